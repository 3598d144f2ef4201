//! Markdown base64 images inside text deltas.

use regex::Regex;

use crate::streaming::Base64Image;

lazy_static::lazy_static! {
    static ref MARKDOWN_DATA_IMAGE: Regex =
        Regex::new(r"!\[[^\]]*\]\((data:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/=\s]+)\)")
            .unwrap_or_else(|e| panic!("invalid markdown image pattern: {e}"));
}

/// Strip every markdown data-URI image from `text`, returning the cleaned
/// text and the images in order of appearance.
pub fn extract_markdown_images(text: &str) -> (String, Vec<Base64Image>) {
    if !text.contains("data:image/") {
        return (text.to_string(), Vec::new());
    }
    let images = MARKDOWN_DATA_IMAGE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| Base64Image {
            url: m.as_str().split_whitespace().collect(),
        })
        .collect();
    let cleaned = MARKDOWN_DATA_IMAGE.replace_all(text, "").into_owned();
    (cleaned, images)
}
