//! Ordered extraction rules for fields that providers spell differently.
//!
//! Adding a provider quirk means adding a row, not a branch.

use serde_json::Value;

use crate::streaming::Citation;

pub struct ReasoningRule {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<String>,
}

/// Reasoning fields on an OpenAI-style `delta` / `message`. First match wins.
pub const REASONING_RULES: &[ReasoningRule] = &[
    ReasoningRule {
        name: "reasoning_content",
        extract: |delta| string_field(delta, "reasoning_content"),
    },
    ReasoningRule {
        name: "reasoning",
        extract: |delta| string_field(delta, "reasoning"),
    },
    ReasoningRule {
        name: "reasoning_details",
        extract: reasoning_details,
    },
];

pub fn extract_reasoning(delta: &Value) -> Option<String> {
    REASONING_RULES.iter().find_map(|rule| (rule.extract)(delta))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// OpenRouter: `reasoning_details: [{type: "reasoning.text", text}, {type:
/// "reasoning.summary", summary}]`. Encrypted entries carry no text.
fn reasoning_details(delta: &Value) -> Option<String> {
    let details = delta.get("reasoning_details")?.as_array()?;
    let text: String = details
        .iter()
        .filter_map(|d| {
            d.get("text")
                .or_else(|| d.get("summary"))
                .and_then(Value::as_str)
        })
        .collect();
    (!text.is_empty()).then_some(text)
}

pub struct CitationRule {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<Vec<Citation>>,
}

/// Citation shapes on a whole OpenAI-style chunk. First match wins.
pub const CITATION_RULES: &[CitationRule] = &[
    CitationRule {
        name: "citations",
        extract: url_list,
    },
    CitationRule {
        name: "search_results",
        extract: |raw| titled_list(raw.get("search_results")?),
    },
    CitationRule {
        name: "annotations",
        extract: annotations,
    },
    CitationRule {
        name: "search_info",
        extract: |raw| titled_list(raw.pointer("/search_info/search_results")?),
    },
];

/// Extract citations; entries without a usable URL are dropped and a missing
/// title falls back to the URL.
pub fn extract_citations(raw: &Value) -> Option<Vec<Citation>> {
    CITATION_RULES
        .iter()
        .find_map(|rule| (rule.extract)(raw).filter(|c| !c.is_empty()))
}

fn citation(title: Option<&str>, url: Option<&str>) -> Option<Citation> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(url);
    Some(Citation {
        title: title.to_string(),
        url: url.to_string(),
    })
}

/// Perplexity: `citations: ["https://..."]`.
fn url_list(raw: &Value) -> Option<Vec<Citation>> {
    let urls = raw.get("citations")?.as_array()?;
    Some(
        urls.iter()
            .filter_map(|u| citation(None, u.as_str()))
            .collect(),
    )
}

/// `[{title, url}]`, used by `search_results` and `search_info.search_results`.
fn titled_list(list: &Value) -> Option<Vec<Citation>> {
    let items = list.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                citation(
                    item.get("title").and_then(Value::as_str),
                    item.get("url")
                        .or_else(|| item.get("link"))
                        .and_then(Value::as_str),
                )
            })
            .collect(),
    )
}

/// OpenAI web search: `choices[0].delta.annotations[].url_citation`.
fn annotations(raw: &Value) -> Option<Vec<Citation>> {
    let choice = raw.pointer("/choices/0")?;
    let annotations = choice
        .pointer("/delta/annotations")
        .or_else(|| choice.pointer("/message/annotations"))?
        .as_array()?;
    Some(
        annotations
            .iter()
            .filter(|a| a.get("type").and_then(Value::as_str) == Some("url_citation"))
            .filter_map(|a| {
                let c = a.get("url_citation")?;
                citation(
                    c.get("title").and_then(Value::as_str),
                    c.get("url").and_then(Value::as_str),
                )
            })
            .collect(),
    )
}
