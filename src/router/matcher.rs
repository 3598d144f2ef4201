//! Router selection.

use super::config::RouterEntry;

/// Pick the router for a request.
///
/// A router whose `base_url_pattern` matches the caller's target endpoint
/// wins first, then the first router listing `model`, then the last router.
pub fn match_router<'a>(
    routers: &'a [RouterEntry],
    model: &str,
    target_base_url: Option<&str>,
) -> Option<&'a RouterEntry> {
    if let Some(target) = target_base_url
        && let Some(router) = routers.iter().find(|r| {
            r.base_url_pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(target))
        })
    {
        return Some(router);
    }
    routers
        .iter()
        .find(|r| r.serves(model))
        .or_else(|| routers.last())
}
