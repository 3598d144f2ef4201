//! Inline `<think>` span splitting.
//!
//! Tags are matched inside one chunk; whether the stream is currently inside
//! a span is carried across chunks in `StreamContext::thinking_in_content`.

use crate::streaming::StreamContext;

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Reasoning(String),
}

/// Split `content` into ordered text / reasoning segments.
pub fn split_think(content: &str, ctx: &mut StreamContext) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        if ctx.thinking_in_content {
            match rest.find(CLOSE) {
                Some(pos) => {
                    push(&mut segments, Segment::Reasoning(rest[..pos].to_string()));
                    ctx.thinking_in_content = false;
                    rest = &rest[pos + CLOSE.len()..];
                }
                None => {
                    push(&mut segments, Segment::Reasoning(rest.to_string()));
                    break;
                }
            }
        } else {
            match rest.find(OPEN) {
                Some(pos) => {
                    push(&mut segments, Segment::Text(rest[..pos].to_string()));
                    ctx.thinking_in_content = true;
                    rest = &rest[pos + OPEN.len()..];
                }
                None => {
                    push(&mut segments, Segment::Text(rest.to_string()));
                    break;
                }
            }
        }
    }
    segments
}

fn push(segments: &mut Vec<Segment>, segment: Segment) {
    let empty = match &segment {
        Segment::Text(s) | Segment::Reasoning(s) => s.is_empty(),
    };
    if !empty {
        segments.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_before_mid_after() {
        let mut ctx = StreamContext::new("s");
        let segments = split_think("before<think>mid</think>after", &mut ctx);
        assert_eq!(
            segments,
            vec![
                Segment::Text("before".into()),
                Segment::Reasoning("mid".into()),
                Segment::Text("after".into()),
            ]
        );
        assert!(!ctx.thinking_in_content);
    }

    #[test]
    fn span_state_crosses_chunks() {
        let mut ctx = StreamContext::new("s");
        assert_eq!(
            split_think("<think>step one", &mut ctx),
            vec![Segment::Reasoning("step one".into())]
        );
        assert!(ctx.thinking_in_content);
        assert_eq!(
            split_think(" and two", &mut ctx),
            vec![Segment::Reasoning(" and two".into())]
        );
        assert_eq!(
            split_think("</think>Answer", &mut ctx),
            vec![Segment::Text("Answer".into())]
        );
        assert!(!ctx.thinking_in_content);
    }
}
