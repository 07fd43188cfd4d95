//! Pull a [`Decision`] out of free-form model output.

use crate::types::Decision;

/// Byte ranges of every balanced top-level `{...}` in `text`, in order.
fn json_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    objects.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    objects
}

/// The first JSON object in `text` that reads as a decision.
pub fn parse_decision(text: &str) -> Option<Decision> {
    json_objects(text)
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<Decision>(candidate).ok())
}

/// Like [`parse_decision`], falling back to an idle decision.
pub fn decide(text: &str) -> Decision {
    parse_decision(text).unwrap_or_else(|| {
        let preview: String = text.chars().take(120).collect();
        Decision::idle(format!("unparsable reply: {}", preview))
    })
}
