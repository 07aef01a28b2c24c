//! Locating JSON payloads inside free-form model output.
//!
//! Instruction-following models wrap their answer in prose or Markdown code
//! fences. These helpers return the first balanced substring that is also
//! well-formed JSON, leaving typed decoding to the caller.

use serde_json::Value;

/// First well-formed JSON array in `text`
pub fn first_json_array(text: &str) -> Option<&str> {
    first_json_value(text, b'[')
}

/// First well-formed JSON object in `text`
pub fn first_json_object(text: &str) -> Option<&str> {
    first_json_value(text, b'{')
}

fn first_json_value(text: &str, open: u8) -> Option<&str> {
    let bytes = text.as_bytes();

    for (start, _) in bytes.iter().enumerate().filter(|(_, b)| **b == open) {
        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        let candidate = &text[start..=end];
        if serde_json::from_str::<Value>(candidate).is_ok() {
            return Some(candidate);
        }
    }

    None
}

/// Index of the bracket closing the one at `start`, ignoring brackets in strings
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}
