//! Tolerant extraction of JSON from free-form model output.
//!
//! Models wrap JSON in prose or markdown fences and sometimes emit several
//! candidates. Every balanced `{...}` / `[...]` span is tried in order of
//! appearance and the first one that deserializes into the requested type
//! wins. Anything else means "no structured result" and the caller falls back
//! to treating the completion as plain text.

use serde::de::DeserializeOwned;

/// First JSON object in `text` that deserializes into `T`.
pub fn extract_json_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    first_parse(text, b'{', b'}')
}

/// First JSON array in `text` that deserializes into `T`.
pub fn extract_json_array<T: DeserializeOwned>(text: &str) -> Option<T> {
    first_parse(text, b'[', b']')
}

fn first_parse<T: DeserializeOwned>(text: &str, open: u8, close: u8) -> Option<T> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == open)
        .filter_map(|(start, _)| balanced_end(bytes, start, open, close).map(|end| (start, end)))
        .find_map(|(start, end)| serde_json::from_str(&text[start..=end]).ok())
}

/// Index of the delimiter closing the one at `start`, skipping string literals.
///
/// Only ASCII delimiters are inspected, so every returned index sits on a
/// UTF-8 boundary.
fn balanced_end(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pick {
        recommendation: String,
        reason: String,
    }

    #[test]
    fn object_inside_prose() {
        let text = r#"Sure! {"recommendation": "promo1", "reason": "fits you"} Enjoy."#;
        let pick: Pick = extract_json_object(text).unwrap();
        assert_eq!(pick.recommendation, "promo1");
    }

    #[test]
    fn object_inside_fence() {
        let text = "```json\n{\"recommendation\": \"a\", \"reason\": \"b\"}\n```";
        assert_eq!(
            extract_json_object::<Pick>(text),
            Some(Pick {
                recommendation: "a".into(),
                reason: "b".into()
            })
        );
    }

    #[test]
    fn braces_in_strings_do_not_confuse_the_scan() {
        let text = r#"{"recommendation": "x", "reason": "use } and { freely"}"#;
        let pick: Pick = extract_json_object(text).unwrap();
        assert_eq!(pick.reason, "use } and { freely");
    }

    #[test]
    fn skips_objects_of_the_wrong_shape() {
        let text = r#"{"note": 1} then {"recommendation": "r", "reason": "why"}"#;
        let pick: Pick = extract_json_object(text).unwrap();
        assert_eq!(pick.recommendation, "r");
    }

    #[test]
    fn plain_question_has_no_object() {
        assert!(extract_json_object::<Pick>("What are you working on right now?").is_none());
        assert!(extract_json_object::<Pick>("{broken").is_none());
    }

    #[test]
    fn array_after_prose() {
        let text = "Here you go:\n[{\"a\": 1}, {\"a\": 2}]\nDone.";
        let values: Vec<serde_json::Value> = extract_json_array(text).unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn empty_array() {
        let values: Vec<serde_json::Value> = extract_json_array("[]").unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn non_ascii_text_around_json() {
        let text = "Вот факты: [\"ёлка\"] — готово";
        let values: Vec<String> = extract_json_array(text).unwrap();
        assert_eq!(values, vec!["ёлка"]);
    }
}
