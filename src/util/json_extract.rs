//! Balanced-braces JSON extraction.
//!
//! The judge and triage subprotocols ask a model for a JSON object, but
//! models routinely wrap it in prose or code fences. This extracts the
//! first balanced `{...}` substring, string-literal aware, for the caller
//! to parse.

/// Extract the first balanced-braces substring of `text`, or `None` when
/// no complete object is present.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
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

    #[test]
    fn extracts_bare_object() {
        assert_eq!(first_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extracts_from_prose() {
        let text = r#"Sure! Here is the result:

```json
{"groups": [[0, 1], [2]], "reasoning": "0 and 1 agree"}
```

Hope that helps."#;
        assert_eq!(
            first_json_object(text),
            Some(r#"{"groups": [[0, 1], [2]], "reasoning": "0 and 1 agree"}"#)
        );
    }

    #[test]
    fn handles_nested_and_strings() {
        let text = r#"x {"a": {"b": "closing } brace in string"}, "c": 2} trailing {"d": 3}"#;
        assert_eq!(
            first_json_object(text),
            Some(r#"{"a": {"b": "closing } brace in string"}, "c": 2}"#)
        );
    }

    #[test]
    fn escaped_quote_inside_string() {
        let text = r#"{"a": "she said \"}\" loudly"}"#;
        assert_eq!(first_json_object(text), Some(text));
    }

    #[test]
    fn unbalanced_returns_none() {
        assert_eq!(first_json_object(r#"{"a": 1"#), None);
        assert_eq!(first_json_object("no braces here"), None);
    }
}
