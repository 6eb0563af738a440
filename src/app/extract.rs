//! Recovers the hypothesis from the engine's JSON result by key.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Final,
    Partial,
}

/// The hypothesis in `raw`, or `""` if there is none or `raw` is malformed.
pub fn extract(raw: &str) -> String {
    extract_kind(raw).map(|(s, _)| s).unwrap_or_default()
}

/// Like [`extract`], also reporting which field the value came from.
/// Returns `None` when there is no non-empty hypothesis.
pub fn extract_kind(raw: &str) -> Option<(String, ResultKind)> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let obj = value.as_object()?;

    let (text, kind) = if let Some(text) = obj.get("text") {
        (text.as_str()?, ResultKind::Final)
    } else if let Some(partial) = obj.get("partial") {
        (partial.as_str()?, ResultKind::Partial)
    } else {
        // {"alternatives": [{"confidence": .., "text": ..}, ..]}
        let first = obj.get("alternatives")?.as_array()?.first()?;
        (first.get("text")?.as_str()?, ResultKind::Final)
    };

    let text = text.trim();
    (!text.is_empty()).then(|| (text.to_string(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::final_text(r#"{"text": "b"}"#, "b")]
    #[case::partial(r#"{"partial": "kilo"}"#, "kilo")]
    #[case::multi_word(r#"{"text" : "a the"}"#, "a the")]
    #[case::surrounding_whitespace("\n  {\"text\": \"c\"}  \n", "c")]
    #[case::padded_value(r#"{"text": "  d "}"#, "d")]
    #[case::embedded_escaped_quotes(r#"{"text": "he said \"b\""}"#, r#"he said "b""#)]
    #[case::extra_fields_first(r#"{"result": [{"word": "x", "conf": 1.0}], "text": "x"}"#, "x")]
    #[case::key_lookalike_in_value(r#"{"spk": "\"text\": \"q\"", "partial": "r"}"#, "r")]
    #[case::alternatives(r#"{"alternatives": [{"confidence": 2.0, "text": "e"}, {"text": "f"}]}"#, "e")]
    #[case::unknown_token(r#"{"text": "[unk]"}"#, "[unk]")]
    fn test_extract(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(extract(raw), expected);
    }

    #[rstest]
    #[case::empty_input("")]
    #[case::garbage("garbage")]
    #[case::empty_partial(r#"{"partial": ""}"#)]
    #[case::empty_text(r#"{"text" : ""}"#)]
    #[case::no_field(r#"{"other": "b"}"#)]
    #[case::truncated(r#"{"text": "b"#)]
    #[case::non_string_value(r#"{"text": 42}"#)]
    #[case::null_value(r#"{"text": null}"#)]
    #[case::array_root(r#"["text", "b"]"#)]
    #[case::empty_alternatives(r#"{"alternatives": []}"#)]
    fn test_extract_empty(#[case] raw: &str) {
        assert_eq!(extract(raw), "");
    }

    #[test]
    fn test_kind() {
        assert_eq!(
            extract_kind(r#"{"text": "b"}"#),
            Some(("b".to_string(), ResultKind::Final))
        );
        assert_eq!(
            extract_kind(r#"{"partial": "b"}"#),
            Some(("b".to_string(), ResultKind::Partial))
        );
        assert_eq!(extract_kind(r#"{"partial": ""}"#), None);
    }
}
