//! Response parser: enforces the JSON answer contract on raw completion text.

use serde_json::{Map, Value};

use crate::data::{CompletionAnswer, ParseError, ResolvedItem};

/// Strips surrounding whitespace and an optional Markdown code fence.
fn extract_payload(raw_text: &str) -> &str {
    let trimmed = raw_text.trim();
    let Some(body) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    // Drop the info string ("json"), which may sit on the same line as the object.
    body.trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim()
}

fn required_field(object: &Map<String, Value>, name: &'static str) -> Result<String, ParseError> {
    match object.get(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ParseError::MissingField(name)),
    }
}

/// Parses a completion into a [`ResolvedItem`] and attaches the original abbreviation.
///
/// Catalog membership is not checked here; see [`crate::catalog::Catalog::validate`].
pub fn parse(raw_text: &str, original_item: &str) -> Result<ResolvedItem, ParseError> {
    let payload = extract_payload(raw_text);
    let value: Value = serde_json::from_str(payload).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
        raw: raw_text.to_string(),
    })?;
    let object = value.as_object().ok_or_else(|| ParseError::InvalidJson {
        message: "expected a JSON object".to_string(),
        raw: raw_text.to_string(),
    })?;

    let [name_field, main_field, sub_field] = CompletionAnswer::FIELD_NAMES;
    let answer = CompletionAnswer {
        product_name: required_field(object, name_field)?,
        category_main: required_field(object, main_field)?,
        category_sub: required_field(object, sub_field)?,
    };
    Ok(ResolvedItem::from_answer(answer, original_item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_known_good_answer() {
        let raw = r#"{"productName": "Granatapfel", "categoryMain": "Obst & Gemüse", "categorySub": "Frisches Obst"}"#;
        let item = parse(raw, "GRANATAPEL").unwrap();
        assert_eq!(
            item,
            ResolvedItem {
                product_abbr: "GRANATAPEL".into(),
                product_name: "Granatapfel".into(),
                category_main: "Obst & Gemüse".into(),
                category_sub: "Frisches Obst".into(),
            }
        );
    }

    #[test]
    fn test_tolerates_whitespace_and_fences() {
        let body = r#"{"productName": "Milch", "categoryMain": "Käse, Eier & Molkerei", "categorySub": "Milch"}"#;
        for raw in [
            format!("\n\n  {body}  \n"),
            format!("```json\n{body}\n```"),
            format!("```\n{body}\n```\n"),
            format!("```json{body}```"),
            format!("```{body}```"),
        ] {
            let item = parse(&raw, "H-MILCH").unwrap();
            assert_eq!(item.product_name, "Milch");
            assert_eq!(item.product_abbr, "H-MILCH");
        }
    }

    #[test]
    fn test_non_json_is_rejected() {
        let err = parse("productName: Granatapfel, categoryMain: Obst", "GRANATAPEL").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));

        let err = parse("[1, 2, 3]", "X").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson { .. }));
    }

    #[test]
    fn test_missing_or_blank_fields() {
        let err = parse(r#"{"productName": "A", "categoryMain": "B"}"#, "X").unwrap_err();
        assert_eq!(err, ParseError::MissingField("categorySub"));

        let err = parse(r#"{"productName": " ", "categoryMain": "B", "categorySub": "C"}"#, "X")
            .unwrap_err();
        assert_eq!(err, ParseError::MissingField("productName"));

        // snake_case keys are not part of the contract
        let err = parse(
            r#"{"productName": "A", "category_main": "B", "categorySub": "C"}"#,
            "X",
        )
        .unwrap_err();
        assert_eq!(err, ParseError::MissingField("categoryMain"));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let raw = r#"{"productName": "A", "categoryMain": "B", "categorySub": "C", "confidence": 0.9}"#;
        assert_eq!(parse(raw, "X").unwrap().category_sub, "C");
    }
}
