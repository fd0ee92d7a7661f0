//! Checksum normalization of embedded JSON in plan output.
//!
//! The engine prints JSON-valued attributes as escaped strings and does not
//! keep their key order stable between runs. Normalization parses each such
//! string, re-serializes it with keys sorted recursively and escapes it back,
//! so identical plans checksum identically.
//!
//! Malformed blobs leave their line untouched: the checksum is a change
//! detector, not a validator.

use super::PlanFormat;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// `attr:   "old" => "new"` lines holding a pretty-printed escaped blob.
static LEGACY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s+[\w.%#-]+:\s+)(.+?"\{\\n.+?\\n\}".*)$"#).expect("legacy line regex is valid")
});

static LEGACY_BLOB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"\{\\n.+?\\n\}"$"#).expect("legacy blob regex is valid"));

/// `attr = "old" -> "new"` lines holding a single-line escaped blob.
static MODERN_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*(?:[+~-]\s+)?"?[\w.-]+"?\s+=\s+)(.*"[\{\[]\\".*)$"#)
        .expect("modern line regex is valid")
});

static MODERN_BLOB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"[\{\[].*[\}\]]"$"#).expect("modern blob regex is valid"));

/// Normalize every line of `data`.
#[must_use]
pub fn normalize(data: &str, format: PlanFormat) -> String {
    data.split('\n')
        .map(|line| normalize_line(line, format))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize one line, returning it unchanged when it holds no blob or any
/// blob fails to parse.
#[must_use]
pub fn normalize_line(line: &str, format: PlanFormat) -> String {
    let (line_re, blob_re, separator) = match format {
        PlanFormat::Legacy => (&*LEGACY_LINE_RE, &*LEGACY_BLOB_RE, " => "),
        PlanFormat::Modern => (&*MODERN_LINE_RE, &*MODERN_BLOB_RE, " -> "),
    };

    let Some(caps) = line_re.captures(line) else {
        return line.to_string();
    };
    let (Some(attribute), Some(values)) = (caps.get(1), caps.get(2)) else {
        return line.to_string();
    };

    let mut normalized = Vec::new();
    for piece in values.as_str().split(separator) {
        if !blob_re.is_match(piece.trim()) {
            normalized.push(piece.to_string());
            continue;
        }
        match sort_blob(piece.trim()) {
            Some(blob) => normalized.push(rewrap(piece, &blob)),
            None => {
                log::warn!("Leaving malformed JSON blob unnormalized: {}", piece.trim());
                return line.to_string();
            }
        }
    }

    format!("{}{}", attribute.as_str(), normalized.join(separator))
}

/// Parse a quoted, escaped JSON string and re-quote it with sorted keys.
fn sort_blob(quoted: &str) -> Option<String> {
    let json: String = serde_json::from_str(quoted).ok()?;
    let value: Value = serde_json::from_str(json.trim_end()).ok()?;
    let compact = serde_json::to_string(&sort_keys(value)).ok()?;
    serde_json::to_string(&compact).ok()
}

/// Order object keys at every depth, whatever map the `Value` is backed by.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn rewrap(original: &str, replacement: &str) -> String {
    let leading = &original[..original.len() - original.trim_start().len()];
    let trailing = &original[original.trim_end().len()..];
    format!("{}{}{}", leading, replacement, trailing)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_A: &str = r#"      policy:                    "{\n  \"Version\": \"2012-10-17\",\n  \"Statement\": [\n    {\n      \"Effect\": \"Allow\",\n      \"Action\": \"s3:GetObject\"\n    }\n  ]\n}" => "{\n  \"Statement\": [],\n  \"Version\": \"2012-10-17\"\n}""#;
    const LEGACY_B: &str = r#"      policy:                    "{\n  \"Statement\": [\n    {\n      \"Action\": \"s3:GetObject\",\n      \"Effect\": \"Allow\"\n    }\n  ],\n  \"Version\": \"2012-10-17\"\n}" => "{\n  \"Version\": \"2012-10-17\",\n  \"Statement\": []\n}""#;

    #[test]
    fn test_legacy_key_order_is_irrelevant() {
        assert_ne!(LEGACY_A, LEGACY_B);
        assert_eq!(
            normalize_line(LEGACY_A, PlanFormat::Legacy),
            normalize_line(LEGACY_B, PlanFormat::Legacy)
        );
    }

    #[test]
    fn test_legacy_output_is_compact_and_sorted() {
        let line = r#"  tags:   "{\n  \"b\": 1,\n  \"a\": {\n    \"d\": 2,\n    \"c\": 3\n  }\n}""#;
        assert_eq!(
            normalize_line(line, PlanFormat::Legacy),
            r#"  tags:   "{\"a\":{\"c\":3,\"d\":2},\"b\":1}""#
        );
    }

    #[test]
    fn test_legacy_keeps_non_blob_pieces() {
        let line = r#"  policy:   "" => "{\n  \"b\": 1,\n  \"a\": 2\n}""#;
        assert_eq!(
            normalize_line(line, PlanFormat::Legacy),
            r#"  policy:   "" => "{\"a\":2,\"b\":1}""#
        );
    }

    #[test]
    fn test_malformed_blob_leaves_line() {
        let line = r#"  policy:   "{\n  \"b\": 1,\n  \"a\": \n}""#;
        assert_eq!(normalize_line(line, PlanFormat::Legacy), line);
    }

    #[test]
    fn test_plain_lines_untouched() {
        for line in [
            "  + aws_instance.web",
            "      ami:                       \"ami-0123\"",
            "",
            "Plan: 1 to add, 0 to change, 0 to destroy.",
        ] {
            assert_eq!(normalize_line(line, PlanFormat::Legacy), line);
            assert_eq!(normalize_line(line, PlanFormat::Modern), line);
        }
    }

    #[test]
    fn test_modern_key_order_is_irrelevant() {
        let a = r#"      ~ policy = "{\"b\":1,\"a\":[{\"y\":true,\"x\":null}]}" -> "{\"a\":[]}""#;
        let b = r#"      ~ policy = "{\"a\":[{\"x\":null,\"y\":true}],\"b\":1}" -> "{\"a\":[]}""#;
        assert_eq!(
            normalize_line(a, PlanFormat::Modern),
            normalize_line(b, PlanFormat::Modern)
        );
        assert_eq!(
            normalize_line(a, PlanFormat::Modern),
            r#"      ~ policy = "{\"a\":[{\"x\":null,\"y\":true}],\"b\":1}" -> "{\"a\":[]}""#
        );
    }

    #[test]
    fn test_legacy_pattern_ignored_by_modern() {
        assert_eq!(normalize_line(LEGACY_A, PlanFormat::Modern), LEGACY_A);
    }

    #[test]
    fn test_normalize_preserves_line_structure() {
        let data = format!("header\n{}\nfooter\n", LEGACY_A);
        let normalized = normalize(&data, PlanFormat::Legacy);
        assert_eq!(normalized.lines().count(), 3);
        assert!(normalized.starts_with("header\n"));
        assert!(normalized.ends_with("footer\n"));
    }

    #[test]
    fn test_nested_keys_sorted_at_every_depth() {
        let line = r#"      + policy = "{\"z\":{\"y\":{\"b\":[{\"q\":1,\"p\":{\"n\":0,\"m\":0}}],\"a\":2},\"x\":3},\"c\":4}""#;
        assert_eq!(
            normalize_line(line, PlanFormat::Modern),
            r#"      + policy = "{\"c\":4,\"z\":{\"x\":3,\"y\":{\"a\":2,\"b\":[{\"p\":{\"m\":0,\"n\":0},\"q\":1}]}}}""#
        );
    }

    #[test]
    fn test_escaped_strings_survive_requoting() {
        let line = r#"  + policy = "{\"path\":\"C:\\\\tmp\",\"msg\":\"say \\\"hi\\\"\\nbye\"}""#;
        assert_eq!(
            normalize_line(line, PlanFormat::Modern),
            r#"  + policy = "{\"msg\":\"say \\\"hi\\\"\\nbye\",\"path\":\"C:\\\\tmp\"}""#
        );
    }

    #[test]
    fn test_sort_keys_orders_nested_objects() {
        let value: Value = serde_json::from_str(r#"{"b":{"d":1,"c":[{"f":1,"e":2}]},"a":0}"#).unwrap();
        let keys: Vec<String> = sort_keys(value.clone())
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(
            serde_json::to_string(&sort_keys(value)).unwrap(),
            r#"{"a":0,"b":{"c":[{"e":2,"f":1}],"d":1}}"#
        );
    }
}
