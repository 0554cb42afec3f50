//! Flat `{placeholder}` substitution for prompt templates.
//!
//! Templates are scanned by hand rather than fed to a formatting macro so the
//! missing-variable policy is fully under our control:
//!
//! - A placeholder is `{` + identifier + `}`, where an identifier is
//!   `[A-Za-z_][A-Za-z0-9_]*`.
//! - Doubled braces (`{{`, `}}`) are literal brace pairs. They are copied
//!   through verbatim and never open or close a placeholder.
//! - Any other brace text (JSON examples, stray braces) is copied verbatim.
//! - Rendering is all-or-nothing: if any referenced variable is missing, the
//!   original template is returned untouched.
//!
//! Substituted values are not rescanned, so a value containing `{x}` stays
//! literal in the output.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

/// Per-call substitution context: variable name → value.
pub type Variables = HashMap<String, String>;

/// Build a [`Variables`] map from `(name, value)` pairs.
///
/// ```
/// let vars = hp_prompts::vars([("name", "Ada"), ("sid", "42")]);
/// assert_eq!(vars["sid"], "42");
/// ```
pub fn vars<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Variables
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Returned by [`try_render`] when the template references variables the
/// caller did not supply. Holds every missing name, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing template variables: {}", .0.join(", "))]
pub struct MissingVariables(pub Vec<String>);

enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Render `template` with `variables`.
///
/// Never fails. When a placeholder has no matching key the whole template is
/// returned unrendered and a warning names the missing keys.
pub fn render(template: &str, variables: &Variables) -> String {
    match try_render(template, variables) {
        Ok(rendered) => rendered,
        Err(missing) => {
            warn!(missing = ?missing.0, "template left unrendered: {missing}");
            template.to_string()
        }
    }
}

/// Render `template`, reporting missing variables instead of falling back.
pub fn try_render(template: &str, variables: &Variables) -> Result<String, MissingVariables> {
    let segments = scan(template);

    let mut missing: Vec<String> = Vec::new();
    for segment in &segments {
        if let Segment::Placeholder(name) = segment
            && !variables.contains_key(*name)
            && !missing.iter().any(|m| m == *name)
        {
            missing.push((*name).to_string());
        }
    }
    if !missing.is_empty() {
        return Err(MissingVariables(missing));
    }

    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => {
                if let Some(value) = variables.get(name) {
                    out.push_str(value);
                }
            }
        }
    }
    Ok(out)
}

/// Identifiers referenced by `template`, deduplicated, in first-seen order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in scan(template) {
        if let Segment::Placeholder(name) = segment
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

fn scan(template: &str) -> Vec<Segment<'_>> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => i += 2,
            b'{' => {
                let ident_len = identifier_len(bytes.get(i + 1..).unwrap_or_default());
                let close = i + 1 + ident_len;
                if ident_len > 0 && bytes.get(close) == Some(&b'}') {
                    if text_start < i {
                        segments.push(Segment::Text(slice(template, text_start, i)));
                    }
                    segments.push(Segment::Placeholder(slice(template, i + 1, close)));
                    i = close + 1;
                    text_start = i;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    if text_start < bytes.len() {
        segments.push(Segment::Text(slice(template, text_start, bytes.len())));
    }
    segments
}

fn identifier_len(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count()
}

// Boundaries always sit next to ASCII braces, so `get` never misses.
fn slice(s: &str, start: usize, end: usize) -> &str {
    s.get(start..end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_all_placeholders() {
        let out = render(
            "Hello {name}, session {sid}",
            &vars([("name", "A"), ("sid", "s-1")]),
        );
        assert_eq!(out, "Hello A, session s-1");
    }

    #[test]
    fn missing_variable_returns_original_template() {
        let template = "Hello {name}, session {sid}";
        let out = render(template, &vars([("name", "A")]));
        assert_eq!(out, template);
    }

    #[test]
    fn try_render_reports_every_missing_key_once() {
        let err = try_render("{a} {b} {a} {c}", &vars([("b", "x")])).unwrap_err();
        assert_eq!(err.0, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(err.to_string(), "missing template variables: a, c");
    }

    #[test]
    fn placeholder_free_text_is_untouched() {
        let text = "Plain text with no variables. Costs $5 {not closed";
        assert_eq!(render(text, &Variables::new()), text);
        let again = render(&render(text, &Variables::new()), &Variables::new());
        assert_eq!(again, text);
    }

    #[test]
    fn extra_keys_are_ignored() {
        let out = render("Hi {name}", &vars([("name", "B"), ("unused", "zzz")]));
        assert_eq!(out, "Hi B");
    }

    #[test]
    fn json_braces_are_literal() {
        let template = r#"Reply as {"action": "question", "response": "..."} for {user}"#;
        let out = render(template, &vars([("user", "u1")]));
        assert_eq!(
            out,
            r#"Reply as {"action": "question", "response": "..."} for u1"#
        );
    }

    #[test]
    fn doubled_braces_are_not_placeholders() {
        let template = "literal {{name}} and {name}";
        assert_eq!(placeholders(template), vec!["name".to_string()]);
        let out = render(template, &vars([("name", "X")]));
        assert_eq!(out, "literal {{name}} and X");
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render("{a}", &vars([("a", "{b}")]));
        assert_eq!(out, "{b}");
    }

    #[test]
    fn non_identifier_contents_are_literal() {
        let template = "{1abc} {with space} {} {ok_1}";
        assert_eq!(placeholders(template), vec!["ok_1".to_string()]);
        let out = render(template, &vars([("ok_1", "y")]));
        assert_eq!(out, "{1abc} {with space} {} y");
    }

    #[test]
    fn multibyte_text_survives_substitution() {
        let out = render("選択: {selection_content}。", &vars([("selection_content", "見出し")]));
        assert_eq!(out, "選択: 見出し。");
    }

    #[test]
    fn placeholders_in_first_seen_order() {
        assert_eq!(
            placeholders("{b} {a} {b}"),
            vec!["b".to_string(), "a".to_string()]
        );
    }
}
