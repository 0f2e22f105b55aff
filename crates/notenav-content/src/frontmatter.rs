//! YAML frontmatter splitting and lookup.

use serde_yaml::{Mapping, Value};
use tracing::debug;

/// A note split into frontmatter and body.
#[derive(Debug)]
pub struct ParsedNote<'a> {
    pub frontmatter: Option<Frontmatter>,
    pub body: &'a str,
}

/// Parsed frontmatter properties.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter(Mapping);

impl Frontmatter {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Scalar value rendered as a trimmed, non-empty string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_to_string)
    }

    /// Sequence of scalars, or a single scalar as a one-element list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(value) => scalar_to_string(value).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Tagged(tagged) => return scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Split raw frontmatter from the body. Returns `(None, text)` when the
/// note does not open with a closed `---` block.
pub fn split(text: &str) -> (Option<&str>, &str) {
    let content = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = content.strip_prefix("---") else {
        return (None, text);
    };
    let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, text)
}

/// Split and parse a note. Malformed YAML yields no frontmatter.
pub fn parse(text: &str) -> ParsedNote<'_> {
    let (raw, body) = split(text);
    let frontmatter = raw.and_then(|yaml| match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => Some(Frontmatter(map)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed frontmatter");
            None
        }
    });
    ParsedNote { frontmatter, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frontmatter() {
        let (yaml, body) = split("---\ntitle: x\n---\nbody\n");
        assert_eq!(yaml, Some("title: x\n"));
        assert_eq!(body, "body\n");
    }

    #[test]
    fn test_split_without_frontmatter() {
        assert_eq!(split("# Title\n"), (None, "# Title\n"));
        assert_eq!(split("---\nunterminated"), (None, "---\nunterminated"));
        assert_eq!(split("----\n"), (None, "----\n"));
    }

    #[test]
    fn test_split_empty_block_and_crlf() {
        assert_eq!(split("---\n---\nbody"), (Some(""), "body"));
        assert_eq!(split("---\r\na: 1\r\n---\r\nbody"), (Some("a: 1\r\n"), "body"));
    }

    #[test]
    fn test_parse_values() {
        let note = parse("---\ntitle: Hello\ncount: 3\ntags: [a, b]\nempty:\n---\ntext");
        let fm = note.frontmatter.unwrap();
        assert_eq!(fm.get_str("title").as_deref(), Some("Hello"));
        assert_eq!(fm.get_str("count").as_deref(), Some("3"));
        assert_eq!(fm.get_str("empty"), None);
        assert_eq!(fm.get_list("tags"), vec!["a", "b"]);
        assert_eq!(fm.get_list("title"), vec!["Hello"]);
        assert!(fm.get_list("missing").is_empty());
        assert_eq!(note.body, "text");
    }

    #[test]
    fn test_parse_malformed_yaml_keeps_body() {
        let note = parse("---\n: [unclosed\n---\nbody");
        assert!(note.frontmatter.is_none());
        assert_eq!(note.body, "body");
    }
}
