//! Fixup scripts.
//!
//! A fixup is a post-parse assignment `target = source` where both sides
//! are access paths into the decoded message tree. The marshaller emits one
//! fixup for every duplicate or circular reference it detects (leaving a
//! `null` placeholder in the target slot), and the receiving side replays
//! the assignments to reconstitute the shared structure.
//!
//! Two wire forms exist. The legacy form is a semicolon-joined string of
//! `lhs=rhs` pairs, each side a chain of access tokens:
//!
//! ```text
//! result[1]=result[0];result[2]["next"]=result[0]
//! ```
//!
//! The structured form is a JSON array of `[target_path, source_path]`
//! pairs where each path is an array of token strings. Both forms are
//! accepted on input; the structured form is emitted.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Failure while parsing or applying a fixup script.
#[derive(Error, Debug)]
pub enum FixupError {
    #[error("malformed fixup path: {0}")]
    MalformedPath(String),

    #[error("fixup source path does not resolve: {0}")]
    MissingSource(String),

    #[error("fixup target path does not resolve: {0}")]
    MissingTarget(String),
}

/// One access step in a fixup path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// A bare name: the envelope field that roots the path (`result`,
    /// `params`), or a legacy unquoted object key.
    Ident(String),
    /// `[<int>]` - an array index.
    Index(usize),
    /// `["<key>"]` - a JSON-escaped object key.
    Key(String),
}

impl PathToken {
    pub fn ident(name: impl Into<String>) -> Self {
        PathToken::Ident(name.into())
    }

    pub fn key(name: impl Into<String>) -> Self {
        PathToken::Key(name.into())
    }

    /// The object key this token selects, if it selects one.
    fn as_key(&self) -> Option<&str> {
        match self {
            PathToken::Ident(name) | PathToken::Key(name) => Some(name),
            PathToken::Index(_) => None,
        }
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Ident(name) => write!(f, "{}", name),
            PathToken::Index(i) => write!(f, "[{}]", i),
            PathToken::Key(k) => write!(f, "[{}]", Value::String(k.clone())),
        }
    }
}

/// A single assignment: after parse, the value at `source` is assigned
/// into the slot at `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixUp {
    pub target: Vec<PathToken>,
    pub source: Vec<PathToken>,
}

impl FixUp {
    pub fn new(target: Vec<PathToken>, source: Vec<PathToken>) -> Self {
        FixUp { target, source }
    }
}

impl fmt::Display for FixUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", display_path(&self.target), display_path(&self.source))
    }
}

/// Renders a token chain in the legacy string syntax.
pub fn display_path(path: &[PathToken]) -> String {
    path.iter().map(PathToken::to_string).collect()
}

/// Parses one token in isolation, as found in the structured wire form.
pub fn parse_token(text: &str) -> Result<PathToken, FixupError> {
    let mut tokens = parse_path(text)?;
    if tokens.len() != 1 {
        return Err(FixupError::MalformedPath(text.to_string()));
    }
    Ok(tokens.remove(0))
}

/// Parses a token chain in the legacy string syntax, e.g.
/// `result[1]["next"]`.
pub fn parse_path(text: &str) -> Result<Vec<PathToken>, FixupError> {
    let malformed = || FixupError::MalformedPath(text.to_string());
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    // Optional leading identifier.
    let ident_end = text.find('[').unwrap_or(text.len());
    if ident_end > 0 {
        let ident = &text[..ident_end];
        if ident.contains(']') || ident.contains('=') {
            return Err(malformed());
        }
        tokens.push(PathToken::Ident(ident.to_string()));
        pos = ident_end;
    }

    while pos < bytes.len() {
        if bytes[pos] != b'[' {
            return Err(malformed());
        }
        pos += 1;
        if pos >= bytes.len() {
            return Err(malformed());
        }
        if bytes[pos] == b'"' {
            // A JSON string literal; scan to its closing quote honoring
            // backslash escapes.
            let start = pos;
            pos += 1;
            while pos < bytes.len() && bytes[pos] != b'"' {
                if bytes[pos] == b'\\' {
                    pos += 1;
                }
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(malformed());
            }
            pos += 1; // past the closing quote
            let literal = &text[start..pos];
            let key: String = serde_json::from_str(literal).map_err(|_| malformed())?;
            if pos >= bytes.len() || bytes[pos] != b']' {
                return Err(malformed());
            }
            pos += 1;
            tokens.push(PathToken::Key(key));
        } else {
            let close = text[pos..].find(']').ok_or_else(malformed)? + pos;
            let index: usize = text[pos..close].parse().map_err(|_| malformed())?;
            tokens.push(PathToken::Index(index));
            pos = close + 1;
        }
    }

    if tokens.is_empty() {
        return Err(malformed());
    }
    Ok(tokens)
}

/// Splits on `sep`, ignoring separators inside JSON string literals.
fn split_outside_strings(text: &str, sep: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b if b == sep && !in_string => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Parses the `fixups` member of a request or response, accepting both the
/// legacy string form and the structured array form.
pub fn parse_fixups(raw: &Value) -> Result<Vec<FixUp>, FixupError> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => {
            let mut fixups = Vec::new();
            for pair in split_outside_strings(text, b';') {
                if pair.is_empty() {
                    continue;
                }
                let sides = split_outside_strings(pair, b'=');
                if sides.len() != 2 {
                    return Err(FixupError::MalformedPath(pair.to_string()));
                }
                fixups.push(FixUp::new(parse_path(sides[0])?, parse_path(sides[1])?));
            }
            Ok(fixups)
        }
        Value::Array(pairs) => {
            let mut fixups = Vec::new();
            for pair in pairs {
                let sides = pair
                    .as_array()
                    .filter(|sides| sides.len() == 2)
                    .ok_or_else(|| FixupError::MalformedPath(pair.to_string()))?;
                fixups.push(FixUp::new(
                    parse_token_list(&sides[0])?,
                    parse_token_list(&sides[1])?,
                ));
            }
            Ok(fixups)
        }
        other => Err(FixupError::MalformedPath(other.to_string())),
    }
}

fn parse_token_list(raw: &Value) -> Result<Vec<PathToken>, FixupError> {
    let items = raw
        .as_array()
        .ok_or_else(|| FixupError::MalformedPath(raw.to_string()))?;
    let mut tokens = Vec::with_capacity(items.len());
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| FixupError::MalformedPath(item.to_string()))?;
        tokens.push(parse_token(text)?);
    }
    if tokens.is_empty() {
        return Err(FixupError::MalformedPath(raw.to_string()));
    }
    Ok(tokens)
}

/// Renders fixups in the structured wire form.
pub fn to_wire_value(fixups: &[FixUp]) -> Value {
    Value::Array(
        fixups
            .iter()
            .map(|f| {
                Value::Array(vec![
                    Value::Array(f.target.iter().map(|t| Value::String(t.to_string())).collect()),
                    Value::Array(f.source.iter().map(|t| Value::String(t.to_string())).collect()),
                ])
            })
            .collect(),
    )
}

fn resolve<'a>(root: &'a Value, path: &[PathToken]) -> Option<&'a Value> {
    let mut current = root;
    for token in path {
        current = match token {
            PathToken::Index(i) => current.get(*i)?,
            other => current.get(other.as_key()?)?,
        };
    }
    Some(current)
}

fn resolve_mut<'a>(root: &'a mut Value, path: &[PathToken]) -> Option<&'a mut Value> {
    let mut current = root;
    for token in path {
        current = match token {
            PathToken::Index(i) => current.get_mut(*i)?,
            other => current.get_mut(other.as_key()?)?,
        };
    }
    Some(current)
}

/// Replays the fixups against a decoded JSON tree, in order. `root` is the
/// full envelope object, so the leading path token names a field of it
/// (`params` on requests, `result` on responses).
pub fn apply_fixups(root: &mut Value, fixups: &[FixUp]) -> Result<(), FixupError> {
    for fixup in fixups {
        let value = resolve(root, &fixup.source)
            .ok_or_else(|| FixupError::MissingSource(display_path(&fixup.source)))?
            .clone();

        let (last, parents) = fixup
            .target
            .split_last()
            .ok_or_else(|| FixupError::MalformedPath(display_path(&fixup.target)))?;
        let parent = resolve_mut(root, parents)
            .ok_or_else(|| FixupError::MissingTarget(display_path(&fixup.target)))?;
        match (parent, last) {
            (Value::Array(items), PathToken::Index(i)) if *i < items.len() => {
                items[*i] = value;
            }
            (Value::Object(map), token) => match token.as_key() {
                Some(key) => {
                    map.insert(key.to_string(), value);
                }
                None => return Err(FixupError::MissingTarget(display_path(&fixup.target))),
            },
            _ => return Err(FixupError::MissingTarget(display_path(&fixup.target))),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_legacy_string_form() {
        let fixups = parse_fixups(&json!("result[1]=result[0];result[2][\"next\"]=result[0]"))
            .expect("parse");
        assert_eq!(fixups.len(), 2);
        assert_eq!(
            fixups[0].target,
            vec![PathToken::ident("result"), PathToken::Index(1)]
        );
        assert_eq!(
            fixups[1].target,
            vec![
                PathToken::ident("result"),
                PathToken::Index(2),
                PathToken::key("next")
            ]
        );
    }

    #[test]
    fn test_parse_structured_form() {
        let fixups =
            parse_fixups(&json!([[["result", "[1]"], ["result", "[0]"]]])).expect("parse");
        assert_eq!(fixups.len(), 1);
        assert_eq!(
            fixups[0].source,
            vec![PathToken::ident("result"), PathToken::Index(0)]
        );
    }

    #[test]
    fn test_key_with_separator_characters() {
        let fixups = parse_fixups(&json!("result[\"a=b;c\"]=result[0]")).expect("parse");
        assert_eq!(fixups.len(), 1);
        assert_eq!(
            fixups[0].target,
            vec![PathToken::ident("result"), PathToken::key("a=b;c")]
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let fixup = FixUp::new(
            vec![
                PathToken::ident("result"),
                PathToken::Index(2),
                PathToken::key("ne\"xt"),
            ],
            vec![PathToken::ident("result")],
        );
        let text = fixup.to_string();
        let reparsed = parse_fixups(&Value::String(text)).expect("reparse");
        assert_eq!(reparsed, vec![fixup]);
    }

    #[test]
    fn test_malformed_paths_rejected() {
        assert!(parse_fixups(&json!("result[=result[0]")).is_err());
        assert!(parse_fixups(&json!("result[1]result[0]")).is_err());
        assert!(parse_fixups(&json!(42)).is_err());
        assert!(parse_token("result[1]").is_err());
    }

    #[test]
    fn test_apply_duplicate() {
        let mut tree = json!({"params": [{"n": 1}, null]});
        let fixups = parse_fixups(&json!("params[1]=params[0]")).expect("parse");
        apply_fixups(&mut tree, &fixups).expect("apply");
        assert_eq!(tree["params"][1], json!({"n": 1}));
    }

    #[test]
    fn test_apply_into_object_key() {
        let mut tree = json!({"result": {"left": {"v": 1}, "right": null}});
        let fixups = parse_fixups(&json!("result[\"right\"]=result[\"left\"]")).expect("parse");
        apply_fixups(&mut tree, &fixups).expect("apply");
        assert_eq!(tree["result"]["right"], json!({"v": 1}));
    }

    #[test]
    fn test_apply_missing_source() {
        let mut tree = json!({"params": [null]});
        let fixups = parse_fixups(&json!("params[0]=params[3]")).expect("parse");
        let err = apply_fixups(&mut tree, &fixups).expect_err("must fail");
        assert!(matches!(err, FixupError::MissingSource(_)));
    }

    #[test]
    fn test_wire_value_round_trip() {
        let fixups = vec![FixUp::new(
            vec![PathToken::ident("result"), PathToken::Index(1)],
            vec![PathToken::ident("result"), PathToken::Index(0)],
        )];
        let wire = to_wire_value(&fixups);
        assert_eq!(wire, json!([[["result", "[1]"], ["result", "[0]"]]]));
        assert_eq!(parse_fixups(&wire).expect("parse"), fixups);
    }
}
