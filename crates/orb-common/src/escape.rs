//! ASCII-clean JSON output.
//!
//! Some transports mangle non-ASCII encodings, so the wire encoding
//! escapes every code point outside `0x20..0x7E` as `\uXXXX` (with UTF-16
//! surrogate pairs above the basic plane). Quotes, backslashes, and
//! control characters are escaped by serde_json's own machinery before
//! string fragments reach the formatter.

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;

struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if (' '..='~').contains(&ch) {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serializes a value as compact JSON containing only printable ASCII.
pub fn to_ascii_json<T>(value: &T) -> serde_json::Result<String>
where
    T: ?Sized + Serialize,
{
    let mut out = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(out).expect("formatter emits ASCII only"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_ascii_passes_through() {
        let out = to_ascii_json(&json!({"id": 1, "result": "hello"})).expect("serialize");
        assert_eq!(out, r#"{"id":1,"result":"hello"}"#);
    }

    #[test]
    fn test_non_ascii_escaped() {
        let out = to_ascii_json(&json!("héllo")).expect("serialize");
        assert_eq!(out, "\"h\\u00e9llo\"");
    }

    #[test]
    fn test_astral_plane_uses_surrogate_pair() {
        let out = to_ascii_json(&json!("𝄞")).expect("serialize");
        assert_eq!(out, "\"\\ud834\\udd1e\"");
    }

    #[test]
    fn test_quotes_and_controls_still_escaped() {
        let out = to_ascii_json(&json!("a\"b\\c\nd")).expect("serialize");
        assert_eq!(out, r#""a\"b\\c\nd""#);
    }

    #[test]
    fn test_output_is_ascii() {
        let out = to_ascii_json(&json!({"k": "日本語 \u{1F600}"})).expect("serialize");
        assert!(out.is_ascii());
        let back: serde_json::Value = serde_json::from_str(&out).expect("reparse");
        assert_eq!(back["k"], json!("日本語 \u{1F600}"));
    }

    #[test]
    fn test_non_ascii_keys_escaped() {
        let out = to_ascii_json(&json!({"clé": 1})).expect("serialize");
        assert_eq!(out, "{\"cl\\u00e9\":1}");
    }
}
