//! Escape filters applied to output statements
//!
//! An output statement names a filter by prefix: `<%html= name %>`,
//! `<%u= query %>`, or `<%= name %>` for the configured default.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// A named output filter
pub type Filter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// A filter bound into compiled code, keeping its name for diagnostics
#[derive(Clone)]
pub struct BoundFilter {
    pub name: String,
    pub func: Filter,
}

impl BoundFilter {
    pub fn apply(&self, value: &Value) -> String {
        (self.func)(value)
    }
}

impl fmt::Debug for BoundFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundFilter({})", self.name)
    }
}

pub fn escape_html(value: &Value) -> String {
    html_escape::encode_quoted_attribute(&value.to_string()).into_owned()
}

pub fn no_escape(value: &Value) -> String {
    value.to_string()
}

pub fn escape_url_with_plus(value: &Value) -> String {
    percent_encode(&value.to_string(), true)
}

pub fn escape_url_without_plus(value: &Value) -> String {
    percent_encode(&value.to_string(), false)
}

/// Serialize to JSON with every non-ASCII character written as `\uXXXX`
pub fn escape_json(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    if json.is_ascii() {
        return json;
    }
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

/// Percent-encode everything outside the unreserved set
///
/// With `plus_for_space` a space becomes `+` and `/` is encoded (form
/// encoding); without it a space becomes `%20` and `/` is kept.
fn percent_encode(input: &str, plus_for_space: bool) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(char::from(byte))
            }
            b' ' if plus_for_space => out.push('+'),
            b'/' if !plus_for_space => out.push('/'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[usize::from(byte >> 4)]));
                out.push(char::from(HEX[usize::from(byte & 0x0f)]));
            }
        }
    }
    out
}

/// The built-in filter table
///
/// `default` is not included: it resolves to whichever filter the config
/// names as its default escape.
pub fn builtin_filters() -> BTreeMap<String, Filter> {
    let html: Filter = Arc::new(escape_html);
    let raw: Filter = Arc::new(no_escape);
    let url: Filter = Arc::new(escape_url_with_plus);
    let url_without_plus: Filter = Arc::new(escape_url_without_plus);
    let json: Filter = Arc::new(escape_json);

    [
        ("html", html.clone()),
        ("h", html),
        ("raw", raw.clone()),
        ("r", raw),
        ("url_with_plus", url.clone()),
        ("url", url.clone()),
        ("u", url),
        ("url_without_plus", url_without_plus),
        ("json", json.clone()),
        ("j", json),
    ]
    .into_iter()
    .map(|(name, filter)| (name.to_string(), filter))
    .collect()
}
