//! Locating and validating JSON in free-form model output.
//!
//! Models are never assumed to support structured output. A response is
//! searched for a JSON object (the whole text, fenced blocks, then the
//! first balanced `{...}` span), parsed to a generic value, and then read
//! field by field through [`Fields`]. Every failure is a [`ParseError`]
//! so callers can tell a garbled answer apart from a transport failure.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum length of response text echoed back in parse errors.
const PREVIEW_LEN: usize = 300;

/// Why a model response could not be turned into the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("no JSON object found in response: {preview}")]
    NoJsonObject { preview: String },

    #[error("invalid JSON in response: {reason}")]
    InvalidJson { reason: String },

    #[error("field '{field}' is missing or not {expected}")]
    Shape {
        field: &'static str,
        expected: &'static str,
    },
}

/// Content inside markdown code fences. The closing fence must start a
/// line so backticks inside JSON strings don't end the match.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").expect("fence regex is valid"));

/// Find and parse the first JSON object in `text`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut first_error = None;
    for candidate in json_candidates(trimmed) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    match first_error {
        Some(reason) if trimmed.contains('{') => Err(ParseError::InvalidJson { reason }),
        _ => Err(ParseError::NoJsonObject {
            preview: preview(trimmed),
        }),
    }
}

/// Candidate substrings, most specific first.
fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    if text.starts_with('{') {
        candidates.push(text);
    }

    for cap in FENCE_RE.captures_iter(text) {
        if let Some(inner) = cap.get(1) {
            let inner = inner.as_str().trim();
            if inner.starts_with('{') {
                candidates.push(inner);
            }
        }
    }

    if let Some(span) = first_balanced_object(text) {
        candidates.push(span);
    }

    candidates
}

/// Return the first balanced `{...}` span, ignoring braces inside strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

/// Field-level reader over a parsed JSON object.
///
/// Each accessor takes a list of accepted keys (snake_case first, then
/// camelCase) because models drift between the two.
pub struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|k| self.map.get(*k))
    }

    /// A string field that must be present.
    pub fn required_str(&self, keys: &[&'static str]) -> Result<String, ParseError> {
        match self.get(keys) {
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            _ => Err(ParseError::Shape {
                field: keys[0],
                expected: "a string",
            }),
        }
    }

    /// A string field, empty when absent or mistyped.
    pub fn str_or_empty(&self, keys: &[&str]) -> String {
        match self.get(keys) {
            Some(Value::String(s)) => s.trim().to_string(),
            _ => String::new(),
        }
    }

    /// An optional integer field.
    pub fn usize_opt(&self, keys: &[&str]) -> Option<usize> {
        self.get(keys)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }

    /// An array of objects; non-arrays and non-object elements are dropped.
    pub fn objects(&self, keys: &[&str]) -> Vec<Fields<'a>> {
        match self.get(keys) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(Fields::new)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// An array of objects that must be present, even if empty.
    pub fn required_objects(&self, keys: &[&'static str]) -> Result<Vec<Fields<'a>>, ParseError> {
        match self.get(keys) {
            Some(Value::Array(_)) => Ok(self.objects(keys)),
            _ => Err(ParseError::Shape {
                field: keys[0],
                expected: "an array",
            }),
        }
    }

    /// An array of strings; non-string elements are dropped.
    pub fn strings(&self, keys: &[&str]) -> Vec<String> {
        match self.get(keys) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// An array of names, each a plain string or an object with a `name`,
    /// in array order.
    pub fn names(&self, keys: &[&str]) -> Vec<String> {
        match self.get(keys) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name.as_str()),
                    Value::Object(map) => map.get("name").and_then(Value::as_str),
                    _ => None,
                })
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}
