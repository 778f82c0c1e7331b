//! Structured output parsing
//!
//! While a structured response streams in, its text is an unfinished JSON
//! document. [`complete_partial_json`] closes it just enough to be parseable so
//! callers can render progressively filled objects. Partial parsing is always
//! best-effort: failures yield `None` and are never surfaced.
//!
//! Once the response completes, [`parse_strict`] parses the full text with no
//! leniency and turns any failure into an error.

use crate::types::Response;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object,
    Array,
}

/// Close an unfinished JSON document.
///
/// Unterminated strings, arrays and objects are closed in nesting order, a
/// trailing comma is dropped, a key with no value gets `null`, a dangling key is
/// removed and a truncated literal or number is completed or dropped. Only
/// documents whose root is an object or array are accepted.
pub fn complete_partial_json(partial: &str) -> Option<String> {
    let trimmed = partial.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }

    let mut out = String::with_capacity(trimmed.len() + 8);
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut expecting_key = false;
    // Byte offset in `out` where the key currently being written started.
    let mut key_start: Option<usize> = None;
    let mut string_start = 0;

    for ch in trimmed.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                string_start = out.len();
                if stack.last() == Some(&Frame::Object) && expecting_key {
                    key_start = Some(out.len());
                }
            }
            '{' => {
                stack.push(Frame::Object);
                expecting_key = true;
            }
            '[' => {
                stack.push(Frame::Array);
                expecting_key = false;
            }
            '}' | ']' => {
                stack.pop();
                expecting_key = false;
                key_start = None;
            }
            ':' => {
                expecting_key = false;
                key_start = None;
            }
            ',' => {
                expecting_key = stack.last() == Some(&Frame::Object);
            }
            _ => {}
        }
        out.push(ch);
    }

    if stack.is_empty() && !in_string {
        return Some(out);
    }

    if in_string {
        // A half-written escape cannot be closed; drop it.
        if escaped {
            out.pop();
        } else if let Some(pos) = out[string_start..].rfind("\\u") {
            let hex = &out[string_start + pos + 2..];
            if hex.len() < 4 {
                out.truncate(string_start + pos);
            }
        }
        out.push('"');
    }

    // A key without its colon has no value to pair with.
    if let Some(start) = key_start {
        out.truncate(start);
    }

    finish_dangling_value(&mut out);

    while let Some(frame) = stack.pop() {
        out.push(match frame {
            Frame::Object => '}',
            Frame::Array => ']',
        });
    }

    Some(out)
}

fn finish_dangling_value(out: &mut String) {
    loop {
        let end = out.trim_end().len();
        out.truncate(end);

        // Byte scan: the last non-matching byte always ends a char.
        let tail_start = out
            .as_bytes()
            .iter()
            .rposition(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'+')))
            .map(|i| i + 1)
            .unwrap_or(0);
        let tail = &out[tail_start..];

        if !tail.is_empty() {
            if let Some(literal) = ["true", "false", "null"]
                .into_iter()
                .find(|lit| lit.starts_with(tail))
            {
                out.truncate(tail_start);
                out.push_str(literal);
                return;
            }
            if serde_json::from_str::<f64>(tail).is_err() || tail.ends_with(['.', '-', '+', 'e', 'E']) {
                out.truncate(tail_start);
                continue;
            }
            return;
        }

        match out.chars().last() {
            Some(',') => {
                out.pop();
            }
            Some(':') => {
                out.push_str("null");
                return;
            }
            _ => return,
        }
    }
}

/// Best-effort parse of a partial document into `P`.
pub fn parse_partial<P: DeserializeOwned>(buffer: &str) -> Option<P> {
    let completed = complete_partial_json(buffer)?;
    serde_json::from_str(&completed).ok()
}

/// Best-effort parse of a partial document into a generic key/value view.
pub fn parse_partial_map(buffer: &str) -> Option<Map<String, Value>> {
    match parse_partial::<Value>(buffer)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Strictly parse the output text of a finished response.
///
/// Fails with [`ErrorKind::MissingOutput`](crate::ErrorKind::MissingOutput)
/// when the response has no output text at all, and with
/// [`ErrorKind::Parsing`](crate::ErrorKind::Parsing) when the text is not a
/// valid `T`.
pub fn parse_strict<T: DeserializeOwned>(response: &Response) -> Result<T> {
    let text = response
        .output_text_opt()
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| {
            Error::missing_output(format!(
                "Response {} contained no output text to parse",
                response.id
            ))
            .with_suggestion("Check that the model supports structured output")
        })?;

    serde_json::from_str(&text).map_err(|e| {
        Error::parsing(format!("Structured output could not be parsed: {}", e))
            .with_response_body(Some(text.clone()))
            .with_source(e)
    })
}

/// Accumulates streamed text and re-parses it after every fragment.
#[derive(Debug)]
pub struct StructuredOutputParser<P> {
    buffer: String,
    _marker: PhantomData<fn() -> P>,
}

impl<P> Default for StructuredOutputParser<P> {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            _marker: PhantomData,
        }
    }
}

impl<P: DeserializeOwned> StructuredOutputParser<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the current best-effort parse.
    pub fn push(&mut self, fragment: &str) -> Option<P> {
        self.buffer.push_str(fragment);
        parse_partial(&self.buffer)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}
