//! Parsed event socket messages

use crate::constants::{
    HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HEADER_EVENT_NAME, HEADER_REPLY_TEXT,
};
use crate::error::{SwitchError, SwitchResult};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Wire encoding used for event subscription and parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum EventEncoding {
    /// MIME-style `text/event-plain` (default)
    #[default]
    Plain,
    /// `text/event-json`
    Json,
}

impl fmt::Display for EventEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventEncoding::Plain => write!(f, "plain"),
            EventEncoding::Json => write!(f, "json"),
        }
    }
}

impl FromStr for EventEncoding {
    type Err = ParseEventEncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(ParseEventEncodingError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid event encoding string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventEncodingError(pub String);

impl fmt::Display for ParseEventEncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event encoding: {}", self.0)
    }
}

impl std::error::Error for ParseEventEncodingError {}

/// A single parsed message: headers plus an optional raw body.
///
/// Events are immutable once published to a stream; handler tasks share one
/// instance behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    headers: HashMap<String, String>,
    body: String,
}

impl Event {
    /// Create an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble an event from already-parsed parts.
    pub fn from_parts(headers: HashMap<String, String>, body: String) -> Self {
        Self { headers, body }
    }

    /// Header value, or `default` when the header is absent or empty.
    pub fn get<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self
            .headers
            .get(key)
        {
            Some(v) if !v.is_empty() => v,
            _ => default,
        }
    }

    /// Header value parsed as an integer.
    pub fn get_int(&self, key: &str) -> SwitchResult<i64> {
        let raw = self.get(key, "");
        raw.trim()
            .parse()
            .map_err(|_| SwitchError::MalformedHeader {
                line: format!("{}: {}", key, raw),
            })
    }

    /// `Content-Length` as a count, 0 when absent or unparseable.
    pub fn content_length(&self) -> usize {
        self.get_int(HEADER_CONTENT_LENGTH)
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }

    /// `Reply-Text` header, empty when absent.
    pub fn reply_text(&self) -> &str {
        self.get(HEADER_REPLY_TEXT, "")
    }

    /// Whether `Reply-Text` indicates success (contains `OK`).
    pub fn is_success(&self) -> bool {
        self.reply_text()
            .contains("OK")
    }

    /// `Content-Type` header, empty when absent.
    pub fn content_type(&self) -> &str {
        self.get(HEADER_CONTENT_TYPE, "")
    }

    /// `Event-Name` header, empty when absent.
    pub fn event_name(&self) -> &str {
        self.get(crate::constants::HEADER_EVENT_NAME, "")
    }

    /// All headers as received.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Raw body, empty for header-only messages.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Set or overwrite a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    /// Remove a header, returning its value if it existed.
    pub fn del_header(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(name)
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Serialize to the plain-text event wire format with percent-encoded
    /// header values: the inverse of parsing a `text/event-plain` body.
    ///
    /// `Event-Name` is emitted first, remaining headers sorted by name for
    /// deterministic output. A stored `Content-Length` is skipped and
    /// recomputed from the body when one is present. Useful as the payload
    /// of a `sendevent` command.
    pub fn to_plain_format(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        if let Some(event_name) = self
            .headers
            .get(HEADER_EVENT_NAME)
        {
            let _ = writeln!(
                out,
                "{}: {}",
                HEADER_EVENT_NAME,
                percent_encode(event_name.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        let mut sorted: Vec<_> = self
            .headers
            .iter()
            .filter(|(k, _)| k.as_str() != HEADER_EVENT_NAME && k.as_str() != HEADER_CONTENT_LENGTH)
            .collect();
        sorted.sort_by_key(|(k, _)| k.as_str());

        for (key, value) in sorted {
            let _ = writeln!(
                out,
                "{}: {}",
                key,
                percent_encode(value.as_bytes(), NON_ALPHANUMERIC)
            );
        }

        if self
            .body
            .is_empty()
        {
            out.push('\n');
        } else {
            let _ = writeln!(
                out,
                "{}: {}",
                HEADER_CONTENT_LENGTH,
                self.body
                    .len()
            );
            out.push('\n');
            out.push_str(&self.body);
        }

        out
    }

    /// Multi-line debug rendering: headers sorted by name, one `key: value`
    /// per line, followed by `BODY: …` when the body is non-empty.
    pub fn pretty(&self) -> String {
        use std::fmt::Write;
        let mut keys: Vec<&String> = self
            .headers
            .keys()
            .collect();
        keys.sort();

        let mut out = String::new();
        for key in keys {
            let _ = writeln!(out, "{}: {}", key, self.headers[key]);
        }
        if !self
            .body
            .is_empty()
        {
            let _ = writeln!(out, "BODY: {:?}", self.body);
        }
        out
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self
            .body
            .is_empty()
        {
            write!(f, "{:?}", self.headers)
        } else {
            write!(f, "{:?} body={:?}", self.headers, self.body)
        }
    }
}
