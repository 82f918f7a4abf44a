//! Wire framing and per-content-type message assembly

use crate::{
    buffer::StreamBuffer,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_EVENT_JSON, CONTENT_TYPE_EVENT_PLAIN,
        HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HEADER_REPLY_TEXT, HEADER_TERMINATOR,
        JSON_BODY_KEY, MAX_MESSAGE_SIZE,
    },
    error::{SwitchError, SwitchResult},
    event::Event,
};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Recognized `Content-Type` values; the routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContentType {
    /// Authentication challenge from the server
    AuthRequest,
    /// Synchronous command acknowledgment
    CommandReply,
    /// `api` command result
    ApiResponse,
    /// Asynchronous event, MIME-style body
    EventPlain,
    /// Asynchronous event, JSON body
    EventJson,
    /// Server-initiated disconnect notice
    DisconnectNotice,
    /// Anything else; fatal for the reader
    Unknown(String),
}

impl ContentType {
    pub(crate) fn from_header(value: &str) -> Self {
        match value {
            CONTENT_TYPE_AUTH_REQUEST => ContentType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => ContentType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => ContentType::ApiResponse,
            CONTENT_TYPE_EVENT_PLAIN => ContentType::EventPlain,
            CONTENT_TYPE_EVENT_JSON => ContentType::EventJson,
            CONTENT_TYPE_DISCONNECT_NOTICE => ContentType::DisconnectNotice,
            other => ContentType::Unknown(other.to_string()),
        }
    }
}

/// One framed wire message: the outer header block and the raw body, before
/// any per-content-type interpretation.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) content_type: ContentType,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Option<String>,
}

/// Percent-decode a header value, keeping the raw value on failure.
fn decode_value(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Parse a `Name: value` block. `decode` applies best-effort percent
/// decoding to each value; keys are kept as received.
fn parse_header_block(text: &str, decode: bool) -> SwitchResult<HashMap<String, String>> {
    let mut headers = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let colon = line
            .find(':')
            .ok_or_else(|| SwitchError::MalformedHeader {
                line: line.to_string(),
            })?;
        let key = line[..colon]
            .trim()
            .to_string();
        let raw_value = line[colon + 1..].trim();
        let value = if decode {
            decode_value(raw_value)
        } else {
            raw_value.to_string()
        };
        headers.insert(key, value);
    }

    Ok(headers)
}

/// Parser state for frames split across socket reads.
#[derive(Debug)]
enum ParseState {
    WaitingForHeaders,
    WaitingForBody {
        content_type: ContentType,
        headers: HashMap<String, String>,
        body_length: usize,
    },
}

/// Incremental frame parser over a byte stream.
///
/// Feed raw socket bytes with [`add_data`](Self::add_data), then drain
/// complete frames with [`parse_frame`](Self::parse_frame). Outer header
/// values are kept raw; decoding happens during assembly, where the policy
/// depends on the content type.
pub(crate) struct FrameParser {
    buffer: StreamBuffer,
    state: ParseState,
}

impl FrameParser {
    pub(crate) fn new() -> Self {
        Self {
            buffer: StreamBuffer::new(),
            state: ParseState::WaitingForHeaders,
        }
    }

    /// Append socket bytes, enforcing the total buffer cap.
    pub(crate) fn add_data(&mut self, data: &[u8]) -> SwitchResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// Try to extract one complete frame; `Ok(None)` means more bytes are
    /// needed.
    pub(crate) fn parse_frame(&mut self) -> SwitchResult<Option<Frame>> {
        match &self.state {
            ParseState::WaitingForHeaders => {
                let Some(header_bytes) = self
                    .buffer
                    .extract_until_pattern(HEADER_TERMINATOR.as_bytes())
                else {
                    return Ok(None);
                };
                self.buffer
                    .compact();

                let header_text =
                    String::from_utf8(header_bytes).map_err(|_| SwitchError::MalformedHeader {
                        line: "header block is not valid UTF-8".to_string(),
                    })?;
                let headers = parse_header_block(&header_text, false)?;

                // Every message carries Content-Type. Its absence means the
                // byte stream is desynced (e.g. a lying Content-Length) and
                // the connection cannot be trusted any further.
                let content_type = headers
                    .get(HEADER_CONTENT_TYPE)
                    .map(|ct| ContentType::from_header(ct))
                    .ok_or_else(|| SwitchError::MalformedHeader {
                        line: format!("missing {} header", HEADER_CONTENT_TYPE),
                    })?;

                let body_length = match headers.get(HEADER_CONTENT_LENGTH) {
                    Some(raw) => {
                        raw.trim()
                            .parse::<usize>()
                            .map_err(|_| SwitchError::MalformedHeader {
                                line: format!("{}: {}", HEADER_CONTENT_LENGTH, raw),
                            })?
                    }
                    None => 0,
                };
                if body_length > MAX_MESSAGE_SIZE {
                    return Err(SwitchError::MalformedBody {
                        reason: format!(
                            "Content-Length {} exceeds limit {}",
                            body_length, MAX_MESSAGE_SIZE
                        ),
                    });
                }

                if body_length > 0 {
                    self.state = ParseState::WaitingForBody {
                        content_type,
                        headers,
                        body_length,
                    };
                    // The body may already be buffered
                    self.parse_frame()
                } else {
                    Ok(Some(Frame {
                        content_type,
                        headers,
                        body: None,
                    }))
                }
            }
            ParseState::WaitingForBody {
                content_type,
                headers,
                body_length,
            } => {
                let Some(body_bytes) = self
                    .buffer
                    .extract_bytes(*body_length)
                else {
                    return Ok(None);
                };
                self.buffer
                    .compact();

                let body =
                    String::from_utf8(body_bytes).map_err(|_| SwitchError::MalformedBody {
                        reason: "body is not valid UTF-8".to_string(),
                    })?;
                let frame = Frame {
                    content_type: content_type.clone(),
                    headers: headers.clone(),
                    body: Some(body),
                };
                self.state = ParseState::WaitingForHeaders;
                Ok(Some(frame))
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble an event from a frame without touching header values.
/// Used for `auth/request`, `api/response`, disconnect notices and
/// unrecognized content types.
pub(crate) fn raw_event(frame: Frame) -> Event {
    Event::from_parts(
        frame.headers,
        frame
            .body
            .unwrap_or_default(),
    )
}

/// Assemble a `command/reply` event. Header values are percent-decoded only
/// when the raw `Reply-Text` begins with `%`, which is how the server marks
/// an encoded reply (the `connect` channel-data reply does this).
pub(crate) fn reply_event(frame: Frame) -> Event {
    let encoded = frame
        .headers
        .get(HEADER_REPLY_TEXT)
        .is_some_and(|v| v.starts_with('%'));
    if !encoded {
        return raw_event(frame);
    }

    let headers = frame
        .headers
        .into_iter()
        .map(|(k, v)| (k, decode_value(&v)))
        .collect();
    Event::from_parts(
        headers,
        frame
            .body
            .unwrap_or_default(),
    )
}

/// Assemble a `text/event-plain` event.
///
/// The outer frame's body is itself a MIME-style header block, optionally
/// followed by a blank line and an inner body of inner `Content-Length`
/// bytes. Outer headers are discarded; inner header values are
/// percent-decoded.
pub(crate) fn plain_event(frame: Frame) -> SwitchResult<Event> {
    let body = frame
        .body
        .ok_or_else(|| SwitchError::MalformedBody {
            reason: "plain event without a body".to_string(),
        })?;

    let (header_text, rest) = match body.find(HEADER_TERMINATOR) {
        Some(pos) => (&body[..pos], &body[pos + HEADER_TERMINATOR.len()..]),
        None => (body.as_str(), ""),
    };

    let headers = parse_header_block(header_text, true)?;
    let mut event = Event::from_parts(headers, String::new());

    if event
        .headers()
        .contains_key(HEADER_CONTENT_LENGTH)
    {
        let inner_length = event.content_length();
        let rest_bytes = rest.as_bytes();
        if rest_bytes.len() < inner_length {
            return Err(SwitchError::MalformedBody {
                reason: format!(
                    "inner body truncated: have {} bytes, Content-Length {}",
                    rest_bytes.len(),
                    inner_length
                ),
            });
        }
        let inner = std::str::from_utf8(&rest_bytes[..inner_length]).map_err(|_| {
            SwitchError::MalformedBody {
                reason: "inner body is not valid UTF-8".to_string(),
            }
        })?;
        event.set_body(inner);
    } else if !rest.is_empty() {
        event.set_body(rest);
    }

    Ok(event)
}

/// Assemble a `text/event-json` event.
///
/// The body is one JSON object; keys become headers verbatim, non-string
/// values keep their JSON rendering. A non-empty `_body` member is moved
/// into the event body and removed from the headers.
pub(crate) fn json_event(frame: Frame) -> SwitchResult<Event> {
    let body = frame
        .body
        .ok_or_else(|| SwitchError::MalformedBody {
            reason: "json event without a body".to_string(),
        })?;

    let value: serde_json::Value = serde_json::from_str(&body)?;
    let object = value
        .as_object()
        .ok_or_else(|| SwitchError::MalformedBody {
            reason: "json event body is not an object".to_string(),
        })?;

    let mut event = Event::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        event.set_header(key.clone(), value);
    }

    if !event
        .get(JSON_BODY_KEY, "")
        .is_empty()
    {
        let inner = event
            .del_header(JSON_BODY_KEY)
            .unwrap_or_default();
        event.set_body(inner);
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(data: &[u8]) -> Frame {
        let mut parser = FrameParser::new();
        parser
            .add_data(data)
            .unwrap();
        parser
            .parse_frame()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn parse_auth_request() {
        let frame = feed(b"Content-Type: auth/request\n\n");
        assert_eq!(frame.content_type, ContentType::AuthRequest);
        assert!(frame
            .body
            .is_none());
    }

    #[test]
    fn parse_api_response_with_body() {
        let frame = feed(b"Content-Type: api/response\nContent-Length: 4\n\nOKAY");
        assert_eq!(frame.content_type, ContentType::ApiResponse);
        assert_eq!(frame.body, Some("OKAY".to_string()));
    }

    #[test]
    fn crlf_line_endings_tolerated() {
        let frame = feed(b"Content-Type: auth/request\r\nSome-Header: some-value\n\n");
        assert_eq!(frame.content_type, ContentType::AuthRequest);
        assert_eq!(
            frame
                .headers
                .get("Some-Header")
                .map(|s| s.as_str()),
            Some("some-value")
        );
    }

    #[test]
    fn incomplete_body_returns_none() {
        let mut parser = FrameParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: 10\n\ntest")
            .unwrap();
        assert!(parser
            .parse_frame()
            .unwrap()
            .is_none());

        // Delivering the rest completes the frame
        parser
            .add_data(b"123456")
            .unwrap();
        let frame = parser
            .parse_frame()
            .unwrap()
            .unwrap();
        assert_eq!(frame.body, Some("test123456".to_string()));
    }

    #[test]
    fn back_to_back_frames() {
        let mut parser = FrameParser::new();
        parser
            .add_data(b"Content-Type: auth/request\n\nContent-Type: api/response\nContent-Length: 2\n\nOK")
            .unwrap();

        let first = parser
            .parse_frame()
            .unwrap()
            .unwrap();
        assert_eq!(first.content_type, ContentType::AuthRequest);

        let second = parser
            .parse_frame()
            .unwrap()
            .unwrap();
        assert_eq!(second.content_type, ContentType::ApiResponse);
        assert_eq!(second.body, Some("OK".to_string()));
    }

    #[test]
    fn missing_content_type_is_desync() {
        let mut parser = FrameParser::new();
        parser
            .add_data(b"Reply-Text: +OK\n\n")
            .unwrap();
        assert!(parser
            .parse_frame()
            .is_err());
    }

    #[test]
    fn oversized_content_length_rejected() {
        let mut parser = FrameParser::new();
        let data = format!(
            "Content-Type: api/response\nContent-Length: {}\n\n",
            MAX_MESSAGE_SIZE + 1
        );
        parser
            .add_data(data.as_bytes())
            .unwrap();
        assert!(parser
            .parse_frame()
            .is_err());
    }

    #[test]
    fn non_numeric_content_length_rejected() {
        let mut parser = FrameParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: abc\n\n")
            .unwrap();
        assert!(parser
            .parse_frame()
            .is_err());
    }

    #[test]
    fn outer_headers_stay_raw() {
        let frame = feed(b"Content-Type: api/response\nX-Escaped: a%20b\n\n");
        assert_eq!(
            frame
                .headers
                .get("X-Escaped")
                .map(|s| s.as_str()),
            Some("a%20b")
        );
        let event = raw_event(frame);
        assert_eq!(event.get("X-Escaped", ""), "a%20b");
    }

    #[test]
    fn plain_event_inner_headers_and_body() {
        let body = "Event-Name: HEARTBEAT\nUptime-msec: 12345\nContent-Length: 2\n\nHI";
        let data = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        );
        let frame = feed(data.as_bytes());
        let event = plain_event(frame).unwrap();

        assert_eq!(event.get("Event-Name", ""), "HEARTBEAT");
        assert_eq!(event.get("Uptime-msec", ""), "12345");
        assert_eq!(event.get("Content-Length", ""), "2");
        assert_eq!(event.body(), "HI");
        // Outer envelope headers are discarded
        assert_eq!(event.content_type(), "");
    }

    #[test]
    fn plain_event_without_inner_body() {
        let body = "Event-Name: CHANNEL_ANSWER\nUnique-ID: test-uuid\n\n";
        let data = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        );
        let event = plain_event(feed(data.as_bytes())).unwrap();
        assert_eq!(event.get("Event-Name", ""), "CHANNEL_ANSWER");
        assert_eq!(event.body(), "");
    }

    #[test]
    fn plain_event_percent_decodes_inner_values() {
        let body = "Event-Name: HEARTBEAT\nUp-Time: 0%20years%2C%200%20days\n\n";
        let data = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        );
        let event = plain_event(feed(data.as_bytes())).unwrap();
        assert_eq!(event.get("Up-Time", ""), "0 years, 0 days");
    }

    #[test]
    fn plain_event_invalid_percent_sequence_kept_raw() {
        let body = "Event-Name: HEARTBEAT\nX-Bad: %ZZinvalid\n\n";
        let data = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        );
        let event = plain_event(feed(data.as_bytes())).unwrap();
        assert_eq!(event.get("X-Bad", ""), "%ZZinvalid");
    }

    #[test]
    fn plain_event_truncated_inner_body_rejected() {
        let body = "Event-Name: BACKGROUND_JOB\nContent-Length: 10\n\nshort";
        let data = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        );
        assert!(plain_event(feed(data.as_bytes())).is_err());
    }

    #[test]
    fn json_event_moves_body_key() {
        let body = r#"{"Event-Name":"API","_body":"sofia status output"}"#;
        let data = format!(
            "Content-Type: text/event-json\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        let event = json_event(feed(data.as_bytes())).unwrap();
        assert_eq!(event.get("Event-Name", ""), "API");
        assert_eq!(event.body(), "sofia status output");
        assert!(!event
            .headers()
            .contains_key("_body"));
    }

    #[test]
    fn json_event_empty_body_key_stays() {
        let body = r#"{"Event-Name":"HEARTBEAT","_body":""}"#;
        let data = format!(
            "Content-Type: text/event-json\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        let event = json_event(feed(data.as_bytes())).unwrap();
        assert_eq!(event.body(), "");
        assert!(event
            .headers()
            .contains_key("_body"));
    }

    #[test]
    fn json_event_non_string_values_rendered() {
        let body = r#"{"Event-Name":"HEARTBEAT","Session-Count":42}"#;
        let data = format!(
            "Content-Type: text/event-json\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        let event = json_event(feed(data.as_bytes())).unwrap();
        assert_eq!(event.get("Session-Count", ""), "42");
    }

    #[test]
    fn json_event_rejects_non_object() {
        let body = "[1,2,3]";
        let data = format!(
            "Content-Type: text/event-json\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        assert!(json_event(feed(data.as_bytes())).is_err());
    }

    #[test]
    fn reply_event_decodes_only_when_marked() {
        let frame = feed(b"Content-Type: command/reply\nReply-Text: %2BOK%20accepted\nSocket-Mode: a%20b\n\n");
        let event = reply_event(frame);
        assert_eq!(event.reply_text(), "+OK accepted");
        assert_eq!(event.get("Socket-Mode", ""), "a b");
        assert!(event.is_success());

        let frame = feed(b"Content-Type: command/reply\nReply-Text: +OK\nSocket-Mode: a%20b\n\n");
        let event = reply_event(frame);
        // Unmarked replies keep values as received
        assert_eq!(event.get("Socket-Mode", ""), "a%20b");
    }

    #[test]
    fn undersized_content_length_desyncs_next_frame() {
        // Content-Length 2 against a 5-byte body leaves "llo" as junk; the
        // junk merges into the next header block, which then has no real
        // Content-Type and must surface as an error.
        let mut parser = FrameParser::new();
        parser
            .add_data(b"Content-Type: api/response\nContent-Length: 2\n\nHello")
            .unwrap();
        let first = parser
            .parse_frame()
            .unwrap()
            .unwrap();
        assert_eq!(first.body, Some("He".to_string()));

        parser
            .add_data(b"Content-Type: auth/request\n\n")
            .unwrap();
        assert!(parser
            .parse_frame()
            .is_err());
    }
}
