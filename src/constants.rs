//! Protocol constants and tuning values

use std::time::Duration;

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Socket buffer size for reading from TCP stream (64KB) - standard TCP receive window
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Maximum single message size (8MB) - validates Content-Length header
/// No legitimate ESL message should exceed this (largest is sofia status ~1-2MB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum total buffer size (16MB) - safety limit to prevent runaway memory
/// Should hold 2 max messages + overhead. Indicates a bug if exceeded.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Capacity of the asynchronous event stream. A consumer that falls this far
/// behind parks the reader task rather than growing memory.
pub const EVENT_STREAM_CAPACITY: usize = 16;

/// Pause between reconnect attempts, and the floor after a successful
/// in-loop reconnect.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Blank line ending an incoming header block (LF framing; CRLF tolerated
/// per line).
pub const HEADER_TERMINATOR: &str = "\n\n";
/// Line separator inside outgoing message blocks.
pub const LINE_TERMINATOR: &str = "\n";

/// Every outgoing command ends with this.
pub const COMMAND_TERMINATOR: &str = "\r\n\r\n";

/// Content-Type of the server's authentication challenge.
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
/// Content-Type of a synchronous command acknowledgment.
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
/// Content-Type of an `api` command result.
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
/// Content-Type of a MIME-style asynchronous event.
pub const CONTENT_TYPE_EVENT_PLAIN: &str = "text/event-plain";
/// Content-Type of a JSON asynchronous event.
pub const CONTENT_TYPE_EVENT_JSON: &str = "text/event-json";
/// Content-Type of the server's disconnect notice.
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";

/// Protocol framing header names.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
/// Event payload header: event name, the dispatch key.
pub const HEADER_EVENT_NAME: &str = "Event-Name";
/// Channel-data header carrying the call UUID of an outbound session.
pub const HEADER_CHANNEL_UUID: &str = "Channel-Unique-ID";

/// JSON event key holding the raw body, moved out of the header map.
pub const JSON_BODY_KEY: &str = "_body";

/// Subscription sentinel: all events, superseding any specific names.
pub const ALL_EVENTS: &str = "ALL";
