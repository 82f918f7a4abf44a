//! Crate error taxonomy

use thiserror::Error;

/// A `Result` specialized to [`SwitchError`].
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Errors surfaced by the event socket engine and the session state machines.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SwitchError {
    /// All connect attempts to the server were exhausted.
    #[error("connect to {address} failed after {attempts} attempt(s)")]
    ConnectFailed {
        /// Server address that was dialed.
        address: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The first message after connect was not an `auth/request` challenge.
    #[error("expected auth/request, server sent {content_type:?}")]
    MissingAuthRequest {
        /// Content type of the message that arrived instead.
        content_type: String,
    },

    /// The server rejected the password.
    #[error("authentication failed: {reply_text}")]
    InvalidPassword {
        /// The server's `Reply-Text`.
        reply_text: String,
    },

    /// The event subscription command was rejected.
    #[error("event subscription failed: {reply_text}")]
    FilterFailed {
        /// The server's `Reply-Text`.
        reply_text: String,
    },

    /// A send was attempted on a closed or absent socket.
    #[error("not connected")]
    NotConnected,

    /// A header line could not be parsed.
    #[error("malformed header: {line}")]
    MalformedHeader {
        /// The offending line or `name: value` pair.
        line: String,
    },

    /// A message body could not be assembled or decoded.
    #[error("malformed body: {reason}")]
    MalformedBody {
        /// What went wrong.
        reason: String,
    },

    /// The peer or the local side closed the connection mid-read.
    #[error("disconnected")]
    Disconnected,

    /// The reader saw a content type outside the known set; fatal.
    #[error("unsupported content type: {content_type}")]
    UnsupportedContentType {
        /// The unrecognized `Content-Type` value.
        content_type: String,
    },

    /// A user-supplied command fragment contained `\r` or `\n`.
    #[error("{context} must not contain newlines")]
    InvalidCommand {
        /// Which fragment was rejected.
        context: String,
    },

    /// Underlying socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `text/event-json` body was not a valid JSON object.
    #[error("JSON event decode error: {0}")]
    Json(#[from] serde_json::Error),
}
