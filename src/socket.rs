//! The event socket protocol engine

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, trace, warn};

use crate::{
    command::{format_command, validate_no_newlines, SendMsg},
    constants::{COMMAND_TERMINATOR, EVENT_STREAM_CAPACITY, HEADER_TERMINATOR, SOCKET_BUF_SIZE},
    error::{SwitchError, SwitchResult},
    event::{Event, EventEncoding},
    handlers::HandlerMap,
    protocol::{self, ContentType, Frame, FrameParser},
};

/// Connection status, published on the session's disconnect signal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// The session is active.
    Connected,
    /// The session ended.
    Disconnected(DisconnectReason),
}

/// Reason the reader task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Server sent a `text/disconnect-notice`
    ServerNotice,
    /// Clean EOF on the TCP connection
    ConnectionClosed,
    /// TCP I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Framing or content error that desynced the stream
    Protocol(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::Protocol(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

/// Which reply stream satisfies a synchronous request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplySource {
    /// `command/reply` only (`sendmsg`)
    Cmd,
    /// Whichever of `command/reply` or `api/response` arrives first
    CmdOrApi,
}

/// Receive ends of the typed streams fed by the reader task.
///
/// `cmd`, `api`, `auth` and `err` are capacity-1 rendezvous channels: the
/// reader parks on `send().await` until the one consumer takes the message,
/// preserving wire order between replies. `evt` is bounded so a slow event
/// consumer exerts backpressure on the reader instead of growing memory.
struct Streams {
    auth: Mutex<mpsc::Receiver<Event>>,
    cmd: Mutex<mpsc::Receiver<Event>>,
    api: Mutex<mpsc::Receiver<Event>>,
    evt: Mutex<mpsc::Receiver<Event>>,
    err: Mutex<mpsc::Receiver<SwitchError>>,
}

/// Send ends held by the reader task, plus the status signal.
struct Router {
    auth_tx: mpsc::Sender<Event>,
    cmd_tx: mpsc::Sender<Event>,
    api_tx: mpsc::Sender<Event>,
    evt_tx: mpsc::Sender<Event>,
    err_tx: mpsc::Sender<SwitchError>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl Router {
    /// Route one parsed frame to exactly one stream. Returns `false` when
    /// the reader must stop (disconnect notice, fatal content type, or all
    /// consumers gone).
    async fn route(&self, frame: Frame) -> bool {
        trace!(content_type = ?frame.content_type, "routing frame");
        match frame
            .content_type
            .clone()
        {
            ContentType::AuthRequest => self
                .auth_tx
                .send(protocol::raw_event(frame))
                .await
                .is_ok(),
            ContentType::CommandReply => self
                .cmd_tx
                .send(protocol::reply_event(frame))
                .await
                .is_ok(),
            ContentType::ApiResponse => self
                .api_tx
                .send(protocol::raw_event(frame))
                .await
                .is_ok(),
            ContentType::EventPlain => match protocol::plain_event(frame) {
                Ok(event) => self
                    .evt_tx
                    .send(event)
                    .await
                    .is_ok(),
                Err(error) => {
                    self.fail(error)
                        .await;
                    false
                }
            },
            ContentType::EventJson => match protocol::json_event(frame) {
                Ok(event) => self
                    .evt_tx
                    .send(event)
                    .await
                    .is_ok(),
                Err(error) => {
                    self.fail(error)
                        .await;
                    false
                }
            },
            ContentType::DisconnectNotice => {
                info!("received disconnect notice from server");
                let _ = self
                    .evt_tx
                    .send(protocol::raw_event(frame))
                    .await;
                let _ = self
                    .status_tx
                    .send(ConnectionStatus::Disconnected(
                        DisconnectReason::ServerNotice,
                    ));
                false
            }
            ContentType::Unknown(content_type) => {
                warn!(%content_type, "unsupported content type, closing");
                let _ = self
                    .evt_tx
                    .send(protocol::raw_event(frame))
                    .await;
                self.fail(SwitchError::UnsupportedContentType { content_type })
                    .await;
                false
            }
        }
    }

    /// Publish a fatal reader error once and mirror it into the status
    /// signal. `try_send` on purpose: if no consumer ever drains `err`, the
    /// error must not park the dying reader.
    async fn fail(&self, error: SwitchError) {
        warn!(%error, "reader failed");
        let reason = match &error {
            SwitchError::Io(e) => DisconnectReason::IoError(e.to_string()),
            SwitchError::Disconnected => DisconnectReason::ConnectionClosed,
            other => DisconnectReason::Protocol(other.to_string()),
        };
        let _ = self
            .err_tx
            .try_send(error);
        let _ = self
            .status_tx
            .send(ConnectionStatus::Disconnected(reason));
    }
}

/// Reader task: sole owner of the read half. Parses one frame per iteration
/// and publishes it to exactly one stream; exits on disconnect or a fatal
/// error, dropping its senders so every parked waiter resolves.
async fn reader_loop(mut reader: OwnedReadHalf, router: Router) {
    let mut parser = FrameParser::new();
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    loop {
        match parser.parse_frame() {
            Ok(Some(frame)) => {
                if !router
                    .route(frame)
                    .await
                {
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(error) => {
                router
                    .fail(error)
                    .await;
                return;
            }
        }

        match reader
            .read(&mut read_buffer)
            .await
        {
            Ok(0) => {
                info!("connection closed (EOF)");
                router
                    .fail(SwitchError::Disconnected)
                    .await;
                return;
            }
            Ok(n) => {
                trace!(bytes = n, "read from socket");
                if let Err(error) = parser.add_data(&read_buffer[..n]) {
                    router
                        .fail(error)
                        .await;
                    return;
                }
            }
            Err(error) => {
                router
                    .fail(SwitchError::Io(error))
                    .await;
                return;
            }
        }
    }
}

/// Protocol engine around one TCP connection.
///
/// Owns the write half; a spawned reader task owns the read half and feeds
/// the typed streams. Synchronous primitives ([`send`](Self::send),
/// [`sendmsg`](Self::sendmsg)) are internally serialized so each command is
/// paired with its own reply even under concurrent callers.
pub struct EventSocket {
    writer: Mutex<OwnedWriteHalf>,
    gate: Mutex<()>,
    streams: Streams,
    handlers: Arc<HandlerMap>,
    encoding: EventEncoding,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for EventSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSocket")
            .field("connected", &self.connected())
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl EventSocket {
    /// Wrap an established TCP stream and start the reader task.
    pub fn new(stream: TcpStream, handlers: Arc<HandlerMap>, encoding: EventEncoding) -> Self {
        let (read_half, write_half) = stream.into_split();

        let (auth_tx, auth_rx) = mpsc::channel(1);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let (api_tx, api_rx) = mpsc::channel(1);
        let (evt_tx, evt_rx) = mpsc::channel(EVENT_STREAM_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);

        tokio::spawn(reader_loop(
            read_half,
            Router {
                auth_tx,
                cmd_tx,
                api_tx,
                evt_tx,
                err_tx,
                status_tx,
            },
        ));

        Self {
            writer: Mutex::new(write_half),
            gate: Mutex::new(()),
            streams: Streams {
                auth: Mutex::new(auth_rx),
                cmd: Mutex::new(cmd_rx),
                api: Mutex::new(api_rx),
                evt: Mutex::new(evt_rx),
                err: Mutex::new(err_rx),
            },
            handlers,
            encoding,
            status_rx,
        }
    }

    /// Whether the reader has not yet observed a disconnect.
    pub fn connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    /// Subscription encoding chosen at session creation.
    pub fn encoding(&self) -> EventEncoding {
        self.encoding
    }

    /// Shut down the write half. The reader observes the resulting
    /// EOF/reset, exits, and unblocks every pending waiter.
    pub async fn disconnect(&self) -> SwitchResult<()> {
        info!("disconnecting");
        let mut writer = self
            .writer
            .lock()
            .await;
        writer
            .shutdown()
            .await?;
        Ok(())
    }

    /// Write an already-framed command string to the socket.
    async fn write_wire(&self, wire: &str, redacted: bool) -> SwitchResult<()> {
        if !self.connected() {
            return Err(SwitchError::NotConnected);
        }
        if redacted {
            debug!("sending command: auth [REDACTED]");
        } else {
            debug!(command = %wire.trim_end(), "sending command");
        }
        let mut writer = self
            .writer
            .lock()
            .await;
        writer
            .write_all(wire.as_bytes())
            .await?;
        writer
            .flush()
            .await?;
        Ok(())
    }

    /// Wait for the reply that pairs with the command just written.
    async fn await_reply(&self, source: ReplySource) -> SwitchResult<Event> {
        match source {
            ReplySource::Cmd => {
                let mut cmd_rx = self
                    .streams
                    .cmd
                    .lock()
                    .await;
                cmd_rx
                    .recv()
                    .await
                    .ok_or(SwitchError::Disconnected)
            }
            ReplySource::CmdOrApi => {
                let mut cmd_rx = self
                    .streams
                    .cmd
                    .lock()
                    .await;
                let mut api_rx = self
                    .streams
                    .api
                    .lock()
                    .await;
                tokio::select! {
                    Some(reply) = cmd_rx.recv() => Ok(reply),
                    Some(reply) = api_rx.recv() => Ok(reply),
                    else => Err(SwitchError::Disconnected),
                }
            }
        }
    }

    /// Send a protocol command and wait for its reply on `cmd` or `api`,
    /// whichever answers first.
    ///
    /// The send-and-await pair runs under an internal mutex; concurrent
    /// callers are serialized so replies cannot swap.
    pub async fn send(&self, command: &str, args: &str) -> SwitchResult<Event> {
        validate_no_newlines(command, "command")?;
        validate_no_newlines(args, "command args")?;

        let wire = format_command(command, args);
        let _gate = self
            .gate
            .lock()
            .await;
        self.write_wire(&wire, command == "auth")
            .await?;
        self.await_reply(ReplySource::CmdOrApi)
            .await
    }

    /// Execute a dialplan application via `sendmsg` and wait for the
    /// `command/reply` acknowledgment.
    pub async fn sendmsg(&self, msg: &SendMsg<'_>) -> SwitchResult<Event> {
        let wire = msg.to_wire_format()?;
        let _gate = self
            .gate
            .lock()
            .await;
        self.write_wire(&wire, false)
            .await?;
        self.await_reply(ReplySource::Cmd)
            .await
    }

    /// Subscribe to the given event names with the session's encoding.
    /// An empty name set is a no-op: no asynchronous events will arrive.
    pub async fn subscribe(&self, names: &[String]) -> SwitchResult<()> {
        if names.is_empty() {
            debug!("no handlers registered, skipping event subscription");
            return Ok(());
        }
        for name in names {
            validate_no_newlines(name, "event name")?;
        }

        let wire = format!(
            "event {} {}{}{}",
            self.encoding,
            names.join(" "),
            HEADER_TERMINATOR,
            COMMAND_TERMINATOR
        );
        let _gate = self
            .gate
            .lock()
            .await;
        self.write_wire(&wire, false)
            .await?;
        let reply = self
            .await_reply(ReplySource::CmdOrApi)
            .await?;
        if !reply.is_success() {
            return Err(SwitchError::FilterFailed {
                reply_text: reply
                    .reply_text()
                    .to_string(),
            });
        }
        info!(encoding = %self.encoding, names = %names.join(" "), "subscribed to events");
        Ok(())
    }

    /// Block until the server's first routed message. Anything other than an
    /// `auth/request` challenge is a protocol violation at this stage.
    pub(crate) async fn await_auth_request(&self) -> SwitchResult<Event> {
        let mut auth_rx = self
            .streams
            .auth
            .lock()
            .await;
        let mut cmd_rx = self
            .streams
            .cmd
            .lock()
            .await;
        let mut api_rx = self
            .streams
            .api
            .lock()
            .await;
        let mut evt_rx = self
            .streams
            .evt
            .lock()
            .await;
        let mut err_rx = self
            .streams
            .err
            .lock()
            .await;

        let unexpected = |event: Event| SwitchError::MissingAuthRequest {
            content_type: event
                .content_type()
                .to_string(),
        };

        tokio::select! {
            Some(challenge) = auth_rx.recv() => Ok(challenge),
            Some(event) = cmd_rx.recv() => Err(unexpected(event)),
            Some(event) = api_rx.recv() => Err(unexpected(event)),
            Some(event) = evt_rx.recv() => Err(unexpected(event)),
            Some(error) = err_rx.recv() => Err(error),
            else => Err(SwitchError::Disconnected),
        }
    }

    /// Next asynchronous event, in wire order, or the reader's fatal error.
    pub async fn read_event(&self) -> SwitchResult<Event> {
        let mut evt_rx = self
            .streams
            .evt
            .lock()
            .await;
        let mut err_rx = self
            .streams
            .err
            .lock()
            .await;

        tokio::select! {
            Some(event) = evt_rx.recv() => Ok(event),
            Some(error) = err_rx.recv() => Err(error),
            else => Err(SwitchError::Disconnected),
        }
    }

    /// Launch every handler registered for the event's name, one task per
    /// handler. Handlers run independently of the reader; a stuck handler
    /// only affects its own task.
    pub(crate) fn dispatch(&self, event: Event) {
        let Some(handler_list) = self
            .handlers
            .get(event.event_name())
        else {
            trace!(event_name = %event.event_name(), "no handlers for event");
            return;
        };
        let event = Arc::new(event);
        for handler in handler_list {
            let handler = handler.clone();
            let event = event.clone();
            tokio::spawn(handler(event));
        }
    }

    // --- protocol verbs ---

    /// Execute a server-wide `api` command; blocks until the result.
    pub async fn api(&self, args: &str) -> SwitchResult<Event> {
        self.send("api", args)
            .await
    }

    /// Execute a background `api` command; the reply carries a `Job-UUID`
    /// and the result arrives later as a `BACKGROUND_JOB` event.
    pub async fn bgapi(&self, args: &str) -> SwitchResult<Event> {
        self.send("bgapi", args)
            .await
    }

    /// Authenticate with the server's cleartext password scheme.
    pub async fn auth(&self, password: &str) -> SwitchResult<Event> {
        self.send("auth", password)
            .await
    }

    /// Install a server-side event filter (`filter 'Event-Name HEARTBEAT'`).
    pub async fn filter(&self, args: &str) -> SwitchResult<Event> {
        self.send("filter", args)
            .await
    }

    /// Remove a server-side event filter.
    pub async fn filter_delete(&self, args: &str) -> SwitchResult<Event> {
        self.send("filter delete", args)
            .await
    }

    /// Raw `event` subscription command; prefer [`subscribe`](Self::subscribe).
    pub async fn event(&self, args: &str) -> SwitchResult<Event> {
        self.send("event", args)
            .await
    }

    /// Raw `event plain` subscription command.
    pub async fn event_plain(&self, args: &str) -> SwitchResult<Event> {
        self.send("event plain", args)
            .await
    }

    /// Raw `event json` subscription command.
    pub async fn event_json(&self, args: &str) -> SwitchResult<Event> {
        self.send("event json", args)
            .await
    }

    /// Fire an event into the server's event bus.
    pub async fn sendevent(&self, args: &str) -> SwitchResult<Event> {
        self.send("sendevent", args)
            .await
    }

    /// Subscribe to all events of the attached session (outbound), or of the
    /// given UUID (inbound).
    pub async fn myevents(&self, uuid: &str) -> SwitchResult<Event> {
        self.send("myevents", uuid)
            .await
    }

    /// Keep the socket open after hangup so remaining events can drain
    /// (outbound only).
    pub async fn linger(&self) -> SwitchResult<Event> {
        self.send("linger", "")
            .await
    }

    /// Bind the socket to its call leg and receive the channel data reply
    /// (outbound only; must be the first command).
    pub async fn channel_connect(&self) -> SwitchResult<Event> {
        self.send("connect", "")
            .await
    }

    /// Resume dialplan execution after the socket application returns
    /// (outbound only).
    pub async fn resume(&self) -> SwitchResult<Event> {
        self.send("resume", "")
            .await
    }

    /// Close the session from the protocol level.
    pub async fn exit(&self) -> SwitchResult<Event> {
        self.send("exit", "")
            .await
    }

    /// Divert session events to this socket (`on`) or back to the server
    /// (`off`).
    pub async fn divert_events(&self, flag: &str) -> SwitchResult<Event> {
        self.send("divert_events", flag)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_status_eq() {
        assert_eq!(ConnectionStatus::Connected, ConnectionStatus::Connected);
        assert_eq!(
            ConnectionStatus::Disconnected(DisconnectReason::ServerNotice),
            ConnectionStatus::Disconnected(DisconnectReason::ServerNotice)
        );
        assert_ne!(
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected(DisconnectReason::ConnectionClosed)
        );
    }

    #[test]
    fn disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::ServerNotice.to_string(),
            "server sent disconnect notice"
        );
        assert_eq!(
            DisconnectReason::IoError("broken pipe".into()).to_string(),
            "I/O error: broken pipe"
        );
    }
}
