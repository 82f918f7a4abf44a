//! Inbound sessions: the library dials FreeSWITCH.

use std::ops::Deref;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    constants::RECONNECT_DELAY,
    error::{SwitchError, SwitchResult},
    event::EventEncoding,
    handlers::HandlerMap,
    socket::EventSocket,
};

/// Connection settings for an inbound session.
#[derive(Clone)]
pub struct InboundConfig {
    /// Server address as `host:port`.
    pub address: String,
    /// Cleartext ESL password.
    pub password: String,
    /// Maximum connect attempts before giving up, both initially and per
    /// reconnect cycle. Every attempt but the first is preceded by a
    /// 2-second delay.
    pub reconnects: u32,
    /// Event subscription encoding.
    pub encoding: EventEncoding,
}

impl InboundConfig {
    /// Settings with the usual defaults: 5 connect attempts, plain encoding.
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            reconnects: 5,
            encoding: EventEncoding::Plain,
        }
    }
}

impl std::fmt::Debug for InboundConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundConfig")
            .field("address", &self.address)
            .field("password", &"[REDACTED]")
            .field("reconnects", &self.reconnects)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// A long-lived client session: dial, authenticate, subscribe, then read
/// and dispatch events with automatic reconnection.
///
/// The contained [`EventSocket`] is exposed through `Deref`, so every
/// protocol and dialplan verb is available directly on the session.
pub struct InboundSocket {
    config: InboundConfig,
    handlers: Arc<HandlerMap>,
    socket: EventSocket,
}

impl InboundSocket {
    /// Dial and fully establish a session: TCP connect (with the configured
    /// retry limit), await the `auth/request` challenge, authenticate, and
    /// subscribe to the handler table's event names.
    pub async fn connect(config: InboundConfig, handlers: HandlerMap) -> SwitchResult<Self> {
        let handlers = Arc::new(handlers);
        let socket = connect_cycle(&config, &handlers).await?;
        Ok(Self {
            config,
            handlers,
            socket,
        })
    }

    /// Read events and dispatch them to the registered handlers, forever.
    ///
    /// A broken connection re-enters the connect cycle; the loop keeps
    /// retrying indefinitely even when a whole cycle fails, so it only ends
    /// with its task. Every cycle, successful or not, is followed by the
    /// 2-second floor before the loop touches the socket again, so a
    /// persistently refusing server is never spun against.
    pub async fn start(&mut self) {
        loop {
            match self
                .socket
                .read_event()
                .await
            {
                Ok(event) => self
                    .socket
                    .dispatch(event),
                Err(error) => {
                    warn!(%error, "connection broken, attempting reconnect");
                    match connect_cycle(&self.config, &self.handlers).await {
                        Ok(socket) => {
                            self.socket = socket;
                        }
                        Err(error) => {
                            warn!(%error, "reconnect cycle failed, retrying");
                        }
                    }
                    // Floor between cycles regardless of outcome: with a
                    // small `reconnects` the cycle itself may not sleep at
                    // all, and a dead socket fails the next read instantly.
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for InboundSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundSocket")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Deref for InboundSocket {
    type Target = EventSocket;

    fn deref(&self) -> &EventSocket {
        &self.socket
    }
}

/// One bounded connect cycle: dial up to `reconnects` times, then run the
/// handshake on the first stream that connects. Handshake failures are
/// fatal for the cycle; only the dial itself is retried.
async fn connect_cycle(
    config: &InboundConfig,
    handlers: &Arc<HandlerMap>,
) -> SwitchResult<EventSocket> {
    for attempt in 0..config.reconnects {
        if attempt > 0 {
            sleep(RECONNECT_DELAY).await;
        }
        debug!(address = %config.address, attempt = attempt + 1, "dialing");
        match TcpStream::connect(&config.address).await {
            Ok(stream) => return establish(stream, config, handlers).await,
            Err(error) => {
                warn!(address = %config.address, attempt = attempt + 1, %error, "connect attempt failed");
            }
        }
    }
    Err(SwitchError::ConnectFailed {
        address: config
            .address
            .clone(),
        attempts: config.reconnects,
    })
}

/// Authenticate and subscribe on a fresh connection.
async fn establish(
    stream: TcpStream,
    config: &InboundConfig,
    handlers: &Arc<HandlerMap>,
) -> SwitchResult<EventSocket> {
    let socket = EventSocket::new(stream, handlers.clone(), config.encoding);

    let challenge = socket
        .await_auth_request()
        .await?;
    debug!(content_type = challenge.content_type(), "received auth challenge");

    let reply = socket
        .auth(&config.password)
        .await?;
    if !reply.is_success() {
        let _ = socket
            .disconnect()
            .await;
        return Err(SwitchError::InvalidPassword {
            reply_text: reply
                .reply_text()
                .to_string(),
        });
    }

    socket
        .subscribe(&handlers.subscription_names())
        .await?;

    info!(address = %config.address, "inbound session established");
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_password() {
        let config = InboundConfig::new("127.0.0.1:8021", "ClueCon");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ClueCon"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn config_defaults() {
        let config = InboundConfig::new("127.0.0.1:8021", "ClueCon");
        assert_eq!(config.reconnects, 5);
        assert_eq!(config.encoding, EventEncoding::Plain);
    }
}
