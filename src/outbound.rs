//! Outbound sessions: FreeSWITCH dials the library, once per call.

use std::future::Future;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{info, warn};

use crate::{
    constants::HEADER_CHANNEL_UUID,
    error::SwitchResult,
    event::{Event, EventEncoding},
    handlers::HandlerMap,
    socket::EventSocket,
};

/// A session bound to one call leg.
///
/// Created by [`OutboundServer`] for each connection FreeSWITCH opens via
/// the `socket` dialplan application. The initial `connect` reply is kept as
/// [`channel`](Self::channel) and carries the full channel variable set.
///
/// The contained [`EventSocket`] is exposed through `Deref`, so every
/// protocol and dialplan verb is available directly on the session.
pub struct OutboundSocket {
    channel: Event,
    socket: EventSocket,
}

impl OutboundSocket {
    /// Bind an accepted connection to its call leg: issue `connect`, keep
    /// the channel data, and subscribe to the handler table's event names.
    pub(crate) async fn establish(
        stream: TcpStream,
        handlers: Arc<HandlerMap>,
        encoding: EventEncoding,
    ) -> SwitchResult<Self> {
        let socket = EventSocket::new(stream, handlers.clone(), encoding);

        let channel = socket
            .channel_connect()
            .await?;
        socket
            .subscribe(&handlers.subscription_names())
            .await?;

        info!(
            uuid = channel.get(HEADER_CHANNEL_UUID, "?"),
            "outbound session bound"
        );
        Ok(Self { channel, socket })
    }

    /// The channel data returned by `connect`: every channel variable of the
    /// call leg that triggered this connection.
    pub fn channel(&self) -> &Event {
        &self.channel
    }

    /// The call UUID, for `sendmsg` targeting from inbound-style code.
    pub fn channel_uuid(&self) -> &str {
        self.channel
            .get(HEADER_CHANNEL_UUID, "")
    }

    /// Read events and dispatch them to the registered handlers until the
    /// reader fails, then disconnect and return. Outbound sessions do not
    /// reconnect; the call leg is gone with the socket.
    pub async fn start(&self) {
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
                    warn!(%error, "outbound session ended");
                    let _ = self
                        .socket
                        .disconnect()
                        .await;
                    return;
                }
            }
        }
    }
}

impl Deref for OutboundSocket {
    type Target = EventSocket;

    fn deref(&self) -> &EventSocket {
        &self.socket
    }
}

/// Listener that turns each connection FreeSWITCH opens into an
/// [`OutboundSocket`] and hands it to a callback.
///
/// ```no_run
/// use fsswitch::{EventEncoding, HandlerMap, OutboundServer};
///
/// # async fn run() -> fsswitch::SwitchResult<()> {
/// let server = OutboundServer::bind(
///     "0.0.0.0:8040",
///     EventEncoding::Plain,
///     HandlerMap::new(),
/// )
/// .await?;
///
/// server
///     .serve(|session| async move {
///         let uuid = session.channel_uuid().to_string();
///         let _ = session.answer(&uuid, false).await;
///         let _ = session.playback("ivr/ivr-welcome.wav", "", &uuid, false, 0).await;
///         session.start().await;
///     })
///     .await
/// # }
/// ```
pub struct OutboundServer {
    listener: TcpListener,
    encoding: EventEncoding,
    handlers: Arc<HandlerMap>,
}

impl OutboundServer {
    /// Bind the listening socket.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        encoding: EventEncoding,
        handlers: HandlerMap,
    ) -> SwitchResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            encoding,
            handlers: Arc::new(handlers),
        })
    }

    /// The bound address, useful with port 0.
    pub fn local_addr(&self) -> SwitchResult<SocketAddr> {
        Ok(self
            .listener
            .local_addr()?)
    }

    /// Accept connections until a fatal accept error.
    ///
    /// Each accepted connection is established and handed to `on_accept` in
    /// its own task; a connection that fails the `connect`/subscribe
    /// handshake is logged and dropped without stopping the server.
    pub async fn serve<F, Fut>(self, on_accept: F) -> SwitchResult<()>
    where
        F: Fn(OutboundSocket) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        info!(addr = ?self.listener.local_addr(), "outbound server listening");
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await?;
            info!(%peer, "accepted connection from FreeSWITCH");

            let handlers = self
                .handlers
                .clone();
            let encoding = self.encoding;
            let on_accept = on_accept.clone();
            tokio::spawn(async move {
                match OutboundSocket::establish(stream, handlers, encoding).await {
                    Ok(session) => on_accept(session).await,
                    Err(error) => warn!(%peer, %error, "failed to establish outbound session"),
                }
            });
        }
    }
}
