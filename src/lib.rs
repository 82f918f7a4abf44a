//! FreeSWITCH Event Socket library for Rust
//!
//! This crate provides an async client and server for FreeSWITCH's Event
//! Socket protocol: connect to FreeSWITCH (inbound), or accept per-call
//! connections from FreeSWITCH (outbound), issue control commands, and
//! receive events.
//!
//! # Architecture
//!
//! Each session wraps an [`EventSocket`] protocol engine. A background
//! reader task parses framed messages off the socket and routes each one by
//! `Content-Type` to a typed stream: auth challenges, command replies, api
//! responses, asynchronous events, or errors. Synchronous primitives
//! ([`EventSocket::send`], [`EventSocket::sendmsg`]) write a command and
//! block until the paired reply arrives; asynchronous events are dispatched
//! concurrently to the handlers registered in a [`HandlerMap`].
//!
//! The event stream is bounded: a consumer that falls behind parks the
//! reader rather than growing memory, so events are never dropped.
//!
//! # Inbound
//!
//! ```rust,no_run
//! use fsswitch::{HandlerMap, InboundConfig, InboundSocket};
//!
//! #[tokio::main]
//! async fn main() -> fsswitch::SwitchResult<()> {
//!     let handlers = HandlerMap::new().on("HEARTBEAT", |event| async move {
//!         println!("uptime: {}", event.get("Up-Time", "?"));
//!     });
//!
//!     let mut session =
//!         InboundSocket::connect(InboundConfig::new("localhost:8021", "ClueCon"), handlers)
//!             .await?;
//!
//!     let response = session.api("status").await?;
//!     println!("status: {}", response.body());
//!
//!     // Read and dispatch events forever, reconnecting as needed.
//!     session.start().await;
//!     Ok(())
//! }
//! ```
//!
//! # Outbound
//!
//! Route a call to the library with the `socket` dialplan application:
//!
//! ```xml
//! <action application="socket" data="127.0.0.1:8040 async full"/>
//! ```
//!
//! ```rust,no_run
//! use fsswitch::{EventEncoding, HandlerMap, OutboundServer};
//!
//! #[tokio::main]
//! async fn main() -> fsswitch::SwitchResult<()> {
//!     let server =
//!         OutboundServer::bind("127.0.0.1:8040", EventEncoding::Plain, HandlerMap::new())
//!             .await?;
//!
//!     server
//!         .serve(|session| async move {
//!             let uuid = session.channel_uuid().to_string();
//!             let _ = session.answer(&uuid, false).await;
//!             let _ = session
//!                 .playback("ivr/ivr-welcome.wav", "", &uuid, false, 0)
//!                 .await;
//!             let _ = session.hangup("NORMAL_CLEARING", &uuid, false).await;
//!             session.start().await;
//!         })
//!         .await
//! }
//! ```
//!
//! # Command/reply discipline
//!
//! The protocol is sequential: one command, one reply, in order, freely
//! interleaved with asynchronous events. The engine serializes concurrent
//! synchronous callers internally, so clones of a session handle may be used
//! from several tasks without swapping replies.

#![deny(missing_docs)]

pub mod constants;
pub mod dptools;
pub mod error;
pub mod event;
pub mod handlers;
pub mod inbound;
pub mod outbound;
pub mod socket;

pub(crate) mod buffer;
pub(crate) mod command;
pub(crate) mod protocol;

pub use command::SendMsg;
pub use constants::{ALL_EVENTS, DEFAULT_ESL_PORT};
pub use dptools::PlayAndGetDigits;
pub use error::{SwitchError, SwitchResult};
pub use event::{Event, EventEncoding};
pub use handlers::{EventHandler, HandlerMap};
pub use inbound::{InboundConfig, InboundSocket};
pub use outbound::{OutboundServer, OutboundSocket};
pub use socket::{ConnectionStatus, DisconnectReason, EventSocket};
