//! Client
//!
//! Action-based sync engine for the messenger. Owns the message window, the
//! conversation list, history paging, presence cadence and realtime
//! ingestion of one viewer's session.
//!
//! # Architecture
//!
//! The client follows the Sans-IO and Action-Based patterns of
//! [`threadline_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for the caller to execute. Every HTTP call is an action carrying a
//! [`RequestId`]; the caller reports its completion back as
//! [`ClientEvent::Response`].
//!
//! # Components
//!
//! - [`Client`]: top-level state machine
//! - [`SessionContext`]: viewer identity, realtime credentials and tunables,
//!   passed in at construction
//! - [`RealtimeBridge`]: push subscription lifecycle and message ingestion
//! - [`ClientEvent`]: events fed into the client
//! - [`ClientAction`]: actions produced by the client
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::HttpTransport`]: executes [`threadline_proto::ApiRequest`]s
//!   over HTTP
//! - [`transport::push::connect`]: Pusher-protocol websocket subscription

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod context;
mod error;
mod event;
mod ingest;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use context::{RealtimeCredentials, SessionContext, ViewerIdentity};
pub use error::{ClientError, TransportError};
pub use event::{ClientAction, ClientEvent, Notice, NoticeKind, RequestId};
pub use ingest::{IngestEffect, RealtimeBridge, RealtimeStatus};
pub use threadline_core::env::Environment;
