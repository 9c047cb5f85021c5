//! Threadline wire contract
//!
//! JSON payloads exchanged between the messenger client and the surrounding
//! application: the HTTP request/response bodies, the realtime push events and
//! the channel naming scheme.
//!
//! The client core never touches raw bytes; transports decode into these types
//! and hand them over. Everything here is plain data with `serde` derives, so
//! the same types serve the HTTP transport, the simulation backend and the fuzz
//! targets.
//!
//! # Components
//!
//! - [`payloads`]: message, user, presence and history bodies
//! - [`PushEvent`] / [`Channel`]: realtime events and where they arrive
//! - [`ApiRequest`] / [`ApiResponse`]: the request contract and its routes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod payloads;
pub mod push;
pub mod request;

pub use errors::{ProtocolError, Result};
pub use payloads::{HistoryPage, OnlineUser, ToggleState, WireMessage, WireUser};
pub use push::{Channel, PushEvent};
pub use request::{ApiRequest, ApiResponse, AttachmentUpload, Method, RequestKind, Route};

/// Server-side user identifier.
pub type UserId = u64;

/// Server-assigned message identifier.
pub type ServerId = u64;
