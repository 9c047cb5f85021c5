//! Fuzz target for ApiResponse decoding
//!
//! Response bodies are parsed according to the request kind that produced
//! them. The fuzzer should NEVER panic; all invalid bodies return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadline_proto::{ApiResponse, RequestKind};

const KINDS: [RequestKind; 11] = [
    RequestKind::ListConversations,
    RequestKind::History,
    RequestKind::Send,
    RequestKind::Edit,
    RequestKind::Delete,
    RequestKind::MarkRead,
    RequestKind::Heartbeat,
    RequestKind::GoOffline,
    RequestKind::OnlineUsers,
    RequestKind::TogglePin,
    RequestKind::ToggleFavorite,
];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let kind = KINDS[usize::from(selector) % KINDS.len()];
    let _ = ApiResponse::decode(kind, body);
});
