//! JSON bodies of the messenger HTTP contract.
//!
//! Field names are snake_case and timestamps RFC 3339, matching what the
//! application server renders. Boolean flags are accepted either as JSON
//! booleans or as `0`/`1` integers because the server's ORM serializes
//! tinyint columns verbatim.

mod message;
mod user;

pub use message::WireMessage;
pub use user::{OnlineUser, WireUser};

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{ProtocolError, Result};

/// One page of conversation history.
///
/// Pages are requested newest-first but each page lists its messages oldest
/// to newest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages on this page, ascending by `created_at`.
    pub data: Vec<WireMessage>,
    /// Whether an older page exists.
    #[serde(alias = "hasNextPage")]
    pub has_next_page: bool,
}

impl HistoryPage {
    /// Decode a history page from a JSON body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(ProtocolError::json("history page"))
    }
}

/// Server state of a pin or favorite flag after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    /// Flag value after the toggle was applied.
    #[serde(alias = "is_pinned", alias = "is_favorite", deserialize_with = "flexible_bool")]
    pub active: bool,
}

/// Deserialize a flag sent either as a JSON boolean or as an integer.
pub(crate) fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flexible::deserialize(deserializer)? {
        Flexible::Bool(value) => value,
        Flexible::Int(value) => value != 0,
    })
}
