//! Session context.
//!
//! Everything the engine needs to know about who is signed in and how to
//! reach realtime, built once at start and passed by constructor.

use serde::{Deserialize, Serialize};
use threadline_core::{SyncConfig, UserId};
use threadline_proto::Channel;

/// Signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerIdentity {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
}

/// Pusher application credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeCredentials {
    /// Application key.
    pub key: String,
    /// Cluster name, e.g. `eu`.
    pub cluster: String,
}

/// Explicit replacement for ambient session globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Signed-in user.
    pub viewer: ViewerIdentity,
    /// Realtime credentials. `None` runs the session on polling alone.
    #[serde(default)]
    pub realtime: Option<RealtimeCredentials>,
    /// Tunables.
    #[serde(default)]
    pub config: SyncConfig,
}

impl SessionContext {
    /// Context with default tunables and no realtime.
    pub fn new(viewer_id: UserId, name: impl Into<String>) -> Self {
        Self {
            viewer: ViewerIdentity { id: viewer_id, name: name.into() },
            realtime: None,
            config: SyncConfig::default(),
        }
    }

    /// Enable realtime.
    pub fn with_realtime(mut self, credentials: RealtimeCredentials) -> Self {
        self.realtime = Some(credentials);
        self
    }

    /// Replace the tunables.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Channels the viewer subscribes to.
    pub fn channels(&self) -> Vec<Channel> {
        vec![Channel::Private { user_id: self.viewer.id }, Channel::Presence]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_cover_private_and_presence() {
        let context = SessionContext::new(7, "Grace");
        let names: Vec<String> = context.channels().iter().map(Channel::name).collect();
        assert_eq!(names, vec!["private-messenger.7".to_owned(), "online-users".to_owned()]);
    }

    #[test]
    fn deserializes_without_optional_sections() {
        let context: SessionContext =
            serde_json::from_str(r#"{"viewer":{"id":3,"name":"Lin"}}"#).unwrap();
        assert_eq!(context.realtime, None);
        assert_eq!(context.config, SyncConfig::default());
    }
}
