//! Pusher-protocol websocket for realtime delivery.
//!
//! [`connect`] spawns a task that holds the socket, authorizes private
//! channels through [`HttpTransport::authorize`], answers keep-alive pings and
//! forwards decoded [`PushEvent`]s. Any connection failure is reported once as
//! [`PushMessage::Unavailable`]; the client then runs on polling alone.

use std::collections::HashSet;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use threadline_proto::{Channel, PushEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::HttpTransport;
use crate::RealtimeCredentials;

const PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "threadline";

/// Output of a push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Decoded event.
    Event(PushEvent),
    /// Realtime is unavailable.
    Unavailable {
        /// Failure description.
        reason: String,
    },
}

enum Command {
    Subscribe(Vec<Channel>),
    Unsubscribe(Vec<Channel>),
    Close,
}

/// Frame of the Pusher protocol.
#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Frame {
    /// Event data as raw JSON. Pusher double-encodes data as a string.
    fn data_bytes(&self) -> Vec<u8> {
        match &self.data {
            Some(Value::String(encoded)) => encoded.clone().into_bytes(),
            Some(value) => value.to_string().into_bytes(),
            None => b"{}".to_vec(),
        }
    }

    /// Socket id carried by `pusher:connection_established`.
    fn socket_id(&self) -> Option<String> {
        serde_json::from_slice::<ConnectionEstablished>(&self.data_bytes())
            .ok()
            .map(|established| established.socket_id)
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
}

/// Handle to a running push connection.
pub struct PushConnection {
    commands: mpsc::UnboundedSender<Command>,
    abort_handle: tokio::task::AbortHandle,
}

impl PushConnection {
    /// Subscribe to channels. Subscriptions requested before the socket is
    /// established are sent once it is.
    pub fn subscribe(&self, channels: Vec<Channel>) {
        let _ = self.commands.send(Command::Subscribe(channels));
    }

    /// Unsubscribe from channels.
    pub fn unsubscribe(&self, channels: Vec<Channel>) {
        let _ = self.commands.send(Command::Unsubscribe(channels));
    }

    /// Close the socket gracefully.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Stop the connection task immediately.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Websocket URL for the given credentials.
pub fn socket_url(credentials: &RealtimeCredentials) -> String {
    format!(
        "wss://ws-{}.pusher.com/app/{}?protocol={PROTOCOL_VERSION}&client={CLIENT_NAME}&version={}",
        credentials.cluster,
        credentials.key,
        env!("CARGO_PKG_VERSION"),
    )
}

/// Open a push connection. Must be called within a tokio runtime.
pub fn connect(
    credentials: &RealtimeCredentials,
    http: HttpTransport,
    sink: mpsc::Sender<PushMessage>,
) -> PushConnection {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let url = socket_url(credentials);
    let handle = tokio::spawn(run_connection(url, http, command_rx, sink));
    PushConnection { commands, abort_handle: handle.abort_handle() }
}

async fn run_connection(
    url: String,
    http: HttpTransport,
    mut commands: mpsc::UnboundedReceiver<Command>,
    sink: mpsc::Sender<PushMessage>,
) {
    let reason = match connect_async(url.as_str()).await {
        Ok((stream, _)) => {
            info!("realtime socket connected");
            let (mut write, mut read) = stream.split();
            let mut socket_id: Option<String> = None;
            let mut wanted: HashSet<Channel> = HashSet::new();

            loop {
                tokio::select! {
                    command = commands.recv() => match command {
                        Some(Command::Subscribe(channels)) => {
                            for channel in channels {
                                if !wanted.insert(channel) {
                                    continue;
                                }
                                let Some(socket_id) = &socket_id else {
                                    continue;
                                };
                                let frame = subscribe_frame(&http, socket_id, channel).await;
                                if let Some(frame) = frame
                                    && write.send(Message::Text(frame)).await.is_err()
                                {
                                    break;
                                }
                            }
                        },
                        Some(Command::Unsubscribe(channels)) => {
                            for channel in channels {
                                wanted.remove(&channel);
                                let frame = json!({
                                    "event": "pusher:unsubscribe",
                                    "data": { "channel": channel.name() },
                                });
                                let _ = write.send(Message::Text(frame.to_string())).await;
                            }
                        },
                        Some(Command::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        },
                    },
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
                                warn!("undecodable realtime frame");
                                continue;
                            };
                            match frame.event.as_str() {
                                "pusher:connection_established" => {
                                    let Some(id) = frame.socket_id() else {
                                        break "connection handshake malformed".to_owned();
                                    };
                                    debug!(socket_id = %id, "realtime session established");
                                    for channel in &wanted {
                                        let frame = subscribe_frame(&http, &id, *channel).await;
                                        if let Some(frame) = frame {
                                            let _ = write.send(Message::Text(frame)).await;
                                        }
                                    }
                                    socket_id = Some(id);
                                },
                                "pusher:ping" => {
                                    let pong = json!({ "event": "pusher:pong", "data": {} });
                                    let _ = write.send(Message::Text(pong.to_string())).await;
                                },
                                "pusher:error" => {
                                    warn!(data = ?frame.data, "realtime error frame");
                                },
                                event if event.starts_with("pusher") => {
                                    let channel = frame.channel.as_deref();
                                    debug!(event, ?channel, "realtime housekeeping");
                                },
                                event => forward(&sink, &frame, event).await,
                            }
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            break "socket closed by server".to_owned();
                        },
                        Some(Err(e)) => break format!("socket error: {e}"),
                        Some(Ok(_)) => {},
                    },
                }
            }
        },
        Err(e) => format!("connect failed: {e}"),
    };

    warn!(%reason, "realtime unavailable");
    let _ = sink.send(PushMessage::Unavailable { reason }).await;
}

async fn forward(sink: &mpsc::Sender<PushMessage>, frame: &Frame, event: &str) {
    let Some(channel) = frame.channel.as_deref() else {
        debug!(event, "event without channel ignored");
        return;
    };

    match PushEvent::decode_on(channel, event, &frame.data_bytes()) {
        Ok(Some(decoded)) => {
            let _ = sink.send(PushMessage::Event(decoded)).await;
        },
        Ok(None) => debug!(event, channel, "unhandled realtime event"),
        Err(error) => warn!(event, channel, %error, "dropping malformed realtime event"),
    }
}

async fn subscribe_frame(
    http: &HttpTransport,
    socket_id: &str,
    channel: Channel,
) -> Option<String> {
    let name = channel.name();
    if !channel.requires_auth() {
        let frame = json!({ "event": "pusher:subscribe", "data": { "channel": name } });
        return Some(frame.to_string());
    }

    match http.authorize(socket_id, &channel).await {
        Ok(auth) => Some(
            json!({ "event": "pusher:subscribe", "data": { "channel": name, "auth": auth } })
                .to_string(),
        ),
        Err(error) => {
            warn!(channel = %name, %error, "channel authorization failed");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_targets_cluster() {
        let url = socket_url(&RealtimeCredentials { key: "abc".into(), cluster: "eu".into() });
        assert!(url.starts_with("wss://ws-eu.pusher.com/app/abc?protocol=7"));
    }

    #[test]
    fn frame_data_is_unwrapped_from_string() {
        let frame: Frame = serde_json::from_str(
            r#"{"event":"UserOnline","channel":"online-users","data":"{\"user_id\":3}"}"#,
        )
        .unwrap();
        assert_eq!(frame.data_bytes(), br#"{"user_id":3}"#.to_vec());
    }

    #[test]
    fn frame_data_accepts_objects() {
        let text = r#"{"event":"pusher:connection_established","data":{"socket_id":"1.2"}}"#;
        let frame: Frame = serde_json::from_str(text).unwrap();
        assert_eq!(frame.socket_id().as_deref(), Some("1.2"));
    }
}
