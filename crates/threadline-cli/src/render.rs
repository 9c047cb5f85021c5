//! Text rendering.
//!
//! [`frame`] turns App state into plain lines: a header, the conversation
//! list, the open conversation's viewport, the status line and the composer.
//! It performs no I/O so the output can be checked in tests.

use threadline_app::{App, SessionState};
use threadline_client::RealtimeStatus;
use threadline_core::{Conversation, Message, MessageId, MessageStatus, Tab};

/// Render the App as lines of text.
pub fn frame(app: &App) -> Vec<String> {
    let mut lines = vec![header(app), filter_line(app)];

    let selected = app.selected();
    for (index, conversation) in app.visible_conversations().into_iter().enumerate() {
        lines.push(conversation_line(conversation, index == selected, app.active()));
    }

    lines.push(String::new());
    match app.active_conversation() {
        Some(conversation) => {
            lines.push(format!("-- {} --", conversation.profile.name));
            let viewer = viewer(app);
            for message in app.visible_messages() {
                lines.push(message_line(message, viewer, conversation));
            }
        },
        None => lines.push("No conversation open. /open <id>, or Enter on the selection.".into()),
    }

    if let Some(status) = app.status_message() {
        lines.push(format!("! {status}"));
    }
    lines.push(format!("> {}", app.composer().text()));
    lines
}

fn viewer(app: &App) -> Option<u64> {
    match app.session() {
        SessionState::Online { viewer } => Some(viewer),
        SessionState::Offline => None,
    }
}

fn header(app: &App) -> String {
    let session = match app.session() {
        SessionState::Online { viewer } => format!("user {viewer}"),
        SessionState::Offline => "offline".to_owned(),
    };
    let realtime = match app.realtime() {
        RealtimeStatus::Idle => "idle",
        RealtimeStatus::Subscribed(_) => "live",
        RealtimeStatus::Degraded { .. } => "polling",
    };
    format!("threadline | {session} | {realtime} | unread {}", app.unread_total())
}

fn filter_line(app: &App) -> String {
    let filter = app.filter();
    let tab = match filter.tab {
        Tab::All => "[all] favorites",
        Tab::Favorites => "all [favorites]",
    };
    if filter.search.is_empty() {
        tab.to_owned()
    } else {
        format!("{tab} | search: {}", filter.search)
    }
}

fn conversation_line(conversation: &Conversation, selected: bool, active: Option<u64>) -> String {
    let cursor = if selected { '>' } else { ' ' };
    let open = if active == Some(conversation.user_id) { '*' } else { ' ' };
    let name = &conversation.profile.name;
    let mut line = format!("{cursor}{open} {name} #{}", conversation.user_id);

    if conversation.is_pinned {
        line.push_str(" [pin]");
    }
    if conversation.is_favorite {
        line.push_str(" [fav]");
    }
    if conversation.is_online {
        line.push_str(" [online]");
    }
    if conversation.unread_count > 0 {
        line.push_str(&format!(" ({} new)", conversation.unread_count));
    }
    if let Some(preview) = &conversation.last_message {
        let text = match (&preview.body, preview.has_attachment) {
            (Some(body), _) => body.as_str(),
            (None, true) => "[attachment]",
            (None, false) => "",
        };
        line.push_str(&format!(": {text}"));
    }
    line
}

fn message_line(message: &Message, viewer: Option<u64>, conversation: &Conversation) -> String {
    let id = match message.id {
        MessageId::Confirmed(id) => id.to_string(),
        MessageId::Pending(_) => "..".to_owned(),
    };
    let author = if Some(message.sender_id) == viewer {
        "you"
    } else {
        conversation.profile.name.as_str()
    };

    let mut line = format!("[{id}] {author}: {}", message.body.as_deref().unwrap_or_default());
    if let Some(attachment) = &message.attachment {
        line.push_str(&format!(" [file: {}]", attachment.name()));
    }
    if message.updated_at.is_some() {
        line.push_str(" (edited)");
    }
    if message.status == MessageStatus::Sending {
        line.push_str(" (sending)");
    }
    line
}
