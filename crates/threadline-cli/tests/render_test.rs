//! Snapshot tests for the text frame.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use insta::assert_snapshot;
use threadline_app::{App, AppEvent, KeyInput};
use threadline_cli::render::frame;
use threadline_client::RealtimeStatus;
use threadline_core::{
    Attachment, Conversation, LocalFile, LocalToken, Message, MessageId, MessagePreview,
    MessageStatus, Tab,
};

const VIEWER: u64 = 1;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

fn conversation(user_id: u64, name: &str) -> Conversation {
    let mut conversation = Conversation::placeholder(user_id);
    conversation.profile.name = name.to_owned();
    conversation
}

fn conversations() -> Vec<Conversation> {
    let mut ada = conversation(2, "Ada");
    ada.is_pinned = true;
    ada.is_online = true;
    ada.unread_count = 2;
    ada.last_message = Some(MessagePreview {
        id: MessageId::Confirmed(11),
        sender_id: 2,
        body: Some("see you".into()),
        has_attachment: false,
        created_at: at(8),
    });

    let mut grace = conversation(3, "Grace");
    grace.is_favorite = true;
    grace.last_message = Some(MessagePreview {
        id: MessageId::Confirmed(7),
        sender_id: VIEWER,
        body: None,
        has_attachment: true,
        created_at: at(9),
    });

    vec![grace, conversation(4, "Linus"), ada]
}

fn message(id: MessageId, sender_id: u64, body: &str) -> Message {
    Message {
        id,
        sender_id,
        receiver_id: if sender_id == VIEWER { 2 } else { VIEWER },
        body: Some(body.to_owned()),
        attachment: None,
        is_read: true,
        created_at: at(10),
        updated_at: None,
        status: MessageStatus::Sent,
    }
}

fn app(active: Option<u64>) -> App {
    let mut app = App::new();
    app.handle(AppEvent::Started { viewer: VIEWER });
    app.handle(AppEvent::ConversationsUpdated { conversations: conversations(), active });
    for c in "hi".chars() {
        app.handle(AppEvent::Key(KeyInput::Char(c)));
    }
    app
}

#[test]
fn list_without_open_conversation() {
    let app = app(None);

    assert_snapshot!(frame(&app).join("\n"), @r"
threadline | user 1 | idle | unread 2
[all] favorites
>  Ada #2 [pin] [online] (2 new): see you
   Grace #3 [fav]: [attachment]
   Linus #4

No conversation open. /open <id>, or Enter on the selection.
> hi
");
}

#[test]
fn open_conversation_shows_transcript() {
    let mut app = app(Some(2));
    app.handle(AppEvent::RealtimeChanged(RealtimeStatus::Subscribed(Vec::new())));

    let mut edited = message(MessageId::Confirmed(12), VIEWER, "hi Ada");
    edited.updated_at = Some(at(11));
    let mut photo = message(MessageId::Confirmed(13), 2, "look");
    photo.attachment = Some(Attachment::Remote("https://files.test/u/photo.png".into()));
    let mut sending = message(MessageId::Pending(LocalToken::new(1)), VIEWER, "on my way");
    sending.status = MessageStatus::Sending;
    sending.attachment = Some(Attachment::Local(LocalFile {
        name: "notes.txt".into(),
        content: Arc::from(&b"notes"[..]),
    }));

    app.handle(AppEvent::MessagesUpdated {
        user_id: Some(2),
        messages: vec![message(MessageId::Confirmed(11), 2, "hello"), edited, photo, sending],
        keep_anchor: false,
    });
    app.handle(AppEvent::ScrollToLatest);

    assert_snapshot!(frame(&app).join("\n"), @r"
threadline | user 1 | live | unread 2
[all] favorites
>* Ada #2 [pin] [online] (2 new): see you
   Grace #3 [fav]: [attachment]
   Linus #4

-- Ada --
[11] Ada: hello
[12] you: hi Ada (edited)
[13] Ada: look [file: photo.png]
[..] you: on my way [file: notes.txt] (sending)
> hi
");
}

#[test]
fn favorites_tab_with_search_and_status() {
    let mut app = app(None);
    app.set_tab(Tab::Favorites);
    app.search("gr".into());
    app.handle(AppEvent::RealtimeChanged(RealtimeStatus::Degraded { reason: "timeout".into() }));

    assert_snapshot!(frame(&app).join("\n"), @r"
threadline | user 1 | polling | unread 2
all [favorites] | search: gr
>  Grace #3 [fav]: [attachment]

No conversation open. /open <id>, or Enter on the selection.
! Realtime unavailable (timeout), polling
> hi
");
}

#[test]
fn stopped_session_renders_offline() {
    let mut app = app(None);
    app.handle(AppEvent::Stopped);

    let header = frame(&app).into_iter().next().unwrap_or_default();

    assert_eq!(header, "threadline | offline | idle | unread 2");
}
