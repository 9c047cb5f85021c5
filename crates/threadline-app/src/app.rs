//! Application state machine.
//!
//! This module defines the [`App`] state machine, which manages the interactive
//! state of the messenger completely decoupled from I/O and sync mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Mirrors the conversation list and the open conversation's messages as
//!   published by the bridge.
//! - Owns view-only state: search text, tab, list selection, composer and the
//!   message viewport.
//! - Turns keys and slash commands into sync intents.

use threadline_client::{Notice, RealtimeStatus};
use threadline_core::{Conversation, Draft, ListFilter, Message, MessageId, Tab, UserId};

use crate::{AppAction, AppEvent, Command, Composer, KeyInput, SessionState, Viewport, command};

/// Rows taken by the header, status line and composer.
const CHROME_ROWS: u16 = 3;

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies; fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App {
    /// Session state.
    session: SessionState,
    /// Conversations in listing order, as last published.
    conversations: Vec<Conversation>,
    /// Open conversation.
    active: Option<UserId>,
    /// Search and tab.
    filter: ListFilter,
    /// Selected index in the visible list.
    selected: usize,
    /// Messages of the open conversation, oldest first.
    messages: Vec<Message>,
    /// Conversation `messages` belongs to.
    messages_for: Option<UserId>,
    /// Composer line.
    composer: Composer,
    /// Message viewport.
    viewport: Viewport,
    /// Terminal dimensions (columns, rows).
    terminal_size: (u16, u16),
    /// Realtime subscription state.
    realtime: RealtimeStatus,
    /// Transient status message. `None` if no message.
    status_message: Option<String>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create an App in offline state.
    pub fn new() -> Self {
        let terminal_size: (u16, u16) = (80, 24);
        Self {
            session: SessionState::Offline,
            conversations: Vec::new(),
            active: None,
            filter: ListFilter::default(),
            selected: 0,
            messages: Vec::new(),
            messages_for: None,
            composer: Composer::default(),
            viewport: Viewport::new(usize::from(terminal_size.1.saturating_sub(CHROME_ROWS))),
            terminal_size,
            realtime: RealtimeStatus::Idle,
            status_message: None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Tick => vec![],
            AppEvent::Resize(cols, rows) => {
                self.terminal_size = (cols, rows);
                self.viewport.resize(usize::from(rows.saturating_sub(CHROME_ROWS)));
                vec![AppAction::Render]
            },
            AppEvent::Started { viewer } => {
                self.session = SessionState::Online { viewer };
                vec![AppAction::Render]
            },
            AppEvent::Stopped => {
                self.session = SessionState::Offline;
                vec![AppAction::Render]
            },
            AppEvent::ConversationsUpdated { conversations, active } => {
                self.conversations = conversations;
                self.active = active;
                self.clamp_selection();
                vec![AppAction::Render]
            },
            AppEvent::MessagesUpdated { user_id, messages, keep_anchor } => {
                if user_id != self.active && user_id.is_some() {
                    return vec![];
                }
                if user_id != self.messages_for {
                    self.viewport.reset();
                    self.messages_for = user_id;
                }
                self.messages = messages;
                self.viewport.set_content(self.messages.len(), keep_anchor);
                vec![AppAction::Render]
            },
            AppEvent::ScrollToLatest => {
                self.viewport.to_bottom();
                vec![AppAction::Render]
            },
            AppEvent::RealtimeChanged(status) => {
                if let RealtimeStatus::Degraded { reason } = &status {
                    self.status_message = Some(format!("Realtime unavailable ({reason}), polling"));
                }
                self.realtime = status;
                vec![AppAction::Render]
            },
            AppEvent::Notice(Notice { message, .. }) => {
                self.status_message = Some(message);
                vec![AppAction::Render]
            },
            AppEvent::Error { message } => {
                self.status_message = Some(format!("Error: {message}"));
                vec![AppAction::Render]
            },
        }
    }

    /// Handle keyboard input.
    fn handle_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        match key {
            KeyInput::Char(c) => {
                self.composer.insert(c);
                vec![AppAction::Activity, AppAction::Render]
            },
            KeyInput::Backspace => {
                self.composer.backspace();
                vec![AppAction::Render]
            },
            KeyInput::Delete => {
                self.composer.delete();
                vec![AppAction::Render]
            },
            KeyInput::Left => {
                self.composer.left();
                vec![AppAction::Render]
            },
            KeyInput::Right => {
                self.composer.right();
                vec![AppAction::Render]
            },
            KeyInput::Home => {
                self.composer.home();
                vec![AppAction::Render]
            },
            KeyInput::End => {
                self.composer.end();
                vec![AppAction::Render]
            },
            KeyInput::Up => {
                self.selected = self.selected.saturating_sub(1);
                vec![AppAction::Render]
            },
            KeyInput::Down => {
                self.selected = self.selected.saturating_add(1);
                self.clamp_selection();
                vec![AppAction::Render]
            },
            KeyInput::PageUp => self.scroll_up(),
            KeyInput::PageDown => {
                self.viewport.scroll_down(self.viewport.rows());
                vec![AppAction::Render]
            },
            KeyInput::Tab => {
                let tab = match self.filter.tab {
                    Tab::All => Tab::Favorites,
                    Tab::Favorites => Tab::All,
                };
                self.set_tab(tab)
            },
            KeyInput::Enter => self.handle_enter(),
            KeyInput::Esc => self.handle_escape(),
        }
    }

    /// Send, run a command, or open the selected conversation.
    fn handle_enter(&mut self) -> Vec<AppAction> {
        if self.composer.is_empty() {
            return match self.selected_conversation() {
                Some(user_id) if Some(user_id) != self.active => self.open_conversation(user_id),
                _ => vec![],
            };
        }

        let input = self.composer.take();
        if let Some(command) = input.strip_prefix('/') {
            return match Command::parse(command) {
                Ok(command) => self.run_command(command),
                Err(usage) => {
                    self.status_message = Some(usage.to_owned());
                    vec![AppAction::Render]
                },
            };
        }

        self.send_message(&input)
    }

    fn handle_escape(&mut self) -> Vec<AppAction> {
        if self.active.is_some() {
            return self.close_conversation();
        }
        if !self.filter.search.is_empty() {
            return self.search(String::new());
        }
        vec![AppAction::Quit]
    }

    fn run_command(&mut self, command: Command) -> Vec<AppAction> {
        match command {
            Command::Open(user_id) => self.open_conversation(user_id),
            Command::Close => self.close_conversation(),
            Command::Pin(user_id) => match user_id.or_else(|| self.target()) {
                Some(user_id) => vec![AppAction::TogglePin { user_id }, AppAction::Render],
                None => self.usage("Select a conversation to pin"),
            },
            Command::Favorite(user_id) => match user_id.or_else(|| self.target()) {
                Some(user_id) => vec![AppAction::ToggleFavorite { user_id }, AppAction::Render],
                None => self.usage("Select a conversation to favorite"),
            },
            Command::Search(text) => self.search(text),
            Command::Tab(tab) => self.set_tab(tab),
            Command::Edit(id, body) => {
                let id = MessageId::Confirmed(id);
                vec![AppAction::EditMessage { id, body }, AppAction::Render]
            },
            Command::Delete(id) => {
                vec![AppAction::DeleteMessage { id: MessageId::Confirmed(id) }, AppAction::Render]
            },
            Command::Older => vec![AppAction::LoadOlder, AppAction::Render],
            Command::Refresh => vec![AppAction::Refresh, AppAction::Render],
            Command::Help => self.usage(command::HELP),
            Command::Quit => vec![AppAction::Quit],
        }
    }

    fn usage(&mut self, text: &str) -> Vec<AppAction> {
        self.status_message = Some(text.to_owned());
        vec![AppAction::Render]
    }

    /// Open the conversation with `user_id`.
    pub fn open_conversation(&mut self, user_id: UserId) -> Vec<AppAction> {
        vec![AppAction::OpenConversation { user_id }, AppAction::Render]
    }

    /// Close the open conversation.
    pub fn close_conversation(&mut self) -> Vec<AppAction> {
        if self.active.is_none() {
            return vec![];
        }
        vec![AppAction::CloseConversation, AppAction::Render]
    }

    /// Send `text` to the open conversation.
    pub fn send_message(&mut self, text: &str) -> Vec<AppAction> {
        match self.active {
            Some(user_id) => {
                let draft = Draft::text(user_id, text);
                vec![AppAction::SendMessage { draft }, AppAction::Render]
            },
            None => self.usage("Open a conversation first (/open <id>)"),
        }
    }

    /// Replace the search text.
    pub fn search(&mut self, text: String) -> Vec<AppAction> {
        self.filter.search = text;
        self.selected = 0;
        vec![AppAction::Render]
    }

    /// Switch the list tab.
    pub fn set_tab(&mut self, tab: Tab) -> Vec<AppAction> {
        self.filter.tab = tab;
        self.selected = 0;
        vec![AppAction::Render]
    }

    /// Scroll towards older messages, asking for history near the top.
    pub fn scroll_up(&mut self) -> Vec<AppAction> {
        self.viewport.scroll_up(self.viewport.rows());
        vec![AppAction::Scrolled { rows_from_top: self.viewport.offset() }, AppAction::Render]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    /// Conversation a bare `/pin` or `/fav` applies to.
    fn target(&self) -> Option<UserId> {
        self.active.or_else(|| self.selected_conversation())
    }

    fn clamp_selection(&mut self) {
        let visible = self.visible_conversations().len();
        self.selected = self.selected.min(visible.saturating_sub(1));
    }

    /// Conversations passing the search and tab, pinned first then by recency.
    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        self.filter.apply(&self.conversations)
    }

    /// Counterpart under the list cursor.
    pub fn selected_conversation(&self) -> Option<UserId> {
        self.visible_conversations().get(self.selected).map(|conversation| conversation.user_id)
    }

    /// Session state.
    pub fn session(&self) -> SessionState {
        self.session
    }

    /// Conversations in listing order.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Open conversation.
    pub fn active(&self) -> Option<UserId> {
        self.active
    }

    /// Open conversation's record.
    pub fn active_conversation(&self) -> Option<&Conversation> {
        let active = self.active?;
        self.conversations.iter().find(|conversation| conversation.user_id == active)
    }

    /// Messages of the open conversation, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages inside the viewport.
    pub fn visible_messages(&self) -> &[Message] {
        let start = self.viewport.offset().min(self.messages.len());
        let end = (start + self.viewport.rows()).min(self.messages.len());
        &self.messages[start..end]
    }

    /// Search and tab.
    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    /// Selected index in the visible list.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Composer line.
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Message viewport.
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Terminal dimensions (columns, rows).
    pub fn terminal_size(&self) -> (u16, u16) {
        self.terminal_size
    }

    /// Realtime subscription state.
    pub fn realtime(&self) -> &RealtimeStatus {
        &self.realtime
    }

    /// Unread messages across all conversations.
    pub fn unread_total(&self) -> u32 {
        self.conversations.iter().map(|conversation| conversation.unread_count).sum()
    }

    /// Transient status message. `None` if no message.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use threadline_core::Profile;

    use super::*;

    fn conversation(user_id: UserId, name: &str, pinned: bool, favorite: bool) -> Conversation {
        Conversation {
            user_id,
            profile: Profile { name: name.into(), ..Profile::default() },
            last_message: None,
            unread_count: 0,
            is_online: false,
            is_pinned: pinned,
            is_favorite: favorite,
        }
    }

    fn listed_app() -> App {
        let mut app = App::new();
        app.handle(AppEvent::Started { viewer: 1 });
        app.handle(AppEvent::ConversationsUpdated {
            conversations: vec![
                conversation(2, "Ada", false, true),
                conversation(3, "Grace", true, false),
                conversation(4, "Linus", false, false),
            ],
            active: None,
        });
        app
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle(AppEvent::Key(KeyInput::Char(c)));
        }
    }

    #[test]
    fn enter_opens_selected_conversation() {
        let mut app = listed_app();
        // Pinned Grace sorts first.
        assert_eq!(app.selected_conversation(), Some(3));

        app.handle(AppEvent::Key(KeyInput::Down));
        let actions = app.handle(AppEvent::Key(KeyInput::Enter));

        assert_eq!(actions, vec![AppAction::OpenConversation { user_id: 2 }, AppAction::Render]);
    }

    #[test]
    fn typed_text_sends_to_active_conversation() {
        let mut app = listed_app();
        app.handle(AppEvent::ConversationsUpdated {
            conversations: app.conversations().to_vec(),
            active: Some(4),
        });
        type_text(&mut app, "hello");

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));

        assert_eq!(actions, vec![
            AppAction::SendMessage { draft: Draft::text(4, "hello") },
            AppAction::Render
        ]);
        assert!(app.composer().is_empty());
    }

    #[test]
    fn send_without_conversation_sets_status() {
        let mut app = listed_app();
        type_text(&mut app, "hello");

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));

        assert_eq!(actions, vec![AppAction::Render]);
        assert!(app.status_message().is_some_and(|m| m.contains("Open a conversation")));
    }

    #[test]
    fn pin_command_defaults_to_selection() {
        let mut app = listed_app();
        type_text(&mut app, "/pin");

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));

        assert_eq!(actions, vec![AppAction::TogglePin { user_id: 3 }, AppAction::Render]);
    }

    #[test]
    fn tab_filters_favorites() {
        let mut app = listed_app();
        app.handle(AppEvent::Key(KeyInput::Tab));

        let visible: Vec<UserId> =
            app.visible_conversations().iter().map(|conversation| conversation.user_id).collect();
        assert_eq!(visible, vec![2]);
    }

    #[test]
    fn search_command_filters_and_escape_clears() {
        let mut app = listed_app();
        type_text(&mut app, "/search lin");
        app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(app.visible_conversations().len(), 1);

        app.handle(AppEvent::Key(KeyInput::Esc));
        assert_eq!(app.visible_conversations().len(), 3);

        assert_eq!(app.handle(AppEvent::Key(KeyInput::Esc)), vec![AppAction::Quit]);
    }

    #[test]
    fn page_up_reports_rows_from_top() {
        let mut app = listed_app();
        app.handle(AppEvent::Resize(80, 13));
        app.handle(AppEvent::MessagesUpdated {
            user_id: None,
            messages: Vec::new(),
            keep_anchor: false,
        });

        let actions = app.scroll_up();

        assert_eq!(actions, vec![AppAction::Scrolled { rows_from_top: 0 }, AppAction::Render]);
    }

    #[test]
    fn unknown_command_shows_help() {
        let mut app = listed_app();
        type_text(&mut app, "/dance");

        app.handle(AppEvent::Key(KeyInput::Enter));

        assert_eq!(app.status_message(), Some(command::HELP));
    }

    #[test]
    fn messages_for_other_conversation_are_ignored() {
        let mut app = listed_app();
        app.handle(AppEvent::ConversationsUpdated {
            conversations: app.conversations().to_vec(),
            active: Some(2),
        });

        let actions = app.handle(AppEvent::MessagesUpdated {
            user_id: Some(3),
            messages: Vec::new(),
            keep_anchor: false,
        });

        assert!(actions.is_empty());
    }
}
