//! Pagination Loader
//!
//! Backward paging through the history of the open conversation. Page 1 is
//! the newest page and replaces the window; later pages are prepended.
//!
//! ```text
//! Closed --load_initial--> Loading(page 1) --ok, more--> Idle(next) --near top--> Loading(next)
//!                        |                          ^                          |
//!                        +--ok, last page--> Exhausted                         |
//!                        +--failed------------------+<------failed-------------+
//! ```
//!
//! # Invariants
//!
//! - At most one load is in flight.
//! - A response is applied only if its ticket matches the in-flight load;
//!   anything else (another conversation, a superseded load) is stale.
//! - Exhausted is terminal until the conversation is reopened.

use threadline_proto::{ApiRequest, UserId};
use tracing::{debug, trace};

/// Identity of one history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    /// Bumped on every open; separates loads of successive visits.
    pub generation: u64,
    /// Counterpart of the conversation.
    pub user_id: UserId,
    /// Requested page, 1 being the newest.
    pub page: u32,
}

impl LoadTicket {
    /// How the page is merged into the window.
    pub fn kind(&self) -> LoadKind {
        if self.page <= 1 { LoadKind::Initial } else { LoadKind::Older }
    }
}

/// How a loaded page is merged into the message window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Newest page; replaces the window.
    Initial,
    /// Older page; prepended.
    Older,
}

/// Loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// No conversation open.
    Closed,
    /// Ready to fetch `next_page`.
    Idle {
        /// Page the next load requests.
        next_page: u32,
    },
    /// A load is in flight.
    Loading {
        /// In-flight load.
        ticket: LoadTicket,
    },
    /// The oldest page has been loaded.
    Exhausted,
}

/// Result of reporting a load completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page belongs to the in-flight load and must be merged.
    Applied {
        /// How to merge it.
        kind: LoadKind,
        /// Whether this was the oldest page.
        exhausted: bool,
    },
    /// The in-flight load failed; the loader accepts another attempt.
    Failed,
    /// The response does not belong to the in-flight load; discard it.
    Stale,
}

/// History pagination state machine.
#[derive(Debug, Clone)]
pub struct PaginationLoader {
    page_size: u32,
    generation: u64,
    conversation: Option<UserId>,
    state: LoaderState,
}

impl PaginationLoader {
    /// Loader requesting `page_size` messages per page.
    pub fn new(page_size: u32) -> Self {
        Self { page_size, generation: 0, conversation: None, state: LoaderState::Closed }
    }

    /// Current state.
    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Conversation being paged.
    pub fn conversation(&self) -> Option<UserId> {
        self.conversation
    }

    /// Whether a load is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoaderState::Loading { .. })
    }

    /// Whether the oldest page has been loaded.
    pub fn is_exhausted(&self) -> bool {
        self.state == LoaderState::Exhausted
    }

    /// Start paging `user_id` and return the ticket for page 1.
    ///
    /// Any load in flight for the previous conversation becomes stale.
    pub fn load_initial(&mut self, user_id: UserId) -> LoadTicket {
        self.generation += 1;
        self.conversation = Some(user_id);
        let ticket = LoadTicket { generation: self.generation, user_id, page: 1 };
        self.state = LoaderState::Loading { ticket };
        debug!(user_id, generation = self.generation, "history paging opened");
        ticket
    }

    /// Stop paging. Any load in flight becomes stale.
    pub fn close(&mut self) {
        self.generation += 1;
        self.conversation = None;
        self.state = LoaderState::Closed;
    }

    /// Start loading the next older page, if one may be requested now.
    pub fn load_older(&mut self) -> Option<LoadTicket> {
        let user_id = self.conversation?;
        match self.state {
            LoaderState::Idle { next_page } => {
                let ticket = LoadTicket { generation: self.generation, user_id, page: next_page };
                self.state = LoaderState::Loading { ticket };
                Some(ticket)
            },
            LoaderState::Loading { .. } => {
                trace!(user_id, "load already in flight");
                None
            },
            LoaderState::Exhausted | LoaderState::Closed => None,
        }
    }

    /// Whether an older page should be requested with the viewport's top edge
    /// `rows_from_top` rows below the oldest loaded message.
    pub fn should_load_older(&self, rows_from_top: usize, threshold: usize) -> bool {
        rows_from_top <= threshold && matches!(self.state, LoaderState::Idle { .. })
    }

    /// History request for `ticket`.
    pub fn request(&self, ticket: &LoadTicket) -> ApiRequest {
        let LoadTicket { user_id, page, .. } = *ticket;
        ApiRequest::History { user_id, page, page_size: self.page_size }
    }

    /// Report a successful response for `ticket`.
    pub fn complete(&mut self, ticket: LoadTicket, has_next_page: bool) -> LoadOutcome {
        if !self.is_current(&ticket) {
            debug!(user_id = ticket.user_id, page = ticket.page, "stale history page discarded");
            return LoadOutcome::Stale;
        }

        self.state = if has_next_page {
            LoaderState::Idle { next_page: ticket.page + 1 }
        } else {
            LoaderState::Exhausted
        };
        LoadOutcome::Applied { kind: ticket.kind(), exhausted: !has_next_page }
    }

    /// Report a failed response for `ticket`. The same page is requested on
    /// the next attempt.
    pub fn fail(&mut self, ticket: LoadTicket) -> LoadOutcome {
        if !self.is_current(&ticket) {
            return LoadOutcome::Stale;
        }
        self.state = LoaderState::Idle { next_page: ticket.page };
        LoadOutcome::Failed
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        matches!(self.state, LoaderState::Loading { ticket: current } if current == *ticket)
    }
}

/// Viewport position captured before content is prepended.
///
/// Prepending grows the content above the viewport; restoring adds the growth
/// to the offset so the rows the viewer was looking at stay in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollAnchor {
    content_height: usize,
    offset: usize,
}

impl ScrollAnchor {
    /// Capture the content height and the viewport's offset from the top.
    pub fn capture(content_height: usize, offset: usize) -> Self {
        Self { content_height, offset }
    }

    /// Offset that keeps the same rows in view after the content grew to
    /// `new_content_height`.
    pub fn restore(&self, new_content_height: usize) -> usize {
        self.offset + new_content_height.saturating_sub(self.content_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_load_requests_newest_page() {
        let mut loader = PaginationLoader::new(20);
        let ticket = loader.load_initial(4);

        assert_eq!(ticket.page, 1);
        assert_eq!(ticket.kind(), LoadKind::Initial);
        assert_eq!(
            loader.request(&ticket),
            ApiRequest::History { user_id: 4, page: 1, page_size: 20 }
        );
        assert!(loader.is_loading());
    }

    #[test]
    fn pages_advance_until_exhausted() {
        let mut loader = PaginationLoader::new(20);
        let first = loader.load_initial(4);
        assert_eq!(
            loader.complete(first, true),
            LoadOutcome::Applied { kind: LoadKind::Initial, exhausted: false }
        );

        let second = loader.load_older().unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(
            loader.complete(second, false),
            LoadOutcome::Applied { kind: LoadKind::Older, exhausted: true }
        );

        assert!(loader.load_older().is_none());
        assert!(loader.is_exhausted());
    }

    #[test]
    fn single_load_in_flight() {
        let mut loader = PaginationLoader::new(20);
        let first = loader.load_initial(4);
        loader.complete(first, true);

        assert!(loader.load_older().is_some());
        assert!(loader.load_older().is_none());
    }

    #[test]
    fn response_for_previous_conversation_is_stale() {
        let mut loader = PaginationLoader::new(20);
        let old = loader.load_initial(4);
        let current = loader.load_initial(5);

        assert_eq!(loader.complete(old, true), LoadOutcome::Stale);
        assert_eq!(loader.state(), LoaderState::Loading { ticket: current });
    }

    #[test]
    fn reopening_same_conversation_stales_earlier_visit() {
        let mut loader = PaginationLoader::new(20);
        let first_visit = loader.load_initial(4);
        loader.close();
        loader.load_initial(4);

        assert_eq!(loader.complete(first_visit, true), LoadOutcome::Stale);
    }

    #[test]
    fn failure_returns_to_idle_at_same_page() {
        let mut loader = PaginationLoader::new(20);
        let first = loader.load_initial(4);
        loader.complete(first, true);
        let second = loader.load_older().unwrap();

        assert_eq!(loader.fail(second), LoadOutcome::Failed);
        assert_eq!(loader.state(), LoaderState::Idle { next_page: 2 });
        assert_eq!(loader.load_older().unwrap().page, 2);
    }

    #[test]
    fn scroll_threshold_gates_requests() {
        let mut loader = PaginationLoader::new(20);
        let first = loader.load_initial(4);
        loader.complete(first, true);

        assert!(!loader.should_load_older(10, 3));
        assert!(loader.should_load_older(3, 3));
        loader.load_older();
        assert!(!loader.should_load_older(0, 3));
    }

    #[test]
    fn closed_loader_requests_nothing() {
        let mut loader = PaginationLoader::new(20);
        assert!(loader.load_older().is_none());
        assert_eq!(loader.state(), LoaderState::Closed);
    }

    #[test]
    fn anchor_offsets_by_prepended_height() {
        let anchor = ScrollAnchor::capture(40, 2);
        assert_eq!(anchor.restore(60), 22);
        assert_eq!(anchor.restore(30), 2);
    }
}
