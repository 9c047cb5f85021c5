//! In-memory application server for simulation.
//!
//! `SimBackend` honours the HTTP and push contracts of
//! [`threadline_proto`] for any number of viewers: it stores users and
//! messages, assigns ids and timestamps, tracks per-viewer pin and favorite
//! flags and the online set, and queues the push events a real broadcaster
//! would deliver.
//!
//! # Failure injection
//!
//! Any [`RequestKind`] can be made to fail for the next `n` calls
//! ([`SimBackend::fail_next`]) or until healed ([`SimBackend::fail_always`]).
//! A failed request has no side effects and answers with status 503, which
//! exercises the client's rollback paths.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use threadline_client::{Environment, RequestId, TransportError};
use threadline_proto::{
    ApiRequest, ApiResponse, Channel, HistoryPage, OnlineUser, PushEvent, RequestKind, ServerId,
    ToggleState, UserId, WireMessage, WireUser,
};
use tracing::{debug, trace};

use crate::SimEnv;

/// Status returned for injected failures.
pub const INJECTED_FAILURE_STATUS: u16 = 503;

/// A push event queued for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// User the event is delivered to.
    pub recipient: UserId,
    /// Channel it arrives on.
    pub channel: Channel,
    /// The event.
    pub event: PushEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Times(u32),
    Always,
}

/// In-memory server.
pub struct SimBackend {
    env: SimEnv,
    users: BTreeMap<UserId, String>,
    messages: BTreeMap<ServerId, WireMessage>,
    next_id: ServerId,
    last_created: Option<DateTime<Utc>>,
    pins: HashSet<(UserId, UserId)>,
    favorites: HashSet<(UserId, UserId)>,
    online: BTreeSet<UserId>,
    faults: HashMap<RequestKind, Fault>,
    echo_to_sender: bool,
    pushes: VecDeque<Delivery>,
    log: Vec<(UserId, RequestKind)>,
}

/// Backend shared between simulated drivers.
pub type SharedBackend = Arc<Mutex<SimBackend>>;

/// Create a backend behind a shared handle.
pub fn create_shared_backend(env: SimEnv) -> SharedBackend {
    Arc::new(Mutex::new(SimBackend::new(env)))
}

/// Lock a shared backend, ignoring poisoning from a panicked test thread.
pub fn lock_backend(backend: &SharedBackend) -> MutexGuard<'_, SimBackend> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimBackend {
    /// Empty backend. The sender's own channel echoes messages by default.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            users: BTreeMap::new(),
            messages: BTreeMap::new(),
            next_id: 1,
            last_created: None,
            pins: HashSet::new(),
            favorites: HashSet::new(),
            online: BTreeSet::new(),
            faults: HashMap::new(),
            echo_to_sender: true,
            pushes: VecDeque::new(),
            log: Vec::new(),
        }
    }

    /// Register a user.
    pub fn add_user(&mut self, id: UserId, name: impl Into<String>) {
        self.users.insert(id, name.into());
    }

    /// Register users `1..=count` named `user-N`.
    pub fn add_users(&mut self, count: u64) {
        for id in 1..=count {
            self.add_user(id, format!("user-{id}"));
        }
    }

    /// Whether the sender's private channel receives its own messages.
    pub fn set_echo_to_sender(&mut self, echo: bool) {
        self.echo_to_sender = echo;
    }

    /// Fail the next `times` requests of `kind`.
    pub fn fail_next(&mut self, kind: RequestKind, times: u32) {
        if times > 0 {
            self.faults.insert(kind, Fault::Times(times));
        }
    }

    /// Fail every request of `kind` until healed.
    pub fn fail_always(&mut self, kind: RequestKind) {
        self.faults.insert(kind, Fault::Always);
    }

    /// Stop failing `kind`.
    pub fn heal(&mut self, kind: RequestKind) {
        self.faults.remove(&kind);
    }

    /// Stop all injected failures.
    pub fn heal_all(&mut self) {
        self.faults.clear();
    }

    /// Execute `request` on behalf of `viewer`.
    ///
    /// # Errors
    ///
    /// - `TransportError::Status` with 503 for injected failures
    /// - `TransportError::Status` with 404/403/422 when the request names an
    ///   unknown user or message, targets someone else's message, or carries
    ///   no content
    pub fn execute(
        &mut self,
        viewer: UserId,
        request_id: RequestId,
        request: &ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let kind = request.kind();
        self.log.push((viewer, kind));
        if self.take_fault(kind) {
            debug!(viewer, %request_id, ?kind, "injected failure");
            return Err(TransportError::Status { request_id, status: INJECTED_FAILURE_STATUS });
        }

        let status = |status| TransportError::Status { request_id, status };
        match request {
            ApiRequest::ListConversations => Ok(ApiResponse::Conversations(self.listing(viewer))),
            ApiRequest::History { user_id, page, page_size } => {
                Ok(ApiResponse::History(self.history(viewer, *user_id, *page, *page_size)))
            },
            ApiRequest::Send { receiver_id, body, attachment } => {
                let body = body.as_deref().map(str::trim).filter(|body| !body.is_empty());
                if !self.users.contains_key(receiver_id) {
                    return Err(status(404));
                }
                if body.is_none() && attachment.is_none() {
                    return Err(status(422));
                }
                let attachment =
                    attachment.as_ref().map(|file| format!("attachments/{}", file.file_name));
                let message =
                    self.commit(viewer, *receiver_id, body.map(str::to_owned), attachment);
                Ok(ApiResponse::Sent(Some(message)))
            },
            ApiRequest::Edit { message_id, body } => {
                let updated_at = self.env.wall_clock();
                let message = self.messages.get_mut(message_id).ok_or_else(|| status(404))?;
                if message.sender_id != viewer {
                    return Err(status(403));
                }
                message.body = Some(body.clone());
                message.updated_at = Some(updated_at);
                Ok(ApiResponse::Edited(Some(message.clone())))
            },
            ApiRequest::Delete { message_id } => {
                match self.messages.get(message_id) {
                    None => return Err(status(404)),
                    Some(message) if message.sender_id != viewer => return Err(status(403)),
                    Some(_) => {},
                }
                self.messages.remove(message_id);
                Ok(ApiResponse::Ack)
            },
            ApiRequest::MarkRead { user_id } => {
                for message in self.messages.values_mut() {
                    if message.sender_id == *user_id && message.receiver_id == viewer {
                        message.is_read = true;
                    }
                }
                Ok(ApiResponse::Ack)
            },
            ApiRequest::Heartbeat => {
                self.set_online(viewer, true);
                Ok(ApiResponse::Ack)
            },
            ApiRequest::GoOffline => {
                self.set_online(viewer, false);
                Ok(ApiResponse::Ack)
            },
            ApiRequest::OnlineUsers => Ok(ApiResponse::OnlineUsers(
                self.users
                    .keys()
                    .filter(|&&id| id != viewer)
                    .map(|&id| OnlineUser { id, is_online: self.online.contains(&id) })
                    .collect(),
            )),
            ApiRequest::TogglePin { user_id } => {
                if !self.users.contains_key(user_id) {
                    return Err(status(404));
                }
                Ok(ApiResponse::Toggled(ToggleState {
                    active: flip(&mut self.pins, viewer, *user_id),
                }))
            },
            ApiRequest::ToggleFavorite { user_id } => {
                if !self.users.contains_key(user_id) {
                    return Err(status(404));
                }
                Ok(ApiResponse::Toggled(ToggleState {
                    active: flip(&mut self.favorites, viewer, *user_id),
                }))
            },
        }
    }

    /// Commit a message sent by someone outside the simulated clients.
    pub fn post_message(
        &mut self,
        sender: UserId,
        receiver: UserId,
        body: impl Into<String>,
    ) -> WireMessage {
        self.commit(sender, receiver, Some(body.into()), None)
    }

    /// Commit `count` alternating messages between `a` and `b` without
    /// queueing pushes.
    pub fn seed_history(&mut self, a: UserId, b: UserId, count: usize) -> Vec<WireMessage> {
        (0..count)
            .map(|index| {
                let (sender, receiver) = if index % 2 == 0 { (a, b) } else { (b, a) };
                let message = self.store(sender, receiver, Some(format!("seed {index}")), None);
                trace!(id = message.id, "seeded");
                message
            })
            .collect()
    }

    /// Change a user's presence and broadcast it to everyone else.
    pub fn set_online(&mut self, user_id: UserId, online: bool) {
        let changed =
            if online { self.online.insert(user_id) } else { self.online.remove(&user_id) };
        if !changed {
            return;
        }
        let event = if online {
            PushEvent::UserOnline { user_id }
        } else {
            PushEvent::UserOffline { user_id }
        };
        let recipients: Vec<UserId> =
            self.users.keys().copied().filter(|&id| id != user_id).collect();
        for recipient in recipients {
            self.queue(recipient, event.clone());
        }
    }

    /// Drain pushes queued for `recipient`, oldest first.
    pub fn take_pushes_for(&mut self, recipient: UserId) -> Vec<Delivery> {
        let (taken, kept): (VecDeque<Delivery>, VecDeque<Delivery>) =
            std::mem::take(&mut self.pushes).into_iter().partition(|d| d.recipient == recipient);
        self.pushes = kept;
        taken.into()
    }

    /// Whether pushes are queued for `recipient`.
    pub fn has_pushes_for(&self, recipient: UserId) -> bool {
        self.pushes.iter().any(|delivery| delivery.recipient == recipient)
    }

    /// Messages between `a` and `b`, oldest first.
    pub fn conversation(&self, a: UserId, b: UserId) -> Vec<WireMessage> {
        let mut messages: Vec<WireMessage> =
            self.messages.values().filter(|m| between(m, a, b)).cloned().collect();
        messages.sort_by(|x, y| x.created_at.cmp(&y.created_at).then(x.id.cmp(&y.id)));
        messages
    }

    /// Stored message.
    pub fn message(&self, id: ServerId) -> Option<&WireMessage> {
        self.messages.get(&id)
    }

    /// Whether `viewer` has pinned `user_id`.
    pub fn is_pinned(&self, viewer: UserId, user_id: UserId) -> bool {
        self.pins.contains(&(viewer, user_id))
    }

    /// Whether `viewer` has marked `user_id` as favorite.
    pub fn is_favorite(&self, viewer: UserId, user_id: UserId) -> bool {
        self.favorites.contains(&(viewer, user_id))
    }

    /// Whether `user_id` is online.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains(&user_id)
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> &[(UserId, RequestKind)] {
        &self.log
    }

    /// Number of requests of `kind` executed so far, failed ones included.
    pub fn count(&self, kind: RequestKind) -> usize {
        self.log.iter().filter(|(_, logged)| *logged == kind).count()
    }

    fn take_fault(&mut self, kind: RequestKind) -> bool {
        match self.faults.get(&kind).copied() {
            None => false,
            Some(Fault::Always) => true,
            Some(Fault::Times(remaining)) => {
                if remaining <= 1 {
                    self.faults.remove(&kind);
                } else {
                    self.faults.insert(kind, Fault::Times(remaining - 1));
                }
                true
            },
        }
    }

    fn listing(&self, viewer: UserId) -> Vec<WireUser> {
        self.users
            .iter()
            .filter(|&(&id, _)| id != viewer)
            .map(|(&id, name)| {
                let history = self.conversation(viewer, id);
                WireUser {
                    id,
                    name: name.clone(),
                    email: format!("{name}@threadline.test"),
                    avatar: None,
                    unread_count: u32::try_from(
                        history.iter().filter(|m| m.sender_id == id && !m.is_read).count(),
                    )
                    .unwrap_or(u32::MAX),
                    last_message: history.into_iter().next_back(),
                    is_online: self.online.contains(&id),
                    is_pinned: self.pins.contains(&(viewer, id)),
                    is_favorite: self.favorites.contains(&(viewer, id)),
                }
            })
            .collect()
    }

    /// Page 1 is the newest `page_size` messages; each page ascending.
    fn history(&self, viewer: UserId, user_id: UserId, page: u32, page_size: u32) -> HistoryPage {
        let all = self.conversation(viewer, user_id);
        let size = page_size.max(1) as usize;
        let skip = (page.max(1) as usize - 1).saturating_mul(size);
        let end = all.len().saturating_sub(skip);
        let start = end.saturating_sub(size);
        HistoryPage { data: all[start..end].to_vec(), has_next_page: start > 0 }
    }

    fn commit(
        &mut self,
        sender: UserId,
        receiver: UserId,
        body: Option<String>,
        attachment: Option<String>,
    ) -> WireMessage {
        let message = self.store(sender, receiver, body, attachment);
        let event = PushEvent::MessageSent { message: message.clone() };
        self.queue(receiver, event.clone());
        if self.echo_to_sender && sender != receiver {
            self.queue(sender, event);
        }
        message
    }

    fn store(
        &mut self,
        sender: UserId,
        receiver: UserId,
        body: Option<String>,
        attachment: Option<String>,
    ) -> WireMessage {
        let id = self.next_id;
        self.next_id += 1;
        let message = WireMessage {
            id,
            sender_id: sender,
            receiver_id: receiver,
            body,
            attachment,
            is_read: false,
            created_at: self.stamp(),
            updated_at: None,
        };
        self.messages.insert(id, message.clone());
        message
    }

    /// Strictly increasing timestamps, one second apart at minimum.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = self.env.wall_clock();
        let stamp = match self.last_created {
            Some(last) if now <= last => last + chrono::Duration::seconds(1),
            _ => now,
        };
        self.last_created = Some(stamp);
        stamp
    }

    fn queue(&mut self, recipient: UserId, event: PushEvent) {
        let channel = event.channel_for(recipient);
        self.pushes.push_back(Delivery { recipient, channel, event });
    }
}

fn between(message: &WireMessage, a: UserId, b: UserId) -> bool {
    (message.sender_id == a && message.receiver_id == b)
        || (message.sender_id == b && message.receiver_id == a)
}

fn flip(set: &mut HashSet<(UserId, UserId)>, viewer: UserId, user_id: UserId) -> bool {
    if set.remove(&(viewer, user_id)) {
        false
    } else {
        set.insert((viewer, user_id));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimBackend {
        let mut backend = SimBackend::new(SimEnv::with_seed(1));
        backend.add_users(3);
        backend
    }

    fn id() -> RequestId {
        RequestId::new(1)
    }

    #[test]
    fn history_pages_newest_first_each_ascending() {
        let mut backend = backend();
        let seeded = backend.seed_history(1, 2, 25);

        let Ok(ApiResponse::History(first)) =
            backend.execute(1, id(), &ApiRequest::History { user_id: 2, page: 1, page_size: 20 })
        else {
            panic!("expected history");
        };
        let Ok(ApiResponse::History(second)) =
            backend.execute(1, id(), &ApiRequest::History { user_id: 2, page: 2, page_size: 20 })
        else {
            panic!("expected history");
        };

        assert_eq!(first.data.len(), 20);
        assert!(first.has_next_page);
        assert_eq!(first.data.last().map(|m| m.id), seeded.last().map(|m| m.id));
        assert!(first.data.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(second.data.len(), 5);
        assert!(!second.has_next_page);
        assert_eq!(second.data[0].id, seeded[0].id);
    }

    #[test]
    fn send_queues_receiver_push_and_echo() {
        let mut backend = backend();
        let request =
            ApiRequest::Send { receiver_id: 2, body: Some("hi".into()), attachment: None };

        let Ok(ApiResponse::Sent(Some(message))) = backend.execute(1, id(), &request) else {
            panic!("expected sent message");
        };

        let to_receiver = backend.take_pushes_for(2);
        assert_eq!(to_receiver.len(), 1);
        assert_eq!(to_receiver[0].channel, Channel::Private { user_id: 2 });
        assert_eq!(to_receiver[0].event, PushEvent::MessageSent { message: message.clone() });
        assert_eq!(backend.take_pushes_for(1).len(), 1);
        assert!(!backend.has_pushes_for(2));
    }

    #[test]
    fn injected_failure_has_no_side_effects() {
        let mut backend = backend();
        backend.fail_next(RequestKind::TogglePin, 1);

        let failed = backend.execute(1, id(), &ApiRequest::TogglePin { user_id: 2 });
        assert!(matches!(failed, Err(TransportError::Status { status: 503, .. })));
        assert!(!backend.is_pinned(1, 2));

        let healed = backend.execute(1, id(), &ApiRequest::TogglePin { user_id: 2 });
        assert_eq!(healed, Ok(ApiResponse::Toggled(ToggleState { active: true })));
        assert_eq!(backend.count(RequestKind::TogglePin), 2);
    }

    #[test]
    fn only_the_sender_may_edit_or_delete() {
        let mut backend = backend();
        let message = backend.post_message(2, 1, "mine");

        let edit = ApiRequest::Edit { message_id: message.id, body: "theirs".into() };
        assert!(matches!(
            backend.execute(1, id(), &edit),
            Err(TransportError::Status { status: 403, .. })
        ));
        assert!(backend.execute(2, id(), &ApiRequest::Delete { message_id: message.id }).is_ok());
        assert!(backend.message(message.id).is_none());
    }

    #[test]
    fn listing_reports_unread_and_flags() {
        let mut backend = backend();
        backend.post_message(2, 1, "one");
        backend.post_message(2, 1, "two");
        backend.set_online(2, true);
        let _ = backend.execute(1, id(), &ApiRequest::ToggleFavorite { user_id: 2 });

        let Ok(ApiResponse::Conversations(users)) =
            backend.execute(1, id(), &ApiRequest::ListConversations)
        else {
            panic!("expected listing");
        };
        let two = users.iter().find(|u| u.id == 2).unwrap();
        assert_eq!(two.unread_count, 2);
        assert!(two.is_online);
        assert!(two.is_favorite);
        assert_eq!(two.last_message.as_ref().and_then(|m| m.body.as_deref()), Some("two"));

        let _ = backend.execute(1, id(), &ApiRequest::MarkRead { user_id: 2 });
        let Ok(ApiResponse::Conversations(users)) =
            backend.execute(1, id(), &ApiRequest::ListConversations)
        else {
            panic!("expected listing");
        };
        assert_eq!(users.iter().find(|u| u.id == 2).map(|u| u.unread_count), Some(0));
    }

    #[test]
    fn timestamps_strictly_increase_on_a_frozen_clock() {
        let mut backend = backend();
        let a = backend.post_message(1, 2, "a");
        let b = backend.post_message(1, 2, "b");
        assert!(b.created_at > a.created_at);
    }
}
