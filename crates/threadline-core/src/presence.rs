//! Presence Tracker
//!
//! Decides when the viewer's liveness heartbeat and the online-user poll are
//! due. Time is passed in by the caller, so the tracker works with any
//! [`crate::Environment`] instant.
//!
//! # Cadence
//!
//! - Heartbeat immediately on start, then every `heartbeat_interval`.
//! - User activity schedules an extra heartbeat `activity_debounce` after the
//!   most recent activity. Any heartbeat restarts the interval.
//! - Poll immediately on start, then every `poll_interval`. Polling continues
//!   while push is connected and reconciles missed presence events.
//! - Teardown stops everything and asks for one go-offline beacon.
//!
//! Presence updates from push and poll are applied to the
//! [`crate::ConversationList`] in arrival order: the last applied wins.

use std::time::Duration;

use threadline_proto::{OnlineUser, UserId};
use tracing::trace;

use crate::{ConversationList, SyncConfig, env::elapsed};

/// Work the tracker asks the caller to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    /// Send a heartbeat.
    SendHeartbeat,
    /// Fetch the online-user set.
    PollOnlineUsers,
}

/// Heartbeat and poll scheduler.
#[derive(Debug, Clone)]
pub struct PresenceTracker<I> {
    heartbeat_interval: Duration,
    activity_debounce: Duration,
    poll_interval: Duration,
    last_heartbeat: Option<I>,
    last_poll: Option<I>,
    last_activity: Option<I>,
    running: bool,
}

impl<I> PresenceTracker<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Stopped tracker using the cadence from `config`.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            activity_debounce: config.activity_debounce,
            poll_interval: config.poll_interval,
            last_heartbeat: None,
            last_poll: None,
            last_activity: None,
            running: false,
        }
    }

    /// Whether the tracker is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start tracking. Both a heartbeat and a poll are due immediately.
    pub fn start(&mut self, now: I) -> Vec<PresenceAction> {
        self.running = true;
        self.last_heartbeat = None;
        self.last_poll = None;
        self.last_activity = None;
        self.on_tick(now)
    }

    /// Note user activity.
    pub fn on_activity(&mut self, now: I) {
        if self.running {
            self.last_activity = Some(now);
        }
    }

    /// Advance time and return the work now due.
    pub fn on_tick(&mut self, now: I) -> Vec<PresenceAction> {
        if !self.running {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.heartbeat_due(now) {
            trace!("heartbeat due");
            self.last_heartbeat = Some(now);
            self.last_activity = None;
            actions.push(PresenceAction::SendHeartbeat);
        }
        if self.last_poll.is_none_or(|last| elapsed(now, last) >= self.poll_interval) {
            self.last_poll = Some(now);
            actions.push(PresenceAction::PollOnlineUsers);
        }
        actions
    }

    /// Stop tracking. Returns `true` exactly once per start, when the
    /// go-offline beacon should be sent.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    /// Time until the next heartbeat or poll is due, for drivers that sleep
    /// between ticks.
    pub fn next_deadline(&self, now: I) -> Option<Duration> {
        if !self.running {
            return None;
        }
        let until = |since: Option<I>, period: Duration| {
            since.map_or(Duration::ZERO, |since| period.saturating_sub(elapsed(now, since)))
        };

        let mut next = until(self.last_heartbeat, self.heartbeat_interval)
            .min(until(self.last_poll, self.poll_interval));
        if let Some(activity) = self.last_activity {
            next = next.min(self.activity_debounce.saturating_sub(elapsed(now, activity)));
        }
        Some(next)
    }

    /// Apply a pushed presence change.
    pub fn apply_push(
        &self,
        conversations: &mut ConversationList,
        user_id: UserId,
        online: bool,
    ) -> bool {
        conversations.set_online(user_id, online)
    }

    /// Apply a polled online-user set.
    pub fn apply_poll(&self, conversations: &mut ConversationList, users: &[OnlineUser]) -> usize {
        conversations.merge_online(users)
    }

    fn heartbeat_due(&self, now: I) -> bool {
        let Some(last) = self.last_heartbeat else {
            return true;
        };
        if elapsed(now, last) >= self.heartbeat_interval {
            return true;
        }
        self.last_activity.is_some_and(|activity| elapsed(now, activity) >= self.activity_debounce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Secs(u64);

    impl std::ops::Sub for Secs {
        type Output = Duration;
        fn sub(self, rhs: Self) -> Duration {
            Duration::from_secs(self.0.saturating_sub(rhs.0))
        }
    }

    fn tracker() -> PresenceTracker<Secs> {
        PresenceTracker::new(&SyncConfig::default())
    }

    fn heartbeats(actions: &[PresenceAction]) -> usize {
        actions.iter().filter(|action| **action == PresenceAction::SendHeartbeat).count()
    }

    #[test]
    fn start_sends_heartbeat_and_poll() {
        let mut presence = tracker();
        assert_eq!(
            presence.start(Secs(0)),
            vec![PresenceAction::SendHeartbeat, PresenceAction::PollOnlineUsers]
        );
        assert!(presence.on_tick(Secs(1)).is_empty());
    }

    #[test]
    fn heartbeat_every_interval() {
        let mut presence = tracker();
        presence.start(Secs(0));

        assert_eq!(heartbeats(&presence.on_tick(Secs(119))), 0);
        assert_eq!(heartbeats(&presence.on_tick(Secs(120))), 1);
        assert_eq!(heartbeats(&presence.on_tick(Secs(200))), 0);
        assert_eq!(heartbeats(&presence.on_tick(Secs(240))), 1);
    }

    #[test]
    fn activity_heartbeat_is_debounced() {
        let mut presence = tracker();
        presence.start(Secs(0));

        presence.on_activity(Secs(10));
        presence.on_activity(Secs(11));
        assert_eq!(heartbeats(&presence.on_tick(Secs(13))), 0);
        assert_eq!(heartbeats(&presence.on_tick(Secs(14))), 1);
        assert_eq!(heartbeats(&presence.on_tick(Secs(20))), 0);

        // The activity heartbeat restarted the interval.
        assert_eq!(heartbeats(&presence.on_tick(Secs(133))), 0);
        assert_eq!(heartbeats(&presence.on_tick(Secs(134))), 1);
    }

    #[test]
    fn poll_every_interval() {
        let mut presence = tracker();
        presence.start(Secs(0));

        assert!(!presence.on_tick(Secs(59)).contains(&PresenceAction::PollOnlineUsers));
        assert!(presence.on_tick(Secs(60)).contains(&PresenceAction::PollOnlineUsers));
    }

    #[test]
    fn stop_requests_one_beacon_and_silences_ticks() {
        let mut presence = tracker();
        presence.start(Secs(0));

        assert!(presence.stop());
        assert!(!presence.stop());
        assert!(presence.on_tick(Secs(1_000)).is_empty());
        assert_eq!(presence.next_deadline(Secs(1_000)), None);
    }

    #[test]
    fn next_deadline_tracks_nearest_timer() {
        let mut presence = tracker();
        presence.start(Secs(0));
        assert_eq!(presence.next_deadline(Secs(10)), Some(Duration::from_secs(50)));

        presence.on_activity(Secs(10));
        assert_eq!(presence.next_deadline(Secs(11)), Some(Duration::from_secs(2)));
    }

    #[test]
    fn last_applied_presence_wins() {
        use threadline_proto::WireUser;

        let mut list = ConversationList::new(3);
        list.merge_listing(vec![WireUser {
            id: 5,
            name: "E".into(),
            email: String::new(),
            avatar: None,
            last_message: None,
            unread_count: 0,
            is_online: false,
            is_pinned: false,
            is_favorite: false,
        }]);
        let presence = tracker();

        assert!(presence.apply_push(&mut list, 5, true));
        assert_eq!(presence.apply_poll(&mut list, &[OnlineUser { id: 5, is_online: false }]), 1);
        assert!(!list.get(5).unwrap().is_online);
        assert!(presence.apply_push(&mut list, 5, true));
        assert!(list.get(5).unwrap().is_online);
    }
}
