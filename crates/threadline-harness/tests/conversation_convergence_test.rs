//! Two-viewer convergence tests using deterministic simulation.
//!
//! Two sessions share one simulated server. Whatever either side sends, with
//! duplicates, failures and presence churn mixed in, both message windows
//! must settle on the server's transcript of the conversation.

use proptest::prelude::*;
use threadline_client::{ClientEvent, RealtimeCredentials, SessionContext};
use threadline_core::{Draft, UserId};
use threadline_harness::{
    ClientSnapshot, InvariantRegistry, SharedBackend, SimEnv, SimSession, SystemSnapshot,
    create_shared_backend, lock_backend,
};
use threadline_proto::RequestKind;

const ALICE: UserId = 1;
const BOB: UserId = 2;

/// Alice and Bob with each other's conversation open.
struct Pair {
    backend: SharedBackend,
    alice: SimSession,
    bob: SimSession,
}

impl Pair {
    fn new(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let backend = create_shared_backend(env.clone());
        lock_backend(&backend).add_users(3);

        let session = |viewer: UserId| {
            let context = SessionContext::new(viewer, format!("user-{viewer}"))
                .with_realtime(RealtimeCredentials { key: "sim".into(), cluster: "local".into() });
            let mut session = SimSession::new(env.clone(), backend.clone(), context);
            session.start();
            session
        };
        let mut alice = session(ALICE);
        let mut bob = session(BOB);

        alice.handle(ClientEvent::OpenConversation { user_id: BOB }).unwrap();
        bob.handle(ClientEvent::OpenConversation { user_id: ALICE }).unwrap();
        Self { backend, alice, bob }
    }

    fn session(&mut self, viewer: UserId) -> &mut SimSession {
        if viewer == ALICE { &mut self.alice } else { &mut self.bob }
    }

    fn send(&mut self, from: UserId, body: &str) {
        let to = if from == ALICE { BOB } else { ALICE };
        self.session(from).handle(ClientEvent::Send { draft: Draft::text(to, body) }).unwrap();
    }

    fn settle(&mut self) {
        for _ in 0..4 {
            self.alice.sync();
            self.bob.sync();
        }
    }

    fn transcript(&self) -> Vec<(UserId, String)> {
        lock_backend(&self.backend)
            .conversation(ALICE, BOB)
            .into_iter()
            .map(|m| (m.sender_id, m.body.unwrap_or_default()))
            .collect()
    }

    fn window(session: &SimSession) -> Vec<(UserId, String)> {
        session
            .client()
            .store()
            .messages()
            .map(|m| (m.sender_id, m.body.clone().unwrap_or_default()))
            .collect()
    }

    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_clients(vec![self.alice.snapshot(), self.bob.snapshot()])
    }
}

#[test]
fn exchange_converges() {
    let mut pair = Pair::new(1);

    pair.send(ALICE, "hi bob");
    pair.settle();
    pair.send(BOB, "hi alice");
    pair.send(BOB, "how are you");
    pair.settle();

    let transcript = pair.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(Pair::window(&pair.alice), transcript);
    assert_eq!(Pair::window(&pair.bob), transcript);
    InvariantRegistry::standard().assert_all(&pair.snapshot(), "after exchange");
}

#[test]
fn closed_conversation_accumulates_unread_then_clears_on_open() {
    let mut pair = Pair::new(2);
    pair.bob.handle(ClientEvent::CloseConversation).unwrap();

    pair.send(ALICE, "one");
    pair.send(ALICE, "two");
    pair.settle();

    let unread = |pair: &Pair| pair.bob.client().conversations().get(ALICE).unwrap().unread_count;
    assert_eq!(unread(&pair), 2);

    pair.bob.handle(ClientEvent::OpenConversation { user_id: ALICE }).unwrap();
    assert_eq!(unread(&pair), 0);
    assert_eq!(Pair::window(&pair.bob), pair.transcript());

    let backend = lock_backend(&pair.backend);
    assert!(backend.conversation(ALICE, BOB).iter().all(|m| m.is_read));
}

#[test]
fn rejected_send_never_reaches_the_other_side() {
    let mut pair = Pair::new(3);
    lock_backend(&pair.backend).fail_next(RequestKind::Send, 1);

    pair.send(ALICE, "dropped");
    pair.send(ALICE, "delivered");
    pair.settle();

    let expected = vec![(ALICE, "delivered".to_owned())];
    assert_eq!(pair.transcript(), expected);
    assert_eq!(Pair::window(&pair.alice), expected);
    assert_eq!(Pair::window(&pair.bob), expected);
}

#[test]
fn redelivered_push_is_absorbed() {
    let mut pair = Pair::new(4);
    pair.send(ALICE, "once");
    pair.settle();

    pair.bob.redeliver_last();
    pair.bob.redeliver_last();

    assert_eq!(Pair::window(&pair.bob), pair.transcript());
    assert_eq!(pair.bob.client().conversations().get(ALICE).unwrap().unread_count, 0);
}

#[test]
fn presence_is_seen_by_the_other_viewer() {
    let mut pair = Pair::new(5);
    pair.settle();

    // Both sent a heartbeat on start.
    assert!(pair.alice.client().conversations().get(BOB).unwrap().is_online);

    pair.bob.handle(ClientEvent::Teardown).unwrap();
    pair.settle();

    assert!(!pair.alice.client().conversations().get(BOB).unwrap().is_online);
    assert!(pair.bob.subscriptions().is_empty());
}

#[derive(Debug, Clone)]
enum Step {
    Send { from_alice: bool, seed: u8 },
    FailNextSend,
    Redeliver { alice: bool },
    Settle,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (any::<bool>(), any::<u8>())
            .prop_map(|(from_alice, seed)| Step::Send { from_alice, seed }),
        1 => Just(Step::FailNextSend),
        2 => any::<bool>().prop_map(|alice| Step::Redeliver { alice }),
        2 => Just(Step::Settle),
    ]
}

proptest! {
    #[test]
    fn prop_windows_converge_on_transcript(
        seed in any::<u64>(),
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let mut pair = Pair::new(seed);
        let invariants = InvariantRegistry::standard();

        for step in &steps {
            match step {
                Step::Send { from_alice, seed } => {
                    let from = if *from_alice { ALICE } else { BOB };
                    pair.send(from, &format!("m{seed}"));
                },
                Step::FailNextSend => lock_backend(&pair.backend).fail_next(RequestKind::Send, 1),
                Step::Redeliver { alice } => {
                    pair.session(if *alice { ALICE } else { BOB }).redeliver_last();
                },
                Step::Settle => pair.settle(),
            }
            let checked = invariants.check_all(&pair.snapshot());
            prop_assert!(checked.is_ok(), "after {:?}: {:?}", step, checked);
        }
        pair.settle();

        let transcript = pair.transcript();
        let tail = |window: Vec<(UserId, String)>| {
            let skip = transcript.len().saturating_sub(window.len());
            (window, transcript[skip..].to_vec())
        };
        let (alice, expected) = tail(Pair::window(&pair.alice));
        prop_assert_eq!(alice, expected);
        let (bob, expected) = tail(Pair::window(&pair.bob));
        prop_assert_eq!(bob, expected);
    }
}

#[test]
fn snapshot_reflects_both_viewers() {
    let pair = Pair::new(6);
    let snapshot = pair.snapshot();

    assert_eq!(snapshot.clients.len(), 2);
    let viewers: Vec<UserId> = snapshot.clients.iter().map(|c: &ClientSnapshot| c.viewer).collect();
    assert_eq!(viewers, vec![ALICE, BOB]);
}
