//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! client behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (SimSession)   Results
//! ```

use std::time::Duration;

use proptest::prelude::*;
use threadline_client::{
    ClientError, ClientEvent, Notice, NoticeKind, RealtimeCredentials, SessionContext,
};
use threadline_core::{Draft, SyncConfig};
use threadline_harness::{
    ClientSnapshot, FaultKind, InvariantRegistry, ModelWorld, ObservableConversation,
    ObservableState, Operation, OperationError, OperationResult, PEERS, SimEnv, SimInstant,
    SimSession, SmallText, SystemSnapshot, VIEWER, create_shared_backend, lock_backend, peer_id,
};
use threadline_proto::RequestKind;

const PAGE_SIZE: u32 = 4;
const PIN_LIMIT: usize = 2;

/// Real system wrapper that mirrors ModelWorld's interface.
struct RealWorld {
    session: SimSession,
}

impl RealWorld {
    fn new(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let backend = create_shared_backend(env.clone());
        lock_backend(&backend).add_users(PEERS + 1);

        let config =
            SyncConfig { page_size: PAGE_SIZE, pin_limit: PIN_LIMIT, ..SyncConfig::default() };
        let context = SessionContext::new(VIEWER, "viewer")
            .with_realtime(RealtimeCredentials { key: "sim".into(), cluster: "local".into() })
            .with_config(config);

        let mut session = SimSession::new(env, backend, context);
        session.start();
        Self { session }
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Open { peer } => {
                self.handle(ClientEvent::OpenConversation { user_id: peer_id(*peer) })
            },
            Operation::Close => self.handle(ClientEvent::CloseConversation),
            Operation::Send { text } => {
                let receiver = self.session.client().active_conversation().unwrap_or_default();
                self.handle(ClientEvent::Send { draft: Draft::text(receiver, text.body()) })
            },
            Operation::Receive { peer, text } => {
                lock_backend(self.session.backend()).post_message(
                    peer_id(*peer),
                    VIEWER,
                    text.body(),
                );
                outcome(&self.session.sync())
            },
            Operation::RedeliverLast => outcome(&self.session.redeliver_last()),
            Operation::TogglePin { peer } => {
                self.handle(ClientEvent::TogglePin { user_id: peer_id(*peer) })
            },
            Operation::ToggleFavorite { peer } => {
                self.handle(ClientEvent::ToggleFavorite { user_id: peer_id(*peer) })
            },
            Operation::Presence { peer, online } => {
                lock_backend(self.session.backend()).set_online(peer_id(*peer), *online);
                outcome(&self.session.sync())
            },
            Operation::FailNext { kind } => {
                let kind = match kind {
                    FaultKind::Send => RequestKind::Send,
                    FaultKind::Pin => RequestKind::TogglePin,
                    FaultKind::Favorite => RequestKind::ToggleFavorite,
                };
                lock_backend(self.session.backend()).fail_next(kind, 1);
                OperationResult::Ok
            },
            Operation::AdvanceTime { secs } => {
                outcome(&self.session.advance(Duration::from_secs(u64::from(*secs))))
            },
        }
    }

    fn handle(&mut self, event: ClientEvent<SimInstant>) -> OperationResult {
        match self.session.handle(event) {
            Ok(notices) => outcome(&notices),
            Err(ClientError::NoActiveConversation) => {
                OperationResult::Err(OperationError::NoActiveConversation)
            },
            Err(error) => panic!("unexpected client error: {error}"),
        }
    }

    fn observable_state(&self) -> ObservableState {
        let client = self.session.client();
        let mut conversations: Vec<ObservableConversation> = client
            .conversations()
            .iter()
            .map(|c| ObservableConversation {
                user_id: c.user_id,
                unread_count: c.unread_count,
                is_pinned: c.is_pinned,
                is_favorite: c.is_favorite,
                is_online: c.is_online,
                last_body: c.last_message.as_ref().and_then(|m| m.body.clone()),
            })
            .collect();
        conversations.sort_by_key(|c| c.user_id);

        ObservableState {
            conversations,
            active: client.active_conversation(),
            window: client
                .store()
                .messages()
                .map(|m| (m.sender_id, m.body.clone().unwrap_or_default()))
                .collect(),
        }
    }

    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot::from_client(self.session.client()))
    }
}

fn outcome(notices: &[Notice]) -> OperationResult {
    let refused = notices.iter().find_map(|notice| match notice.kind {
        NoticeKind::PinLimitReached => Some(OperationError::PinLimitReached),
        NoticeKind::SendFailed | NoticeKind::PinFailed => Some(OperationError::Rejected),
        _ => None,
    });
    refused.map_or(OperationResult::Ok, OperationResult::Err)
}

fn small_text_strategy() -> impl Strategy<Value = SmallText> {
    any::<u8>().prop_map(|seed| SmallText { seed })
}

fn fault_strategy() -> impl Strategy<Value = FaultKind> {
    prop_oneof![Just(FaultKind::Send), Just(FaultKind::Pin), Just(FaultKind::Favorite)]
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let peer = 0..PEERS as u8;

    prop_oneof![
        // Weight towards message traffic
        3 => peer.clone().prop_map(|peer| Operation::Open { peer }),
        1 => Just(Operation::Close),
        5 => small_text_strategy().prop_map(|text| Operation::Send { text }),
        5 => (peer.clone(), small_text_strategy())
            .prop_map(|(peer, text)| Operation::Receive { peer, text }),
        2 => Just(Operation::RedeliverLast),
        2 => peer.clone().prop_map(|peer| Operation::TogglePin { peer }),
        2 => peer.clone().prop_map(|peer| Operation::ToggleFavorite { peer }),
        2 => (peer, any::<bool>()).prop_map(|(peer, online)| Operation::Presence { peer, online }),
        1 => fault_strategy().prop_map(|kind| Operation::FailNext { kind }),
        1 => any::<u8>().prop_map(|secs| Operation::AdvanceTime { secs }),
    ]
}

proptest! {
    /// Verify that operation results match between model and real client.
    ///
    /// This is the core model-based test. It generates random operation
    /// sequences and asserts that both implementations return the same
    /// results and expose the same state after every step.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut model = ModelWorld::new(PAGE_SIZE as usize, PIN_LIMIT);
        let mut real = RealWorld::new(seed);
        let invariants = InvariantRegistry::standard();

        prop_assert_eq!(model.observable_state(), real.observable_state(), "after start");

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "State divergence after operation {}: {:?}",
                i, op
            );
            let checked = invariants.check_all(&real.snapshot());
            prop_assert!(checked.is_ok(), "invariants violated after {:?}: {:?}", op, checked);
        }
    }

    /// The server ends up holding exactly the messages the model committed.
    #[test]
    fn prop_server_log_matches_model(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..40)
    ) {
        let mut model = ModelWorld::new(PAGE_SIZE as usize, PIN_LIMIT);
        let mut real = RealWorld::new(seed);

        for op in &ops {
            model.apply(op);
            real.apply(op);
        }

        let backend = lock_backend(real.session.backend());
        for peer in 0..PEERS as u8 {
            let expected: Vec<(u64, String)> = model
                .server_messages()
                .iter()
                .filter(|m| m.sender == peer_id(peer) || m.receiver == peer_id(peer))
                .map(|m| (m.sender, m.body.clone()))
                .collect();
            let actual: Vec<(u64, String)> = backend
                .conversation(VIEWER, peer_id(peer))
                .into_iter()
                .map(|m| (m.sender_id, m.body.unwrap_or_default()))
                .collect();
            prop_assert_eq!(expected, actual, "server log for peer {}", peer);
        }
    }
}

#[test]
fn scripted_session_matches_model() {
    let ops = [
        Operation::Receive { peer: 0, text: SmallText { seed: 1 } },
        Operation::Receive { peer: 0, text: SmallText { seed: 2 } },
        Operation::Open { peer: 0 },
        Operation::Send { text: SmallText { seed: 3 } },
        Operation::RedeliverLast,
        Operation::FailNext { kind: FaultKind::Send },
        Operation::Send { text: SmallText { seed: 4 } },
        Operation::TogglePin { peer: 1 },
        Operation::TogglePin { peer: 2 },
        Operation::TogglePin { peer: 3 },
        Operation::Presence { peer: 1, online: true },
        Operation::AdvanceTime { secs: 200 },
        Operation::Close,
        Operation::Send { text: SmallText { seed: 5 } },
    ];

    let mut model = ModelWorld::new(PAGE_SIZE as usize, PIN_LIMIT);
    let mut real = RealWorld::new(7);
    for op in &ops {
        assert_eq!(model.apply(op), real.apply(op), "result of {op:?}");
        assert_eq!(model.observable_state(), real.observable_state(), "state after {op:?}");
    }

    let state = real.observable_state();
    assert_eq!(state.active, None);
    assert!(state.conversations.iter().find(|c| c.user_id == peer_id(1)).unwrap().is_online);
    assert_eq!(state.conversations.iter().filter(|c| c.is_pinned).count(), PIN_LIMIT);
}
