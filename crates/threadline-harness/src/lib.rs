//! Deterministic simulation harness for the threadline sync engine.
//!
//! Virtual-time implementations of the Environment and Driver traits plus an
//! in-memory application server, for deterministic, reproducible testing of
//! the client under failures, duplicates and reordering.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and real implementation,
//! and their observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the full
//! messenger set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod session;
pub mod sim_backend;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    ActiveConversationListed, ActiveUnreadZero, ClientSnapshot, ConversationSnapshot, Invariant,
    InvariantRegistry, InvariantResult, MessageSnapshot, MessagesInConversation, MessagesOrdered,
    PinLimit, SystemSnapshot, UniqueConversations, UniqueMessageIds, Violation,
};
pub use model::{
    FaultKind, ModelMessage, ModelPeer, ModelWorld, ObservableConversation, ObservableState,
    Operation, OperationError, OperationResult, PEERS, SmallText, VIEWER, peer_id,
};
pub use session::SimSession;
pub use sim_backend::{
    Delivery, INJECTED_FAILURE_STATUS, SharedBackend, SimBackend, create_shared_backend,
    lock_backend,
};
pub use sim_driver::{SimDriver, SimDriverError, run_until_idle};
pub use sim_env::{SimEnv, SimInstant};
