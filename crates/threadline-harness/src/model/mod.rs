//! Reference model for model-based testing.
//!
//! [`ModelWorld`] is a deliberately naive implementation of one viewer's
//! session. Tests apply the same [`Operation`] sequence to the model and to a
//! real `Client` wired to the simulated backend, then compare results and
//! [`ObservableState`].

mod operation;
mod world;

pub use operation::{FaultKind, ModelPeer, Operation, OperationError, OperationResult, SmallText};
pub use world::{
    ModelMessage, ModelWorld, ObservableConversation, ObservableState, PEERS, VIEWER, peer_id,
};
