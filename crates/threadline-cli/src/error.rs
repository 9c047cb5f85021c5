//! CLI error types.

use std::io;

use thiserror::Error;
use threadline_client::TransportError;
use threadline_harness::SimDriverError;

/// Errors that end a CLI session.
#[derive(Debug, Error)]
pub enum CliError {
    /// I/O error from terminal operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport could not be set up.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session file could not be read.
    #[error("invalid session file {path}: {reason}")]
    Session {
        /// File that was read.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// In-process simulation failed.
    #[error("simulation error: {0}")]
    Simulation(#[from] SimDriverError),

    /// The inbound event bus closed while requests were in flight.
    #[error("event bus closed")]
    BusClosed,
}
