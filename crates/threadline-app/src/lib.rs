//! Application layer for Threadline
//!
//! Pure state machines and a generic runtime for the messenger UI and sync
//! orchestration, so deterministic simulation runs the same code as
//! production.
//!
//! # Components
//!
//! - [`App`]: UI state machine (composer, slash commands, conversation
//!   navigation, search, tabs, message viewport)
//! - [`Bridge`]: sync bridge (translates App actions to Client events and
//!   Client actions back to App events)
//! - [`EventBus`]: bounded channel carrying responses and push events from
//!   transport tasks to the runtime
//! - [`Driver`]: trait for platform-specific I/O
//! - [`Runtime`]: generic orchestration loop using a Driver

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod app;
mod bridge;
mod bus;
mod command;
mod driver;
mod event;
mod input;
mod runtime;
mod state;

pub use action::AppAction;
pub use app::App;
pub use bridge::{Bridge, Outbound};
pub use bus::{BusReceiver, DEFAULT_BUS_CAPACITY, EventBus, Inbound};
pub use command::Command;
pub use driver::Driver;
pub use event::AppEvent;
pub use input::KeyInput;
pub use runtime::Runtime;
pub use state::{Composer, SessionState, Viewport};
