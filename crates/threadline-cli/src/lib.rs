//! Line-mode terminal client for Threadline
//!
//! A thin shell over [`threadline_app::Driver`] that provides terminal and
//! network I/O. All orchestration logic lives in the generic
//! [`threadline_app::Runtime`].
//!
//! Two drivers are provided: [`NetworkDriver`] talks to a real server over
//! HTTP and the Pusher socket, [`LocalDriver`] runs against the in-process
//! simulated server.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod console;
pub mod error;
pub mod input;
pub mod local;
pub mod network;
pub mod render;
pub mod system_env;

pub use console::Console;
pub use error::CliError;
pub use local::LocalDriver;
pub use network::NetworkDriver;
pub use system_env::SystemEnv;
