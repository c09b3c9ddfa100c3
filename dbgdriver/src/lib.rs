/// Debugger command driver
///
/// This crate sits between a debugger front end and a line-oriented
/// debugger process such as gdb. It serializes commands into two priority
/// queues, sends them one at a time, collects the output until the
/// debugger prompt reappears and reports each completed command back.
///
/// The synchronous core is [`DebuggerDriver`]; [`DebuggerSession`] runs
/// one driver and one debugger process on a tokio task.

use thiserror::Error;

pub mod commands;
pub mod communication;
pub mod config;
pub mod driver;
pub mod events;
pub mod output;
pub mod parser;
pub mod process;
pub mod session;
pub mod transcript;
pub mod types;

pub use commands::CommandQueues;
pub use communication::{PipeTransport, ProcessEvent, Transport, TransportError};
pub use config::{ConfigError, DriverConfig, PromptConfig};
pub use driver::DebuggerDriver;
pub use events::{DriverListener, DriverNotification, NotificationHandler};
pub use output::{DelayedOutput, OutputBuffer};
pub use parser::{PatternPrompt, PromptRecognizer, TrailingPrompt};
pub use process::{DebuggerProcess, ProcessError, SpawnedDebugger};
pub use session::DebuggerSession;
pub use transcript::Transcript;
pub use types::*;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to launch debugger: {0}")]
    Launch(#[from] ProcessError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Debugger session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, DriverError>;
