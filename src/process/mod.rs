//! External tool invocation
//!
//! - `locator`: resolves and caches the executable path
//! - `command`: subcommand model and argv construction
//! - `cancel`: caller cancellation combined with the invocation deadline
//! - `invoker`: the `ToolRunner` that spawns, drains and kills processes
//! - `lock_file`: stale lock cleanup for logout commands

pub mod cancel;
pub mod command;
pub mod invoker;
pub mod locator;
pub mod lock_file;

pub use cancel::{CancellationToken, StopReason};
pub use command::{PLACEHOLDER_AUTH_CODE, ToolCommand, ToolInvocation};
pub use invoker::ProcessInvoker;
pub use locator::{ResolvedBy, ResolvedTool, ToolLocator};
