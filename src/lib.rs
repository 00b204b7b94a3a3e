pub mod classify;
pub mod core;
pub mod orchestration;
pub mod process;
pub mod security;

pub use classify::{ClassifiedOutcome, OutcomeKind, ResponseClassifier};
pub use self::core::*;
pub use orchestration::{AppStoreClient, LoginResult, LoginService, LoginStatus};
pub use process::{CancellationToken, ProcessInvoker, ToolCommand, ToolInvocation};
pub use security::{KeychainTokenManager, SqliteSecretStore};
