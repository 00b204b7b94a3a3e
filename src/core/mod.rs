pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod session;
pub mod state_machine;
pub mod traits;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader, ConfigOverrides, ConfigValidationResult};
pub use error::*;
pub use session::SessionState;
pub use state_machine::{AuthState, AuthStateMachine, AuthTransition};
pub use traits::*;
