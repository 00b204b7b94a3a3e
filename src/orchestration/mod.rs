//! Orchestration layer for the App Store tool
//!
//! Wires the invoker, secret store and classifier into the login flow and
//! the client facade the command-line front-end drives.

pub mod app_store_client;
pub mod context;
pub mod login_service;

pub use app_store_client::{AppStoreClient, SearchOutcome, purchase_succeeded};
pub use context::DriverContext;
pub use login_service::{LoginResult, LoginService, LoginStatus};
