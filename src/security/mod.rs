pub mod secret_store;
pub mod token_manager;

pub use secret_store::{SqliteSecretStore, generate_secret};
pub use token_manager::{KeychainTokenManager, mask_secrets_in_string, mask_token};
