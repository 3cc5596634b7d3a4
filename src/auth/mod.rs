// Authentication module
// Credential store and token lifecycle

mod credentials;
mod manager;
mod refresh;
mod types;

pub use credentials::{CredentialStore, Credentials};
pub use manager::AuthManager;
pub use refresh::TokenEndpoint;
pub use types::Token;
