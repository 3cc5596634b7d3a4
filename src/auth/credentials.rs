// Credential store

use std::fmt;

use crate::error::{ClientError, Result};

/// Long-lived authentication material supplied by the caller
///
/// Immutable once built. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    principal: String,
    secret: String,
}

impl Credentials {
    /// Build credentials, rejecting empty values
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let principal = principal.into();
        let secret = secret.into();

        if principal.trim().is_empty() {
            return Err(ClientError::Config(
                "Credential principal must not be empty".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(ClientError::Config(
                "Credential secret must not be empty".to_string(),
            ));
        }

        Ok(Self { principal, secret })
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"***")
            .finish()
    }
}

/// Read-only holder of the client's credentials
#[derive(Debug, Clone)]
pub struct CredentialStore {
    credentials: Credentials,
}

impl CredentialStore {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// The single read operation
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
