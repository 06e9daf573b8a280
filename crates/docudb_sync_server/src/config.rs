//! Server configuration.

use crate::auth::AuthConfig;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identifier reported in logs and database info.
    pub server_id: String,
    /// Maximum revisions served or accepted per request.
    pub max_batch: u32,
    /// Token authentication for users other than the guest.
    pub auth: Option<AuthConfig>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            max_batch: 500,
            auth: None,
        }
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch(mut self, size: u32) -> Self {
        self.max_batch = size.max(1);
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.auth = Some(AuthConfig::new(secret));
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("docudb-sync")
    }
}
