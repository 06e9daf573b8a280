//! Error types for the sync server.

use docudb_core::CoreError;
use docudb_sync_engine::SyncError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Authorization failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No route for the method and path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The named database is not provisioned.
    #[error("unknown database: {0:?}")]
    UnknownDatabase(String),

    /// The named database is already provisioned.
    #[error("database {0:?} already exists")]
    DatabaseExists(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: {0}")]
    ProtocolMismatch(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::NotAuthorized(_)
                | ServerError::NotFound(_)
                | ServerError::UnknownDatabase(_)
                | ServerError::DatabaseExists(_)
                | ServerError::ProtocolMismatch(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Database(_) | ServerError::Internal(_))
    }

    /// The HTTP status reported for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::ProtocolMismatch(_) => 400,
            ServerError::AuthenticationFailed(_) => 401,
            ServerError::NotAuthorized(_) => 403,
            ServerError::NotFound(_) | ServerError::UnknownDatabase(_) => 404,
            ServerError::DatabaseExists(_) => 412,
            ServerError::Database(CoreError::Validation { .. }) => 400,
            ServerError::Database(_) | ServerError::Internal(_) => 500,
        }
    }
}

impl From<SyncError> for ServerError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AuthenticationFailed(message) => ServerError::AuthenticationFailed(message),
            SyncError::Protocol(message) => ServerError::InvalidRequest(message),
            e @ SyncError::VersionMismatch { .. } => ServerError::ProtocolMismatch(e.to_string()),
            SyncError::Database(e) => ServerError::Database(e),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
        assert!(ServerError::DatabaseExists("db".into()).is_client_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::AuthenticationFailed("x".into()).status(), 401);
        assert_eq!(ServerError::UnknownDatabase("db".into()).status(), 404);
        assert_eq!(ServerError::DatabaseExists("db".into()).status(), 412);
        assert_eq!(ServerError::from(CoreError::validation("bad id")).status(), 400);
        assert_eq!(ServerError::from(CoreError::DatabaseClosed).status(), 500);
    }

    #[test]
    fn sync_errors_map_to_server_errors() {
        let err = ServerError::from(SyncError::AuthenticationFailed("unknown session".into()));
        assert_eq!(err.status(), 401);

        let err = ServerError::from(SyncError::VersionMismatch {
            local: 1,
            remote: 2,
        });
        assert!(matches!(err, ServerError::ProtocolMismatch(_)));
        assert!(ServerError::from(SyncError::NotConnected).is_server_error());
    }
}
