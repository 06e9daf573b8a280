//! Request handlers for sync endpoints.

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::provision::{DatabasePolicy, GUEST};
use docudb_core::Database;
use docudb_sync_engine::{LocalPeer, ReplicationPeer};
use docudb_sync_protocol::{
    ChangesRequest, ChangesResponse, FetchRequest, FetchResponse, HandshakeRequest,
    HandshakeResponse, PushRequest, PushResponse, RevsDiffRequest, RevsDiffResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A provisioned database and the peer serving it.
pub struct HostedDatabase {
    name: String,
    database: Arc<Database>,
    peer: LocalPeer,
    policy: DatabasePolicy,
}

impl HostedDatabase {
    /// Opens an in-memory database for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn new(name: &str, policy: DatabasePolicy) -> ServerResult<Self> {
        let database = Arc::new(Database::open_in_memory(name)?);
        Ok(Self {
            name: name.to_string(),
            peer: LocalPeer::new(Arc::clone(&database)),
            database,
            policy,
        })
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying database.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// The provisioning policy.
    pub fn policy(&self) -> &DatabasePolicy {
        &self.policy
    }

    /// Summary returned by `GET /{db}/`.
    pub fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            db_name: self.name.clone(),
            uuid: self.database.uuid().to_string(),
            doc_count: self.database.count(),
            update_seq: self.database.last_sequence(),
            guest_enabled: self.policy.guest_enabled(),
        }
    }

    /// Ends every session and closes the database.
    pub(crate) fn shut_down(&self) -> ServerResult<()> {
        self.peer.close()?;
        self.database.close()?;
        Ok(())
    }
}

/// Database summary, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub db_name: String,
    /// Database UUID.
    pub uuid: String,
    /// Live documents.
    pub doc_count: u64,
    /// Last committed sequence.
    pub update_seq: u64,
    /// Whether anonymous sessions are allowed.
    pub guest_enabled: bool,
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig) -> Self {
        let validator = config.auth.clone().map(TokenValidator::new);
        Self { config, validator }
    }

    /// The token validator, if authentication is configured.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the user a handshake is made as.
    fn authorize(&self, db: &HostedDatabase, token: Option<&str>) -> ServerResult<String> {
        let Some(token) = token else {
            if db.policy.guest_enabled() {
                return Ok(GUEST.to_string());
            }
            return Err(ServerError::AuthenticationFailed(
                "guest access is disabled".into(),
            ));
        };
        let validator = self.context.validator().ok_or_else(|| {
            ServerError::AuthenticationFailed("token authentication is not configured".into())
        })?;
        let user = validator.validate_token(token, &db.name)?;
        if !db.policy.user_enabled(&user) {
            return Err(ServerError::NotAuthorized(format!("user {user:?} is disabled")));
        }
        Ok(user)
    }

    fn check_batch(&self, len: usize) -> ServerResult<()> {
        let max = self.context.config.max_batch;
        if len > max as usize {
            return Err(ServerError::InvalidRequest(format!(
                "too many revisions: {len} > {max}"
            )));
        }
        Ok(())
    }

    /// Handles a handshake request.
    pub fn handle_handshake(
        &self,
        db: &HostedDatabase,
        request: HandshakeRequest,
    ) -> ServerResult<HandshakeResponse> {
        let user = match self.authorize(db, request.auth_token.as_deref()) {
            Ok(user) => user,
            Err(e) => {
                warn!(
                    database = %db.name,
                    client = %request.client_id,
                    error = %e,
                    "handshake rejected"
                );
                return Err(e);
            }
        };
        let response = db
            .peer
            .handshake(&request)?
            .with_max_batch(self.context.config.max_batch);
        info!(
            server = %self.context.config.server_id,
            database = %db.name,
            client = %request.client_id,
            user = %user,
            "session opened"
        );
        Ok(response)
    }

    /// Handles a changes request, capping the page at the batch limit.
    pub fn handle_changes(
        &self,
        db: &HostedDatabase,
        mut request: ChangesRequest,
    ) -> ServerResult<ChangesResponse> {
        request.limit = request.limit.clamp(1, self.context.config.max_batch);
        Ok(db.peer.changes(&request)?)
    }

    /// Handles a revs-diff request.
    pub fn handle_revs_diff(
        &self,
        db: &HostedDatabase,
        request: RevsDiffRequest,
    ) -> ServerResult<RevsDiffResponse> {
        self.check_batch(request.revisions.len())?;
        Ok(db.peer.revs_diff(&request)?)
    }

    /// Handles a fetch request.
    pub fn handle_fetch(
        &self,
        db: &HostedDatabase,
        request: FetchRequest,
    ) -> ServerResult<FetchResponse> {
        self.check_batch(request.doc_ids.len())?;
        Ok(db.peer.fetch(&request)?)
    }

    /// Handles a push request.
    pub fn handle_push(&self, db: &HostedDatabase, request: PushRequest) -> ServerResult<PushResponse> {
        self.check_batch(request.revisions.len())?;
        let response = db.peer.push(&request)?;
        debug!(
            database = %db.name,
            accepted = response.accepted,
            rejected = response.rejected.len(),
            "push applied"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::provision::UserPolicy;
    use docudb_core::{Document, RevisionRecord};
    use docudb_sync_engine::record_to_payload;

    fn handler(config: ServerConfig) -> RequestHandler {
        RequestHandler::new(Arc::new(HandlerContext::new(config)))
    }

    fn closed_policy() -> DatabasePolicy {
        let mut policy = DatabasePolicy::default();
        policy.users.insert(
            GUEST.into(),
            UserPolicy {
                disabled: true,
                ..UserPolicy::default()
            },
        );
        policy.users.insert("pupshaw".into(), UserPolicy::default());
        policy
    }

    fn record(doc_id: &str) -> RevisionRecord {
        let source = Database::open_in_memory("source").unwrap();
        source.save(&Document::with_id(doc_id)).unwrap();
        source.revision(doc_id).unwrap().unwrap()
    }

    #[test]
    fn guest_handshake_opens_session() {
        let db = HostedDatabase::new("travel", DatabasePolicy::open_guest()).unwrap();
        let response = handler(ServerConfig::default())
            .handle_handshake(&db, HandshakeRequest::new("client", "travel"))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.peer_uuid, db.database().uuid());
        assert!(response.session.is_some());
        assert_eq!(response.max_batch, Some(ServerConfig::default().max_batch));
    }

    #[test]
    fn disabled_guest_requires_token() {
        let db = HostedDatabase::new("travel", closed_policy()).unwrap();
        let config = ServerConfig::default().with_auth(b"secret".to_vec());
        let token = TokenValidator::new(AuthConfig::new(b"secret".to_vec()))
            .create_token("pupshaw", "travel")
            .unwrap();
        let handler = handler(config);

        let anonymous = handler.handle_handshake(&db, HandshakeRequest::new("client", "travel"));
        assert!(matches!(anonymous, Err(ServerError::AuthenticationFailed(_))));

        let with_token = handler
            .handle_handshake(&db, HandshakeRequest::new("client", "travel").with_token(token))
            .unwrap();
        assert!(with_token.success);
    }

    #[test]
    fn token_for_unknown_user_is_refused() {
        let db = HostedDatabase::new("travel", closed_policy()).unwrap();
        let config = ServerConfig::default().with_auth(b"secret".to_vec());
        let token = TokenValidator::new(AuthConfig::new(b"secret".to_vec()))
            .create_token("stranger", "travel")
            .unwrap();
        let result = handler(config)
            .handle_handshake(&db, HandshakeRequest::new("client", "travel").with_token(token));
        assert!(matches!(result, Err(ServerError::NotAuthorized(_))));
    }

    #[test]
    fn requests_need_a_session() {
        let db = HostedDatabase::new("travel", DatabasePolicy::open_guest()).unwrap();
        let result = handler(ServerConfig::default())
            .handle_changes(&db, ChangesRequest::new("bogus", 0, 10));
        assert!(matches!(result, Err(ServerError::AuthenticationFailed(_))));
    }

    #[test]
    fn push_respects_batch_limit() {
        let db = HostedDatabase::new("travel", DatabasePolicy::open_guest()).unwrap();
        let handler = handler(ServerConfig::default().with_max_batch(1));
        let session = handler
            .handle_handshake(&db, HandshakeRequest::new("client", "travel"))
            .unwrap()
            .session
            .unwrap();

        let one = PushRequest {
            session: session.clone(),
            revisions: vec![record_to_payload(&record("a"))],
        };
        assert_eq!(handler.handle_push(&db, one).unwrap().accepted, 1);

        let two = PushRequest {
            session,
            revisions: vec![record_to_payload(&record("b")), record_to_payload(&record("c"))],
        };
        assert!(matches!(
            handler.handle_push(&db, two),
            Err(ServerError::InvalidRequest(_))
        ));
        assert_eq!(db.info().doc_count, 1);
    }
}
