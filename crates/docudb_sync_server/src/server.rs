//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, HostedDatabase, RequestHandler};
use crate::provision::DatabasePolicy;
use docudb_core::Database;
use docudb_sync_engine::{HttpResponse, LoopbackServer, Method};
use docudb_sync_protocol::WireMessage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The sync server.
///
/// Hosts named databases and answers the replication protocol for each
/// of them. Requests arrive through [`LoopbackServer::handle`], so the
/// server can sit behind any HTTP front end or be called in-process.
///
/// | Method | Path | Body |
/// |---|---|---|
/// | `PUT` | `/{db}/` | JSON [`DatabasePolicy`] |
/// | `GET` | `/{db}/` | none; returns JSON info |
/// | `DELETE` | `/{db}/` | none |
/// | `POST` | `/{db}/_handshake`, `_changes`, `_revs_diff`, `_fetch`, `_push` | CBOR |
///
/// # Example
///
/// ```
/// use docudb_sync_engine::{LoopbackServer, Method};
/// use docudb_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let policy = br#"{"users":{"GUEST":{"disabled":false,"admin_channels":["*"]}}}"#;
/// assert_eq!(server.handle(Method::Put, "/travel/", policy).status, 201);
/// assert_eq!(server.handle(Method::Delete, "/travel/", b"").status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    databases: RwLock<HashMap<String, Arc<HostedDatabase>>>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        let context = Arc::new(HandlerContext::new(config));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            databases: RwLock::new(HashMap::new()),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Provisions a database.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a bad name and `DatabaseExists` if the
    /// name is taken.
    pub fn create_database(
        &self,
        name: &str,
        policy: DatabasePolicy,
    ) -> ServerResult<Arc<Database>> {
        validate_db_name(name)?;
        let mut databases = self.databases.write();
        if databases.contains_key(name) {
            return Err(ServerError::DatabaseExists(name.to_string()));
        }
        let hosted = Arc::new(HostedDatabase::new(name, policy)?);
        let database = Arc::clone(hosted.database());
        databases.insert(name.to_string(), hosted);
        info!(
            server = %self.context.config.server_id,
            database = %name,
            uuid = %database.uuid(),
            "database provisioned"
        );
        Ok(database)
    }

    /// Removes a database, ending its sessions.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDatabase` if it does not exist.
    pub fn delete_database(&self, name: &str) -> ServerResult<()> {
        let hosted = self
            .databases
            .write()
            .remove(name)
            .ok_or_else(|| ServerError::UnknownDatabase(name.to_string()))?;
        hosted.shut_down()?;
        info!(server = %self.context.config.server_id, database = %name, "database removed");
        Ok(())
    }

    /// The database provisioned under `name`.
    pub fn database(&self, name: &str) -> Option<Arc<Database>> {
        self.databases
            .read()
            .get(name)
            .map(|hosted| Arc::clone(hosted.database()))
    }

    /// Names of all provisioned databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Issues a token for `user` on `database`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if authentication is not configured.
    pub fn create_token(&self, user: &str, database: &str) -> ServerResult<String> {
        self.context
            .validator()
            .ok_or_else(|| ServerError::Internal("authentication is not configured".into()))?
            .create_token(user, database)
    }

    fn hosted(&self, name: &str) -> ServerResult<Arc<HostedDatabase>> {
        self.databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownDatabase(name.to_string()))
    }

    /// Routes one request.
    ///
    /// # Errors
    ///
    /// Returns the error to report; [`LoopbackServer::handle`] turns it
    /// into a response with the matching status.
    pub fn dispatch(&self, method: Method, path: &str, body: &[u8]) -> ServerResult<HttpResponse> {
        let path = path.split('?').next().unwrap_or_default();
        let trimmed = path.trim_start_matches('/');
        let (db, endpoint) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        if db.is_empty() {
            return Err(ServerError::NotFound(path.to_string()));
        }

        match (method, endpoint) {
            (Method::Put, "") => {
                let policy = DatabasePolicy::from_json(body)?;
                self.create_database(db, policy)?;
                Ok(HttpResponse::with_status(201, Vec::new()))
            }
            (Method::Delete, "") => {
                self.delete_database(db)?;
                Ok(HttpResponse::ok(Vec::new()))
            }
            (Method::Get, "") => {
                let info = self.hosted(db)?.info();
                let body = serde_json::to_vec(&info)
                    .map_err(|e| ServerError::Internal(e.to_string()))?;
                Ok(HttpResponse::ok(body))
            }
            (Method::Post, "_handshake") => {
                let hosted = self.hosted(db)?;
                rpc(body, |req| self.handler.handle_handshake(&hosted, req))
            }
            (Method::Post, "_changes") => {
                let hosted = self.hosted(db)?;
                rpc(body, |req| self.handler.handle_changes(&hosted, req))
            }
            (Method::Post, "_revs_diff") => {
                let hosted = self.hosted(db)?;
                rpc(body, |req| self.handler.handle_revs_diff(&hosted, req))
            }
            (Method::Post, "_fetch") => {
                let hosted = self.hosted(db)?;
                rpc(body, |req| self.handler.handle_fetch(&hosted, req))
            }
            (Method::Post, "_push") => {
                let hosted = self.hosted(db)?;
                rpc(body, |req| self.handler.handle_push(&hosted, req))
            }
            _ => Err(ServerError::NotFound(format!("{method} {path}"))),
        }
    }
}

impl LoopbackServer for SyncServer {
    fn handle(&self, method: Method, path: &str, body: &[u8]) -> HttpResponse {
        match self.dispatch(method, path, body) {
            Ok(response) => response,
            Err(e) => {
                if e.is_server_error() {
                    warn!(%method, path, error = %e, "request failed");
                } else {
                    debug!(%method, path, error = %e, "request rejected");
                }
                HttpResponse::error(e.status(), e.to_string())
            }
        }
    }
}

/// Decodes a CBOR request, runs `handle` and encodes its response.
fn rpc<Req, Res>(
    body: &[u8],
    handle: impl FnOnce(Req) -> ServerResult<Res>,
) -> ServerResult<HttpResponse>
where
    Req: WireMessage,
    Res: WireMessage,
{
    let request = Req::decode(body).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    let response = handle(request)?;
    let bytes = response
        .encode()
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(HttpResponse::ok(bytes))
}

/// Names start with a lowercase letter and use `[a-z0-9_$()+-]`.
fn validate_db_name(name: &str) -> ServerResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(ServerError::InvalidRequest(format!("invalid database name {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DatabaseInfo;
    use docudb_sync_protocol::{ChangesRequest, HandshakeRequest, HandshakeResponse};

    const GUEST_POLICY: &[u8] =
        br#"{"server":"walrus:","users":{"GUEST":{"disabled":false,"admin_channels":["*"]}},"unsupported":{"replicator_2":true}}"#;

    fn server() -> SyncServer {
        SyncServer::new(ServerConfig::default())
    }

    #[test]
    fn provisioning_lifecycle() {
        let server = server();
        assert_eq!(server.handle(Method::Put, "/travel/", GUEST_POLICY).status, 201);
        assert_eq!(server.handle(Method::Put, "/travel/", GUEST_POLICY).status, 412);
        assert_eq!(server.database_names(), vec!["travel"]);

        let info = server.handle(Method::Get, "/travel/", b"");
        assert!(info.is_success());
        let info: DatabaseInfo = serde_json::from_slice(&info.body).unwrap();
        assert_eq!(info.db_name, "travel");
        assert_eq!(info.doc_count, 0);
        assert!(info.guest_enabled);

        assert_eq!(server.handle(Method::Delete, "/travel/", b"").status, 200);
        assert_eq!(server.handle(Method::Delete, "/travel/", b"").status, 404);
        assert!(server.database("travel").is_none());
    }

    #[test]
    fn rejects_bad_names_and_routes() {
        let server = server();
        assert_eq!(server.handle(Method::Put, "/Travel/", GUEST_POLICY).status, 400);
        assert_eq!(server.handle(Method::Put, "/", GUEST_POLICY).status, 404);
        assert_eq!(server.handle(Method::Put, "/travel/", b"{oops").status, 400);
        server.create_database("travel", DatabasePolicy::open_guest()).unwrap();
        assert_eq!(server.handle(Method::Get, "/travel/_unknown", b"").status, 404);
        assert_eq!(server.handle(Method::Post, "/travel/_changes", b"junk").status, 400);
        assert_eq!(server.handle(Method::Post, "/beer/_handshake", b"").status, 404);
    }

    #[test]
    fn handshake_over_cbor() {
        let server = server();
        let db = server.create_database("travel", DatabasePolicy::open_guest()).unwrap();

        let request = HandshakeRequest::new("client", "travel").encode().unwrap();
        let response = server.handle(Method::Post, "/travel/_handshake", &request);
        assert!(response.is_success());
        let handshake = HandshakeResponse::decode(&response.body).unwrap();
        assert_eq!(handshake.peer_uuid, db.uuid());

        let changes = ChangesRequest::new("not-a-session", 0, 10).encode().unwrap();
        let response = server.handle(Method::Post, "/travel/_changes?style=all_docs", &changes);
        assert_eq!(response.status, 401);
        assert!(response.error_message().contains("unknown session"));
    }

    #[test]
    fn delete_ends_sessions() {
        let server = server();
        server.create_database("travel", DatabasePolicy::open_guest()).unwrap();
        let request = HandshakeRequest::new("client", "travel").encode().unwrap();
        let response = server.handle(Method::Post, "/travel/_handshake", &request);
        let session = HandshakeResponse::decode(&response.body).unwrap().session.unwrap();

        server.delete_database("travel").unwrap();
        let changes = ChangesRequest::new(session, 0, 10).encode().unwrap();
        assert_eq!(server.handle(Method::Post, "/travel/_changes", &changes).status, 404);
    }

    #[test]
    fn tokens_need_auth_config() {
        assert!(server().create_token("pupshaw", "travel").is_err());
        let server = SyncServer::new(ServerConfig::default().with_auth(b"secret".to_vec()));
        assert!(server.create_token("pupshaw", "travel").is_ok());
    }
}
