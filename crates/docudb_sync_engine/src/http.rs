//! HTTP transport implementation.
//!
//! This module provides a [`ReplicationPeer`] that talks to a sync server
//! over HTTP. The actual HTTP client is abstracted via a trait to allow
//! different implementations (reqwest, hyper, ureq, or the in-process
//! [`LoopbackClient`]).
//!
//! Bodies are CBOR-encoded protocol messages. Every replication request is
//! a `POST` to `{database_url}/_handshake`, `/_changes`, `/_revs_diff`,
//! `/_fetch` or `/_push`. Failed requests carry an
//! [`ErrorResponse`] body.

use crate::error::{SyncError, SyncResult};
use crate::peer::ReplicationPeer;
use docudb_sync_protocol::{
    ChangesRequest, ChangesResponse, ErrorResponse, FetchRequest, FetchResponse,
    HandshakeRequest, HandshakeResponse, PushRequest, PushResponse, RevsDiffRequest,
    RevsDiffResponse, WireMessage,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A `200 OK` response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// A response with an arbitrary status.
    pub fn with_status(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// A failed response carrying an encoded [`ErrorResponse`].
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = ErrorResponse::new(status, message)
            .encode()
            .unwrap_or_default();
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error message carried by a failed response.
    pub fn error_message(&self) -> String {
        ErrorResponse::decode(&self.body)
            .map(|e| e.message)
            .unwrap_or_else(|_| format!("HTTP {}", self.status))
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a request. `Err` means no response was received.
    fn send(&self, method: Method, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Sends a POST request.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        self.send(Method::Post, url, body)
    }

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (the URL without scheme and host).
    fn handle(&self, method: Method, path: &str, body: &[u8]) -> HttpResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle(&self, method: Method, path: &str, body: &[u8]) -> HttpResponse {
        (**self).handle(method, path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead. Taking the client
/// offline makes every request fail as if the network were down.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    online: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            online: AtomicBool::new(true),
        }
    }

    /// Simulates losing or regaining the network.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// The wrapped server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn send(&self, method: Method, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        if !self.is_healthy() {
            return Err(format!("{method} {url}: network unreachable"));
        }
        Ok(self.server.handle(method, url_path(url), &body))
    }

    fn is_healthy(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Strips scheme and host: `http://h:1/db/_push` becomes `/db/_push`.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            rest.find('/').map_or("/", |j| &rest[j..])
        }
        None => url,
    }
}

/// A peer reached through an [`HttpClient`].
pub struct RemotePeer {
    /// Database URL (e.g., "http://sync.example.com:4984/travel").
    base_url: String,
    client: Arc<dyn HttpClient>,
    closed: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl RemotePeer {
    /// Creates a peer for the database at `base_url`.
    pub fn new(base_url: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            closed: AtomicBool::new(false),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn post_cbor<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }

        let body = request.encode()?;
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.client.post(&url, body).map_err(|e| {
            warn!(url = %url, error = %e, "request failed");
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;

        if !response.is_success() {
            let message = response.error_message();
            debug!(url = %url, status = response.status, message = %message, "request rejected");
            *self.last_error.write() = Some(message.clone());
            return Err(status_error(response.status, message));
        }

        *self.last_error.write() = None;
        Ok(Res::decode(&response.body)?)
    }
}

/// Maps a failed status to the matching error.
fn status_error(status: u16, message: String) -> SyncError {
    match status {
        401 | 403 => SyncError::AuthenticationFailed(message),
        400..=499 => SyncError::Protocol(format!("HTTP {status}: {message}")),
        _ => SyncError::ServerError(format!("HTTP {status}: {message}")),
    }
}

impl ReplicationPeer for RemotePeer {
    fn handshake(&self, request: &HandshakeRequest) -> SyncResult<HandshakeResponse> {
        let response: HandshakeResponse = self.post_cbor("_handshake", request)?;
        if !response.success {
            let message = response.error.unwrap_or_else(|| "handshake refused".into());
            return Err(SyncError::AuthenticationFailed(message));
        }
        Ok(response)
    }

    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse> {
        self.post_cbor("_changes", request)
    }

    fn revs_diff(&self, request: &RevsDiffRequest) -> SyncResult<RevsDiffResponse> {
        self.post_cbor("_revs_diff", request)
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        self.post_cbor("_fetch", request)
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.post_cbor("_push", request)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::LocalPeer;
    use docudb_core::{Database, Document};
    use parking_lot::Mutex;

    /// Serves one database at `/db/...`.
    struct TestServer {
        peer: LocalPeer,
        paths: Mutex<Vec<String>>,
    }

    impl TestServer {
        fn new() -> Self {
            let db = Arc::new(Database::open_in_memory("served").unwrap());
            let doc = Document::with_id("a");
            doc.set("n", 1);
            db.save(&doc).unwrap();
            Self {
                peer: LocalPeer::new(db),
                paths: Mutex::new(Vec::new()),
            }
        }

        fn dispatch(&self, path: &str, body: &[u8]) -> SyncResult<Vec<u8>> {
            Ok(match path {
                "/db/_handshake" => self.peer.handshake(&HandshakeRequest::decode(body)?)?.encode()?,
                "/db/_changes" => self.peer.changes(&ChangesRequest::decode(body)?)?.encode()?,
                _ => return Err(SyncError::Protocol(format!("no route {path}"))),
            })
        }
    }

    impl LoopbackServer for TestServer {
        fn handle(&self, method: Method, path: &str, body: &[u8]) -> HttpResponse {
            self.paths.lock().push(format!("{method} {path}"));
            match self.dispatch(path, body) {
                Ok(body) => HttpResponse::ok(body),
                Err(SyncError::AuthenticationFailed(m)) => HttpResponse::error(401, m),
                Err(e) => HttpResponse::error(404, e.to_string()),
            }
        }
    }

    struct FixedStatus(u16);

    impl LoopbackServer for FixedStatus {
        fn handle(&self, _method: Method, _path: &str, _body: &[u8]) -> HttpResponse {
            HttpResponse::error(self.0, "nope")
        }
    }

    fn remote<S: LoopbackServer + 'static>(server: S) -> (RemotePeer, Arc<LoopbackClient<S>>) {
        let client = Arc::new(LoopbackClient::new(server));
        let peer = RemotePeer::new("http://localhost:4984/db/", client.clone());
        (peer, client)
    }

    #[test]
    fn url_paths() {
        assert_eq!(url_path("http://host:4984/db/_push"), "/db/_push");
        assert_eq!(url_path("https://host"), "/");
        assert_eq!(url_path("/db/_changes"), "/db/_changes");
    }

    #[test]
    fn remote_round_trip() {
        let server = Arc::new(TestServer::new());
        let (peer, _client) = remote(server.clone());
        assert_eq!(peer.base_url(), "http://localhost:4984/db");

        let hs = peer
            .handshake(&HandshakeRequest::new("client", "local"))
            .unwrap();
        let changes = peer
            .changes(&ChangesRequest::new(hs.session.unwrap(), 0, 10))
            .unwrap();
        assert_eq!(changes.changes.len(), 1);
        assert_eq!(changes.changes[0].doc_id, "a");
        assert_eq!(
            *server.paths.lock(),
            vec!["POST /db/_handshake", "POST /db/_changes"]
        );
        assert!(peer.last_error().is_none());
    }

    #[test]
    fn offline_client_gives_retryable_error() {
        let (peer, client) = remote(TestServer::new());
        client.set_online(false);
        assert!(!peer.is_connected());

        let err = peer
            .handshake(&HandshakeRequest::new("client", "local"))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(peer.last_error().is_some());

        client.set_online(true);
        assert!(peer
            .handshake(&HandshakeRequest::new("client", "local"))
            .is_ok());
    }

    #[test]
    fn status_mapping() {
        let request = HandshakeRequest::new("client", "local");

        let (peer, _) = remote(FixedStatus(401));
        let err = peer.handshake(&request).unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(ref m) if m == "nope"));

        let (peer, _) = remote(FixedStatus(404));
        let err = peer.handshake(&request).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(!err.is_retryable());

        let (peer, _) = remote(FixedStatus(503));
        let err = peer.handshake(&request).unwrap_err();
        assert!(matches!(err, SyncError::ServerError(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn unknown_session_is_an_auth_failure() {
        let (peer, _) = remote(TestServer::new());
        let err = peer
            .changes(&ChangesRequest::new("stale", 0, 10))
            .unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
    }

    #[test]
    fn closed_peer() {
        let (peer, _) = remote(TestServer::new());
        peer.close().unwrap();
        assert!(!peer.is_connected());
        assert!(matches!(
            peer.handshake(&HandshakeRequest::new("client", "local")),
            Err(SyncError::NotConnected)
        ));
    }
}
