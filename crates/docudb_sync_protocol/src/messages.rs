//! Protocol messages for replication.

use crate::error::{ProtocolError, ProtocolResult};
use crate::revision::{ChangeEntry, RevisionPayload, RevisionRef};
use crate::PROTOCOL_VERSION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// CBOR encoding shared by every message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)?;
        Ok(bytes)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if the bytes are not this message.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(ciborium::from_reader(bytes)?)
    }
}

/// A sync protocol message.
#[derive(Debug, Clone)]
pub enum SyncMessage {
    /// Handshake request.
    HandshakeRequest(HandshakeRequest),
    /// Handshake response.
    HandshakeResponse(HandshakeResponse),
    /// Changes request.
    ChangesRequest(ChangesRequest),
    /// Changes response.
    ChangesResponse(ChangesResponse),
    /// Revs-diff request.
    RevsDiffRequest(RevsDiffRequest),
    /// Revs-diff response.
    RevsDiffResponse(RevsDiffResponse),
    /// Fetch request.
    FetchRequest(FetchRequest),
    /// Fetch response.
    FetchResponse(FetchResponse),
    /// Push request.
    PushRequest(PushRequest),
    /// Push response.
    PushResponse(PushResponse),
    /// Error reply.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::HandshakeRequest(_) => 1,
            SyncMessage::HandshakeResponse(_) => 2,
            SyncMessage::ChangesRequest(_) => 3,
            SyncMessage::ChangesResponse(_) => 4,
            SyncMessage::RevsDiffRequest(_) => 5,
            SyncMessage::RevsDiffResponse(_) => 6,
            SyncMessage::FetchRequest(_) => 7,
            SyncMessage::FetchResponse(_) => 8,
            SyncMessage::PushRequest(_) => 9,
            SyncMessage::PushResponse(_) => 10,
            SyncMessage::Error(_) => 255,
        }
    }

    /// Route segment the message is sent to, for requests.
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            SyncMessage::HandshakeRequest(_) => Some("_handshake"),
            SyncMessage::ChangesRequest(_) => Some("_changes"),
            SyncMessage::RevsDiffRequest(_) => Some("_revs_diff"),
            SyncMessage::FetchRequest(_) => Some("_fetch"),
            SyncMessage::PushRequest(_) => Some("_push"),
            _ => None,
        }
    }
}

/// Opens a replication session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Protocol version spoken by the client.
    pub protocol_version: u16,
    /// UUID of the client's local database.
    pub client_id: String,
    /// Name of the database on the receiving side.
    pub database: String,
    /// Bearer token, required when guest access is disabled.
    pub auth_token: Option<String>,
}

impl HandshakeRequest {
    /// Creates a handshake request at the current protocol version.
    pub fn new(client_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            client_id: client_id.into(),
            database: database.into(),
            auth_token: None,
        }
    }

    /// Attaches an auth token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Fails unless the request speaks our protocol version.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::VersionMismatch`].
    pub fn check_version(&self) -> ProtocolResult<()> {
        if self.protocol_version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote: self.protocol_version,
            })
        }
    }
}

impl WireMessage for HandshakeRequest {}

/// Handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Whether handshake succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Protocol version of the responder.
    pub protocol_version: u16,
    /// UUID of the responder's database.
    pub peer_uuid: String,
    /// Session id to quote in every later request.
    pub session: Option<String>,
    /// Largest batch the responder accepts in one request, if limited.
    #[serde(default)]
    pub max_batch: Option<u32>,
}

impl HandshakeResponse {
    /// Creates a successful handshake response.
    pub fn success(peer_uuid: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            protocol_version: PROTOCOL_VERSION,
            peer_uuid: peer_uuid.into(),
            session: Some(session.into()),
            max_batch: None,
        }
    }

    /// Advertises the largest batch the responder accepts.
    pub fn with_max_batch(mut self, max_batch: u32) -> Self {
        self.max_batch = Some(max_batch);
        self
    }

    /// Creates a failed handshake response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            protocol_version: PROTOCOL_VERSION,
            peer_uuid: String::new(),
            session: None,
            max_batch: None,
        }
    }
}

impl WireMessage for HandshakeResponse {}

/// Asks for the responder's changes after a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesRequest {
    /// Session id from the handshake.
    pub session: String,
    /// Return changes with a sequence greater than this.
    pub since: u64,
    /// Maximum number of entries.
    pub limit: u32,
}

impl ChangesRequest {
    /// Creates a changes request.
    pub fn new(session: impl Into<String>, since: u64, limit: u32) -> Self {
        Self {
            session: session.into(),
            since,
            limit,
        }
    }
}

impl WireMessage for ChangesRequest {}

/// Changes reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// Latest revision of every document changed in the range, in sequence order.
    pub changes: Vec<ChangeEntry>,
    /// Sequence to resume from.
    pub last_sequence: u64,
    /// Whether more changes are waiting.
    pub has_more: bool,
}

impl ChangesResponse {
    /// Creates a changes response; `last_sequence` is taken from the
    /// final entry, or `since` when there is none.
    pub fn new(changes: Vec<ChangeEntry>, since: u64, has_more: bool) -> Self {
        let last_sequence = changes.last().map_or(since, |c| c.sequence);
        Self {
            changes,
            last_sequence,
            has_more,
        }
    }
}

impl WireMessage for ChangesResponse {}

/// Offers revisions; the reply lists those the responder lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevsDiffRequest {
    /// Session id from the handshake.
    pub session: String,
    /// Revisions on offer.
    pub revisions: Vec<RevisionRef>,
}

impl WireMessage for RevsDiffRequest {}

/// Revs-diff reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevsDiffResponse {
    /// Offered revisions the responder does not know.
    pub missing: Vec<RevisionRef>,
}

impl WireMessage for RevsDiffResponse {}

/// Requests full payloads of the responder's current revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Session id from the handshake.
    pub session: String,
    /// Documents to fetch.
    pub doc_ids: Vec<String>,
}

impl WireMessage for FetchRequest {}

/// Fetch reply. Unknown ids are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Current revision of every known requested document.
    pub revisions: Vec<RevisionPayload>,
}

impl WireMessage for FetchResponse {}

/// Ships revisions to the responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Session id from the handshake.
    pub session: String,
    /// Revisions to apply.
    pub revisions: Vec<RevisionPayload>,
}

impl WireMessage for PushRequest {}

/// Why one pushed revision was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Document id.
    pub doc_id: String,
    /// Revision id.
    pub rev: String,
    /// Reason.
    pub reason: String,
}

/// Push reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PushResponse {
    /// Number of revisions applied or already known.
    pub accepted: u32,
    /// Revisions that could not be applied.
    pub rejected: Vec<Rejection>,
}

impl PushResponse {
    /// True if every revision was accepted.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl WireMessage for PushResponse {}

/// Body of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Error message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl WireMessage for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_roundtrip() {
        let request = HandshakeRequest::new("client-uuid", "db").with_token("tok");
        let decoded = HandshakeRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
        assert!(decoded.check_version().is_ok());
    }

    #[test]
    fn version_mismatch_is_detected() {
        let mut request = HandshakeRequest::new("c", "db");
        request.protocol_version = 99;
        assert!(matches!(
            request.check_version(),
            Err(ProtocolError::VersionMismatch { remote: 99, .. })
        ));
    }

    #[test]
    fn handshake_response_error() {
        let response = HandshakeResponse::error("unauthorized");
        let decoded = HandshakeResponse::decode(&response.encode().unwrap()).unwrap();
        assert!(!decoded.success);
        assert_eq!(decoded.error.as_deref(), Some("unauthorized"));
        assert!(decoded.session.is_none());
    }

    #[test]
    fn handshake_response_without_batch_limit_decodes() {
        #[derive(Serialize)]
        struct Unlimited {
            success: bool,
            error: Option<String>,
            protocol_version: u16,
            peer_uuid: String,
            session: Option<String>,
        }
        let unlimited = Unlimited {
            success: true,
            error: None,
            protocol_version: PROTOCOL_VERSION,
            peer_uuid: "server".into(),
            session: Some("s1".into()),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&unlimited, &mut bytes).unwrap();
        let decoded = HandshakeResponse::decode(&bytes).unwrap();
        assert_eq!(decoded, HandshakeResponse::success("server", "s1"));
        assert_eq!(decoded.max_batch, None);

        let limited = HandshakeResponse::success("server", "s1").with_max_batch(5);
        let decoded = HandshakeResponse::decode(&limited.encode().unwrap()).unwrap();
        assert_eq!(decoded.max_batch, Some(5));
    }

    #[test]
    fn changes_response_tracks_last_sequence() {
        let empty = ChangesResponse::new(Vec::new(), 7, false);
        assert_eq!(empty.last_sequence, 7);

        let entries = vec![
            ChangeEntry {
                sequence: 9,
                doc_id: "a".into(),
                rev: "1-aa".into(),
                deleted: false,
            },
            ChangeEntry {
                sequence: 12,
                doc_id: "b".into(),
                rev: "3-bb".into(),
                deleted: true,
            },
        ];
        let response = ChangesResponse::new(entries, 7, true);
        let decoded = ChangesResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded.last_sequence, 12);
        assert!(decoded.has_more);
        assert_eq!(decoded, response);
    }

    #[test]
    fn push_request_carries_bodies() {
        let request = PushRequest {
            session: "s".into(),
            revisions: vec![RevisionPayload {
                doc_id: "a".into(),
                rev: "1-aa".into(),
                history: vec!["1-aa".into()],
                deleted: false,
                body: vec![1, 2, 3],
            }],
        };
        let decoded = PushRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded.revisions[0].body, [1, 2, 3]);
    }

    #[test]
    fn decoding_wrong_message_fails() {
        let bytes = RevsDiffResponse {
            missing: vec![RevisionRef::new("a", "1-aa")],
        }
        .encode()
        .unwrap();
        assert!(matches!(
            HandshakeRequest::decode(&bytes),
            Err(ProtocolError::Decode(_))
        ));
        assert!(HandshakeRequest::decode(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn endpoints_and_type_codes() {
        let message = SyncMessage::PushRequest(PushRequest {
            session: String::new(),
            revisions: Vec::new(),
        });
        assert_eq!(message.type_code(), 9);
        assert_eq!(message.endpoint(), Some("_push"));
        let reply = SyncMessage::PushResponse(PushResponse::default());
        assert_eq!(reply.endpoint(), None);
    }
}
