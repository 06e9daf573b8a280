//! Database provisioning policies.
//!
//! `PUT /{db}/` carries a JSON policy in the same shape sync gateways use:
//!
//! ```json
//! {
//!   "server": "walrus:",
//!   "users": { "GUEST": { "disabled": false, "admin_channels": ["*"] } },
//!   "unsupported": { "replicator_2": true }
//! }
//! ```
//!
//! Channels are recorded but not enforced. Unknown `unsupported` flags
//! are kept as-is.

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the anonymous user.
pub const GUEST: &str = "GUEST";

/// Storage the policy asks for. Only in-memory storage is served.
pub const IN_MEMORY_SERVER: &str = "walrus:";

/// Access settings for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPolicy {
    /// Disabled users cannot open sessions.
    pub disabled: bool,
    /// Channels the user may read.
    pub admin_channels: Vec<String>,
    /// Password; unused by token auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Policy a database is provisioned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasePolicy {
    /// Backing store URL.
    pub server: String,
    /// Users keyed by name; [`GUEST`] is the anonymous user.
    pub users: BTreeMap<String, UserPolicy>,
    /// Feature flags passed through untouched.
    pub unsupported: BTreeMap<String, serde_json::Value>,
}

impl Default for DatabasePolicy {
    fn default() -> Self {
        Self {
            server: IN_MEMORY_SERVER.to_string(),
            users: BTreeMap::new(),
            unsupported: BTreeMap::new(),
        }
    }
}

impl DatabasePolicy {
    /// A policy with the guest user enabled on every channel.
    pub fn open_guest() -> Self {
        let mut policy = Self::default();
        policy.users.insert(
            GUEST.to_string(),
            UserPolicy {
                disabled: false,
                admin_channels: vec!["*".to_string()],
                password: None,
            },
        );
        policy
    }

    /// Parses a policy body. An empty body yields the default policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for malformed JSON or an unsupported
    /// `server`.
    pub fn from_json(body: &[u8]) -> ServerResult<Self> {
        let policy: Self = if body.iter().all(u8::is_ascii_whitespace) {
            Self::default()
        } else {
            serde_json::from_slice(body)
                .map_err(|e| ServerError::InvalidRequest(format!("invalid policy: {e}")))?
        };
        if policy.server != IN_MEMORY_SERVER {
            return Err(ServerError::InvalidRequest(format!(
                "unsupported server {:?}",
                policy.server
            )));
        }
        Ok(policy)
    }

    /// Returns true if anonymous sessions are allowed.
    pub fn guest_enabled(&self) -> bool {
        self.users.get(GUEST).is_some_and(|guest| !guest.disabled)
    }

    /// Returns true if `user` exists and is enabled.
    pub fn user_enabled(&self, user: &str) -> bool {
        self.users.get(user).is_some_and(|u| !u.disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_guest_policy() {
        let body = br#"{"server":"walrus:","users":{"GUEST":{"disabled":false,"admin_channels":["*"]}},"unsupported":{"replicator_2":true}}"#;
        let policy = DatabasePolicy::from_json(body).unwrap();
        assert!(policy.guest_enabled());
        assert_eq!(policy.users[GUEST].admin_channels, vec!["*"]);
        assert_eq!(policy.unsupported["replicator_2"], serde_json::Value::Bool(true));

        let mut expected = DatabasePolicy::open_guest();
        expected
            .unsupported
            .insert("replicator_2".into(), serde_json::Value::Bool(true));
        assert_eq!(policy, expected);
    }

    #[test]
    fn empty_body_is_default_policy() {
        let policy = DatabasePolicy::from_json(b"").unwrap();
        assert_eq!(policy, DatabasePolicy::default());
        assert!(!policy.guest_enabled());
    }

    #[test]
    fn disabled_guest() {
        let body = br#"{"users":{"GUEST":{"disabled":true},"pupshaw":{"password":"frank"}}}"#;
        let policy = DatabasePolicy::from_json(body).unwrap();
        assert!(!policy.guest_enabled());
        assert!(policy.user_enabled("pupshaw"));
        assert!(!policy.user_enabled("nobody"));
    }

    #[test]
    fn rejects_bad_policies() {
        assert!(DatabasePolicy::from_json(b"{not json").is_err());
        assert!(DatabasePolicy::from_json(br#"{"server":"memcached://x"}"#).is_err());
    }
}
