//! Configuration for replicators.

use crate::http::HttpClient;
use crate::peer::ReplicationPeer;
use docudb_core::Database;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Direction of replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicatorType {
    /// Local changes are sent to the peer.
    Push,
    /// Peer changes are brought into the local database.
    Pull,
    /// Both directions, independently.
    #[default]
    PushAndPull,
}

impl ReplicatorType {
    /// Returns true if local changes are pushed.
    pub fn pushes(self) -> bool {
        matches!(self, Self::Push | Self::PushAndPull)
    }

    /// Returns true if peer changes are pulled.
    pub fn pulls(self) -> bool {
        matches!(self, Self::Pull | Self::PushAndPull)
    }
}

/// The other side of a replication.
#[derive(Clone)]
pub enum Endpoint {
    /// Another database in this process.
    Database(Arc<Database>),
    /// A sync server database, e.g. `http://host:4984/travel`.
    Remote {
        /// Base URL of the remote database.
        url: String,
        /// Client used for requests.
        client: Arc<dyn HttpClient>,
    },
    /// Any other peer implementation.
    Peer(Arc<dyn ReplicationPeer>),
}

impl Endpoint {
    /// Creates a remote endpoint.
    pub fn remote(url: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        Self::Remote {
            url: url.into(),
            client,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(db) => f.debug_tuple("Database").field(&db.name()).finish(),
            Self::Remote { url, .. } => f.debug_struct("Remote").field("url", url).finish(),
            Self::Peer(_) => f.write_str("Peer"),
        }
    }
}

/// Configuration for one replicator.
#[derive(Debug, Clone)]
pub struct ReplicatorConfiguration {
    /// The local database.
    pub database: Arc<Database>,
    /// Where to replicate to/from.
    pub endpoint: Endpoint,
    /// Direction.
    pub replicator_type: ReplicatorType,
    /// Keep running after catching up.
    pub continuous: bool,
    /// Backoff used by continuous replicators after network errors.
    pub retry: RetryConfig,
    /// Maximum revisions per request.
    pub batch_size: u32,
    /// How often a continuous replicator checks a peer that cannot notify.
    pub poll_interval: Duration,
    /// Token sent with the handshake.
    pub auth_token: Option<String>,
}

impl ReplicatorConfiguration {
    /// Creates a one-shot push-and-pull configuration.
    pub fn new(database: Arc<Database>, endpoint: Endpoint) -> Self {
        Self {
            database,
            endpoint,
            replicator_type: ReplicatorType::PushAndPull,
            continuous: false,
            retry: RetryConfig::default(),
            batch_size: 100,
            poll_interval: Duration::from_millis(250),
            auth_token: None,
        }
    }

    /// Sets the direction.
    pub fn with_type(mut self, replicator_type: ReplicatorType) -> Self {
        self.replicator_type = replicator_type;
        self
    }

    /// Sets continuous mode.
    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the batch size. Zero is raised to one.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the auth token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum consecutive failed attempts before giving up; 0 retries forever.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Returns true once `failures` consecutive failures exhaust the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts != 0 && failures >= self.max_attempts
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% extra.
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
