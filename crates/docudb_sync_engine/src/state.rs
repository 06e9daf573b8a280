//! Replicator activity state machine.
//!
//! ```text
//!            start                 connected(pending)
//! Stopped ---------> Connecting -----------------------> Busy <--+
//!    ^                  ^   |     connected(caught up)    |  ^    | work queued
//!    |                  |   +-------------------------> Idle ----+
//!    | stop        retry|                                 |
//!    +-- (any) ------ Offline <------- network lost ------+
//! ```
//!
//! Every transition goes through [`ActivityLevel::on`], so the legal set is
//! listed in one place.

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::sync::Arc;

/// A replicator's current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityLevel {
    /// Not running. Initial and terminal state.
    Stopped,
    /// Waiting to retry after losing the peer.
    Offline,
    /// Performing the handshake.
    Connecting,
    /// Caught up; continuous replicators wait for changes here.
    Idle,
    /// Transferring revisions.
    Busy,
}

impl ActivityLevel {
    /// Returns true for every state except `Stopped`.
    pub fn is_running(self) -> bool {
        self != Self::Stopped
    }

    /// Applies `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] for an event that is not
    /// legal in the current state.
    pub fn on(self, event: ActivityEvent) -> SyncResult<ActivityLevel> {
        use ActivityEvent as E;
        use ActivityLevel as S;

        let next = match (self, event) {
            (S::Stopped, E::Start) => S::Connecting,
            (S::Connecting, E::Connected { pending: true }) => S::Busy,
            (S::Connecting, E::Connected { pending: false }) => S::Idle,
            (S::Idle | S::Busy, E::WorkQueued) => S::Busy,
            (S::Idle | S::Busy, E::CaughtUp) => S::Idle,
            (S::Connecting | S::Idle | S::Busy, E::NetworkLost) => S::Offline,
            (S::Offline, E::Retry) => S::Connecting,
            (_, E::Stop) => S::Stopped,
            (from, event) => {
                return Err(SyncError::InvalidStateTransition {
                    from: from.to_string(),
                    to: event.to_string(),
                })
            }
        };
        Ok(next)
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// Inputs to the activity state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// `start()` was called.
    Start,
    /// Handshake succeeded; `pending` if work is already known.
    Connected {
        /// Whether there is work to do.
        pending: bool,
    },
    /// New revisions were discovered.
    WorkQueued,
    /// Everything discovered has been transferred.
    CaughtUp,
    /// The peer became unreachable.
    NetworkLost,
    /// Backoff elapsed.
    Retry,
    /// Stop requested or the session ended.
    Stop,
}

impl fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Connected { pending } => write!(f, "connected(pending={pending})"),
            Self::WorkQueued => f.write_str("work-queued"),
            Self::CaughtUp => f.write_str("caught-up"),
            Self::NetworkLost => f.write_str("network-lost"),
            Self::Retry => f.write_str("retry"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// Revisions discovered and transferred during one run.
///
/// Both counters only grow while a replicator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Revisions handled so far.
    pub completed: u64,
    /// Revisions discovered so far.
    pub total: u64,
}

impl Progress {
    /// Returns true if everything discovered has been handled.
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Snapshot delivered to replicator listeners.
#[derive(Debug, Clone)]
pub struct ReplicatorStatus {
    /// Current activity.
    pub activity: ActivityLevel,
    /// Progress of the current run.
    pub progress: Progress,
    /// Most recent error, cleared by the next successful handshake.
    pub error: Option<Arc<SyncError>>,
}

impl ReplicatorStatus {
    pub(crate) fn stopped() -> Self {
        Self {
            activity: ActivityLevel::Stopped,
            progress: Progress::default(),
            error: None,
        }
    }
}
