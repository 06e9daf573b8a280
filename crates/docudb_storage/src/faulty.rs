//! Fault-injecting backend wrapper.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared switchboard controlling a [`FaultyBackend`].
///
/// The plan is cloned out before the backend is handed to a database, so a
/// test can arm faults while the database is live.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    state: Arc<FaultState>,
}

#[derive(Debug, Default)]
struct FaultState {
    fail_appends: AtomicBool,
    torn_appends: AtomicBool,
    fail_syncs: AtomicBool,
    /// Appends still allowed before `fail_appends` is armed; 0 means unset.
    appends_until_failure: AtomicU64,
    injected: AtomicU64,
}

impl FaultPlan {
    /// Makes every append fail without writing anything.
    pub fn fail_appends(&self, enabled: bool) {
        self.state.fail_appends.store(enabled, Ordering::SeqCst);
    }

    /// Makes every append write half of its bytes and then fail.
    pub fn tear_appends(&self, enabled: bool) {
        self.state.torn_appends.store(enabled, Ordering::SeqCst);
    }

    /// Makes every sync fail.
    pub fn fail_syncs(&self, enabled: bool) {
        self.state.fail_syncs.store(enabled, Ordering::SeqCst);
    }

    /// Lets `count` more appends succeed, then fails all following ones.
    pub fn fail_after_appends(&self, count: u64) {
        self.state
            .appends_until_failure
            .store(count.saturating_add(1), Ordering::SeqCst);
    }

    /// Clears every armed fault.
    pub fn heal(&self) {
        self.fail_appends(false);
        self.tear_appends(false);
        self.fail_syncs(false);
        self.state.appends_until_failure.store(0, Ordering::SeqCst);
    }

    /// Returns how many operations have been failed so far.
    pub fn injected_count(&self) -> u64 {
        self.state.injected.load(Ordering::SeqCst)
    }

    fn append_should_fail(&self) -> bool {
        let countdown = &self.state.appends_until_failure;
        let remaining = countdown.load(Ordering::SeqCst);
        if remaining == 1 {
            self.state.fail_appends.store(true, Ordering::SeqCst);
            countdown.store(0, Ordering::SeqCst);
        } else if remaining > 1 {
            countdown.store(remaining - 1, Ordering::SeqCst);
        }
        self.state.fail_appends.load(Ordering::SeqCst)
    }

    fn record_injection(&self) {
        self.state.injected.fetch_add(1, Ordering::SeqCst);
    }
}

/// A backend that forwards to another one until told to fail.
///
/// Simulates a full disk, a failing device or a crash halfway through a
/// write, so callers can verify their error and atomicity handling.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    plan: FaultPlan,
}

impl FaultyBackend {
    /// Wraps `inner` and returns the backend with its control handle.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, FaultPlan) {
        let plan = FaultPlan::default();
        (
            Self {
                inner,
                plan: plan.clone(),
            },
            plan,
        )
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.plan.state.torn_appends.load(Ordering::SeqCst) {
            self.plan.record_injection();
            self.inner.append(&data[..data.len() / 2])?;
            return Err(StorageError::Injected("torn write"));
        }
        if self.plan.append_should_fail() {
            self.plan.record_injection();
            return Err(StorageError::Injected("no space left on device"));
        }
        self.inner.append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.plan.state.fail_syncs.load(Ordering::SeqCst) {
            self.plan.record_injection();
            return Err(StorageError::Injected("sync failed"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.plan.append_should_fail() {
            self.plan.record_injection();
            return Err(StorageError::Injected("no space left on device"));
        }
        self.inner.replace(data)
    }
}
