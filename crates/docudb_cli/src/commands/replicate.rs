//! Replicate command implementation.

use super::{CliError, CliResult};
use clap::ValueEnum;
use docudb_core::Database;
use docudb_sync_engine::{
    ActivityLevel, Endpoint, Replicator, ReplicatorConfiguration, ReplicatorStatus,
    ReplicatorType,
};
use std::io::Write;
use std::sync::{mpsc, Arc};
use tracing::debug;

/// Which way documents flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    /// Local to target.
    Push,
    /// Target to local.
    Pull,
    /// Both ways.
    Both,
}

impl From<Direction> for ReplicatorType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Push => ReplicatorType::Push,
            Direction::Pull => ReplicatorType::Pull,
            Direction::Both => ReplicatorType::PushAndPull,
        }
    }
}

/// Runs a one-shot replication and blocks until it stops.
pub fn run(
    local: Database,
    target: Database,
    direction: Direction,
    out: &mut impl Write,
) -> CliResult<()> {
    let local = Arc::new(local);
    let target = Arc::new(target);
    let endpoint = Endpoint::Database(Arc::clone(&target));
    let config =
        ReplicatorConfiguration::new(Arc::clone(&local), endpoint).with_type(direction.into());
    let replicator = Replicator::new(config)?;

    let (tx, rx) = mpsc::channel::<ReplicatorStatus>();
    replicator.add_change_listener(move |status| {
        let _ = tx.send(status.clone());
    });
    replicator.start()?;

    let mut last = None;
    for status in rx.iter() {
        debug!(
            activity = %status.activity,
            completed = status.progress.completed,
            total = status.progress.total,
            "replicator status"
        );
        let stopped = status.activity == ActivityLevel::Stopped;
        last = Some(status);
        if stopped {
            break;
        }
    }

    if let Some(error) = last.as_ref().and_then(|s| s.error.as_deref()) {
        return Err(CliError::Stopped(error.to_string()));
    }
    let progress = last.map(|s| s.progress).unwrap_or_default();
    writeln!(
        out,
        "Replicated {} of {} revisions; {} now holds {} documents, {} holds {}",
        progress.completed,
        progress.total,
        local.name(),
        local.count(),
        target.name(),
        target.count()
    )?;
    Ok(())
}
