// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync run orchestration.
//!
//! Thin sequencing layer over the core components. A full run converges the
//! mirror with the remote first, then computes and applies the index delta,
//! then stages, commits, and pushes the result. Runs are single-threaded and
//! synchronous end to end; callers must serialize runs against the same
//! mirror root.

use crate::{
    config::SyncConfig,
    index::{Delta, Indexer, INDEX_FILE_NAME},
    reconcile::Reconciler,
    repo::{CommitOutcome, Git2Source, Mirror},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{instrument, warn};

/// User-visible result of one full sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Mirror changed: this many blobs were synced in and removed.
    Changed { synced: usize, removed: usize },

    /// Watched set matches the mirror exactly.
    NoChanges,
}

impl Display for SyncOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Changed { synced, removed } => {
                write!(fmt, "synced {synced}, removed {removed} files")
            }
            Self::NoChanges => write!(fmt, "no changes"),
        }
    }
}

/// Run one full local-to-remote sync.
///
/// Sequence: open or clone the mirror, converge with the remote, build the
/// index, reconcile the mirror directory, stage removals and additions,
/// commit, push. Convergence happens before reconciliation so the delta is
/// computed against the remote's view of the mirror.
///
/// # Errors
///
/// Any fatal failure from the underlying components aborts the run: the
/// mirror is never committed or pushed on top of an unconverged update or an
/// unwritten index file.
#[instrument(skip(config), level = "debug")]
pub fn run(config: &SyncConfig) -> Result<SyncOutcome> {
    let mirror_root = config.mirror_root()?;
    let mirror = Mirror::open_or_clone(&config.git, &mirror_root, &Git2Source)?;
    mirror.try_update()?;

    let index = Indexer::new(&mirror_root).build(&config.files)?;
    let changes = Reconciler::new(&mirror_root).reconcile(&index)?;

    if changes.is_empty() {
        return Ok(SyncOutcome::NoChanges);
    }

    mirror.remove(&changes.removed)?;
    let mut staged = changes.added.clone();
    staged.push(INDEX_FILE_NAME.to_string());
    mirror.add(&staged)?;

    let outcome = SyncOutcome::Changed {
        synced: changes.added.len(),
        removed: changes.removed.len(),
    };
    match mirror.commit(&outcome.to_string())? {
        CommitOutcome::Committed(_) => mirror.push()?,
        CommitOutcome::NothingToCommit => {
            warn!("mirror directory changed but nothing was staged")
        }
    }

    Ok(outcome)
}

/// Report what a sync run would change, without touching the mirror or git.
///
/// # Errors
///
/// - Return [`SyncError::Index`] if the persisted index file exists but
///   cannot be read.
pub fn status(config: &SyncConfig) -> Result<Delta> {
    let mirror_root = config.mirror_root()?;
    let index = Indexer::new(&mirror_root).build(&config.files)?;

    Ok(index.delta())
}

/// Converge the mirror with the remote without syncing local files.
///
/// Diverged local mirror state is discarded per the update policy.
#[instrument(skip(config), level = "debug")]
pub fn pull(config: &SyncConfig) -> Result<()> {
    let mirror_root = config.mirror_root()?;
    let mirror = Mirror::open_or_clone(&config.git, &mirror_root, &Git2Source)?;
    mirror.try_update()?;

    Ok(())
}

/// Sync run error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Mirror root cannot be resolved.
    #[error(transparent)]
    NoWayHome(#[from] crate::path::NoWayHome),

    /// Index build failed.
    #[error(transparent)]
    Index(#[from] crate::index::IndexError),

    /// Mirror reconciliation failed.
    #[error(transparent)]
    Reconcile(#[from] crate::reconcile::ReconcileError),

    /// Git mirror operation failed.
    #[error(transparent)]
    Repo(#[from] crate::repo::RepoError),
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn outcome_reports_like_a_commit_message() {
        let outcome = SyncOutcome::Changed {
            synced: 3,
            removed: 1,
        };
        assert_eq!(outcome.to_string(), "synced 3, removed 1 files");
        assert_eq!(SyncOutcome::NoChanges.to_string(), "no changes");
    }
}
