// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror directory reconciliation.
//!
//! The mirror directory is a flat content-addressed store: every tracked
//! blob is a file named by its content hash at the top level of the mirror
//! root, never by its original filename. This decouples the watched files'
//! names and locations from git history, and stores identical content shared
//! across watched paths exactly once.
//!
//! Reconciliation applies an index delta to that store: stale blobs are
//! deleted, new blobs are copied in, and the persisted index file is
//! rewritten to match. Per-file failures are logged and skipped so one bad
//! dotfile never blocks the rest, but a failed index rewrite aborts the run
//! before anything gets committed on top of it.

use crate::index::{self, Index};

use std::{
    fs, io,
    path::PathBuf,
};
use tracing::{debug, info, instrument, warn};

/// Applies index deltas to one mirror root.
#[derive(Debug)]
pub struct Reconciler {
    mirror_root: PathBuf,
}

/// Relative mirror paths touched by a reconciliation, ready for git staging.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileOutcome {
    /// Check whether the reconciliation changed the mirror at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl Reconciler {
    /// Construct new reconciler bound to target mirror root.
    pub fn new(mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            mirror_root: mirror_root.into(),
        }
    }

    /// Apply the delta between the index's snapshots to the mirror root.
    ///
    /// Deletes every `to_remove` blob, copies every `to_copy` blob from its
    /// watched source path, and rewrites the persisted index file. A blob
    /// that is already absent counts as removed. A blob that fails to copy
    /// is withheld from the rewritten index, and a blob that fails to delete
    /// is kept in it, so the next run computes the same delta entry again
    /// and retries.
    ///
    /// Returned paths are sorted and relative to the mirror root.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::WriteIndex`] if the index file cannot be
    ///   rewritten. This is fatal to the run: an unwritten index would
    ///   desynchronize snapshot tracking for the next run, so the caller
    ///   must not proceed to commit or push.
    #[instrument(skip(self, index), level = "debug")]
    pub fn reconcile(&self, index: &Index) -> Result<ReconcileOutcome> {
        let delta = index.delta();
        let mut outcome = ReconcileOutcome::default();
        let mut rewrite = index.new.clone();

        for (hash, record) in &delta.to_remove {
            let blob_path = self.mirror_root.join(hash);
            match fs::remove_file(&blob_path) {
                Ok(()) => outcome.removed.push(hash.clone()),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    // Already absent, but git may still hold the entry.
                    debug!("blob {hash} for {:?} already gone", record.path.display());
                    outcome.removed.push(hash.clone());
                }
                Err(error) => {
                    warn!("failed to remove blob {hash}: {error}");
                    // Keep the entry so the next run retries the removal.
                    rewrite.insert(hash.clone(), record.clone());
                }
            }
        }

        for (hash, record) in &delta.to_copy {
            let blob_path = self.mirror_root.join(hash);
            match fs::copy(&record.path, &blob_path) {
                Ok(_) => {
                    set_permission(&blob_path, record.permission);
                    outcome.added.push(hash.clone());
                }
                Err(error) => {
                    warn!(
                        "failed to copy {:?} into mirror: {error}",
                        record.path.display()
                    );
                    // Withhold from the rewrite so the next run retries.
                    rewrite.remove(hash);
                }
            }
        }

        index::write_index_file(&self.mirror_root, &rewrite)?;
        info!(
            "reconciled mirror: {} added, {} removed, {} unchanged",
            outcome.added.len(),
            outcome.removed.len(),
            delta.unchanged.len()
        );

        outcome.added.sort();
        outcome.removed.sort();

        Ok(outcome)
    }
}

#[cfg(unix)]
fn set_permission(path: &std::path::Path, permission: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(permission)) {
        warn!("failed to set mode {permission:04o} on {:?}: {error}", path.display());
    }
}
#[cfg(not(unix))]
fn set_permission(_path: &std::path::Path, _permission: u32) {}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Persisted index file rewrite failed. Fatal to the run.
    #[error(transparent)]
    WriteIndex(#[from] crate::index::IndexError),
}

/// Friendly result alias :3
type Result<T, E = ReconcileError> = std::result::Result<T, E>;
