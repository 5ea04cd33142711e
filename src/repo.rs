// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git mirror management.
//!
//! The mirror root doubles as a normal git working tree whose remote is the
//! single source of truth. One [`Mirror`] value exclusively owns the open
//! working tree for the duration of a run: it is created once per run by
//! opening or cloning, converged with the remote, fed staged adds and
//! removals, and discarded at process exit. No durable state lives here
//! outside the working tree itself.
//!
//! # Convergence Policy
//!
//! [`Mirror::try_update`] first attempts a normal pull. When local history
//! cannot fast-forward onto the remote branch head, the working tree is hard
//! reset to the fetched remote head instead. Local divergence is discarded,
//! never merged. After the reset, local HEAD must equal the remote branch
//! reference, otherwise the run stops rather than commit on top of an
//! unverified state.

use crate::config::GitSettings;

use auth_git2::GitAuthenticator;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config as GitConfig, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository, ResetType,
    Signature,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Layer of indirection for repository bootstrap.
///
/// Only two operations exist at this seam, so tests can substitute a local
/// fixture or counting implementation without touching network code.
pub trait RepoSource {
    /// Clone remote repository at target branch into target path.
    fn try_clone(
        &self,
        url: &str,
        branch: &str,
        auth: &GitAuthenticator,
        path: &Path,
    ) -> Result<Repository, git2::Error>;

    /// Open existing working tree at target path.
    fn try_open(&self, path: &Path) -> Result<Repository, git2::Error>;
}

/// Repository bootstrap through libgit2.
#[derive(Debug, Default)]
pub struct Git2Source;

impl RepoSource for Git2Source {
    fn try_clone(
        &self,
        url: &str,
        branch: &str,
        auth: &GitAuthenticator,
        path: &Path,
    ) -> Result<Repository, git2::Error> {
        let config = GitConfig::open_default()?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(auth.credentials(&config));
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);

        let repo = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fetch)
            .clone(url, path);
        repo
    }

    fn try_open(&self, path: &Path) -> Result<Repository, git2::Error> {
        Repository::open(path)
    }
}

/// One open git working tree bound to the mirror root.
///
/// Holds the authentication credential, the configured remote name, and the
/// configured branch name alongside the working tree handle.
pub struct Mirror {
    repository: Repository,
    auth: GitAuthenticator,
    remote: String,
    branch: String,
}

impl Mirror {
    /// Open the mirror working tree, cloning it first if absent.
    ///
    /// The credential file is read up front so a missing or unreadable key
    /// fails the run at startup instead of deep inside a transfer.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Auth`] if the credential file cannot be read.
    /// - Return [`RepoError::Clone`] if no git metadata exists at the mirror
    ///   root and cloning fails.
    /// - Return [`RepoError::Open`] if the existing working tree cannot be
    ///   opened.
    #[instrument(skip(settings, mirror_root, source), level = "debug")]
    pub fn open_or_clone(
        settings: &GitSettings,
        mirror_root: impl AsRef<Path>,
        source: &impl RepoSource,
    ) -> Result<Self> {
        let mirror_root = mirror_root.as_ref();
        let auth = authenticator(&settings.ssh_key)?;

        let repository = if mirror_root.join(".git").exists() {
            debug!("open mirror working tree at {:?}", mirror_root.display());
            source
                .try_open(mirror_root)
                .map_err(|source| RepoError::Open {
                    source,
                    path: mirror_root.to_path_buf(),
                })?
        } else {
            info!("clone {} into {:?}", settings.url, mirror_root.display());
            if let Some(parent) = mirror_root.parent() {
                fs::create_dir_all(parent).map_err(|source| RepoError::CreateMirrorRoot {
                    source,
                    path: parent.to_path_buf(),
                })?;
            }
            source
                .try_clone(&settings.url, &settings.branch, &auth, mirror_root)
                .map_err(|source| RepoError::Clone {
                    source,
                    url: settings.url.clone(),
                })?
        };

        Ok(Self {
            repository,
            auth,
            remote: settings.remote.clone(),
            branch: settings.branch.clone(),
        })
    }

    /// Borrow the underlying working tree handle.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Converge the working tree with the remote branch head.
    ///
    /// A normal pull that succeeds, including the degenerate "already up to
    /// date" case, is success. A pull that cannot fast-forward falls back to
    /// a hard reset of the working tree onto the fetched remote head, since
    /// the remote is the single source of truth and local divergence is
    /// discarded rather than merged.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::UpdateFailed`] if local HEAD still differs from
    ///   the remote branch reference after the reset. Fatal: the caller must
    ///   stop rather than commit on top of an unverified state.
    #[instrument(skip(self), level = "debug")]
    pub fn try_update(&self) -> Result<()> {
        self.fetch()?;

        let fetch_head = self.repository.find_reference("FETCH_HEAD")?;
        let fetch_commit = self.repository.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repository.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!("mirror already up to date");
            return Ok(());
        }

        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{}", self.branch);
            let mut reference = self.repository.find_reference(&refname)?;
            reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
            self.repository
                .checkout_head(Some(CheckoutBuilder::default().force()))?;
            info!("fast-forwarded mirror to {}", fetch_commit.id());
            return Ok(());
        }

        warn!("local history does not fast-forward onto remote head, hard resetting");
        self.reset_to_remote_head()
    }

    fn reset_to_remote_head(&self) -> Result<()> {
        let refname = format!("refs/remotes/{}/{}", self.remote, self.branch);
        let remote_oid = self.repository.refname_to_id(&refname)?;
        let target = self.repository.find_object(remote_oid, None)?;
        self.repository.reset(&target, ResetType::Hard, None)?;

        // INVARIANT: Never leave HEAD short of the remote head after reset.
        if self.repository.head()?.target() != Some(remote_oid) {
            return Err(RepoError::UpdateFailed {
                remote_ref: refname,
            });
        }

        info!("hard reset mirror to {refname} at {remote_oid}");
        Ok(())
    }

    fn fetch(&self) -> Result<()> {
        let config = GitConfig::open_default()?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(self.auth.credentials(&config));
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks);

        // Explicit refspec so the remote tracking reference advances even
        // when the remote history was rewritten.
        let refspec = format!(
            "+refs/heads/{0}:refs/remotes/{1}/{0}",
            self.branch, self.remote
        );
        let mut remote = self.repository.find_remote(&self.remote)?;
        remote.fetch(&[refspec.as_str()], Some(&mut opts), None)?;

        Ok(())
    }

    /// Stage mirror-relative paths into the working tree index.
    ///
    /// Each path failure is logged individually without aborting the batch.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Stage`] if the index itself cannot be loaded or
    ///   written back.
    #[instrument(skip(self, paths), level = "debug")]
    pub fn add(&self, paths: impl IntoIterator<Item = impl AsRef<str>>) -> Result<()> {
        let mut index = self
            .repository
            .index()
            .map_err(|source| RepoError::Stage { source })?;

        for path in paths {
            let path = Path::new(path.as_ref());
            if let Err(error) = index.add_path(path) {
                warn!("failed to stage {:?}: {error}", path.display());
            }
        }

        index
            .write()
            .map_err(|source| RepoError::Stage { source })?;

        Ok(())
    }

    /// Unstage mirror-relative paths, removing them from the working tree
    /// index.
    ///
    /// Each path failure is logged individually without aborting the batch.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Stage`] if the index itself cannot be loaded or
    ///   written back.
    #[instrument(skip(self, paths), level = "debug")]
    pub fn remove(&self, paths: impl IntoIterator<Item = impl AsRef<str>>) -> Result<()> {
        let mut index = self
            .repository
            .index()
            .map_err(|source| RepoError::Stage { source })?;

        for path in paths {
            let path = Path::new(path.as_ref());
            if let Err(error) = index.remove_path(path) {
                warn!("failed to unstage {:?}: {error}", path.display());
            }
        }

        index
            .write()
            .map_err(|source| RepoError::Stage { source })?;

        Ok(())
    }

    /// Commit currently staged changes under the fixed synthetic author.
    ///
    /// A staged tree identical to the HEAD tree yields
    /// [`CommitOutcome::NothingToCommit`], which is not an error.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Commit`] if writing the tree or the commit
    ///   object fails.
    #[instrument(skip(self, message), level = "debug")]
    pub fn commit(&self, message: &str) -> Result<CommitOutcome> {
        let commit_error = |source| RepoError::Commit { source };

        let mut index = self.repository.index().map_err(commit_error)?;
        let tree_id = index.write_tree().map_err(commit_error)?;

        let parent = match self.repository.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(commit_error)?),
            Err(_) => None,
        };

        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                debug!("staged tree equals HEAD tree, nothing to commit");
                return Ok(CommitOutcome::NothingToCommit);
            }
        }

        let tree = self.repository.find_tree(tree_id).map_err(commit_error)?;
        let signature = Signature::now("dotmirror", "dotmirror@localhost").map_err(commit_error)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self
            .repository
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(commit_error)?;

        info!("committed {oid}: {message}");
        Ok(CommitOutcome::Committed(oid))
    }

    /// Push the configured branch to the configured remote.
    ///
    /// Pushing an already up-to-date branch is a no-op success.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Push`] if the transfer fails.
    #[instrument(skip(self), level = "debug")]
    pub fn push(&self) -> Result<()> {
        let push_error = |source| RepoError::Push { source };

        let config = GitConfig::open_default().map_err(push_error)?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(self.auth.credentials(&config));
        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
        let mut remote = self
            .repository
            .find_remote(&self.remote)
            .map_err(push_error)?;
        remote
            .push(&[refspec.as_str()], Some(&mut opts))
            .map_err(push_error)?;

        info!("pushed {} to {}", self.branch, self.remote);
        Ok(())
    }
}

fn authenticator(key_file: &Path) -> Result<GitAuthenticator> {
    // auth-git2 defers key parsing to transport time, so at minimum demand
    // a readable credential before any repository bootstrap happens.
    fs::read(key_file).map_err(|source| RepoError::Auth {
        source,
        key_file: key_file.to_path_buf(),
    })?;

    Ok(GitAuthenticator::new_empty().add_ssh_key_from_file(key_file.to_path_buf(), None))
}

/// Distinguished result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit object was written to HEAD.
    Committed(Oid),

    /// The staged tree already matches HEAD. Not an error.
    NothingToCommit,
}

/// Git mirror error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Credential file cannot be read.
    #[error("failed to read credential at {:?}", key_file.display())]
    Auth {
        #[source]
        source: io::Error,
        key_file: PathBuf,
    },

    /// Mirror root parent directory cannot be created before cloning.
    #[error("failed to create mirror root at {:?}", path.display())]
    CreateMirrorRoot {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Repository bootstrap through cloning fails.
    #[error("failed to clone {url}")]
    Clone {
        #[source]
        source: git2::Error,
        url: String,
    },

    /// Repository bootstrap through opening fails.
    #[error("failed to open mirror working tree at {:?}", path.display())]
    Open {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Pull and hard reset both failed to converge with the remote. Fatal.
    #[error("mirror did not converge with {remote_ref} after hard reset")]
    UpdateFailed { remote_ref: String },

    /// Working tree index cannot be loaded or written back.
    #[error("failed to stage paths in mirror index")]
    Stage {
        #[source]
        source: git2::Error,
    },

    /// Staged changes cannot be committed.
    #[error("failed to commit staged mirror changes")]
    Commit {
        #[source]
        source: git2::Error,
    },

    /// Current branch cannot be pushed to the remote.
    #[error("failed to push mirror branch to remote")]
    Push {
        #[source]
        source: git2::Error,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = RepoError> = std::result::Result<T, E>;
