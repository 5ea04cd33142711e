// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Full sync runs end to end against a local remote fixture.

use crate::{local_settings, RemoteFixture};

use anyhow::Result;
use dotmirror::{
    config::SyncConfig,
    hash,
    index::INDEX_FILE_NAME,
    sync::{self, SyncOutcome},
};
use std::{fs, path::PathBuf};

struct World {
    _keep: tempfile::TempDir,
    remote: RemoteFixture,
    config: SyncConfig,
    mirror_root: PathBuf,
    vimrc: PathBuf,
}

fn world() -> Result<World> {
    let keep = tempfile::tempdir()?;
    let remote_path = keep.path().join("remote.git");
    let remote = RemoteFixture::new(&remote_path)?;
    remote.commit_file("README", "dotfile mirror\n")?;

    let key_file = keep.path().join("id_ed25519");
    fs::write(&key_file, "not really a key")?;

    let vimrc = keep.path().join("vimrc");
    fs::write(&vimrc, "set number\n")?;

    let mirror_root = keep.path().join("mirror");
    let config = SyncConfig {
        git: local_settings(&remote_path, &key_file),
        mirror_path: Some(mirror_root.clone()),
        files: vec![vimrc.to_string_lossy().into_owned()],
    };

    Ok(World {
        _keep: keep,
        remote,
        config,
        mirror_root,
        vimrc,
    })
}

#[test]
fn first_run_copies_commits_and_pushes() -> Result<()> {
    let world = world()?;

    let outcome = sync::run(&world.config)?;

    assert_eq!(
        outcome,
        SyncOutcome::Changed {
            synced: 1,
            removed: 0
        }
    );
    let blob = hash::digest_file(&world.vimrc)?;
    assert!(world.mirror_root.join(&blob).exists());
    assert!(world.mirror_root.join(INDEX_FILE_NAME).exists());
    assert_eq!(world.remote.head_message()?, "synced 1, removed 0 files");

    Ok(())
}

#[test]
fn rerun_without_changes_reports_no_changes() -> Result<()> {
    let world = world()?;

    sync::run(&world.config)?;
    let head_after_first = world.remote.head_id()?;
    let outcome = sync::run(&world.config)?;

    assert_eq!(outcome, SyncOutcome::NoChanges);
    assert_eq!(world.remote.head_id()?, head_after_first);

    Ok(())
}

#[test]
fn edited_watched_file_swaps_mirror_entry() -> Result<()> {
    let world = world()?;

    sync::run(&world.config)?;
    let old_blob = hash::digest_file(&world.vimrc)?;

    fs::write(&world.vimrc, "set nonumber\n")?;
    let outcome = sync::run(&world.config)?;

    assert_eq!(
        outcome,
        SyncOutcome::Changed {
            synced: 1,
            removed: 1
        }
    );
    let new_blob = hash::digest_file(&world.vimrc)?;
    assert!(world.mirror_root.join(&new_blob).exists());
    assert!(!world.mirror_root.join(&old_blob).exists());
    assert_eq!(world.remote.head_message()?, "synced 1, removed 1 files");

    Ok(())
}

#[test]
fn status_previews_pending_copies_without_mutating() -> Result<()> {
    let world = world()?;

    let delta = sync::status(&world.config)?;

    assert_eq!(delta.to_copy.len(), 1);
    assert!(delta.to_remove.is_empty());
    assert!(!world.mirror_root.exists());

    Ok(())
}

#[test]
fn pull_converges_fresh_mirror_with_remote() -> Result<()> {
    let world = world()?;

    sync::pull(&world.config)?;

    assert!(world.mirror_root.join(".git").exists());
    assert!(world.mirror_root.join("README").exists());

    Ok(())
}
