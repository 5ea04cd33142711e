// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror working tree behavior against a local remote fixture.

use crate::{local_settings, RemoteFixture};

use anyhow::Result;
use dotmirror::repo::{CommitOutcome, Git2Source, Mirror};
use std::{fs, path::PathBuf};

struct Setup {
    _keep: tempfile::TempDir,
    remote: RemoteFixture,
    mirror: Mirror,
    mirror_root: PathBuf,
}

fn setup() -> Result<Setup> {
    let keep = tempfile::tempdir()?;
    let remote_path = keep.path().join("remote.git");
    let remote = RemoteFixture::new(&remote_path)?;
    remote.commit_file("seed", "seed content\n")?;

    let key_file = keep.path().join("id_ed25519");
    fs::write(&key_file, "not really a key")?;

    let mirror_root = keep.path().join("mirror");
    let settings = local_settings(&remote_path, &key_file);
    let mirror = Mirror::open_or_clone(&settings, &mirror_root, &Git2Source)?;

    Ok(Setup {
        _keep: keep,
        remote,
        mirror,
        mirror_root,
    })
}

#[test]
fn update_on_converged_mirror_is_success_without_mutation() -> Result<()> {
    let setup = setup()?;
    let before = setup.mirror.repository().head()?.target();

    setup.mirror.try_update()?;

    let after = setup.mirror.repository().head()?.target();
    assert_eq!(before, after);
    assert_eq!(after, Some(setup.remote.head_id()?));

    Ok(())
}

#[test]
fn update_fast_forwards_mirror_behind_remote() -> Result<()> {
    let setup = setup()?;
    setup
        .remote
        .commit_file("upstream", "someone else's dotfile\n")?;

    setup.mirror.try_update()?;

    assert_eq!(
        setup.mirror.repository().head()?.target(),
        Some(setup.remote.head_id()?)
    );
    assert!(setup.mirror_root.join("upstream").exists());

    Ok(())
}

#[test]
fn update_hard_resets_diverged_mirror_to_remote_head() -> Result<()> {
    let setup = setup()?;

    // Diverge: one commit only the mirror knows about.
    fs::write(setup.mirror_root.join("local"), "local only\n")?;
    setup.mirror.add(["local"])?;
    let outcome = setup.mirror.commit("local divergence")?;
    assert!(matches!(outcome, CommitOutcome::Committed(_)));

    // Meanwhile the remote moved on independently.
    setup
        .remote
        .commit_file("upstream", "someone else's dotfile\n")?;

    setup.mirror.try_update()?;

    assert_eq!(
        setup.mirror.repository().head()?.target(),
        Some(setup.remote.head_id()?)
    );
    assert!(!setup.mirror_root.join("local").exists());

    Ok(())
}

#[test]
fn commit_with_nothing_staged_is_distinguished() -> Result<()> {
    let setup = setup()?;

    let outcome = setup.mirror.commit("nothing here")?;

    assert_eq!(outcome, CommitOutcome::NothingToCommit);

    Ok(())
}

#[test]
fn add_commit_push_lands_on_remote() -> Result<()> {
    let setup = setup()?;

    fs::write(setup.mirror_root.join("blob"), "export EDITOR=vim\n")?;
    setup.mirror.add(["blob"])?;
    let outcome = setup.mirror.commit("synced 1, removed 0 files")?;
    assert!(matches!(outcome, CommitOutcome::Committed(_)));

    setup.mirror.push()?;

    assert_eq!(
        setup.mirror.repository().head()?.target(),
        Some(setup.remote.head_id()?)
    );
    assert_eq!(setup.remote.head_message()?, "synced 1, removed 0 files");

    Ok(())
}

#[test]
fn push_with_nothing_new_is_idempotent() -> Result<()> {
    let setup = setup()?;

    setup.mirror.push()?;
    setup.mirror.push()?;

    assert_eq!(
        setup.mirror.repository().head()?.target(),
        Some(setup.remote.head_id()?)
    );

    Ok(())
}
