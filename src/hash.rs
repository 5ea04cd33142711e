// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Content digests for watched files.
//!
//! Every tracked file is keyed by a digest of its byte content, never by its
//! path or any filesystem metadata. Equal bytes always produce an equal
//! digest, so the digest alone decides whether a file counts as changed.

use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

/// Compute the hex-encoded content digest of a file.
///
/// The file is streamed through the hasher in full, so peak memory stays
/// bounded regardless of file size.
///
/// # Errors
///
/// - Return [`ReadError`] if the file cannot be opened or fully read.
pub fn digest_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReadError {
        source,
        path: path.to_path_buf(),
    })?;

    digest_reader(file).map_err(|source| ReadError {
        source,
        path: path.to_path_buf(),
    })
}

/// Compute the hex-encoded content digest of an arbitrary byte stream.
///
/// Consumes the reader to exhaustion.
pub fn digest_reader(mut reader: impl io::Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Source file could not be fully read for hashing.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {:?} for hashing", path.display())]
pub struct ReadError {
    #[source]
    pub source: io::Error,
    pub path: PathBuf,
}

/// Friendly result alias :3
pub type Result<T, E = ReadError> = std::result::Result<T, E>;
