// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Content-addressed change detection index.
//!
//! The index is the sole durable record of what the mirror held after the
//! last successful run. Every run builds a fresh snapshot of the watched
//! file set, loads the persisted snapshot from the mirror root, and derives
//! the delta between them. Identity is always the content digest: two
//! watched paths with identical bytes collapse to one entry, and a file only
//! counts as changed when its bytes changed.
//!
//! # Index File
//!
//! The persisted index lives at the top level of the mirror root, named
//! [`INDEX_FILE_NAME`], so git versions it along with the mirrored blobs.
//! One record per line:
//!
//! ```text
//! <hash>:<original-path>:<permission-bits>
//! ```
//!
//! Permission bits are octal. Malformed lines are tolerated with a logged
//! warning, and any line with a non-empty hash is still admitted so an
//! existing mirror entry is never silently lost.

use crate::hash;

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Name of the persisted index file inside the mirror root.
pub const INDEX_FILE_NAME: &str = ".idx";

/// One tracked file's metadata at a point in time.
///
/// The path is the watched file's absolute location outside the mirror. The
/// permission field holds the file's mode bits masked to `0o7777`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub permission: u32,
}

/// Snapshot pair the mirror reconciles between.
///
/// `current` is the snapshot loaded from the persisted index file, the
/// mirror's last known-synced state. `new` is freshly computed from the live
/// watched file set this run. After a successful reconciliation the
/// persisted file holds exactly `new`, so the next run's `current` equals
/// this run's `new`.
#[derive(Default, Debug)]
pub struct Index {
    pub current: HashMap<String, FileRecord>,
    pub new: HashMap<String, FileRecord>,
}

impl Index {
    /// Derive the three-way delta between `new` and `current`.
    ///
    /// Keyed by hash: `to_copy` holds entries present only in `new`,
    /// `to_remove` holds entries present only in `current`, and `unchanged`
    /// holds the intersection.
    pub fn delta(&self) -> Delta {
        let mut delta = Delta::default();

        for (hash, record) in &self.new {
            if self.current.contains_key(hash) {
                delta.unchanged.insert(hash.clone(), record.clone());
            } else {
                delta.to_copy.insert(hash.clone(), record.clone());
            }
        }

        for (hash, record) in &self.current {
            if !self.new.contains_key(hash) {
                delta.to_remove.insert(hash.clone(), record.clone());
            }
        }

        delta
    }
}

/// Derived change set between two snapshots. Never persisted.
#[derive(Default, Debug)]
pub struct Delta {
    pub to_copy: HashMap<String, FileRecord>,
    pub to_remove: HashMap<String, FileRecord>,
    pub unchanged: HashMap<String, FileRecord>,
}

/// Builds index snapshots for one mirror root.
#[derive(Debug)]
pub struct Indexer {
    mirror_root: PathBuf,
}

impl Indexer {
    /// Construct new indexer bound to target mirror root.
    pub fn new(mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            mirror_root: mirror_root.into(),
        }
    }

    /// Build a full [`Index`] from the watched file listing.
    ///
    /// Blank entries are skipped. Any watched file that cannot be opened,
    /// stated, or hashed is logged and excluded from `new` for this run, so
    /// one broken file never blocks synchronization of the healthy rest.
    /// When two watched paths carry identical content, the first-seen path
    /// wins the entry.
    ///
    /// # Errors
    ///
    /// - Return [`IndexError::ReadIndexFile`] if the persisted index file
    ///   exists but cannot be read. A missing file is an empty `current`.
    #[instrument(skip(self, watched), level = "debug")]
    pub fn build(&self, watched: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Index> {
        let mut index = Index::default();

        for entry in watched {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }

            let path = PathBuf::from(entry);
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(error) => {
                    warn!("failed to open {:?}: {error}", path.display());
                    continue;
                }
            };
            let metadata = match file.metadata() {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!("failed to stat {:?}: {error}", path.display());
                    continue;
                }
            };
            let digest = match hash::digest_reader(file) {
                Ok(digest) => digest,
                Err(error) => {
                    warn!("failed to hash {:?}: {error}", path.display());
                    continue;
                }
            };

            // INVARIANT: First-seen path wins for duplicate content.
            index.new.entry(digest).or_insert(FileRecord {
                path,
                permission: permission_bits(&metadata),
            });
        }

        index.current = load_index_file(&self.mirror_root)?;

        Ok(index)
    }
}

/// Load the persisted index file from the mirror root.
///
/// Absence is not an error; a mirror without an index file has an empty
/// `current` snapshot (first run).
///
/// # Errors
///
/// - Return [`IndexError::ReadIndexFile`] on any read failure other than
///   the file being absent.
pub fn load_index_file(mirror_root: &Path) -> Result<HashMap<String, FileRecord>> {
    let index_path = mirror_root.join(INDEX_FILE_NAME);
    let data = match fs::read_to_string(&index_path) {
        Ok(data) => data,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("no index file at {:?}, starting empty", index_path.display());
            return Ok(HashMap::new());
        }
        Err(source) => {
            return Err(IndexError::ReadIndexFile {
                source,
                path: index_path,
            })
        }
    };

    let mut records = HashMap::new();
    for line in data.lines() {
        if line.is_empty() {
            continue;
        }

        if let Some((hash, record)) = parse_record(line) {
            records.insert(hash, record);
        }
    }

    Ok(records)
}

/// Rewrite the persisted index file to exactly the given records.
///
/// Records are written sorted by hash so the file content is stable across
/// runs and diffs cleanly in git history.
///
/// # Errors
///
/// - Return [`IndexError::WriteIndexFile`] on any write failure.
pub fn write_index_file(mirror_root: &Path, records: &HashMap<String, FileRecord>) -> Result<()> {
    let index_path = mirror_root.join(INDEX_FILE_NAME);
    let persist = |path: &Path| -> io::Result<()> {
        let mut file = File::create(path)?;
        let mut hashes = records.keys().collect::<Vec<_>>();
        hashes.sort();
        for hash in hashes {
            let record = &records[hash];
            writeln!(
                file,
                "{hash}:{}:{:04o}",
                record.path.display(),
                record.permission
            )?;
        }
        Ok(())
    };

    persist(&index_path).map_err(|source| IndexError::WriteIndexFile {
        source,
        path: index_path,
    })
}

/// Parse one `hash:path:permission` line.
///
/// Splits the hash off the front and the permission off the back, so paths
/// containing ':' survive a round trip. Returns [`None`] only when the hash
/// field itself is empty.
fn parse_record(line: &str) -> Option<(String, FileRecord)> {
    let (hash, rest) = match line.split_once(':') {
        Some(parts) => parts,
        None => (line, ""),
    };

    if hash.is_empty() {
        warn!("index line {line:?} has no hash field, dropped");
        return None;
    }

    let (path, permission) = match rest.rsplit_once(':') {
        Some((path, perm)) => match u32::from_str_radix(perm, 8) {
            Ok(bits) => (path, bits),
            Err(_) => {
                warn!("index line {line:?} has malformed permission field");
                (path, 0)
            }
        },
        None => {
            warn!("index line {line:?} is missing one or more fields");
            (rest, 0)
        }
    };

    Some((
        hash.to_string(),
        FileRecord {
            path: PathBuf::from(path),
            permission,
        },
    ))
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}
#[cfg(not(unix))]
fn permission_bits(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// Index manipulation error types.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Persisted index file cannot be read.
    #[error("failed to read index file at {:?}", path.display())]
    ReadIndexFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Persisted index file cannot be rewritten.
    #[error("failed to write index file at {:?}", path.display())]
    WriteIndexFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = IndexError> = std::result::Result<T, E>;
