//! Target files and the create-or-update write
//!
//! A target is one file slot, `file-<k>.yaml`, rewritten repeatedly by a
//! single job. Whether the file exists is decided once, before the first
//! write; after that the writer trusts its own bookkeeping and never checks
//! the disk again.

use crate::error::{TargetError, TargetResult};
use crate::payload::{IdAllocator, Payload};
use chrono::Utc;
use rand::Rng;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One logical file slot, identified by its 1-based index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    index: usize,
    path: PathBuf,
}

impl Target {
    /// Target `index` inside `dir`
    pub fn new(dir: &Path, index: usize) -> Self {
        Self {
            index,
            path: dir.join(Self::file_name(index)),
        }
    }

    /// File name for a target index
    pub fn file_name(index: usize) -> String {
        format!("file-{}.yaml", index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the target once and return a writer for it
    ///
    /// A missing file means the first write creates it. Any other read
    /// failure aborts the whole target.
    pub fn resolve(&self) -> TargetResult<TargetWriter> {
        let exists = match fs::read(&self.path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                return Err(TargetError::Unreadable {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        Ok(TargetWriter {
            path: self.path.clone(),
            exists,
        })
    }
}

/// What a single write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Created,
    Updated,
}

/// Result of one successful write
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome {
    pub kind: WriteKind,
    pub id: i64,
    pub bytes: u64,
}

/// Performs create-or-update writes for one resolved target
#[derive(Debug)]
pub struct TargetWriter {
    path: PathBuf,
    exists: bool,
}

impl TargetWriter {
    /// Whether the next write is an update
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Write one revision of the file
    ///
    /// Writes are plain overwrites; a crash mid-write can leave a torn file.
    pub fn write_once<R: Rng + ?Sized>(
        &mut self,
        ids: &IdAllocator,
        rng: &mut R,
    ) -> TargetResult<WriteOutcome> {
        if self.exists {
            self.update(rng)
        } else {
            let outcome = self.create(ids, rng)?;
            self.exists = true;
            Ok(outcome)
        }
    }

    fn create<R: Rng + ?Sized>(&self, ids: &IdAllocator, rng: &mut R) -> TargetResult<WriteOutcome> {
        let payload = Payload::generate(rng, ids.next_id(), Utc::now());
        let bytes = self.store(&payload)?;

        Ok(WriteOutcome {
            kind: WriteKind::Created,
            id: payload.id,
            bytes,
        })
    }

    fn update<R: Rng + ?Sized>(&self, rng: &mut R) -> TargetResult<WriteOutcome> {
        let data = fs::read(&self.path).map_err(|e| TargetError::ReadPrevious {
            path: self.path.clone(),
            source: e,
        })?;

        let previous = Payload::from_yaml(&data).map_err(|e| TargetError::Payload {
            path: self.path.clone(),
            source: e,
        })?;

        let payload = Payload::next_revision(rng, &previous, Utc::now());
        let bytes = self.store(&payload)?;

        Ok(WriteOutcome {
            kind: WriteKind::Updated,
            id: payload.id,
            bytes,
        })
    }

    fn store(&self, payload: &Payload) -> TargetResult<u64> {
        let data = payload.to_yaml().map_err(|e| TargetError::Payload {
            path: self.path.clone(),
            source: e,
        })?;

        fs::write(&self.path, data.as_bytes()).map_err(|e| TargetError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(data.len() as u64)
    }
}
