//! Artifact Record - files a run produced, identified by content hash

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{content_hash, SavedArtifact};
use crate::Result;

/// A file produced by a run.
///
/// `cas_hash` has the form `algorithm:hex_digest`, e.g. `sha256:e3b0c4...`,
/// so two runs that wrote identical bytes share a hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    key: String,
    path: PathBuf,
    cas_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// New record stamped with the current time.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        key: impl Into<String>,
        path: impl Into<PathBuf>,
        cas_hash: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            path: path.into(),
            cas_hash: cas_hash.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Record for an envelope written by [`crate::artifact::save`].
    #[must_use]
    pub fn from_saved(run_id: impl Into<String>, key: impl Into<String>, saved: &SavedArtifact) -> Self {
        Self::new(
            run_id,
            key,
            saved.path.clone(),
            saved.cas_hash.clone(),
            saved.size_bytes,
        )
    }

    /// Record for an arbitrary file already on disk, hashing its bytes.
    ///
    /// # Errors
    /// Returns error if the file cannot be read
    pub fn from_file(
        run_id: impl Into<String>,
        key: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(Self::new(
            run_id,
            key,
            path,
            content_hash(&bytes),
            bytes.len() as u64,
        ))
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the artifact key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Where the file was written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the content hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Get the size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_hashes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        std::fs::write(&path, "Actual,Prediction\n1.0,2.0\n").unwrap();

        let record = ArtifactRecord::from_file("run-1", "output", &path).unwrap();
        assert_eq!(record.size_bytes(), 26);
        assert!(record.cas_hash().starts_with("sha256:"));
        assert_eq!(record.path(), path.as_path());
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ArtifactRecord::from_file("run-1", "x", dir.path().join("nope")).is_err());
    }
}
