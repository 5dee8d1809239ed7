//! Versioned artifact persistence
//!
//! Every persisted blob is wrapped in an [`ArtifactEnvelope`]:
//!
//! ```text
//! {
//!   "format": "housing-value",
//!   "version": 1,
//!   "kind": "pipeline",
//!   "created_at": "2024-01-01T00:00:00Z",
//!   "payload": { ... }
//! }
//! ```
//!
//! Loading checks the envelope before touching the payload, so a stale or
//! foreign file is rejected with `SchemaMismatch` instead of failing (or
//! silently mispredicting) halfway through scoring.

use crate::features::PreparerState;
use crate::model::RandomForestRegressor;
use crate::train::TrainedPipeline;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Format tag written into every envelope
pub const ARTIFACT_FORMAT: &str = "housing-value";

/// Current envelope/payload schema version
pub const ARTIFACT_VERSION: u32 = 1;

/// What an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Fitted preparer state alone
    Preparer,
    /// Fitted forest alone
    Model,
    /// Preparer + forest bundle
    Pipeline,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparer => "preparer",
            Self::Model => "model",
            Self::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// A payload type that can be persisted as an artifact
pub trait Artifact: Serialize + DeserializeOwned {
    /// Kind tag written into the envelope
    const KIND: ArtifactKind;
}

impl Artifact for PreparerState {
    const KIND: ArtifactKind = ArtifactKind::Preparer;
}

impl Artifact for RandomForestRegressor {
    const KIND: ArtifactKind = ArtifactKind::Model;
}

impl Artifact for TrainedPipeline {
    const KIND: ArtifactKind = ArtifactKind::Pipeline;
}

/// Versioned wrapper around a persisted payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope<T> {
    format: String,
    version: u32,
    kind: ArtifactKind,
    created_at: DateTime<Utc>,
    payload: T,
}

/// Envelope fields checked before the payload is decoded
#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    format: String,
    version: u32,
    kind: ArtifactKind,
}

/// Where and what was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    /// File path
    pub path: PathBuf,
    /// Content hash, `sha256:<hex>`
    pub cas_hash: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Content-addressable hash of a byte slice
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

/// Serialize an artifact into its envelope and write it, creating parent
/// directories
///
/// # Errors
/// Returns error if serialization or the write fails
pub fn save<T: Artifact, P: AsRef<Path>>(path: P, payload: &T) -> Result<SavedArtifact> {
    let path = path.as_ref();
    let envelope = ArtifactEnvelope {
        format: ARTIFACT_FORMAT.to_string(),
        version: ARTIFACT_VERSION,
        kind: T::KIND,
        created_at: Utc::now(),
        payload,
    };
    let bytes = serde_json::to_vec(&envelope)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, &bytes)?;

    let saved = SavedArtifact {
        path: path.to_path_buf(),
        cas_hash: content_hash(&bytes),
        size_bytes: bytes.len() as u64,
    };
    tracing::info!(
        path = %path.display(),
        kind = %T::KIND,
        hash = %saved.cas_hash,
        "Saved artifact"
    );
    Ok(saved)
}

/// Read and validate an artifact
///
/// # Errors
/// - `MissingArtifact` if the file is absent, unreadable or not JSON
/// - `SchemaMismatch` if the envelope format, version or kind differ from
///   what this build writes, or the payload does not decode
pub fn load<T: Artifact, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let missing = |reason: String| Error::MissingArtifact {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        return Err(missing("file not found".to_string()));
    }
    let bytes = std::fs::read(path).map_err(|e| missing(format!("unreadable: {e}")))?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| missing(format!("not valid JSON: {e}")))?;

    let header: EnvelopeHeader = serde_json::from_value(value.clone()).map_err(|e| {
        Error::SchemaMismatch(format!("{} is not an artifact envelope: {e}", path.display()))
    })?;
    if header.format != ARTIFACT_FORMAT {
        return Err(Error::SchemaMismatch(format!(
            "{} has format '{}', expected '{ARTIFACT_FORMAT}'",
            path.display(),
            header.format
        )));
    }
    if header.version != ARTIFACT_VERSION {
        return Err(Error::SchemaMismatch(format!(
            "{} has artifact version {}, this build reads version {ARTIFACT_VERSION}",
            path.display(),
            header.version
        )));
    }
    if header.kind != T::KIND {
        return Err(Error::SchemaMismatch(format!(
            "{} holds a {} artifact, expected {}",
            path.display(),
            header.kind,
            T::KIND
        )));
    }

    let envelope: ArtifactEnvelope<T> = serde_json::from_value(value).map_err(|e| {
        Error::SchemaMismatch(format!("{} payload does not decode: {e}", path.display()))
    })?;
    tracing::debug!(
        path = %path.display(),
        kind = %T::KIND,
        created_at = %envelope.created_at,
        "Loaded artifact"
    );
    Ok(envelope.payload)
}

/// Load a trained pipeline and verify its parts still fit together
///
/// # Errors
/// Same as [`load`], plus `SchemaMismatch` if the stored preparer output
/// does not match the stored model inputs
pub fn load_pipeline<P: AsRef<Path>>(path: P) -> Result<TrainedPipeline> {
    let pipeline: TrainedPipeline = load(path)?;
    pipeline.check_consistency()?;
    Ok(pipeline)
}

/// Rebuild a pipeline from separately saved preparer and model artifacts
///
/// # Errors
/// Same as [`load`] for either file, plus `SchemaMismatch` if the model
/// was not trained on the preparer's output
pub fn load_pipeline_parts<P, Q>(
    preparer: P,
    model: Q,
    label_column: &str,
) -> Result<TrainedPipeline>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let preparer: PreparerState = load(preparer)?;
    let model: RandomForestRegressor = load(model)?;
    TrainedPipeline::new(label_column, preparer, model)
}
