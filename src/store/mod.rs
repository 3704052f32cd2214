//! Durable project storage: the manifest, its lock, artifacts, and handoff records.
//!
//! Every file is written through [`atomic`], so an interrupted process leaves
//! the previous version intact.

pub mod artifact;
pub mod atomic;
pub mod handoff;
pub mod manifest;
pub mod schema;

pub use artifact::{ArtifactDocument, ArtifactStore, StoredArtifact, content_digest};
pub use handoff::HandoffLog;
pub use manifest::{ManifestLock, ManifestStore};
pub use schema::{ArtifactSchema, FieldKind, FieldSpec, SchemaRegistry};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
