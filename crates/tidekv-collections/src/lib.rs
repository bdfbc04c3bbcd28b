#![warn(missing_docs)]

//! TideKV collections manifest: the versioned namespace over the keyspace.
//!
//! A manifest maps scope and collection identifiers to names, carries an
//! optional per-collection TTL, and evolves only to strictly greater
//! versions under successor rules: a surviving identifier may never be
//! renamed or moved to another scope. Manifests are immutable values;
//! replacement swaps the whole instance at the owning container.

pub mod error;
pub mod manifest;
pub mod types;

pub use error::ManifestError;
pub use manifest::{CollectionEntry, CollectionStatsEntry, Manifest, ManifestStats, Scope};
pub use types::{
    valid_name, CollectionId, ManifestUid, ScopeId, DEFAULT_COLLECTION_NAME, DEFAULT_SCOPE_NAME,
    MAX_COLLECTION_NAME_SIZE,
};
