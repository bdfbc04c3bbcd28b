//! Error types for the collections manifest.

use crate::types::ScopeId;
use thiserror::Error;

/// Errors that can occur parsing or querying a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest document was malformed or violated a constraint.
    #[error("invalid manifest: {reason}")]
    InvalidManifest {
        /// What was wrong with the document.
        reason: String,
    },

    /// A path query named a syntactically invalid scope or collection.
    #[error("invalid {kind} name in path: {name}")]
    InvalidPath {
        /// "scope" or "collection".
        kind: &'static str,
        /// The offending path component.
        name: String,
    },

    /// A collection lookup was given a scope id the manifest does not
    /// hold. Callers resolve the scope first, so this is a caller bug.
    #[error("unknown scope: {sid}")]
    UnknownScope {
        /// The unknown scope id.
        sid: ScopeId,
    },

    /// The candidate manifest is not a legal successor of the current
    /// one and cannot be applied.
    #[error("cannot apply collections manifest: {reason}")]
    NotSuccessor {
        /// Why the candidate was rejected.
        reason: String,
    },
}
