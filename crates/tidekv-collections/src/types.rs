//! Identifier newtypes and naming rules for the collections namespace.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ManifestError;

/// Longest permitted scope or collection name, in bytes.
pub const MAX_COLLECTION_NAME_SIZE: usize = 251;

/// Name carried by the default scope.
pub const DEFAULT_SCOPE_NAME: &str = "_default";

/// Name carried by the default collection.
pub const DEFAULT_COLLECTION_NAME: &str = "_default";

/// Identifies a scope within a bucket's manifest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The default scope (always id 0).
    pub const DEFAULT: ScopeId = ScopeId(0);

    /// Reserved for system use; must never appear in a manifest.
    pub const SYSTEM: ScopeId = ScopeId(1);

    /// Creates a ScopeId from a raw u32 value.
    pub fn new(id: u32) -> Self {
        ScopeId(id)
    }

    /// Returns the raw u32 value of this scope id.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// True for the default scope.
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    /// Parse from the manifest's hex-string form (no `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, ManifestError> {
        parse_hex_u32(s).map(ScopeId).ok_or_else(|| ManifestError::InvalidManifest {
            reason: format!("invalid scope uid: {s}"),
        })
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identifies a collection within a bucket's manifest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(u32);

impl CollectionId {
    /// The default collection (always id 0).
    pub const DEFAULT: CollectionId = CollectionId(0);

    /// Reserved for system use; must never appear in a manifest.
    pub const SYSTEM: CollectionId = CollectionId(1);

    /// Creates a CollectionId from a raw u32 value.
    pub fn new(id: u32) -> Self {
        CollectionId(id)
    }

    /// Returns the raw u32 value of this collection id.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// True for the default collection.
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    /// Parse from the manifest's hex-string form (no `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, ManifestError> {
        parse_hex_u32(s)
            .map(CollectionId)
            .ok_or_else(|| ManifestError::InvalidManifest {
                reason: format!("invalid collection uid: {s}"),
            })
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// The manifest's monotonically non-decreasing version number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestUid(u64);

impl ManifestUid {
    /// The epoch version.
    pub const EPOCH: ManifestUid = ManifestUid(0);

    /// Creates a ManifestUid from a raw u64 value.
    pub fn new(uid: u64) -> Self {
        ManifestUid(uid)
    }

    /// Returns the raw u64 value of this uid.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse from the manifest's hex-string form (no `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, ManifestError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ManifestError::InvalidManifest {
                reason: format!("invalid manifest uid: {s}"),
            });
        }
        u64::from_str_radix(s, 16)
            .map(ManifestUid)
            .map_err(|_| ManifestError::InvalidManifest {
                reason: format!("invalid manifest uid: {s}"),
            })
    }
}

impl fmt::Display for ManifestUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

fn parse_hex_u32(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

/// Check a scope or collection name against the naming rules: nonempty,
/// at most [`MAX_COLLECTION_NAME_SIZE`] bytes, characters from
/// `[A-Za-z0-9_\-%$]`, and not starting with `$` (reserved).
pub fn valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME_SIZE || name.starts_with('$') {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'%' || b == b'$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parse() {
        assert_eq!(ScopeId::from_hex("0").unwrap(), ScopeId::DEFAULT);
        assert_eq!(ScopeId::from_hex("8").unwrap().as_u32(), 8);
        assert_eq!(CollectionId::from_hex("ff").unwrap().as_u32(), 255);
        assert_eq!(ManifestUid::from_hex("5fa1").unwrap().as_u64(), 0x5fa1);
    }

    #[test]
    fn test_hex_parse_rejects_bad_input() {
        assert!(ScopeId::from_hex("").is_err());
        assert!(ScopeId::from_hex("0x8").is_err());
        assert!(ScopeId::from_hex("-1").is_err());
        assert!(ScopeId::from_hex("zz").is_err());
        assert!(CollectionId::from_hex("100000000").is_err());
        assert!(ManifestUid::from_hex("g").is_err());
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(ScopeId::new(8).to_string(), "0x8");
        assert_eq!(CollectionId::new(255).to_string(), "0xff");
        assert_eq!(ManifestUid::new(0x5fa1).to_string(), "0x5fa1");
    }

    #[test]
    fn test_valid_names() {
        assert!(valid_name("_default"));
        assert!(valid_name("beer-sample"));
        assert!(valid_name("a%b$c"));
        assert!(valid_name("A1"));
        assert!(valid_name(&"x".repeat(MAX_COLLECTION_NAME_SIZE)));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!valid_name(""));
        assert!(!valid_name("$starts_reserved"));
        assert!(!valid_name("has space"));
        assert!(!valid_name("has.dot"));
        assert!(!valid_name(&"x".repeat(MAX_COLLECTION_NAME_SIZE + 1)));
    }
}
