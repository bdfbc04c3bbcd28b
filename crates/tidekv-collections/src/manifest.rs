//! The manifest value type: parse, validate, query, successor rules.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::ManifestError;
use crate::types::{
    valid_name, CollectionId, ManifestUid, ScopeId, DEFAULT_COLLECTION_NAME, DEFAULT_SCOPE_NAME,
};

/// A collection as it appears within its owning scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    /// The collection's id.
    pub id: CollectionId,
    /// Optional per-collection TTL in seconds.
    pub max_ttl_secs: Option<u32>,
}

/// A scope and the collections it holds, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// The scope's name, unique across the manifest.
    pub name: String,
    /// The collections owned by this scope.
    pub collections: Vec<CollectionEntry>,
}

/// Denormalised per-collection record for id-keyed lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CollectionInfo {
    sid: ScopeId,
    name: String,
}

/// Summary counters for the stats surface.
#[derive(Debug, Clone, Copy)]
pub struct ManifestStats {
    /// The manifest version.
    pub uid: u64,
    /// Number of scopes defined.
    pub num_scopes: usize,
    /// Number of collections defined across all scopes.
    pub num_collections: usize,
}

/// One row of the per-collection stats dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatsEntry {
    /// The owning scope.
    pub sid: ScopeId,
    /// The collection.
    pub cid: CollectionId,
    /// The collection's name.
    pub name: String,
    /// The collection's TTL, if set.
    pub max_ttl_secs: Option<u32>,
}

/// An immutable, versioned mapping of scope and collection identifiers
/// to names.
///
/// Constructed by [`Manifest::parse`] (which enforces every document
/// constraint) or [`Manifest::epoch`]; never mutated afterwards.
/// Replacement installs a fresh instance at the owning container after
/// an [`Manifest::is_successor`] check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    uid: ManifestUid,
    scopes: BTreeMap<ScopeId, Scope>,
    collections: BTreeMap<CollectionId, CollectionInfo>,
    default_collection_exists: bool,
}

impl Manifest {
    /// The distinguished initial manifest: uid 0, the default scope
    /// holding the default collection, nothing else.
    pub fn epoch() -> Self {
        let mut scopes = BTreeMap::new();
        scopes.insert(
            ScopeId::DEFAULT,
            Scope {
                name: DEFAULT_SCOPE_NAME.to_string(),
                collections: vec![CollectionEntry {
                    id: CollectionId::DEFAULT,
                    max_ttl_secs: None,
                }],
            },
        );
        let mut collections = BTreeMap::new();
        collections.insert(
            CollectionId::DEFAULT,
            CollectionInfo {
                sid: ScopeId::DEFAULT,
                name: DEFAULT_COLLECTION_NAME.to_string(),
            },
        );
        Self {
            uid: ManifestUid::EPOCH,
            scopes,
            collections,
            default_collection_exists: true,
        }
    }

    /// Parse and validate a manifest document.
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let doc: Value = serde_json::from_str(json).map_err(|e| invalid(format!("cannot parse json: {e}")))?;
        let doc = doc
            .as_object()
            .ok_or_else(|| invalid("document must be an object".to_string()))?;

        let uid = ManifestUid::from_hex(get_str(doc, "uid")?)?;

        let mut manifest = Manifest {
            uid,
            scopes: BTreeMap::new(),
            collections: BTreeMap::new(),
            default_collection_exists: false,
        };

        for scope_val in get_array(doc, "scopes")? {
            let scope_obj = scope_val
                .as_object()
                .ok_or_else(|| invalid("scopes entries must be objects".to_string()))?;

            let name = get_str(scope_obj, "name")?;
            if !valid_name(name) {
                return Err(invalid(format!("scope name: {name} is not valid")));
            }
            let sid = ScopeId::from_hex(get_str(scope_obj, "uid")?)?;

            if sid == ScopeId::SYSTEM {
                return Err(invalid(format!("scope uid: {sid} is not valid")));
            }
            if sid.is_default() && name != DEFAULT_SCOPE_NAME {
                return Err(invalid(format!("default scope with wrong name: {name}")));
            }
            if manifest.scopes.contains_key(&sid) {
                return Err(invalid(format!("duplicate scope uid: {sid}, name: {name}")));
            }
            if manifest.scopes.values().any(|s| s.name == name) {
                return Err(invalid(format!("duplicate scope name: {sid}, name: {name}")));
            }

            let mut scope_collections = Vec::new();
            for coll_val in get_array(scope_obj, "collections")? {
                let coll_obj = coll_val
                    .as_object()
                    .ok_or_else(|| invalid("collections entries must be objects".to_string()))?;

                let cname = get_str(coll_obj, "name")?;
                if !valid_name(cname) {
                    return Err(invalid(format!("collection name: {cname} is not valid")));
                }
                let cid = CollectionId::from_hex(get_str(coll_obj, "uid")?)?;

                if cid.is_default() {
                    if cname != DEFAULT_COLLECTION_NAME {
                        return Err(invalid(format!(
                            "the default collection has an unexpected name: {cname}"
                        )));
                    }
                    if !sid.is_default() {
                        return Err(invalid(
                            "the default collection is not in the default scope".to_string(),
                        ));
                    }
                } else if cid == CollectionId::SYSTEM {
                    return Err(invalid(format!("collection uid: {cid} is not valid")));
                }
                if manifest.collections.contains_key(&cid) {
                    return Err(invalid(format!(
                        "duplicate collection uid: {cid}, name: {cname}"
                    )));
                }
                // Names must be unique within the scope (they may repeat
                // across scopes).
                let dup = scope_collections.iter().any(|e: &CollectionEntry| {
                    manifest
                        .collections
                        .get(&e.id)
                        .map_or(false, |info| info.name == cname)
                });
                if dup {
                    return Err(invalid(format!(
                        "duplicate collection name: {cid}, name: {cname}"
                    )));
                }

                let max_ttl_secs = match coll_obj.get("maxTTL") {
                    None => None,
                    Some(v) => {
                        let value = v
                            .as_u64()
                            .ok_or_else(|| invalid("maxTTL must be an unsigned number".to_string()))?;
                        if value > u32::MAX as u64 {
                            return Err(invalid(format!("maxTTL: {value}")));
                        }
                        Some(value as u32)
                    }
                };

                if cid.is_default() {
                    manifest.default_collection_exists = true;
                }
                manifest.collections.insert(
                    cid,
                    CollectionInfo {
                        sid,
                        name: cname.to_string(),
                    },
                );
                scope_collections.push(CollectionEntry {
                    id: cid,
                    max_ttl_secs,
                });
            }

            manifest.scopes.insert(
                sid,
                Scope {
                    name: name.to_string(),
                    collections: scope_collections,
                },
            );
        }

        // uid 0 is reserved for the epoch state; anything else at uid 0
        // is damage. Past that, the default scope must always exist.
        if uid == ManifestUid::EPOCH && !manifest.is_epoch() {
            return Err(invalid(
                "uid of 0 but not the expected 'epoch' manifest".to_string(),
            ));
        } else if manifest.scopes.is_empty() {
            return Err(invalid("no scopes were defined in the manifest".to_string()));
        } else if !manifest.scopes.contains_key(&ScopeId::DEFAULT) {
            return Err(invalid("the default scope was not defined".to_string()));
        }

        debug!(uid = %manifest.uid, scopes = manifest.scopes.len(), "parsed manifest");
        Ok(manifest)
    }

    /// The manifest version.
    pub fn uid(&self) -> ManifestUid {
        self.uid
    }

    /// True when this is the distinguished initial manifest.
    pub fn is_epoch(&self) -> bool {
        self.uid == ManifestUid::EPOCH
            && self.scopes.len() == 1
            && self.collections.len() == 1
            && self.default_collection_exists
            && self
                .scopes
                .get(&ScopeId::DEFAULT)
                .map_or(false, |s| s.name == DEFAULT_SCOPE_NAME)
    }

    /// True when the default collection has not been dropped.
    pub fn default_collection_exists(&self) -> bool {
        self.default_collection_exists
    }

    /// Iterate scopes in ascending id order.
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().map(|(sid, scope)| (*sid, scope))
    }

    /// Look up one scope by id.
    pub fn scope(&self, sid: ScopeId) -> Option<&Scope> {
        self.scopes.get(&sid)
    }

    /// Iterate collections in ascending id order as (id, owner, name).
    pub fn collections(&self) -> impl Iterator<Item = (CollectionId, ScopeId, &str)> {
        self.collections
            .iter()
            .map(|(cid, info)| (*cid, info.sid, info.name.as_str()))
    }

    /// The name of a collection, if defined.
    pub fn collection_name(&self, cid: CollectionId) -> Option<&str> {
        self.collections.get(&cid).map(|info| info.name.as_str())
    }

    /// Resolve the scope component of a dotted `scope.collection` path.
    ///
    /// An empty scope component denotes the default scope. A
    /// syntactically invalid component is an error; a valid but unknown
    /// name resolves to `None`.
    pub fn get_scope_id(&self, path: &str) -> Result<Option<ScopeId>, ManifestError> {
        let scope = path.split_once('.').map_or(path, |(s, _)| s);
        let scope = if scope.is_empty() { DEFAULT_SCOPE_NAME } else { scope };
        if !valid_name(scope) {
            return Err(ManifestError::InvalidPath {
                kind: "scope",
                name: scope.to_string(),
            });
        }
        Ok(self
            .scopes
            .iter()
            .find(|(_, s)| s.name == scope)
            .map(|(sid, _)| *sid))
    }

    /// Resolve the collection component of a dotted `scope.collection`
    /// path within an already-resolved scope.
    ///
    /// An empty collection component denotes the default collection.
    /// The scope must exist (callers resolve it first via
    /// [`Manifest::get_scope_id`]); an unknown scope id is an error.
    pub fn get_collection_id(
        &self,
        scope: ScopeId,
        path: &str,
    ) -> Result<Option<CollectionId>, ManifestError> {
        let collection = path.split_once('.').map_or(path, |(_, c)| c);
        let collection = if collection.is_empty() {
            DEFAULT_COLLECTION_NAME
        } else {
            collection
        };
        if !valid_name(collection) {
            return Err(ManifestError::InvalidPath {
                kind: "collection",
                name: collection.to_string(),
            });
        }
        let scope_entry = self
            .scopes
            .get(&scope)
            .ok_or(ManifestError::UnknownScope { sid: scope })?;
        for entry in &scope_entry.collections {
            if let Some(info) = self.collections.get(&entry.id) {
                if info.name == collection {
                    return Ok(Some(entry.id));
                }
            }
        }
        Ok(None)
    }

    /// The scope owning a collection, if the collection is defined.
    pub fn scope_for_collection(&self, cid: CollectionId) -> Option<ScopeId> {
        if cid.is_default() && self.default_collection_exists {
            return Some(ScopeId::DEFAULT);
        }
        self.collections.get(&cid).map(|info| info.sid)
    }

    /// Check whether `successor` may replace this manifest.
    ///
    /// A successor must carry a uid at least as large. With an equal
    /// uid the manifests must be identical; with a greater uid, every
    /// scope id that survives must keep its name and every collection
    /// id that survives must keep its name and owning scope. Removals
    /// and additions are fine.
    pub fn is_successor(&self, successor: &Manifest) -> Result<(), ManifestError> {
        if successor.uid > self.uid {
            for (sid, scope) in &self.scopes {
                if let Some(other) = successor.scopes.get(sid) {
                    if scope.name != other.name {
                        return Err(ManifestError::NotSuccessor {
                            reason: format!(
                                "invalid name change detected on scope sid: {sid}, name: {}, \
                                 new-name: {}",
                                scope.name, other.name
                            ),
                        });
                    }
                }
                // A removed sid is fine.
            }
            for (cid, info) in &self.collections {
                if let Some(other) = successor.collections.get(cid) {
                    if info != other {
                        return Err(ManifestError::NotSuccessor {
                            reason: format!(
                                "invalid collection change detected cid: {cid}, name: {}, \
                                 sid: {}, new-name: {}, new-sid: {}",
                                info.name, info.sid, other.name, other.sid
                            ),
                        });
                    }
                }
                // A removed cid is fine.
            }
            Ok(())
        } else if successor.uid == self.uid {
            if self == successor {
                Ok(())
            } else {
                Err(ManifestError::NotSuccessor {
                    reason: "equal uid but not an equal manifest".to_string(),
                })
            }
        } else {
            Err(ManifestError::NotSuccessor {
                reason: format!(
                    "uid must be >= current-uid: {}, new-uid: {}",
                    self.uid, successor.uid
                ),
            })
        }
    }

    /// Serialise to the manifest document form, filtered by a
    /// visibility predicate (`is_visible(scope, None)` asks about the
    /// scope itself).
    ///
    /// A scope is emitted when it is visible or still has a visible
    /// collection. The output uses a stable ascending-id ordering, so
    /// two equivalent manifests serialise identically.
    pub fn to_json<F>(&self, is_visible: F) -> Value
    where
        F: Fn(ScopeId, Option<CollectionId>) -> bool,
    {
        let mut scopes = Vec::new();
        for (sid, scope) in &self.scopes {
            let scope_visible = is_visible(*sid, None);
            let mut collections = Vec::new();
            for entry in &scope.collections {
                if is_visible(*sid, Some(entry.id)) {
                    let mut obj = json!({
                        "name": self.collections[&entry.id].name,
                        "uid": format!("{:x}", entry.id.as_u32()),
                    });
                    if let Some(ttl) = entry.max_ttl_secs {
                        obj["maxTTL"] = json!(ttl);
                    }
                    collections.push(obj);
                }
            }
            if !collections.is_empty() || scope_visible {
                scopes.push(json!({
                    "name": scope.name,
                    "uid": format!("{:x}", sid.as_u32()),
                    "collections": collections,
                }));
            }
        }
        json!({
            "uid": format!("{:x}", self.uid.as_u64()),
            "scopes": scopes,
        })
    }

    /// Summary counters for the stats surface.
    pub fn stats(&self) -> ManifestStats {
        ManifestStats {
            uid: self.uid.as_u64(),
            num_scopes: self.scopes.len(),
            num_collections: self.collections.len(),
        }
    }

    /// Per-collection stats rows, filtered by the same visibility
    /// predicate as [`Manifest::to_json`] (permits RBAC filtering of
    /// the stats surface).
    pub fn collection_stats<F>(&self, is_visible: F) -> Vec<CollectionStatsEntry>
    where
        F: Fn(ScopeId, Option<CollectionId>) -> bool,
    {
        let mut rows = Vec::new();
        for (sid, scope) in &self.scopes {
            for entry in &scope.collections {
                if is_visible(*sid, Some(entry.id)) {
                    rows.push(CollectionStatsEntry {
                        sid: *sid,
                        cid: entry.id,
                        name: self.collections[&entry.id].name.clone(),
                        max_ttl_secs: entry.max_ttl_secs,
                    });
                }
            }
        }
        rows
    }
}

fn invalid(reason: String) -> ManifestError {
    ManifestError::InvalidManifest { reason }
}

fn get_key<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Value, ManifestError> {
    obj.get(key)
        .ok_or_else(|| invalid(format!("missing key: {key}")))
}

fn get_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, ManifestError> {
    get_key(obj, key)?
        .as_str()
        .ok_or_else(|| invalid(format!("key {key} must be a string")))
}

fn get_array<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>, ManifestError> {
    get_key(obj, key)?
        .as_array()
        .ok_or_else(|| invalid(format!("key {key} must be an array")))
}
