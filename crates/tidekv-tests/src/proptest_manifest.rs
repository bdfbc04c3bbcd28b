//! Property-based tests for the collections manifest.

use proptest::prelude::*;
use serde_json::{json, Value};

/// A randomly shaped but always-valid manifest layout: the default
/// scope (optionally holding the default collection) plus extra scopes
/// with disjoint collection id sets. Names are derived from ids, which
/// keeps them valid and unique by construction.
#[derive(Debug, Clone)]
pub struct ManifestLayout {
    /// Manifest uid (nonzero; zero is only legal for the epoch).
    pub uid: u64,
    /// Whether the default collection is present.
    pub has_default_collection: bool,
    /// (scope id, collection ids) for the non-default scopes.
    pub scopes: Vec<(u32, Vec<u32>)>,
    /// Collections in the default scope (besides the default one).
    pub default_scope_collections: Vec<u32>,
}

impl ManifestLayout {
    /// Render the layout as a manifest document.
    pub fn to_doc(&self) -> Value {
        let mut scopes = Vec::new();

        let mut default_collections = Vec::new();
        if self.has_default_collection {
            default_collections.push(json!({"uid": "0", "name": "_default"}));
        }
        for cid in &self.default_scope_collections {
            default_collections.push(json!({
                "uid": format!("{cid:x}"),
                "name": format!("c{cid:x}"),
            }));
        }
        scopes.push(json!({
            "uid": "0",
            "name": "_default",
            "collections": default_collections,
        }));

        for (sid, cids) in &self.scopes {
            let collections: Vec<Value> = cids
                .iter()
                .map(|cid| {
                    json!({
                        "uid": format!("{cid:x}"),
                        "name": format!("c{cid:x}"),
                        "maxTTL": cid % 1000,
                    })
                })
                .collect();
            scopes.push(json!({
                "uid": format!("{sid:x}"),
                "name": format!("s{sid:x}"),
                "collections": collections,
            }));
        }

        json!({"uid": format!("{:x}", self.uid), "scopes": scopes})
    }
}

/// Generator for valid manifest layouts.
pub fn arb_layout() -> impl Strategy<Value = ManifestLayout> {
    (
        1u64..1_000_000,
        any::<bool>(),
        proptest::collection::btree_set(2u32..500, 0..4),
        proptest::collection::btree_set(2u32..10_000, 0..8),
    )
        .prop_map(|(uid, has_default_collection, scope_ids, coll_ids)| {
            let scope_ids: Vec<u32> = scope_ids.into_iter().collect();
            let coll_ids: Vec<u32> = coll_ids.into_iter().collect();

            // Deal collections round-robin over the scopes, slot 0
            // being the default scope.
            let mut scopes: Vec<(u32, Vec<u32>)> =
                scope_ids.iter().map(|sid| (*sid, Vec::new())).collect();
            let mut default_scope_collections = Vec::new();
            for (idx, cid) in coll_ids.into_iter().enumerate() {
                let slot = idx % (scopes.len() + 1);
                if slot == 0 {
                    default_scope_collections.push(cid);
                } else {
                    scopes[slot - 1].1.push(cid);
                }
            }
            ManifestLayout {
                uid,
                has_default_collection,
                scopes,
                default_scope_collections,
            }
        })
}
