//! The kind registry: what the cluster serves, and where.
//!
//! The registry is the single piece of shared mutable state in the client.
//! It is populated by [`Discovery`][crate::Discovery] at bootstrap and kept
//! in sync with the cluster's CustomResourceDefinitions afterwards, and is
//! read by the [`Convertor`][crate::Convertor] on every operation.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::{Error, Result};

/// Everything the client knows about one full kind.
///
/// A *full kind* is `<group>.<kind>` for grouped resources and the bare
/// `<kind>` for the core group, e.g. `apps.Deployment` vs `Pod`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct KindDescriptor {
    /// Singular PascalCase name of the resource (the document's `kind`)
    pub kind: String,
    /// Resource name / plural name, the lowercase URL segment
    pub plural: String,
    /// Resource group, empty for the core group
    pub group: String,
    /// Group version
    pub version: String,
    /// Whether the resource is namespaced or not
    pub namespaced: bool,
    /// Absolute base URL up to and including `/api/<v>` or `/apis/<g>/<v>`,
    /// without a trailing slash
    pub api_prefix: String,
    /// Verbs the apiserver reported for this resource
    pub verbs: Vec<String>,
}

impl KindDescriptor {
    /// The apiVersion string used in a document of this kind
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

#[derive(Default)]
struct Inner {
    /// fullKind -> descriptor
    descriptors: HashMap<String, KindDescriptor>,
    /// shortKind -> every fullKind it may refer to
    short_kinds: HashMap<String, Vec<String>>,
}

/// Mapping store from kinds to the information needed to build URLs for them.
///
/// Lookups take a read lock and return an owned snapshot; mutations take the
/// write lock. The lock is never held across an await point.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Create an empty registry.
    ///
    /// Normally filled by [`Discovery`][crate::Discovery]; tests seed it
    /// directly through [`Registry::put_kind`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the descriptor for `full_kind`.
    ///
    /// Idempotent: re-registering the same kind updates the descriptor and
    /// leaves the short kind index without duplicates.
    pub fn put_kind(&self, full_kind: &str, descriptor: KindDescriptor) {
        let mut inner = self.inner.write();
        let listed = inner
            .short_kinds
            .entry(descriptor.kind.clone())
            .or_default();
        if !listed.iter().any(|k| k == full_kind) {
            listed.push(full_kind.to_string());
        }
        inner.descriptors.insert(full_kind.to_string(), descriptor);
    }

    /// Unregister `full_kind`, dropping the short kind index entry when its
    /// candidate list becomes empty.
    pub fn remove_full_kind(&self, short_kind: &str, full_kind: &str) {
        let mut inner = self.inner.write();
        inner.descriptors.remove(full_kind);
        let emptied = match inner.short_kinds.get_mut(short_kind) {
            Some(listed) => {
                listed.retain(|k| k != full_kind);
                listed.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.short_kinds.remove(short_kind);
        }
    }

    /// Resolve a short kind to its single full kind.
    ///
    /// Fails with [`Error::AmbiguousKind`] when several groups serve the same
    /// kind name; callers must then pass the full kind explicitly.
    pub fn full_kind_of(&self, short_kind: &str) -> Result<String> {
        let inner = self.inner.read();
        match inner.short_kinds.get(short_kind) {
            Some(listed) if listed.len() == 1 => Ok(listed[0].clone()),
            Some(listed) if !listed.is_empty() => {
                let mut candidates = listed.clone();
                candidates.sort();
                Err(Error::AmbiguousKind {
                    kind: short_kind.to_string(),
                    candidates,
                })
            }
            _ => Err(Error::UnknownKind(short_kind.to_string())),
        }
    }

    /// Look up the descriptor for a full kind.
    pub fn descriptor(&self, full_kind: &str) -> Result<KindDescriptor> {
        self.inner
            .read()
            .descriptors
            .get(full_kind)
            .cloned()
            .ok_or_else(|| Error::UnknownKind(full_kind.to_string()))
    }

    /// Resolve user kind input: anything containing a `.` is taken as a full
    /// kind, everything else as a short kind.
    pub fn resolve(&self, kind: &str) -> Result<KindDescriptor> {
        if kind.contains('.') {
            self.descriptor(kind)
        } else {
            self.descriptor(&self.full_kind_of(kind)?)
        }
    }

    /// Every known short kind, sorted and deduplicated.
    pub fn kinds(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut kinds: Vec<String> = inner.descriptors.values().map(|d| d.kind.clone()).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Every known full kind, sorted.
    pub fn full_kinds(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut kinds: Vec<String> = inner.descriptors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// A consistent (fullKind, descriptor) snapshot, sorted by full kind.
    pub fn snapshot(&self) -> Vec<(String, KindDescriptor)> {
        let inner = self.inner.read();
        let mut all: Vec<_> = inner
            .descriptors
            .iter()
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of registered full kinds.
    pub fn len(&self) -> usize {
        self.inner.read().descriptors.len()
    }

    /// Whether any kind has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.inner.read().descriptors.is_empty()
    }
}
