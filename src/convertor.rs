//! URL construction over the registry.
//!
//! The convertor is pure: given registry state and either a JSON document or
//! a (kind, namespace, name) triple it produces the exact URL for an
//! operation. It performs no I/O; the only failures are registry misses and
//! argument validation.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    registry::{KindDescriptor, Registry},
    Error, Result,
};

/// Appended verbatim to every watch URL. The timeout effectively disables
/// server-side connection expiry (~10 years).
const WATCH_QUERY: &str = "?watch=true&timeoutSeconds=315360000";

/// Namespace a document is assumed to live in when `metadata.namespace`
/// is absent and no cluster default overrides it.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Optional query parameters for list calls.
///
/// Parameters are appended in a fixed order: `kind`, `limit` (when
/// positive), `continue`, `fieldSelector`, `labelSelector`.
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Filter by kind name. Off by default; the apiserver does not require it.
    pub kind: Option<String>,
    /// Page size; 0 means unpaged
    pub limit: u32,
    /// Continuation token from a previous paged list response
    pub continue_token: Option<String>,
    /// Field selector expression, e.g. `status.phase=Running`
    pub field_selector: Option<String>,
    /// Label selector expression, e.g. `app=nginx`
    pub label_selector: Option<String>,
}

impl ListOptions {
    fn query(&self) -> String {
        let mut params = Vec::new();
        if let Some(kind) = &self.kind {
            params.push(format!("kind={}", kind));
        }
        if self.limit > 0 {
            params.push(format!("limit={}", self.limit));
        }
        if let Some(token) = &self.continue_token {
            params.push(format!("continue={}", token));
        }
        if let Some(fields) = &self.field_selector {
            params.push(format!("fieldSelector={}", fields));
        }
        if let Some(labels) = &self.label_selector {
            params.push(format!("labelSelector={}", labels));
        }
        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

/// Builds operation URLs from registry state.
#[derive(Clone)]
pub struct Convertor {
    registry: Arc<Registry>,
    default_namespace: String,
}

impl Convertor {
    /// Construct over a shared registry, using `default_namespace` for
    /// documents that carry no `metadata.namespace`.
    pub fn new(registry: Arc<Registry>, default_namespace: impl Into<String>) -> Self {
        Self {
            registry,
            default_namespace: default_namespace.into(),
        }
    }

    /// URL to POST a new resource described by `doc`.
    pub fn create_url(&self, doc: &Value) -> Result<String> {
        let desc = self.registry.descriptor(&doc_full_kind(doc)?)?;
        Ok(format!(
            "{}{}/{}",
            desc.api_prefix,
            namespace_segment(desc.namespaced, &self.doc_namespace(doc)),
            desc.plural
        ))
    }

    /// URL to POST a `Binding` document: the scheduling endpoint under the
    /// target pod.
    pub fn binding_url(&self, doc: &Value) -> Result<String> {
        let desc = self.registry.descriptor(&doc_full_kind(doc)?)?;
        let name = doc_name(doc)?;
        Ok(format!(
            "{}{}/pods/{}/binding",
            desc.api_prefix,
            namespace_segment(desc.namespaced, &self.doc_namespace(doc)),
            name
        ))
    }

    /// URL of a single named resource, used for GET.
    pub fn get_url(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
        self.item_url(kind, namespace, name)
    }

    /// URL of a single named resource, used for PUT.
    pub fn update_url(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
        self.item_url(kind, namespace, name)
    }

    /// URL of a single named resource, used for DELETE.
    pub fn delete_url(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
        self.item_url(kind, namespace, name)
    }

    /// URL of the `/status` subresource of a named resource.
    pub fn update_status_url(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
        Ok(format!("{}/status", self.item_url(kind, namespace, name)?))
    }

    /// Collection URL for a kind; an empty namespace means all namespaces
    /// (or the whole cluster for cluster-scoped kinds).
    pub fn list_url(&self, kind: &str, namespace: &str) -> Result<String> {
        let desc = self.resolve(kind)?;
        Ok(format!(
            "{}{}/{}",
            desc.api_prefix,
            namespace_segment(desc.namespaced, namespace),
            desc.plural
        ))
    }

    /// Collection URL with list query parameters appended.
    pub fn list_url_with(&self, kind: &str, namespace: &str, options: &ListOptions) -> Result<String> {
        Ok(format!("{}{}", self.list_url(kind, namespace)?, options.query()))
    }

    /// Streaming watch URL for a single named resource.
    pub fn watch_one_url(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
        let desc = self.resolve(kind)?;
        let name = require("name", name)?;
        Ok(format!(
            "{}/watch{}/{}/{}{}",
            desc.api_prefix,
            namespace_segment(desc.namespaced, namespace),
            desc.plural,
            name,
            WATCH_QUERY
        ))
    }

    /// Streaming watch URL for a whole collection.
    pub fn watch_all_url(&self, kind: &str, namespace: &str) -> Result<String> {
        let desc = self.resolve(kind)?;
        Ok(format!(
            "{}/watch{}/{}{}",
            desc.api_prefix,
            namespace_segment(desc.namespaced, namespace),
            desc.plural,
            WATCH_QUERY
        ))
    }

    /// The namespace a document addresses, falling back to the configured
    /// default when `metadata.namespace` is absent.
    pub fn doc_namespace(&self, doc: &Value) -> String {
        doc.pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_namespace)
            .to_string()
    }

    fn item_url(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
        let desc = self.resolve(kind)?;
        let name = require("name", name)?;
        Ok(format!(
            "{}{}/{}/{}",
            desc.api_prefix,
            namespace_segment(desc.namespaced, namespace),
            desc.plural,
            name
        ))
    }

    fn resolve(&self, kind: &str) -> Result<KindDescriptor> {
        self.registry.resolve(require("kind", kind)?)
    }
}

fn namespace_segment(namespaced: bool, namespace: &str) -> String {
    if namespaced && !namespace.is_empty() {
        format!("/namespaces/{}", namespace)
    } else {
        String::new()
    }
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        Err(Error::RequestValidation(format!("{} must not be empty", field)))
    } else {
        Ok(value)
    }
}

/// The `kind` field of a document.
pub(crate) fn doc_kind(doc: &Value) -> Result<&str> {
    doc.get("kind")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::RequestValidation("document has no kind".to_string()))
}

/// The `apiVersion` field of a document.
pub(crate) fn doc_api_version(doc: &Value) -> Result<&str> {
    doc.get("apiVersion")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::RequestValidation("document has no apiVersion".to_string()))
}

/// The full kind a document refers to: `<group>.<kind>` when `apiVersion`
/// carries a group, the bare `kind` for the core group.
pub(crate) fn doc_full_kind(doc: &Value) -> Result<String> {
    let kind = doc_kind(doc)?;
    Ok(match doc_api_version(doc)?.split_once('/') {
        Some((group, _version)) => format!("{}.{}", group, kind),
        None => kind.to_string(),
    })
}

/// The `metadata.name` of a document.
pub(crate) fn doc_name(doc: &Value) -> Result<&str> {
    doc.pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::RequestValidation("document has no metadata.name".to_string()))
}
