//! The user-facing client.
//!
//! A [`Client`] composes the registry, convertor, discovery, executor, and
//! watch engine behind the operation surface users actually call. It works
//! entirely on untyped [`serde_json::Value`] documents: the set of kinds it
//! can address is whatever the connected cluster serves, CRDs included.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    config::Config,
    convertor::{doc_full_kind, doc_name, Convertor, ListOptions},
    crd::{CrdWatcher, CRD_FULL_KIND},
    discovery::Discovery,
    executor::Executor,
    registry::Registry,
    watch::{self, WatchHandle, WatchHandler},
    Result,
};

struct Inner {
    executor: Executor,
    registry: Arc<Registry>,
    convertor: Convertor,
    discovery: Discovery,
}

/// Client for a Kubernetes-style REST/Watch API over untyped JSON documents.
///
/// Cheap to clone; clones share the registry and the pooled connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Connect, crawl the discovery endpoints, and start tracking CRDs.
    ///
    /// On return the registry holds every kind the cluster currently serves,
    /// and a background watch keeps it in sync as CustomResourceDefinitions
    /// come and go. If that watch cannot be established (e.g. missing watch
    /// permission on CRDs) the client still works with the bootstrap
    /// vocabulary; the failure is logged.
    pub async fn new(config: Config) -> Result<Self> {
        let client = Self::with_registry(config, Arc::new(Registry::new()))?;
        client.inner.discovery.run().await?;
        client.start_crd_watcher().await;
        Ok(client)
    }

    /// Build over a pre-seeded registry without any network I/O.
    ///
    /// No discovery runs and no CRD watch starts; the registry contents are
    /// entirely the caller's. Used by tests and by callers that manage the
    /// kind vocabulary themselves.
    pub fn with_registry(config: Config, registry: Arc<Registry>) -> Result<Self> {
        let convertor = Convertor::new(registry.clone(), config.default_namespace.clone());
        let executor = Executor::new(config)?;
        let discovery = Discovery::new(executor.clone(), registry.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                executor,
                registry,
                convertor,
                discovery,
            }),
        })
    }

    async fn start_crd_watcher(&self) {
        let handler: Arc<dyn WatchHandler> = Arc::new(CrdWatcher::new(self.clone()));
        match self.watch_resources(CRD_FULL_KIND, "", handler).await {
            // detach: the session lives until its stream closes, and the
            // handler re-establishes itself from on_close
            Ok(handle) => debug!(url = %handle.url(), "CRD bootstrap watch started"),
            Err(err) => warn!(%err, "CRD bootstrap watch unavailable"),
        }
    }

    /// POST a new resource described by `json`. The `status` subtree is
    /// stripped; the server owns status.
    pub async fn create_resource(&self, json: &Value) -> Result<Value> {
        let url = self.inner.convertor.create_url(json)?;
        self.inner.executor.post(&url, &strip_status(json)).await
    }

    /// PUT a full replacement of the resource described by `json`, minus its
    /// `status` subtree.
    pub async fn update_resource(&self, json: &Value) -> Result<Value> {
        let url = self.inner.convertor.update_url(
            &doc_full_kind(json)?,
            &self.inner.convertor.doc_namespace(json),
            doc_name(json)?,
        )?;
        self.inner.executor.put(&url, &strip_status(json)).await
    }

    /// PUT `json` to the resource's `/status` subresource.
    pub async fn update_resource_status(&self, json: &Value) -> Result<Value> {
        let url = self.inner.convertor.update_status_url(
            &doc_full_kind(json)?,
            &self.inner.convertor.doc_namespace(json),
            doc_name(json)?,
        )?;
        self.inner.executor.put(&url, json).await
    }

    /// GET one resource. An empty `namespace` addresses cluster scope.
    pub async fn get_resource(&self, kind: &str, namespace: &str, name: &str) -> Result<Value> {
        let url = self.inner.convertor.get_url(kind, namespace, name)?;
        self.inner.executor.get(&url).await
    }

    /// Whether the resource exists: [`Client::get_resource`] mapped to a
    /// boolean, with any error reading as absence.
    pub async fn has_resource(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.get_resource(kind, namespace, name).await.is_ok()
    }

    /// DELETE one resource.
    pub async fn delete_resource(&self, kind: &str, namespace: &str, name: &str) -> Result<Value> {
        let url = self.inner.convertor.delete_url(kind, namespace, name)?;
        self.inner.executor.delete(&url).await
    }

    /// DELETE the resource a document describes.
    pub async fn delete_resource_from(&self, json: &Value) -> Result<Value> {
        self.delete_resource(
            &doc_full_kind(json)?,
            &self.inner.convertor.doc_namespace(json),
            doc_name(json)?,
        )
        .await
    }

    /// List a collection. An empty `namespace` lists across all namespaces.
    pub async fn list_resources(&self, kind: &str, namespace: &str) -> Result<Value> {
        self.list_resources_with(kind, namespace, &ListOptions::default())
            .await
    }

    /// List a collection with selectors and paging.
    pub async fn list_resources_with(
        &self,
        kind: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Value> {
        let url = self.inner.convertor.list_url_with(kind, namespace, options)?;
        self.inner.executor.get(&url).await
    }

    /// Bind a pod to a node by POSTing a `Binding` document to the pod's
    /// `binding` subresource. This is what a scheduler does.
    pub async fn binding_resource(&self, pod: &Value, host: &str) -> Result<Value> {
        let binding = binding_document(pod, host, &self.inner.convertor)?;
        let url = self.inner.convertor.binding_url(&binding)?;
        self.inner.executor.post(&url, &binding).await
    }

    /// Watch one named resource. Events stream to `handler` from a
    /// background task until the connection closes.
    pub async fn watch_resource(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        handler: Arc<dyn WatchHandler>,
    ) -> Result<WatchHandle> {
        let url = self.inner.convertor.watch_one_url(kind, namespace, name)?;
        watch::spawn(self.inner.executor.clone(), url, handler).await
    }

    /// Watch a whole collection. An empty `namespace` watches everywhere.
    pub async fn watch_resources(
        &self,
        kind: &str,
        namespace: &str,
        handler: Arc<dyn WatchHandler>,
    ) -> Result<WatchHandle> {
        let url = self.inner.convertor.watch_all_url(kind, namespace)?;
        watch::spawn(self.inner.executor.clone(), url, handler).await
    }

    /// Every short kind the registry knows, sorted.
    pub fn kinds(&self) -> Vec<String> {
        self.inner.registry.kinds()
    }

    /// Every full kind the registry knows, sorted.
    pub fn full_kinds(&self) -> Vec<String> {
        self.inner.registry.full_kinds()
    }

    /// A JSON object describing every registered kind:
    /// fullKind to `{apiVersion, kind, plural, verbs}`.
    pub fn kind_descriptors(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (full_kind, desc) in self.inner.registry.snapshot() {
            map.insert(
                full_kind,
                json!({
                    "apiVersion": desc.api_version(),
                    "kind": desc.kind,
                    "plural": desc.plural,
                    "verbs": desc.verbs,
                }),
            );
        }
        Value::Object(map)
    }

    /// The shared kind registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// The URL convertor over this client's registry.
    pub fn convertor(&self) -> &Convertor {
        &self.inner.convertor
    }

    /// The discovery crawler; call [`Discovery::run`] to re-sync the
    /// registry with the cluster wholesale.
    pub fn discovery(&self) -> &Discovery {
        &self.inner.discovery
    }

    /// The request executor, for raw access to plumbing.
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }
}

/// A copy of `json` without its `status` subtree.
fn strip_status(json: &Value) -> Value {
    let mut doc = json.clone();
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("status");
    }
    doc
}

/// The `Binding` document POSTed to `pods/<name>/binding`:
/// the pod's coordinates plus a `Node` target.
fn binding_document(pod: &Value, host: &str, convertor: &Convertor) -> Result<Value> {
    let name = doc_name(pod)?;
    Ok(json!({
        "apiVersion": "v1",
        "kind": "Binding",
        "metadata": {
            "name": name,
            "namespace": convertor.doc_namespace(pod),
        },
        "target": {
            "apiVersion": "v1",
            "kind": "Node",
            "name": host,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KindDescriptor;
    use crate::Error;

    fn seeded_client() -> Client {
        let registry = Arc::new(Registry::new());
        registry.put_kind(
            "Pod",
            KindDescriptor {
                kind: "Pod".into(),
                plural: "pods".into(),
                group: String::new(),
                version: "v1".into(),
                namespaced: true,
                api_prefix: "https://host:6443/api/v1".into(),
                verbs: vec!["create".into(), "get".into(), "list".into(), "watch".into()],
            },
        );
        registry.put_kind(
            "Binding",
            KindDescriptor {
                kind: "Binding".into(),
                plural: "bindings".into(),
                group: String::new(),
                version: "v1".into(),
                namespaced: true,
                api_prefix: "https://host:6443/api/v1".into(),
                verbs: vec!["create".into()],
            },
        );
        let config = Config::with_token("https://host:6443", "test-token").unwrap();
        Client::with_registry(config, registry).unwrap()
    }

    #[test]
    fn strip_status_removes_only_status() {
        let doc = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "p"},
            "spec": {"nodeName": "n"},
            "status": {"phase": "Running"}
        });
        let stripped = strip_status(&doc);
        assert!(stripped.get("status").is_none());
        assert_eq!(stripped.pointer("/spec/nodeName").unwrap(), "n");
        // the input document is untouched
        assert!(doc.get("status").is_some());
    }

    #[test]
    fn strip_status_is_a_noop_without_status() {
        let doc = json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}});
        assert_eq!(strip_status(&doc), doc);
    }

    #[test]
    fn binding_document_shape() {
        let client = seeded_client();
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-0", "namespace": "prod"}
        });
        let binding = binding_document(&pod, "node-3", client.convertor()).unwrap();
        assert_eq!(binding["kind"], "Binding");
        assert_eq!(binding.pointer("/metadata/name").unwrap(), "web-0");
        assert_eq!(binding.pointer("/metadata/namespace").unwrap(), "prod");
        assert_eq!(binding.pointer("/target/kind").unwrap(), "Node");
        assert_eq!(binding.pointer("/target/name").unwrap(), "node-3");

        assert_eq!(
            client.convertor().binding_url(&binding).unwrap(),
            "https://host:6443/api/v1/namespaces/prod/pods/web-0/binding"
        );
    }

    #[test]
    fn binding_document_requires_a_pod_name() {
        let client = seeded_client();
        let pod = json!({"apiVersion": "v1", "kind": "Pod", "metadata": {}});
        assert!(matches!(
            binding_document(&pod, "node-3", client.convertor()),
            Err(Error::RequestValidation(_))
        ));
    }

    #[test]
    fn kind_listing() {
        let client = seeded_client();
        assert_eq!(client.kinds(), vec!["Binding", "Pod"]);
        assert_eq!(client.full_kinds(), vec!["Binding", "Pod"]);

        let descs = client.kind_descriptors();
        assert_eq!(descs.pointer("/Pod/plural").unwrap(), "pods");
        assert_eq!(descs.pointer("/Pod/apiVersion").unwrap(), "v1");
        assert!(descs
            .pointer("/Pod/verbs")
            .and_then(Value::as_array)
            .is_some_and(|verbs| verbs.iter().any(|v| v == "watch")));
    }
}
