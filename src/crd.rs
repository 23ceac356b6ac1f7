//! The CRD bootstrap watcher.
//!
//! A watch session on `CustomResourceDefinition` that grows and shrinks the
//! registry with the cluster: a freshly created CRD makes its kinds
//! addressable without a restart, a deleted one makes the next lookup fail.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::{client::Client, watch::WatchHandler, Error};

/// The full kind the bootstrap watch binds to.
pub(crate) const CRD_FULL_KIND: &str = "apiextensions.k8s.io.CustomResourceDefinition";

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Keeps the registry in sync with the cluster's CRD set.
pub(crate) struct CrdWatcher {
    client: Client,
}

impl CrdWatcher {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

/// `spec.group` and the first served version of a CRD document.
fn crd_group_version(crd: &Value) -> Option<(String, String)> {
    let group = crd.pointer("/spec/group")?.as_str()?;
    let version = crd.pointer("/spec/versions/0/name")?.as_str()?;
    Some((group.to_string(), version.to_string()))
}

/// The (shortKind, fullKind) pair a CRD document defines.
fn crd_kind_names(crd: &Value) -> Option<(String, String)> {
    let group = crd.pointer("/spec/group")?.as_str()?;
    let short_kind = crd.pointer("/spec/names/kind")?.as_str()?;
    Some((short_kind.to_string(), format!("{}.{}", group, short_kind)))
}

#[async_trait]
impl WatchHandler for CrdWatcher {
    async fn on_added(&self, obj: Value) {
        let Some((group, version)) = crd_group_version(&obj) else {
            warn!("CRD event without spec.group or spec.versions, ignoring");
            return;
        };
        // registration failures must not poison the control loop
        match self
            .client
            .discovery()
            .register_group_version(&group, &version)
            .await
        {
            Ok(()) => info!(%group, %version, "registered kinds for CRD"),
            Err(err) => warn!(%group, %version, %err, "failed to register kinds for new CRD"),
        }
    }

    async fn on_modified(&self, _obj: Value) {}

    async fn on_deleted(&self, obj: Value) {
        let Some((short_kind, full_kind)) = crd_kind_names(&obj) else {
            warn!("CRD event without spec.names.kind, ignoring");
            return;
        };
        self.client.registry().remove_full_kind(&short_kind, &full_kind);
        info!(kind = %short_kind, "unregistered kind");
    }

    async fn on_close(&self, err: Error) {
        warn!(%err, "CRD watch closed, re-establishing");
        let handler: Arc<dyn WatchHandler> = Arc::new(CrdWatcher::new(self.client.clone()));
        loop {
            match self
                .client
                .watch_resources(CRD_FULL_KIND, "", handler.clone())
                .await
            {
                Ok(_handle) => break,
                Err(err) => {
                    warn!(%err, "CRD watch reconnect failed, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, registry::KindDescriptor, registry::Registry};
    use serde_json::json;

    fn crd_doc() -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "foos.example.com"},
            "spec": {
                "group": "example.com",
                "names": {"kind": "Foo", "plural": "foos"},
                "scope": "Namespaced",
                "versions": [
                    {"name": "v1", "served": true, "storage": true},
                    {"name": "v2alpha1", "served": true, "storage": false}
                ]
            }
        })
    }

    #[test]
    fn group_and_first_version_are_extracted() {
        let (group, version) = crd_group_version(&crd_doc()).unwrap();
        assert_eq!(group, "example.com");
        // only the first array element counts, whatever else is served
        assert_eq!(version, "v1");
    }

    #[test]
    fn kind_names_are_extracted() {
        let (short_kind, full_kind) = crd_kind_names(&crd_doc()).unwrap();
        assert_eq!(short_kind, "Foo");
        assert_eq!(full_kind, "example.com.Foo");
    }

    #[test]
    fn malformed_crds_yield_nothing() {
        assert!(crd_group_version(&json!({"spec": {}})).is_none());
        assert!(crd_kind_names(&json!({})).is_none());
    }

    #[tokio::test]
    async fn deleted_crd_unregisters_its_kind() {
        let registry = Arc::new(Registry::new());
        registry.put_kind(
            "example.com.Foo",
            KindDescriptor {
                kind: "Foo".into(),
                plural: "foos".into(),
                group: "example.com".into(),
                version: "v1".into(),
                namespaced: true,
                api_prefix: "https://host:6443/apis/example.com/v1".into(),
                verbs: vec!["get".into()],
            },
        );
        let config = Config::with_token("https://host:6443", "test-token").unwrap();
        let client = Client::with_registry(config, registry).unwrap();

        let watcher = CrdWatcher::new(client.clone());
        watcher.on_deleted(crd_doc()).await;

        assert!(matches!(
            client.registry().descriptor("example.com.Foo"),
            Err(Error::UnknownKind(_))
        ));
        assert!(matches!(
            client.registry().full_kind_of("Foo"),
            Err(Error::UnknownKind(_))
        ));
    }
}
