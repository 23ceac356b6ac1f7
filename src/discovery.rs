//! Runtime API discovery: crawling what the cluster serves.
//!
//! The crawl walks the core group at `/api/v1` and every group under
//! `/apis` at its preferred version, writing a complete descriptor per
//! served resource into the registry. The CRD watcher reuses the targeted
//! variant to register kinds the moment their definition appears.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    executor::Executor,
    registry::{KindDescriptor, Registry},
    Result,
};

/// Crawls the discovery endpoints and populates the registry.
#[derive(Clone)]
pub struct Discovery {
    executor: Executor,
    registry: Arc<Registry>,
}

#[derive(Deserialize)]
struct ApiGroupList {
    #[serde(default)]
    groups: Vec<ApiGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGroup {
    name: String,
    preferred_version: GroupVersionForDiscovery,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupVersionForDiscovery {
    group_version: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResourceList {
    group_version: String,
    #[serde(default)]
    resources: Vec<ApiResourceEntry>,
}

#[derive(Deserialize)]
struct ApiResourceEntry {
    name: String,
    kind: String,
    namespaced: bool,
    #[serde(default)]
    verbs: Vec<String>,
}

impl Discovery {
    pub(crate) fn new(executor: Executor, registry: Arc<Registry>) -> Self {
        Self { executor, registry }
    }

    /// Run the full crawl: the core group, then every group under `/apis`.
    ///
    /// Core discovery failures abort the bootstrap; a single unreachable
    /// group (stale aggregated APIs are common) is logged and skipped.
    pub async fn run(&self) -> Result<()> {
        self.register_path("api/v1").await?;

        let url = format!("{}/apis", self.executor.master_url());
        let groups: ApiGroupList = serde_json::from_value(self.executor.get(&url).await?)?;
        for group in groups.groups {
            let group_version = group.preferred_version.group_version;
            if let Err(err) = self.register_path(&format!("apis/{}", group_version)).await {
                warn!(group = %group.name, %err, "failed to register API group");
            }
        }
        debug!(kinds = self.registry.len(), "discovery complete");
        Ok(())
    }

    /// Register every kind served at `/apis/<group>/<version>`.
    pub async fn register_group_version(&self, group: &str, version: &str) -> Result<()> {
        self.register_path(&format!("apis/{}/{}", group, version))
            .await
    }

    async fn register_path(&self, path: &str) -> Result<()> {
        let url = format!("{}/{}", self.executor.master_url(), path);
        let list: ApiResourceList = serde_json::from_value(self.executor.get(&url).await?)?;
        let count = register_resources(&self.registry, &url, list);
        debug!(%url, count, "registered kinds");
        Ok(())
    }
}

/// Write one descriptor per top-level resource in `list` into the registry.
///
/// Entries whose name contains a `/` are subresources (`pods/status`,
/// `deployments/scale`) and are skipped. Returns the number registered.
fn register_resources(registry: &Registry, api_prefix: &str, list: ApiResourceList) -> usize {
    let (group, version) = match list.group_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), list.group_version.clone()),
    };

    let mut count = 0;
    for resource in list.resources {
        if resource.name.contains('/') {
            continue;
        }
        let full_kind = if group.is_empty() {
            resource.kind.clone()
        } else {
            format!("{}.{}", group, resource.kind)
        };
        registry.put_kind(
            &full_kind,
            KindDescriptor {
                kind: resource.kind,
                plural: resource.name,
                group: group.clone(),
                version: version.clone(),
                namespaced: resource.namespaced,
                api_prefix: api_prefix.to_string(),
                verbs: resource.verbs,
            },
        );
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convertor::Convertor;
    use serde_json::json;

    const HOST: &str = "https://host:6443";

    fn core_list() -> ApiResourceList {
        serde_json::from_value(json!({
            "kind": "APIResourceList",
            "groupVersion": "v1",
            "resources": [
                {"name": "pods", "singularName": "", "namespaced": true, "kind": "Pod",
                 "verbs": ["create", "delete", "get", "list", "watch"]},
                {"name": "pods/status", "singularName": "", "namespaced": true, "kind": "Pod",
                 "verbs": ["get", "patch", "update"]},
                {"name": "nodes", "singularName": "", "namespaced": false, "kind": "Node",
                 "verbs": ["create", "delete", "get", "list", "watch"]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn core_resources_register_with_bare_full_kinds() {
        let registry = Registry::new();
        let count = register_resources(&registry, &format!("{}/api/v1", HOST), core_list());
        assert_eq!(count, 2, "the pods/status subresource is skipped");

        let pod = registry.descriptor("Pod").unwrap();
        assert_eq!(pod.plural, "pods");
        assert_eq!(pod.group, "");
        assert_eq!(pod.version, "v1");
        assert!(pod.namespaced);
        assert_eq!(pod.api_prefix, "https://host:6443/api/v1");
        assert!(pod.verbs.contains(&"watch".to_string()));

        assert!(!registry.descriptor("Node").unwrap().namespaced);
    }

    #[test]
    fn grouped_resources_register_with_qualified_full_kinds() {
        let registry = Registry::new();
        let list: ApiResourceList = serde_json::from_value(json!({
            "kind": "APIResourceList",
            "groupVersion": "apps/v1",
            "resources": [
                {"name": "deployments", "namespaced": true, "kind": "Deployment",
                 "verbs": ["create", "get", "list", "watch"]},
                {"name": "deployments/scale", "namespaced": true, "kind": "Scale", "verbs": ["get"]}
            ]
        }))
        .unwrap();
        register_resources(&registry, &format!("{}/apis/apps/v1", HOST), list);

        assert_eq!(registry.full_kinds(), vec!["apps.Deployment"]);
        let desc = registry.descriptor("apps.Deployment").unwrap();
        assert_eq!(desc.group, "apps");
        assert_eq!(desc.api_version(), "apps/v1");
    }

    #[test]
    fn registration_enables_url_construction() {
        // the ADDED leg of the CRD flow: once /apis/example.com/v1 has been
        // crawled, documents of the new kind convert to URLs
        let registry = Arc::new(Registry::new());
        let list: ApiResourceList = serde_json::from_value(json!({
            "groupVersion": "example.com/v1",
            "resources": [
                {"name": "foos", "namespaced": true, "kind": "Foo", "verbs": ["create", "get"]}
            ]
        }))
        .unwrap();
        register_resources(&registry, &format!("{}/apis/example.com/v1", HOST), list);

        let convertor = Convertor::new(registry, "default");
        let doc = json!({
            "apiVersion": "example.com/v1",
            "kind": "Foo",
            "metadata": {"name": "bar", "namespace": "ns1"}
        });
        assert_eq!(
            convertor.create_url(&doc).unwrap(),
            "https://host:6443/apis/example.com/v1/namespaces/ns1/foos"
        );
    }

    #[test]
    fn group_list_parses() {
        let groups: ApiGroupList = serde_json::from_value(json!({
            "kind": "APIGroupList",
            "groups": [
                {"name": "apps",
                 "versions": [{"groupVersion": "apps/v1", "version": "v1"}],
                 "preferredVersion": {"groupVersion": "apps/v1", "version": "v1"}}
            ]
        }))
        .unwrap();
        assert_eq!(groups.groups.len(), 1);
        assert_eq!(groups.groups[0].preferred_version.group_version, "apps/v1");
    }
}
