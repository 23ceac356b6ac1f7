//! Construction from the environment a pod runs in.

use std::env;

/// Environment variable holding the apiserver host inside a pod
pub const SERVICE_HOSTENV: &str = "KUBERNETES_SERVICE_HOST";
/// Environment variable holding the apiserver port inside a pod
pub const SERVICE_PORTENV: &str = "KUBERNETES_SERVICE_PORT";
pub(crate) const SERVICE_TOKENFILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub(crate) const SERVICE_CERTFILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
pub(crate) const SERVICE_DEFAULT_NS: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Returns the apiserver address from the service environment variables.
pub fn kube_server() -> Option<String> {
    let host = env::var(SERVICE_HOSTENV).ok()?;
    let port = env::var(SERVICE_PORTENV).ok()?;
    Some(format!("https://{}:{}", host, port))
}
