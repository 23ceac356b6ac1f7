#![allow(missing_docs)]

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, Result};

/// [`Kubeconfig`] represents information on how to connect to a remote
/// Kubernetes cluster that is normally stored in `~/.kube/config`.
///
/// Exposed for convenience; load a [`Config`][crate::Config] for use with a
/// [`Client`][crate::Client].
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Kubeconfig {
    pub clusters: Vec<NamedCluster>,
    #[serde(rename = "users")]
    pub auth_infos: Vec<NamedAuthInfo>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: Option<String>,
}

/// NamedCluster associates name with cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

/// Cluster stores information to connect to a Kubernetes cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cluster {
    pub server: String,
    #[serde(rename = "insecure-skip-tls-verify")]
    pub insecure_skip_tls_verify: Option<bool>,
    #[serde(rename = "certificate-authority")]
    pub certificate_authority: Option<String>,
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: Option<String>,
}

/// NamedAuthInfo associates name with authentication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedAuthInfo {
    pub name: String,
    #[serde(rename = "user")]
    pub auth_info: AuthInfo,
}

/// AuthInfo stores information that tells the cluster who you are.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AuthInfo {
    pub username: Option<String>,
    pub password: Option<String>,

    pub token: Option<String>,
    #[serde(rename = "tokenFile")]
    pub token_file: Option<String>,

    #[serde(rename = "client-certificate")]
    pub client_certificate: Option<String>,
    #[serde(rename = "client-certificate-data")]
    pub client_certificate_data: Option<String>,

    #[serde(rename = "client-key")]
    pub client_key: Option<String>,
    #[serde(rename = "client-key-data")]
    pub client_key_data: Option<String>,
}

/// NamedContext associates name with context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

/// Context stores a tuple of cluster and user information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Context {
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
}

const KUBECONFIG: &str = "KUBECONFIG";

impl Kubeconfig {
    /// Read a kubeconfig from an arbitrary location.
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Kubeconfig> {
        let f = fs::File::open(&path).map_err(|source| ConfigError::ReadFile {
            path: path.as_ref().into(),
            source,
        })?;
        let config: Kubeconfig = serde_yaml::from_reader(f).map_err(ConfigError::ParseYaml)?;
        Ok(config)
    }

    /// Read a kubeconfig from `$KUBECONFIG` or the default location.
    pub fn read() -> Result<Kubeconfig> {
        let path = kubeconfig_path()
            .or_else(default_kube_path)
            .ok_or(ConfigError::NoKubeconfigPath)?;
        Self::read_from(path)
    }
}

/// Returns the kubeconfig path from the `KUBECONFIG` environment variable.
pub fn kubeconfig_path() -> Option<PathBuf> {
    env::var_os(KUBECONFIG).map(PathBuf::from)
}

/// Returns the kubeconfig path at `$HOME/.kube/config`.
pub fn default_kube_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".kube").join("config"))
}

/// Resolve PEM bytes from inline base64 data or a file path, preferring data.
pub(crate) fn data_or_file_with_base64<P: AsRef<Path>>(
    data: &Option<String>,
    file: &Option<P>,
) -> Result<Vec<u8>> {
    match (data, file) {
        (Some(d), _) => base64::engine::general_purpose::STANDARD
            .decode(d)
            .map_err(|e| ConfigError::Base64Decode(e).into()),
        (_, Some(f)) => fs::read(f).map_err(|source| {
            ConfigError::ReadFile {
                path: f.as_ref().into(),
                source,
            }
            .into()
        }),
        _ => Err(ConfigError::NoBase64FileOrData.into()),
    }
}

/// Resolve a string from inline data or a file path, preferring data.
pub(crate) fn data_or_file<P: AsRef<Path>>(data: &Option<String>, file: &Option<P>) -> Result<String> {
    match (data, file) {
        (Some(d), _) => Ok(d.to_string()),
        (_, Some(f)) => fs::read_to_string(f).map_err(|source| {
            ConfigError::ReadFile {
                path: f.as_ref().into(),
                source,
            }
            .into()
        }),
        _ => Err(ConfigError::NoBase64FileOrData.into()),
    }
}
