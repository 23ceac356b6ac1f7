//! Cluster connection configuration.
//!
//! A [`Config`] carries the apiserver URL, the credential to present, and
//! the TLS material to trust. It can be built from a bearer token, basic
//! auth credentials, a kubeconfig file, or the in-cluster service account
//! environment, and converts into the `reqwest` client builder every
//! executor and watch session uses.

mod file_config;
pub mod incluster;

use base64::Engine;
use reqwest::{header, Certificate, Identity};

pub use file_config::{
    default_kube_path, kubeconfig_path, AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo,
    NamedCluster, NamedContext,
};

use crate::{error::ConfigError, Result};

const DEFAULT_NAMESPACE: &str = "default";

/// Client configuration: apiserver URL, credential, and TLS trust.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the apiserver, without a trailing slash
    pub cluster_url: String,
    /// The namespace documents are assumed to live in when they carry none.
    /// `default` unless the kubeconfig context or pod environment says otherwise.
    pub default_namespace: String,
    headers: header::HeaderMap,
    root_certs: Vec<Certificate>,
    identity: Option<Identity>,
    accept_invalid_certs: bool,
}

impl Config {
    fn bare(cluster_url: &str) -> Self {
        Self {
            cluster_url: cluster_url.trim_end_matches('/').to_string(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            headers: header::HeaderMap::new(),
            root_certs: Vec::new(),
            identity: None,
            accept_invalid_certs: false,
        }
    }

    /// Connect with a bearer token.
    ///
    /// Certificate verification is relaxed: token access is the road into
    /// clusters that only present their self-signed cert.
    pub fn with_token(cluster_url: &str, token: &str) -> Result<Self> {
        let mut config = Self::bare(cluster_url);
        config.set_bearer_token(token)?;
        config.accept_invalid_certs = true;
        Ok(config)
    }

    /// Connect with HTTP basic auth. Certificate verification is relaxed as
    /// for [`Config::with_token`].
    pub fn with_basic_auth(cluster_url: &str, username: &str, password: &str) -> Result<Self> {
        let mut config = Self::bare(cluster_url);
        config.set_basic_auth(username, password)?;
        config.accept_invalid_certs = true;
        Ok(config)
    }

    /// Build from a kubeconfig file at `path`, using its current context.
    pub fn from_kubeconfig(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_custom_kubeconfig(Kubeconfig::read_from(path)?)
    }

    /// Build from `$KUBECONFIG` or `~/.kube/config`.
    pub fn from_default_kubeconfig() -> Result<Self> {
        Self::from_custom_kubeconfig(Kubeconfig::read()?)
    }

    /// Build from an already-parsed [`Kubeconfig`].
    pub fn from_custom_kubeconfig(kubeconfig: Kubeconfig) -> Result<Self> {
        let context_name = kubeconfig
            .current_context
            .clone()
            .ok_or(ConfigError::CurrentContextNotSet)?;
        let context = kubeconfig
            .contexts
            .iter()
            .find(|named| named.name == context_name)
            .map(|named| named.context.clone())
            .ok_or(ConfigError::LoadContext { context_name })?;
        let cluster = kubeconfig
            .clusters
            .iter()
            .find(|named| named.name == context.cluster)
            .map(|named| named.cluster.clone())
            .ok_or(ConfigError::LoadClusterOfContext {
                cluster_name: context.cluster.clone(),
            })?;
        let user = kubeconfig
            .auth_infos
            .iter()
            .find(|named| named.name == context.user)
            .map(|named| named.auth_info.clone())
            .ok_or(ConfigError::FindUser {
                user_name: context.user.clone(),
            })?;

        let mut config = Self::bare(&cluster.server);
        if let Some(namespace) = context.namespace {
            config.default_namespace = namespace;
        }

        if cluster.certificate_authority.is_some() || cluster.certificate_authority_data.is_some() {
            let ca = file_config::data_or_file_with_base64(
                &cluster.certificate_authority_data,
                &cluster.certificate_authority,
            )?;
            config
                .root_certs
                .push(Certificate::from_pem(&ca).map_err(ConfigError::InvalidTls)?);
        }
        if let Some(true) = cluster.insecure_skip_tls_verify {
            config.accept_invalid_certs = true;
        }

        if user.client_certificate.is_some() || user.client_certificate_data.is_some() {
            let mut pem = file_config::data_or_file_with_base64(
                &user.client_certificate_data,
                &user.client_certificate,
            )?;
            pem.extend(file_config::data_or_file_with_base64(
                &user.client_key_data,
                &user.client_key,
            )?);
            config.identity = Some(Identity::from_pem(&pem).map_err(ConfigError::InvalidTls)?);
        }

        if user.token.is_some() || user.token_file.is_some() {
            let token = file_config::data_or_file(&user.token, &user.token_file)?;
            config.set_bearer_token(token.trim())?;
        } else if let (Some(username), Some(password)) = (&user.username, &user.password) {
            config.set_basic_auth(username, password)?;
        }

        Ok(config)
    }

    /// Build from the service account environment inside a pod.
    pub fn incluster() -> Result<Self> {
        let server = incluster::kube_server().ok_or(ConfigError::MissingInClusterVariables {
            hostenv: incluster::SERVICE_HOSTENV,
            portenv: incluster::SERVICE_PORTENV,
        })?;

        let mut config = Self::bare(&server);
        let ca =
            file_config::data_or_file_with_base64(&None, &Some(incluster::SERVICE_CERTFILE))?;
        config
            .root_certs
            .push(Certificate::from_pem(&ca).map_err(ConfigError::InvalidTls)?);
        let token = file_config::data_or_file(&None, &Some(incluster::SERVICE_TOKENFILE))?;
        config.set_bearer_token(token.trim())?;
        if let Ok(namespace) = file_config::data_or_file(&None, &Some(incluster::SERVICE_DEFAULT_NS))
        {
            config.default_namespace = namespace.trim().to_string();
        }
        Ok(config)
    }

    fn set_bearer_token(&mut self, token: &str) -> Result<()> {
        self.insert_authorization(
            &format!("Bearer {}", token),
            ConfigError::InvalidBearerToken,
        )
    }

    fn set_basic_auth(&mut self, username: &str, password: &str) -> Result<()> {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
        self.insert_authorization(
            &format!("Basic {}", encoded),
            ConfigError::InvalidBasicAuth,
        )
    }

    fn insert_authorization(
        &mut self,
        value: &str,
        wrap: fn(header::InvalidHeaderValue) -> ConfigError,
    ) -> Result<()> {
        let mut value = header::HeaderValue::from_str(value).map_err(wrap)?;
        value.set_sensitive(true);
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }

    /// The client builder every request and watch connection starts from.
    pub(crate) fn client_builder(&self) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .default_headers(self.headers.clone())
            .danger_accept_invalid_certs(self.accept_invalid_certs);
        for cert in &self.root_certs {
            builder = builder.add_root_certificate(cert.clone());
        }
        if let Some(identity) = &self.identity {
            builder = builder.identity(identity.clone());
        }
        builder
    }
}
