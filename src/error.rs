//! Error handling in [`dynakube`][crate]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors when working with [`dynakube`][crate]
#[derive(Error, Debug)]
pub enum Error {
    /// ApiError for when things fail
    ///
    /// The apiserver answered with a JSON body whose `status` is `Failure`.
    /// This is raised regardless of the HTTP status code, and is also what a
    /// watch stream's `ERROR` event closes with.
    #[error("ApiError: {0}")]
    Api(#[source] ErrorResponse),

    /// A kind that the registry has never seen, or that was unregistered
    /// after its CustomResourceDefinition was deleted.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// A short kind that maps to several full kinds.
    ///
    /// Callers must retry with one of the fully-qualified candidates.
    #[error("ambiguous kind {kind}: specify one of {candidates:?}")]
    AmbiguousKind {
        /// The short kind that was looked up
        kind: String,
        /// Every full kind the short kind maps to, sorted
        candidates: Vec<String>,
    },

    /// A request argument failed validation before any I/O happened.
    #[error("request validation failed: {0}")]
    RequestValidation(String),

    /// Transport-level failure from the underlying HTTP client.
    #[error("HttpError: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Common error case when parsing a response or a watch event.
    #[error("error deserializing response")]
    SerdeError(#[from] serde_json::Error),

    /// A watch stream ended: normal close or peer reset.
    #[error("watch stream closed")]
    WatchClosed,

    /// Configuration error
    #[error("error loading configuration: {0}")]
    Kubeconfig(#[from] ConfigError),
}

/// Possible errors when loading config
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("invalid basic auth")]
    InvalidBasicAuth(#[source] reqwest::header::InvalidHeaderValue),

    #[error("invalid bearer token")]
    InvalidBearerToken(#[source] reqwest::header::InvalidHeaderValue),

    #[error("failed to determine current context")]
    CurrentContextNotSet,

    #[error("unable to load current context: {context_name}")]
    LoadContext { context_name: String },

    #[error("unable to load cluster of context: {cluster_name}")]
    LoadClusterOfContext { cluster_name: String },

    #[error("unable to find named user: {user_name}")]
    FindUser { user_name: String },

    #[error("unable to find path of kubeconfig")]
    NoKubeconfigPath,

    #[error("failed to decode base64")]
    Base64Decode(#[source] base64::DecodeError),

    #[error("failed to read '{path:?}'")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get data/file with base64 format")]
    NoBase64FileOrData,

    #[error("failed to parse kubeconfig YAML")]
    ParseYaml(#[source] serde_yaml::Error),

    #[error("invalid TLS material")]
    InvalidTls(#[source] reqwest::Error),

    #[error("unable to load in-cluster config, {hostenv} and {portenv} must be defined")]
    MissingInClusterVariables {
        hostenv: &'static str,
        portenv: &'static str,
    },
}

/// An error response from the API.
#[derive(Error, Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status
    #[serde(default)]
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    #[serde(default)]
    pub code: u16,
}

#[cfg(test)]
mod tests {
    use super::ErrorResponse;

    #[test]
    fn error_response_parses_a_status_document() {
        let body = r#"{"kind":"Status","apiVersion":"v1","metadata":{},"status":"Failure",
            "message":"pods \"nope\" not found","reason":"NotFound","code":404}"#;
        let resp: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.status, "Failure");
        assert_eq!(resp.reason, "NotFound");
        assert_eq!(resp.code, 404);
    }

    #[test]
    fn error_response_tolerates_missing_fields() {
        let resp: ErrorResponse = serde_json::from_str(r#"{"status":"Failure"}"#).unwrap();
        assert_eq!(resp.code, 0);
        assert!(resp.message.is_empty());
    }
}
