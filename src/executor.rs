//! The request executor: a thin contract over the HTTP client.
//!
//! Synchronous operations share one pooled client; every watch session gets
//! a client of its own so a streaming read never competes with
//! request/response traffic for a connection.

use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{trace, warn};

use crate::{config::Config, error::ErrorResponse, Error, Result};

/// Issues authenticated requests and parses apiserver responses.
#[derive(Clone)]
pub struct Executor {
    master_url: String,
    client: reqwest::Client,
    config: Config,
}

impl Executor {
    /// Build the pooled client from `config`.
    pub fn new(config: Config) -> Result<Self> {
        let client = config.client_builder().build()?;
        Ok(Self {
            master_url: config.cluster_url.clone(),
            client,
            config,
        })
    }

    /// Base URL of the apiserver, without a trailing slash.
    pub fn master_url(&self) -> &str {
        &self.master_url
    }

    /// GET `url` and parse the response.
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.consume(self.client.get(url).send().await?).await
    }

    /// POST `body` to `url` and parse the response.
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        self.consume(self.client.post(url).json(body).send().await?)
            .await
    }

    /// PUT `body` to `url` and parse the response.
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        self.consume(self.client.put(url).json(body).send().await?)
            .await
    }

    /// DELETE `url` and parse the response.
    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.consume(self.client.delete(url).send().await?).await
    }

    /// Open a long-lived GET stream on a dedicated connection.
    ///
    /// A non-success status is consumed and surfaced as the corresponding
    /// API error instead of a response.
    pub async fn open_stream(&self, url: &str) -> Result<Response> {
        let client = self.config.client_builder().build()?;
        let response = client.get(url).send().await?;
        let status = response.status();
        trace!(%status, %url, "watch stream opened");
        if !status.is_success() {
            let text = response.text().await?;
            return match parse_response(status, &text) {
                Err(err) => Err(err),
                Ok(_) => Err(Error::WatchClosed),
            };
        }
        Ok(response)
    }

    async fn consume(&self, response: Response) -> Result<Value> {
        let status = response.status();
        trace!(%status, url = %response.url(), "response");
        let text = response.text().await?;
        parse_response(status, &text)
    }
}

/// Decode an apiserver response body.
///
/// A body whose `status` field is `Failure` is an error regardless of the
/// HTTP status code. A non-2xx response without a parseable body is
/// reconstructed into an [`ErrorResponse`] so callers always see the API
/// error shape.
fn parse_response(status: StatusCode, text: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(body) => {
            let failed = body.get("status").and_then(Value::as_str) == Some("Failure");
            if failed || status.is_client_error() || status.is_server_error() {
                return Err(Error::Api(error_response(&body)));
            }
            Ok(body)
        }
        Err(err) => {
            if status.is_client_error() || status.is_server_error() {
                warn!(%status, "non-JSON error body from apiserver");
                Err(Error::Api(ErrorResponse {
                    status: status.to_string(),
                    message: text.to_string(),
                    reason: "Failed to parse error data".to_string(),
                    code: status.as_u16(),
                }))
            } else {
                Err(Error::SerdeError(err))
            }
        }
    }
}

fn error_response(body: &Value) -> ErrorResponse {
    let mut response: ErrorResponse = serde_json::from_value(body.clone()).unwrap_or_default();
    if response.message.is_empty() {
        response.message = serde_json::to_string_pretty(body).unwrap_or_default();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_status_is_an_error_even_on_200() {
        let text = r#"{"kind":"Status","status":"Failure","message":"denied","reason":"Forbidden","code":403}"#;
        match parse_response(StatusCode::OK, text) {
            Err(Error::Api(resp)) => {
                assert_eq!(resp.reason, "Forbidden");
                assert_eq!(resp.code, 403);
            }
            other => panic!("expected Api error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn failure_without_message_falls_back_to_pretty_body() {
        let text = r#"{"status":"Failure","reason":"Conflict"}"#;
        match parse_response(StatusCode::CONFLICT, text) {
            Err(Error::Api(resp)) => {
                assert!(resp.message.contains("\"reason\": \"Conflict\""));
            }
            other => panic!("expected Api error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn non_json_error_body_is_reconstructed() {
        match parse_response(StatusCode::BAD_GATEWAY, "<html>nope</html>") {
            Err(Error::Api(resp)) => {
                assert_eq!(resp.code, 502);
                assert_eq!(resp.message, "<html>nope</html>");
            }
            other => panic!("expected Api error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn success_body_passes_through() {
        let text = r#"{"kind":"Pod","metadata":{"name":"p"},"status":{"phase":"Running"}}"#;
        let body = parse_response(StatusCode::OK, text).unwrap();
        // a structured status subtree is not the Failure marker
        assert_eq!(body.pointer("/status/phase").unwrap(), "Running");
    }

    #[test]
    fn malformed_success_body_is_a_parse_error() {
        assert!(matches!(
            parse_response(StatusCode::OK, "not json"),
            Err(Error::SerdeError(_))
        ));
    }
}
