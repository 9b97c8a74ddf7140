use super::{Response, Transport, TransportError};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::env;
use std::time::Duration;
use url::Url;

/// reqwest-backed [`Transport`].
///
/// `GET` and `DELETE` send the input as query parameters (a non-object input
/// as one `input` parameter holding its JSON), everything else as a JSON body.
/// Any status is returned as a [`Response`]; only connection-level
/// failures become errors.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        Url::parse(base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url: {e}"),
                ErrorContext::new()
                    .with_field_path("transport.base_url")
                    .with_details(base_url.to_string()),
            )
        })?;

        // Minimal production-friendly defaults (env-overridable).
        let timeout_secs = env::var("API_QUERY_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("API_QUERY_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: env::var("API_QUERY_BEARER_TOKEN").ok(),
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&raw).map_err(|e| Error::Transport(TransportError::InvalidUrl(format!("{raw}: {e}"))))
    }
}

/// Parameter carrying a non-object input as JSON text.
const INPUT_PARAM: &str = "input";

/// Flatten an input object into query pairs. Nested values are sent as JSON text.
/// Any other non-null input becomes a single `input=<json>` pair.
fn query_pairs(input: &Value) -> Vec<(String, String)> {
    match input {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![(INPUT_PARAM.to_string(), other.to_string())],
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, path: &str, method: &Method, input: &Value) -> Result<Response> {
        let url = self.url(path)?;
        let mut req = self.client.request(method.clone(), url);

        req = if *method == Method::GET || *method == Method::DELETE {
            req.query(&query_pairs(input))
        } else {
            req.json(input)
        };

        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e.to_string())))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e.to_string())))?;

        tracing::trace!(%method, path, status, "transport call finished");
        Ok(Response::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_flatten() {
        let pairs = query_pairs(&json!({"id": 3, "q": "rust", "tags": ["a", "b"], "skip": null}));
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "3".to_string()),
                ("q".to_string(), "rust".to_string()),
                ("tags".to_string(), "[\"a\",\"b\"]".to_string()),
            ]
        );
        assert!(query_pairs(&json!(null)).is_empty());
    }

    #[test]
    fn test_query_pairs_keep_non_object_inputs() {
        assert_eq!(
            query_pairs(&json!([1, 2])),
            vec![("input".to_string(), "[1,2]".to_string())]
        );
        assert_ne!(query_pairs(&json!([1, 2])), query_pairs(&json!([3, 4])));
        assert_eq!(
            query_pairs(&json!("rust")),
            vec![("input".to_string(), "\"rust\"".to_string())]
        );
        assert_eq!(query_pairs(&json!(7)), vec![("input".to_string(), "7".to_string())]);
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpTransport::new("not a url").err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_url_joining() {
        let t = HttpTransport::new("http://localhost:8080/api/").unwrap();
        assert_eq!(t.url("/users").unwrap().as_str(), "http://localhost:8080/api/users");
        assert_eq!(t.url("users").unwrap().as_str(), "http://localhost:8080/api/users");
    }
}
