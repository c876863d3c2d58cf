//! `reqwest`-backed transport

use crate::error::ConfigError;
use gophr_core::{Method, Resource, Transport, TransportError, TransportFuture};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

/// Environment variable holding the API base URL
pub const API_URL_VAR: &str = "GOPHR_API_URL";

/// Base URL used when [`API_URL_VAR`] is unset
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api/v0";

/// HTTP transport
///
/// Calls `{base}/{resource}`:
/// - `get` with an object payload sends it as the query string (nulls
///   skipped, arrays repeated); a string payload is appended as path
///   segments; any other scalar becomes one path segment
/// - `post` sends the payload as a JSON body
///
/// Status mapping: 2xx → JSON body (empty body → `null`), 404 → `NotFound`,
/// 401/403 → `Unauthorized`, 429 → `RateLimited`, anything else → `Status`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport for `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL does not parse or cannot be a base.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            client: Client::new(),
            base_url: parse_base(base_url)?,
            timeout: None,
        })
    }

    /// Create a transport from `GOPHR_API_URL`, falling back to the local default
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configured URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&url)
    }

    /// Rebuild the client with a per-request timeout
    ///
    /// An expired request is reported as [`TransportError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] if the client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// The API base URL
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL a call resolves to
    ///
    /// Only `get` payloads shape the URL; `post` payloads go in the body.
    #[must_use]
    pub fn endpoint(&self, method: Method, resource: &Resource, payload: &Value) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(resource.as_str().split('/').filter(|s| !s.is_empty()));
            if method == Method::Get {
                match payload {
                    Value::String(path) => {
                        segments.extend(path.split('/').filter(|s| !s.is_empty()));
                    },
                    Value::Bool(_) | Value::Number(_) => {
                        segments.push(&payload.to_string());
                    },
                    Value::Null | Value::Object(_) | Value::Array(_) => {},
                }
            }
        }

        if method == Method::Get {
            if let Value::Object(fields) = payload {
                let mut query = url.query_pairs_mut();
                for (key, value) in fields {
                    match value {
                        Value::Null => {},
                        Value::Array(items) => {
                            for item in items {
                                query.append_pair(key, &query_value(item));
                            }
                        },
                        other => {
                            query.append_pair(key, &query_value(other));
                        },
                    }
                }
            }
            if url.query() == Some("") {
                url.set_query(None);
            }
        }

        url
    }

    async fn execute(&self, method: Method, resource: Resource, payload: Value) -> Result<Value, TransportError> {
        let url = self.endpoint(method, &resource, &payload);
        tracing::debug!(%method, %url, "Sending API request");

        let request = if method == Method::Get {
            self.client.get(url.clone())
        } else {
            let http_method = reqwest::Method::from_bytes(method.as_str().to_ascii_uppercase().as_bytes())
                .map_err(|e| TransportError::Status {
                    status: 405,
                    message: e.to_string(),
                })?;
            let request = self.client.request(http_method, url.clone());
            if payload.is_null() {
                request
            } else {
                request.json(&payload)
            }
        };

        let response = request.send().await.map_err(|e| self.send_error(&e))?;
        let status = response.status();

        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()));
        }

        let error = match status {
            StatusCode::NOT_FOUND => TransportError::NotFound {
                resource: self.relative_path(&url),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited,
            status => TransportError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            },
        };
        tracing::warn!(%method, %url, status = status.as_u16(), "API request rejected");
        Err(error)
    }

    fn send_error(&self, error: &reqwest::Error) -> TransportError {
        match self.timeout {
            Some(timeout) if error.is_timeout() => TransportError::Timeout {
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            _ => TransportError::Network(error.to_string()),
        }
    }

    fn relative_path(&self, url: &Url) -> String {
        url.path()
            .strip_prefix(self.base_url.path().trim_end_matches('/'))
            .unwrap_or_else(|| url.path())
            .trim_start_matches('/')
            .to_string()
    }
}

impl Transport for HttpTransport {
    fn call(&self, method: Method, resource: &Resource, payload: &Value) -> TransportFuture<'_> {
        Box::pin(self.execute(method, resource.clone(), payload.clone()))
    }
}

fn parse_base(base_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::CannotBeABase(base_url.to_string()));
    }
    Ok(url)
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport() -> HttpTransport {
        HttpTransport::new("http://localhost:3000/api/v0").unwrap()
    }

    #[test]
    fn resource_is_appended_to_the_base_path() {
        let url = transport().endpoint(Method::Post, &Resource::LOGIN, &json!({ "password": "x" }));
        assert_eq!(url.as_str(), "http://localhost:3000/api/v0/login");
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let t = HttpTransport::new("http://localhost:3000/api/v0/").unwrap();
        let url = t.endpoint(Method::Get, &Resource::TOKENS, &Value::Null);
        assert_eq!(url.as_str(), "http://localhost:3000/api/v0/tokens");
    }

    #[test]
    fn get_object_payload_becomes_query() {
        let url = transport().endpoint(
            Method::Get,
            &Resource::PACKAGES,
            &json!({ "q": "http router", "page": 2, "skip": null, "tag": ["a", "b"] }),
        );
        assert_eq!(url.path(), "/api/v0/packages");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "http router".into())));
        assert!(pairs.contains(&("page".into(), "2".into())));
        assert!(pairs.contains(&("tag".into(), "a".into())));
        assert!(pairs.contains(&("tag".into(), "b".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "skip"));
    }

    #[test]
    fn get_string_payload_becomes_path() {
        let url = transport().endpoint(Method::Get, &Resource::PROFILE, &json!("gorilla/mux"));
        assert_eq!(url.as_str(), "http://localhost:3000/api/v0/profile/gorilla/mux");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        assert!(matches!(HttpTransport::new("not a url"), Err(ConfigError::InvalidUrl { .. })));
        assert!(matches!(
            HttpTransport::new("mailto:gopher@example.com"),
            Err(ConfigError::CannotBeABase(_))
        ));
    }
}
