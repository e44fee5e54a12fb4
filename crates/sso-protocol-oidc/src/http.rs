//! Minimal HTTP transport for token, userinfo and metadata endpoints.
//!
//! - every request is bounded by a timeout
//! - response bodies are capped, both by declared `Content-Length` and while
//!   streaming
//! - GET follows at most one redirect; POST never follows
//! - bodies are parsed as JSON, falling back to form encoding

use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, LOCATION};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{OidcError, OidcResult};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default response size cap (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

const SNIPPET_LEN: usize = 512;

/// Transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum response body size in bytes.
    pub max_response_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Parses the body as JSON, falling back to
    /// `application/x-www-form-urlencoded`.
    ///
    /// An empty body parses to `Value::Null`.
    pub fn json(&self) -> OidcResult<Value> {
        let trimmed = self.body.trim_ascii();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        if let Ok(value) = serde_json::from_slice::<Value>(trimmed) {
            return Ok(value);
        }
        parse_form(trimmed).ok_or_else(|| {
            OidcError::InvalidResponse(format!(
                "body is neither JSON nor form-encoded: {}",
                self.snippet()
            ))
        })
    }

    /// Returns the start of the body as lossy UTF-8.
    #[must_use]
    pub fn snippet(&self) -> String {
        let end = self.body.len().min(SNIPPET_LEN);
        String::from_utf8_lossy(&self.body[..end]).into_owned()
    }
}

fn parse_form(body: &[u8]) -> Option<Value> {
    if !body.contains(&b'=') {
        return None;
    }
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    if pairs.is_empty() || pairs.iter().any(|(k, _)| k.is_empty()) {
        return None;
    }
    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Some(Value::Object(map))
}

/// HTTP client used by the OAuth engine and connectivity probes.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpTransport {
    /// Creates a transport.
    pub fn new(config: HttpConfig) -> OidcResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OidcError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// POSTs a form. Redirects are returned as-is.
    pub async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> OidcResult<HttpResponse> {
        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(params);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        self.read(response).await
    }

    /// GETs a URL, following a single redirect hop.
    pub async fn get(&self, url: &str, bearer: Option<&str>) -> OidcResult<HttpResponse> {
        let response = self.send_get(url, bearer).await?;
        if !response.status().is_redirection() {
            return self.read(response).await;
        }

        let next = redirect_target(&response)?;
        tracing::debug!(from = %url, to = %next, "following redirect");
        let response = self.send_get(next.as_str(), bearer).await?;
        if response.status().is_redirection() {
            return Err(OidcError::Network(format!(
                "too many redirects fetching {url}"
            )));
        }
        self.read(response).await
    }

    /// Sends a HEAD request and returns the status.
    pub async fn head(&self, url: &str, timeout: Duration) -> OidcResult<u16> {
        let response = self.client.head(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }

    async fn send_get(&self, url: &str, bearer: Option<&str>) -> OidcResult<reqwest::Response> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    async fn read(&self, mut response: reqwest::Response) -> OidcResult<HttpResponse> {
        let limit = self.config.max_response_bytes;
        let status = response.status().as_u16();

        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(OidcError::ResponseTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(OidcError::ResponseTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse { status, body })
    }
}

fn redirect_target(response: &reqwest::Response) -> OidcResult<Url> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OidcError::InvalidResponse("redirect without Location".to_string()))?;
    response
        .url()
        .join(location)
        .map_err(|e| OidcError::InvalidResponse(format!("invalid redirect location: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(max: usize) -> HttpTransport {
        HttpTransport::new(HttpConfig {
            timeout: Duration::from_secs(2),
            max_response_bytes: max,
        })
        .unwrap()
    }

    #[test]
    fn form_fallback_parses_key_values() {
        let response = HttpResponse {
            status: 200,
            body: b"access_token=abc&token_type=bearer&expires_in=60".to_vec(),
        };
        let value = response.json().unwrap();
        assert_eq!(value["access_token"], "abc");
        assert_eq!(value["expires_in"], "60");
    }

    #[test]
    fn plain_text_is_rejected() {
        let response = HttpResponse {
            status: 200,
            body: b"<html>oops</html>".to_vec(),
        };
        assert!(matches!(response.json(), Err(OidcError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn get_follows_one_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let response = transport(1024)
            .get(&format!("{}/old", server.uri()), Some("tok"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn get_refuses_a_second_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/c"))
            .mount(&server)
            .await;

        let err = transport(1024)
            .get(&format!("{}/a", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Network(_)));
    }

    #[tokio::test]
    async fn post_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", "/elsewhere"))
            .mount(&server)
            .await;

        let response = transport(1024)
            .post_form(&format!("{}/token", server.uri()), &[("a", "b")], None)
            .await
            .unwrap();
        assert_eq!(response.status, 307);
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let err = transport(1024)
            .get(&format!("{}/big", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::ResponseTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let err = transport(1024)
            .get(&format!("{}/slow", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Timeout));
    }
}
