//! Single-shot authenticated JSON requests.
//!
//! Every call goes out exactly once with a bounded timeout. Transport-level
//! failures (timeout, DNS, refused connection, non-JSON body) never surface as
//! Rust errors: they come back as a sentinel [`ApiResponse`] with status `0`
//! and a `detail` message, so callers classify every outcome the same way
//! through [`crate::envelope::Envelope`].

use crate::normalize::{truncate, SHORT_TEXT};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("skillkit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

/// Decoded upstream reply. `status == 0` marks a transport failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn transport_failure(detail: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: json!({ "detail": detail.into() }),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }
}

pub struct ApiClient {
    base_url: String,
    token: String,
    client: Option<Client>,
}

impl ApiClient {
    /// `base_url` without a trailing slash is joined with request paths as-is.
    pub fn new(base_url: &str, token: &str) -> Self {
        let client = match Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build http client");
                None
            }
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get(&self, path: &str, query: &[(&str, String)]) -> ApiResponse {
        self.request(Method::Get, path, query, None)
    }

    pub fn post(&self, path: &str, body: &Value) -> ApiResponse {
        self.request(Method::Post, path, &[], Some(body))
    }

    pub fn patch(&self, path: &str, body: &Value) -> ApiResponse {
        self.request(Method::Patch, path, &[], Some(body))
    }

    pub fn put(&self, path: &str, body: &Value) -> ApiResponse {
        self.request(Method::Put, path, &[], Some(body))
    }

    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ApiResponse {
        let Some(client) = &self.client else {
            return ApiResponse::transport_failure("http client unavailable");
        };
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(?method, %url, "sending request");

        let mut builder = client
            .request(method.as_reqwest(), &url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%url, error = %e, "request failed");
                return ApiResponse::transport_failure(e.to_string());
            }
        };
        let status = response.status().as_u16();
        let text = match response.text() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(%url, error = %e, "failed to read response body");
                return ApiResponse::transport_failure(e.to_string());
            }
        };
        tracing::debug!(status, bytes = text.len(), "received response");

        if text.trim().is_empty() {
            return ApiResponse::new(status, json!({}));
        }
        match serde_json::from_str(&text) {
            Ok(body) => ApiResponse::new(status, body),
            Err(_) => ApiResponse::transport_failure(format!(
                "non-JSON response (HTTP {status}): {}",
                truncate(text.trim(), SHORT_TEXT)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn sends_bearer_token_and_query() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/items")
            .match_header("authorization", "Bearer sk_test")
            .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_body(r#"{"data": [1, 2]}"#)
            .create();

        let client = ApiClient::new(&server.url(), "sk_test");
        let resp = client.get("/api/items", &[("limit", "5".to_string())]);
        mock.assert();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["data"], json!([1, 2]));
    }

    #[test]
    fn posts_json_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PATCH", "/api/items/1/")
            .match_body(Matcher::Json(json!({ "saved": true })))
            .with_status(200)
            .with_body(r#"{"id": 1, "saved": true}"#)
            .create();

        let client = ApiClient::new(&format!("{}/", server.url()), "k");
        let resp = client.patch("/api/items/1/", &json!({ "saved": true }));
        mock.assert();
        assert_eq!(resp.body["saved"], true);
    }

    #[test]
    fn non_json_body_becomes_sentinel() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/broken")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create();

        let resp = ApiClient::new(&server.url(), "k").get("/broken", &[]);
        assert!(resp.is_transport_failure());
        assert!(resp.body["detail"]
            .as_str()
            .unwrap()
            .contains("non-JSON response (HTTP 502)"));
    }

    #[test]
    fn empty_body_is_empty_object() {
        let mut server = mockito::Server::new();
        server.mock("POST", "/cancel").with_status(200).create();

        let resp = ApiClient::new(&server.url(), "k").post("/cancel", &json!({}));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, json!({}));
    }

    #[test]
    fn unreachable_host_becomes_sentinel() {
        // Port 9 (discard) on localhost is reliably closed in test environments.
        let resp = ApiClient::new("http://127.0.0.1:9", "k").get("/", &[]);
        assert!(resp.is_transport_failure());
        assert!(resp.body["detail"].is_string());
    }
}
