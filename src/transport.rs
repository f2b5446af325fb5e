//! The HTTP transport collaborator
//!
//! The protocol core performs exactly one logical POST/GET per operation and leaves
//! everything HTTP-shaped (pooling, TLS, redirects) to an [`HttpTransport`]
//! implementation. The default is [`ReqwestTransport`]; tests and offline callers can
//! substitute a scripted [`MockTransport`].

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// The credentials injected into every request.
///
/// There is no challenge-response negotiation: whatever is configured here is sent
/// as-is on each round trip, which is why a 401/403 is always a hard failure.
#[derive(Clone, Debug)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

/// What the protocol core needs from HTTP: JSON in, status and JSON out.
///
/// Implementations must not retry on their own; retry policy belongs to the caller
/// because blindly replaying non-idempotent calls (e.g. a create) is unsafe.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body. Returns the status code and the response body, or JSON
    /// `null` when the body is not parseable as JSON (e.g. an HTML error page).
    async fn post_json(
        &self,
        url: &Url,
        body: &Value,
        credentials: &Credentials,
    ) -> Result<(u16, Value)>;

    /// GET a JSON document (used for the well-known session bootstrap).
    async fn get_json(&self, url: &Url, credentials: &Credentials) -> Result<(u16, Value)>;
}

/// The default transport, backed by a shared `reqwest` client.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn with_credentials(
    builder: reqwest::RequestBuilder,
    credentials: &Credentials,
) -> reqwest::RequestBuilder {
    match credentials {
        Credentials::Basic { username, password } => builder.basic_auth(username, Some(password)),
        Credentials::Bearer(token) => builder.bearer_auth(token),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &Url,
        body: &Value,
        credentials: &Credentials,
    ) -> Result<(u16, Value)> {
        let body = serde_json::to_string(body)
            .map_err(|err| Error::Protocol(format!("unserializable request body: {}", err)))?;
        let response = with_credentials(self.http.post(url.as_str()), credentials)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, serde_json::from_str(&text).unwrap_or(Value::Null)))
    }

    async fn get_json(&self, url: &Url, credentials: &Credentials) -> Result<(u16, Value)> {
        let response = with_credentials(self.http.get(url.as_str()), credentials)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, serde_json::from_str(&text).unwrap_or(Value::Null)))
    }
}

/// One request a [`MockTransport`] saw.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// `"GET"` or `"POST"`
    pub method: String,
    pub url: Url,
    /// The request body (`null` for GET)
    pub body: Value,
}

/// A scripted transport for tests and offline use.
///
/// Responses are served in FIFO order; every request is recorded so a test can
/// assert how many round trips an operation really took.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<(u16, Value)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next canned response.
    pub fn push_response(&self, status: u16, body: Value) {
        self.responses.lock().unwrap().push_back((status, body));
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn record_and_pop(&self, method: &str, url: &Url, body: Value) -> Result<(u16, Value)> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.clone(),
            body,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Protocol("mock transport has no scripted response left".into()))
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_json(
        &self,
        url: &Url,
        body: &Value,
        _credentials: &Credentials,
    ) -> Result<(u16, Value)> {
        self.record_and_pop("POST", url, body.clone())
    }

    async fn get_json(&self, url: &Url, _credentials: &Credentials) -> Result<(u16, Value)> {
        self.record_and_pop("GET", url, Value::Null)
    }
}
