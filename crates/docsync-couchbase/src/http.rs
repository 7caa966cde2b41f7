use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::types::ClusterOptions;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(75);

pub(crate) enum Body<'a> {
    Empty,
    Json(&'a Value),
    Form(&'a [(&'a str, &'a str)]),
}

pub(crate) struct Reply {
    pub(crate) status: u16,
    pub(crate) body: String,
}

impl Reply {
    pub(crate) fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub(crate) fn json(&self) -> BackendResult<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| BackendError::Unexpected(format!("invalid JSON in response: {e}")))
    }

    /// The body as JSON on success, a classified error otherwise.
    pub(crate) fn into_json(self, not_found: impl FnOnce() -> BackendError) -> BackendResult<Value> {
        if self.is_success() {
            self.json()
        } else {
            Err(classify(self.status, &self.body, not_found))
        }
    }

    pub(crate) fn into_unit(self, not_found: impl FnOnce() -> BackendError) -> BackendResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(classify(self.status, &self.body, not_found))
        }
    }
}

/// Maps a failed HTTP reply onto a backend error class.
pub(crate) fn classify(status: u16, body: &str, not_found: impl FnOnce() -> BackendError) -> BackendError {
    let lowered = body.to_lowercase();
    if status == 404 || lowered.contains("not found") || lowered.contains("does not exist") {
        not_found()
    } else if lowered.contains("already exist") {
        BackendError::AlreadyExists(body.trim().to_string())
    } else if status == 401 || status == 403 {
        BackendError::Transport(format!("HTTP {status}: authentication failed"))
    } else {
        BackendError::Unexpected(format!("HTTP {status}: {}", body.trim()))
    }
}

/// Authenticated blocking HTTP client shared by every handle of a session.
pub(crate) struct RestClient {
    http: Client,
    username: Option<String>,
    password: Option<String>,
}

impl RestClient {
    pub(crate) fn new(options: &ClusterOptions) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, username: options.username.clone(), password: options.password.clone() })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    pub(crate) fn send(&self, method: Method, url: &str, body: Body<'_>) -> BackendResult<Reply> {
        tracing::debug!("{method} {url}");
        let request = self.authed(self.http.request(method, url)).header("cache-control", "no-cache");
        let request = match body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Form(fields) => request.form(fields),
        };
        let response = request.send().map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Reply { status, body })
    }

    pub(crate) fn get(&self, url: &str) -> BackendResult<Reply> {
        self.send(Method::GET, url, Body::Empty)
    }
}
