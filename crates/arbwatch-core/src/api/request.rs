use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;

use super::ApiError;

/// How many times a request may be replayed after a token refresh.
const MAX_AUTH_REPLAYS: u32 = 1;

/// A single outbound API call.
///
/// Built once and never mutated while in flight, so the same descriptor can
/// be replayed after a token refresh.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    timeout: Option<Duration>,
    refresh_on_unauthorized: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            timeout: None,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Validation(format!("Unserializable request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::Validation(format!("Invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ApiError::Validation(format!("Invalid value for header {}", name)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Override the client-wide timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Treat a 401 as final instead of refreshing the session.
    ///
    /// Used for the auth endpoints themselves, where a 401 means bad
    /// credentials rather than an expired token.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn refreshes_on_unauthorized(&self) -> bool {
        self.refresh_on_unauthorized
    }
}

/// Per-dispatch state: which attempt this is and the bearer token to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    attempt: u32,
    bearer: Option<String>,
}

impl RequestContext {
    pub fn initial(bearer: Option<String>) -> Self {
        Self { attempt: 0, bearer }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub fn is_replay(&self) -> bool {
        self.attempt > 0
    }

    pub fn can_replay(&self) -> bool {
        self.attempt < MAX_AUTH_REPLAYS
    }

    /// Context for replaying with a freshly issued token.
    pub fn replay(&self, token: String) -> Self {
        Self {
            attempt: self.attempt + 1,
            bearer: Some(token),
        }
    }
}
