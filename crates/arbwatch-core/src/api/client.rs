//! API client for the arbwatch dashboard REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests. Every call carries the stored bearer token and the CSRF token
//! from the cookie jar. A 401 triggers one token refresh, shared by all
//! requests that hit a 401 while it runs, and the request is replayed once
//! with the new token.

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::auth::{csrf, CredentialStore, MemoryCredentialStore, SessionEvent, SessionEvents};
use crate::coalesce::Coalescer;
use crate::config::ClientConfig;
use crate::models::{ApiResponse, LoginRequest, RegisterRequest, User};
use crate::retry::RetryPolicy;

use super::request::{RequestContext, RequestDescriptor};
use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

const LOGIN_PATH: &str = "auth/login";
const REGISTER_PATH: &str = "auth/register";
const LOGOUT_PATH: &str = "auth/logout";
const ME_PATH: &str = "auth/me";
const REFRESH_PATH: &str = "auth/refresh";

/// Everything needed to put a request on the wire.
///
/// Kept separate from the refresh coalescer so the in-flight refresh future
/// can own a copy without holding on to the coalescer itself.
#[derive(Clone)]
struct Transport {
    http: Client,
    config: Arc<ClientConfig>,
    cookies: Arc<Jar>,
    credentials: Arc<dyn CredentialStore>,
    events: SessionEvents,
}

impl Transport {
    fn stored_token(&self) -> Result<Option<String>, ApiError> {
        self.credentials
            .token()
            .map_err(|e| ApiError::Credentials(format!("{:#}", e)))
    }

    fn store_token(&self, token: &str) -> Result<(), ApiError> {
        self.credentials
            .set_token(token)
            .map_err(|e| ApiError::Credentials(format!("{:#}", e)))
    }

    fn clear_credentials(&self) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
        ctx: &RequestContext,
    ) -> Result<ApiResponse<T>, ApiError> {
        let url = self
            .config
            .endpoint(request.path())
            .map_err(|e| ApiError::Validation(format!("{:#}", e)))?;

        let mut builder = self
            .http
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());

        match csrf::csrf_token(&self.cookies, &url, &self.config.csrf_cookie) {
            Some(token) => builder = builder.header(self.config.csrf_header.as_str(), token),
            None => debug!(path = request.path(), "No CSRF cookie, sending without CSRF header"),
        }
        if let Some(token) = ctx.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.request_timeout() {
            builder = builder.timeout(timeout);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            attempt = ctx.attempt(),
            "Sending request"
        );

        let response = builder.send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(ApiResponse::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Exchange the refresh cookie for a new access token and persist it.
    ///
    /// On failure the stored credentials are cleared and `Expired` is
    /// announced before the error is returned.
    async fn refresh(self) -> Result<String, ApiError> {
        info!("Access token rejected, refreshing session");

        let outcome = self.request_new_token().await;
        match outcome {
            Ok(token) => {
                info!("Session refreshed");
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed, clearing credentials");
                self.clear_credentials();
                self.events.emit(SessionEvent::Expired {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn request_new_token(&self) -> Result<String, ApiError> {
        let request = RequestDescriptor::post(REFRESH_PATH).without_refresh();
        let ctx = RequestContext::initial(self.stored_token()?);
        let response: ApiResponse<serde_json::Value> = self.dispatch(&request, &ctx).await?;

        let token = response.access_token.ok_or_else(|| {
            ApiError::InvalidResponse("Refresh response did not include an access token".into())
        })?;
        self.store_token(&token)?;
        Ok(token)
    }
}

/// Clears local credentials when dropped, on every exit path of logout.
struct LogoutCleanup<'a> {
    transport: &'a Transport,
}

impl Drop for LogoutCleanup<'_> {
    fn drop(&mut self) {
        self.transport.clear_credentials();
        self.transport.events.emit(SessionEvent::LoggedOut);
    }
}

/// API client for the arbwatch dashboard.
/// Clone is cheap - all state is shared behind `Arc`s, including the
/// in-flight refresh, so clones coalesce refreshes with each other.
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
    refresh: Coalescer<(), Result<String, ApiError>>,
}

impl ApiClient {
    /// Create a client backed by the given credential store.
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let cookies = Arc::new(Jar::default());
        let http = Client::builder()
            .timeout(config.request_timeout)
            .cookie_provider(Arc::clone(&cookies))
            .build()?;

        Ok(Self {
            transport: Transport {
                http,
                config: Arc::new(config),
                cookies,
                credentials,
                events: SessionEvents::new(),
            },
            refresh: Coalescer::new(),
        })
    }

    /// Create a client that keeps its token in memory only.
    pub fn in_memory(config: ClientConfig) -> Result<Self, ApiError> {
        Self::new(config, Arc::new(MemoryCredentialStore::new()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.transport.config
    }

    /// Cookie jar shared with the HTTP client (CSRF and refresh cookies).
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.transport.cookies
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.transport.credentials
    }

    /// Receive session notifications such as [`SessionEvent::Expired`].
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.transport.events.subscribe()
    }

    /// Whether an access token is currently stored.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.transport.stored_token(), Ok(Some(_)))
    }

    /// Transient-failure retry policy that gives up once the session ends.
    ///
    /// A refresh that fails clears the stored token, and every later attempt
    /// would only start another refresh. When the policy is built while
    /// signed in, it stops retrying as soon as the token is gone.
    pub fn retry_policy(&self) -> RetryPolicy<ApiError> {
        let credentials = Arc::clone(&self.transport.credentials);
        let signed_in = self.is_authenticated();
        RetryPolicy::new().with_should_retry(move |err: &ApiError| {
            err.is_retryable() && (!signed_in || matches!(credentials.token(), Ok(Some(_))))
        })
    }

    // ===== Generic Verbs =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        self.send(&RequestDescriptor::get(path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(&RequestDescriptor::post(path).json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(&RequestDescriptor::put(path).json(body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(&RequestDescriptor::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
        self.send(&RequestDescriptor::delete(path)).await
    }

    /// Send a request, refreshing the session and replaying once on 401.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ApiResponse<T>, ApiError> {
        let mut ctx = RequestContext::initial(self.transport.stored_token()?);

        loop {
            let result = self.transport.dispatch(request, &ctx).await;
            match result {
                Err(ApiError::Unauthorized)
                    if request.refreshes_on_unauthorized() && ctx.can_replay() =>
                {
                    debug!(path = request.path(), "Unauthorized, waiting for token refresh");
                    let token = self.refresh_token().await?;
                    ctx = ctx.replay(token);
                }
                result => return result,
            }
        }
    }

    /// Join the in-flight refresh, or start one.
    async fn refresh_token(&self) -> Result<String, ApiError> {
        let transport = self.transport.clone();
        self.refresh.run((), move || transport.refresh()).await
    }

    /// Whether a token refresh is currently running.
    pub async fn is_refreshing(&self) -> bool {
        self.refresh.in_flight(&()).await
    }

    // ===== Auth Flows =====

    /// Log in and store the returned access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<ApiResponse<User>, ApiError> {
        let request = RequestDescriptor::post(LOGIN_PATH)
            .json(&LoginRequest { email, password })?
            .without_refresh();
        let response: ApiResponse<User> = self.send(&request).await?;
        self.persist_session(&response)?;
        info!(email = email, "Logged in");
        Ok(response)
    }

    /// Create an account. The server may log the new user in directly.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<ApiResponse<User>, ApiError> {
        let request = RequestDescriptor::post(REGISTER_PATH)
            .json(&RegisterRequest {
                name,
                email,
                password,
            })?
            .without_refresh();
        let response: ApiResponse<User> = self.send(&request).await?;
        self.persist_session(&response)?;
        info!(email = email, "Registered");
        Ok(response)
    }

    /// Tell the server we are leaving, then drop local credentials.
    ///
    /// Local credentials are cleared even when the server call fails; the
    /// server error is still returned so callers can report it.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let _cleanup = LogoutCleanup {
            transport: &self.transport,
        };
        let request = RequestDescriptor::post(LOGOUT_PATH).without_refresh();
        match self.send::<serde_json::Value>(&request).await {
            Ok(_) => {
                info!("Logged out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
                Err(e)
            }
        }
    }

    pub async fn get_current_user(&self) -> Result<ApiResponse<User>, ApiError> {
        self.get(ME_PATH).await
    }

    fn persist_session<T>(&self, response: &ApiResponse<T>) -> Result<(), ApiError> {
        if let Some(ref token) = response.access_token {
            self.transport.store_token(token)?;
            self.transport.events.emit(SessionEvent::LoggedIn);
        }
        Ok(())
    }
}
