//! Core library for arbwatch, the cross-chain arbitrage monitoring dashboard.
//!
//! Provides the resilient request layer shared by the dashboard's HTTP-calling
//! code:
//! - `api`: authenticated client with single-flight token refresh and replay
//! - `retry`: exponential backoff executor with a configurable retry policy
//! - `coalesce`: keyed de-duplication of concurrent async work
//! - `auth`: credential stores, CSRF lookup and session events
//! - `config`: client configuration from environment and config file
//! - `models`: wire types shared with the web frontend

pub mod api;
pub mod auth;
pub mod coalesce;
pub mod config;
pub mod models;
pub mod retry;

pub use api::{ApiClient, ApiError, RequestDescriptor};
pub use auth::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
    SessionEvent,
};
pub use coalesce::Coalescer;
pub use config::{ClientConfig, Config};
pub use models::{ApiResponse, User};
pub use retry::{retry, retry_with, RetryExecutor, RetryPolicy};
