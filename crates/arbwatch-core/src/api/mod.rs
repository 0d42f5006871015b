//! REST API client module for the arbwatch dashboard API.
//!
//! This module provides the `ApiClient` for calling the dashboard backend.
//! The API uses bearer token authentication issued by `/auth/login` and
//! renewed through `/auth/refresh` using the server's refresh cookie.

pub mod client;
pub mod error;
pub mod request;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{RequestContext, RequestDescriptor};
