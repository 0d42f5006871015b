//! Authentication support for the API client.
//!
//! This module provides:
//! - `CredentialStore`: pluggable bearer token storage (memory, file, keychain)
//! - CSRF token lookup from the client's cookie jar
//! - `SessionEvents`: notifications such as session expiry for the UI layer

pub mod credentials;
pub mod csrf;
pub mod events;
pub mod session;

pub use credentials::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use events::{SessionEvent, SessionEvents};
pub use session::{FileCredentialStore, SessionData};
