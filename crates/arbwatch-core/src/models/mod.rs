//! Wire models exchanged with the dashboard API.
//!
//! All payloads use camelCase field names on the wire. With the `ts` feature
//! enabled, TypeScript bindings are generated for the React dashboard.

pub mod response;
pub mod user;

pub use response::ApiResponse;
pub use user::{LoginRequest, RegisterRequest, User};
