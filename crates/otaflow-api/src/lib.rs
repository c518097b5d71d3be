//! otaflow-api: Shared API types and schemas
//!
//! Contains request/response types and OpenAPI schema definitions used by
//! the daemon, the HTTP client and the CLI.

pub mod requests;
pub mod responses;
