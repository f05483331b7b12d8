//! Client for the stub server REST API
//!
//! Operation names map to URL paths by splitting at the first underscore:
//! `begin_session` becomes `begin/session`.

mod client;
mod operation;

pub use client::{param, ApiResponse, RequestBody, StuboClient};
pub use operation::{method_to_path, Operation};

/// Header identifying responses produced by the stub server
pub const STUBO_VERSION_HEADER: &str = "X-Stubo-Version";
