//! Network layer for Stubo
//!
//! Provides the HTTP transport and the interception seam used by sessions.

mod interceptor;
mod transport;

pub use interceptor::{InterceptedClient, Interceptor};
pub use transport::{header_pairs, HttpRequest, HttpResponse, HttpTransport};
