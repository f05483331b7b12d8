//! Recording and playback of HTTP traffic through the stub server

mod adapter;
mod call;
mod session;

pub use adapter::{
    proxify, RequestInfo, StuboInterceptor, GET_RESPONSE_PATH, HEADER_REQUEST_HOST,
    HEADER_REQUEST_METHOD, HEADER_REQUEST_PATH, HEADER_REQUEST_QUERY, HEADER_REQUEST_URI,
};
pub use call::HttpCall;
pub use session::Session;

/// Server status of a session it has never seen
pub const STATUS_NOT_FOUND: &str = "notfound";

/// Server status of a session that exists but is not running
pub const STATUS_DORMANT: &str = "dormant";
