//! Interceptor that records or redirects traffic for a session
//!
//! In record mode the request goes to its real destination and the exchange
//! is captured. In any other mode the request is rewritten to the stub
//! server's `get/response` endpoint and the original target travels along in
//! `Stubo-Request-*` headers.

use std::sync::{Mutex, Weak};

use hyper::header::AUTHORIZATION;
use hyper::{Method, Uri};
use tracing::{debug, warn};

use crate::config::BasicAuth;
use crate::network::{HttpRequest, HttpResponse, Interceptor};
use crate::{Result, StuboError};

use super::call::HttpCall;
use super::session::{lock_state, SessionState};

/// Original request URL
pub const HEADER_REQUEST_URI: &str = "Stubo-Request-URI";
/// Original `host[:port]`, including any credentials
pub const HEADER_REQUEST_HOST: &str = "Stubo-Request-Host";
/// Original method
pub const HEADER_REQUEST_METHOD: &str = "Stubo-Request-Method";
/// Original path
pub const HEADER_REQUEST_PATH: &str = "Stubo-Request-Path";
/// Original query string
pub const HEADER_REQUEST_QUERY: &str = "Stubo-Request-Query";

/// Path of the stub lookup endpoint on the stub server
pub const GET_RESPONSE_PATH: &str = "stubo/api/get/response";

/// Describes the original target of an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Full URL
    pub uri: String,
    /// Authority as written, credentials included
    pub host: String,
    /// Method
    pub method: String,
    /// Path, when present
    pub path: Option<String>,
    /// Query string, when present
    pub query: Option<String>,
}

impl RequestInfo {
    /// Describe a request about to be sent
    #[must_use]
    pub fn from_request(method: &Method, uri: &Uri) -> Self {
        Self {
            uri: uri.to_string(),
            host: uri
                .authority()
                .map(|a| a.as_str().to_string())
                .unwrap_or_default(),
            method: method.to_string(),
            path: Some(uri.path().to_string()).filter(|p| !p.is_empty()),
            query: uri.query().map(ToString::to_string).filter(|q| !q.is_empty()),
        }
    }

    /// Header name/value pairs carrying this description
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, &str)> {
        let mut headers = vec![
            (HEADER_REQUEST_URI, self.uri.as_str()),
            (HEADER_REQUEST_HOST, self.host.as_str()),
            (HEADER_REQUEST_METHOD, self.method.as_str()),
        ];
        if let Some(path) = &self.path {
            headers.push((HEADER_REQUEST_PATH, path.as_str()));
        }
        if let Some(query) = &self.query {
            headers.push((HEADER_REQUEST_QUERY, query.as_str()));
        }
        headers
    }
}

/// Rewrite `original` to the stub server's lookup URL for `session`
///
/// Scheme and embedded credentials are kept; path and query are dropped.
///
/// # Errors
///
/// Returns error if the rewritten URL is not a valid URI
pub fn proxify(original: &Uri, stubo_host: &str, session: &str) -> Result<Uri> {
    let scheme = original.scheme_str().unwrap_or("http");
    let userinfo = original
        .authority()
        .and_then(|a| a.as_str().rsplit_once('@'))
        .map(|(creds, _)| format!("{creds}@"))
        .unwrap_or_default();

    let url = format!(
        "{scheme}://{userinfo}{stubo_host}/{GET_RESPONSE_PATH}?session={}",
        urlencoding::encode(session)
    );
    url.parse::<Uri>()
        .map_err(|e| StuboError::InvalidUri(format!("'{url}': {e}")))
}

/// Records or redirects requests on behalf of one session
pub struct StuboInterceptor {
    state: Weak<Mutex<SessionState>>,
    session_name: String,
    stubo_host: String,
    auth: Option<BasicAuth>,
}

impl StuboInterceptor {
    pub(crate) fn new(
        state: Weak<Mutex<SessionState>>,
        session_name: String,
        stubo_host: String,
        auth: Option<BasicAuth>,
    ) -> Self {
        Self {
            state,
            session_name,
            stubo_host,
            auth,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SessionState) -> Result<T>) -> Result<T> {
        let state = self.state.upgrade().ok_or_else(|| {
            StuboError::Protocol(format!(
                "session '{}' was dropped while its client was in use",
                self.session_name
            ))
        })?;
        let mut guard = lock_state(&state)?;
        f(&mut guard)
    }
}

impl Interceptor for StuboInterceptor {
    fn before_send(&self, request: &mut HttpRequest) -> Result<()> {
        let info = RequestInfo::from_request(&request.method, &request.uri);

        let recording = self.with_state(|state| {
            if !state.mode.is_some_and(|m| m.is_record()) {
                return Ok(false);
            }
            if let Some(orphan) = state.current.take() {
                warn!(
                    "Discarding unanswered request {} {}",
                    orphan.request_method, orphan.request_url
                );
            }
            state.current = Some(HttpCall::from_request(info.host.clone(), request));
            Ok(true)
        })?;

        if recording {
            debug!("Recording {} {}", info.method, info.uri);
            return Ok(());
        }

        for (name, value) in info.headers() {
            request.set_header(name, value)?;
        }
        request.uri = proxify(&request.uri, &self.stubo_host, &self.session_name)?;
        if let Some(auth) = &self.auth {
            request.set_header(AUTHORIZATION.as_str(), &auth.header_value())?;
        }

        debug!("Redirecting {} {} to {}", info.method, info.uri, request.uri);
        Ok(())
    }

    fn after_receive(&self, response: &HttpResponse) -> Result<()> {
        self.with_state(|state| {
            if !state.mode.is_some_and(|m| m.is_record()) {
                return Ok(());
            }
            let mut call = state.current.take().ok_or_else(|| {
                StuboError::Protocol(
                    "Called record response when no request was made.".to_string(),
                )
            })?;
            call.complete(response);
            debug!(
                "Recorded {} {} -> {}",
                call.request_method,
                call.request_url,
                response.status
            );
            state.calls.push(call);
            Ok(())
        })
    }
}
