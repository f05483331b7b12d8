//! Interception hooks around the HTTP send path

use std::sync::Arc;

use bytes::Bytes;
use hyper::Method;
use tracing::debug;

use crate::Result;

use super::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Hooks invoked around every request sent through an [`InterceptedClient`]
pub trait Interceptor: Send + Sync {
    /// Called before the request hits the network; may rewrite it
    ///
    /// # Errors
    ///
    /// An error aborts the request before any I/O happens
    fn before_send(&self, request: &mut HttpRequest) -> Result<()>;

    /// Called once the full response has been read
    ///
    /// # Errors
    ///
    /// An error is returned to the caller instead of the response
    fn after_receive(&self, response: &HttpResponse) -> Result<()>;
}

/// HTTP client that routes every request through an [`Interceptor`]
#[derive(Clone)]
pub struct InterceptedClient {
    transport: HttpTransport,
    interceptor: Arc<dyn Interceptor>,
}

impl InterceptedClient {
    /// Wrap a transport with an interceptor
    #[must_use]
    pub fn new(transport: HttpTransport, interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            transport,
            interceptor,
        }
    }

    /// Send a request through the interceptor hooks
    ///
    /// # Errors
    ///
    /// Returns error if a hook rejects the exchange or the transport fails
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        self.interceptor.before_send(&mut request)?;
        debug!("Intercepted {} {}", request.method, request.uri);

        let response = self.transport.send(request).await?;
        self.interceptor.after_receive(&response)?;
        Ok(response)
    }

    /// Send a `GET` request
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the exchange fails
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::new(Method::GET, url, Bytes::new())?)
            .await
    }

    /// Send a `POST` request with a body
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the exchange fails
    pub async fn post(&self, url: &str, body: impl Into<Bytes>) -> Result<HttpResponse> {
        self.send(HttpRequest::new(Method::POST, url, body)?).await
    }
}
