//! HTTP transport shared by the stub server client and intercepted clients

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::{Result, StuboError};

/// Outgoing HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl HttpRequest {
    /// Create a request with no headers
    ///
    /// # Errors
    ///
    /// Returns error if `url` is not a valid URI
    pub fn new(method: Method, url: &str, body: impl Into<Bytes>) -> Result<Self> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| StuboError::InvalidUri(format!("'{url}': {e}")))?;

        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: body.into(),
        })
    }

    /// Set a header, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns error if the name or value is not a valid header
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StuboError::Protocol(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StuboError::Protocol(format!("Invalid header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }
}

/// Incoming HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Canonical reason phrase for the status
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Header value as text, if present and valid
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as UTF-8, lossily
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Header pairs as owned strings, skipping non-text values
#[must_use]
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<invalid>").to_string(),
            )
        })
        .collect()
}

/// HTTP client performing the actual network round trips
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpTransport {
    /// Create a new transport for `http` and `https` targets
    ///
    /// # Errors
    ///
    /// Returns error if the TLS crypto provider cannot be installed
    pub fn new() -> Result<Self> {
        ensure_crypto_provider()?;

        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("No native TLS roots available, https targets will fail: {e}");
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };

        let connector = builder
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Ok(Self { client })
    }

    /// Send a request and read the full response
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body cannot be read
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("Sending {} {}", request.method, request.uri);

        let mut builder = Request::builder()
            .method(request.method)
            .uri(request.uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }

        let http_request = builder
            .body(Full::new(request.body))
            .map_err(|e| StuboError::Protocol(format!("Failed to build request: {e}")))?;

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Request failed: {e}");
            StuboError::Transport(format!("Request failed: {e}"))
        })?;

        let status = response.status();
        let headers = response.headers().clone();

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| StuboError::Transport(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn ensure_crypto_provider() -> Result<()> {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return Ok(());
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err(StuboError::Transport(
            "Failed to install rustls crypto provider".to_string(),
        ));
    }
    Ok(())
}
