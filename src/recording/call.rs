//! Captured HTTP exchanges

use std::fmt;

use bytes::Bytes;
use hyper::Uri;

use crate::network::{header_pairs, HttpRequest, HttpResponse};
use crate::{Result, StuboError};

/// One HTTP request/response observed while recording
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpCall {
    /// Target `host[:port]` of the request
    pub host: String,
    /// Request method
    pub request_method: String,
    /// Full request URL
    pub request_url: String,
    /// Request body
    pub request_body: Bytes,
    /// Request headers
    pub request_headers: Vec<(String, String)>,
    /// Response status, set once the response arrives
    pub response_status: Option<u16>,
    /// Response reason phrase
    pub response_reason: Option<String>,
    /// Response headers
    pub response_headers: Vec<(String, String)>,
    /// Response body
    pub response_body: Bytes,
}

impl HttpCall {
    /// Start an entry from an outgoing request
    pub fn from_request(host: impl Into<String>, request: &HttpRequest) -> Self {
        Self {
            host: host.into(),
            request_method: request.method.to_string(),
            request_url: request.uri.to_string(),
            request_body: request.body.clone(),
            request_headers: header_pairs(&request.headers),
            ..Self::default()
        }
    }

    /// Fill in the response half of the exchange
    pub fn complete(&mut self, response: &HttpResponse) {
        self.response_status = Some(response.status.as_u16());
        self.response_reason = Some(response.reason().to_string());
        self.response_headers = header_pairs(&response.headers);
        self.response_body = response.body.clone();
    }

    /// Whether the response has been recorded
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.response_status.is_some()
    }

    /// Parsed request URL
    ///
    /// # Errors
    ///
    /// Returns error if the stored URL is not a valid URI
    pub fn url_parts(&self) -> Result<Uri> {
        self.request_url
            .parse::<Uri>()
            .map_err(|e| StuboError::InvalidUri(format!("'{}': {e}", self.request_url)))
    }

    /// Decoded query parameters of the request URL, in order
    ///
    /// Repeated keys yield one pair per value; blank values are skipped.
    #[must_use]
    pub fn request_query_args(&self) -> Vec<(String, String)> {
        let query = self
            .request_url
            .split_once('?')
            .map(|(_, q)| q.split('#').next().unwrap_or_default())
            .unwrap_or_default();
        parse_query(query)
    }

    /// Request body as text
    #[must_use]
    pub fn request_text(&self) -> String {
        String::from_utf8_lossy(&self.request_body).into_owned()
    }

    /// Response body as text
    #[must_use]
    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.response_body).into_owned()
    }
}

impl fmt::Display for HttpCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "request: {} {} {}, {:?}",
            self.request_method,
            self.request_url,
            self.request_text(),
            self.request_headers
        )?;
        write!(
            f,
            "response: {}, {}, {}, {:?}",
            self.response_status
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
            self.response_reason.as_deref().unwrap_or("-"),
            self.response_text(),
            self.response_headers
        )
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if value.is_empty() {
                return None;
            }
            Some((decode_component(key), decode_component(value)))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map_or(spaced.clone(), |s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use hyper::{HeaderMap, Method, StatusCode};

    fn request(url: &str, body: &'static str) -> HttpRequest {
        let mut request = HttpRequest::new(Method::POST, url, body).unwrap();
        request.set_header("content-type", "text/plain").unwrap();
        request
    }

    #[test]
    fn test_from_request() {
        let call = HttpCall::from_request("httpbin.org", &request("http://httpbin.org/post", "hello world"));

        assert_eq!(call.host, "httpbin.org");
        assert_eq!(call.request_method, "POST");
        assert_eq!(call.request_url, "http://httpbin.org/post");
        assert_eq!(call.request_text(), "hello world");
        assert_eq!(
            call.request_headers,
            vec![("content-type".to_string(), "text/plain".to_string())]
        );
        assert!(!call.is_complete());
    }

    #[test]
    fn test_complete() {
        let mut call = HttpCall::from_request("x", &request("http://x/y", "hello"));
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        call.complete(&HttpResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"{\"data\":\"hello\"}"),
        });

        assert!(call.is_complete());
        assert_eq!(call.response_status, Some(200));
        assert_eq!(call.response_reason.as_deref(), Some("OK"));
        assert_eq!(call.response_text(), "{\"data\":\"hello\"}");
    }

    #[test]
    fn test_request_query_args() {
        let call = HttpCall::from_request(
            "httpbin.org",
            &request("http://httpbin.org/post?x=y&a=b&a=c&empty=&sp=a+b%21", ""),
        );
        assert_eq!(
            call.request_query_args(),
            vec![
                ("x".to_string(), "y".to_string()),
                ("a".to_string(), "b".to_string()),
                ("a".to_string(), "c".to_string()),
                ("sp".to_string(), "a b!".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_query_args_none() {
        let call = HttpCall::from_request("x", &request("http://x/y", ""));
        assert!(call.request_query_args().is_empty());
    }

    #[test]
    fn test_url_parts() {
        let call = HttpCall::from_request("x:8080", &request("http://x:8080/y?q=1", ""));
        let uri = call.url_parts().unwrap();
        assert_eq!(uri.port_u16(), Some(8080));
        assert_eq!(uri.path(), "/y");
    }

    #[test]
    fn test_display() {
        let call = HttpCall::from_request("x", &request("http://x/y", "hello"));
        let text = call.to_string();
        assert!(text.starts_with("request: POST http://x/y hello"));
        assert!(text.contains("response: -, -"));
    }
}
