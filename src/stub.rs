//! Stub records pushed to the stub server

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Default response status of a stub
pub const DEFAULT_STATUS: u16 = 200;

/// Default request method of a stub
pub const DEFAULT_METHOD: &str = "POST";

/// Literal substrings the request body must contain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyPattern {
    /// Substrings that must all be present
    pub contains: Vec<String>,
}

/// Request matcher of a stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubRequest {
    /// HTTP method to match
    pub method: String,
    /// Exactly one matcher clause list
    #[serde(rename = "bodyPatterns")]
    pub body_patterns: [BodyPattern; 1],
}

/// Response body, either a single text or a list of texts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Scalar body
    Text(String),
    /// Sequence body
    Lines(Vec<String>),
}

impl ResponseBody {
    /// Body as a sequence, wrapping a scalar into one element
    #[must_use]
    pub fn to_lines(&self) -> Vec<String> {
        match self {
            ResponseBody::Text(text) => vec![text.clone()],
            ResponseBody::Lines(lines) => lines.clone(),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

impl From<Vec<String>> for ResponseBody {
    fn from(lines: Vec<String>) -> Self {
        ResponseBody::Lines(lines)
    }
}

impl From<Vec<&str>> for ResponseBody {
    fn from(lines: Vec<&str>) -> Self {
        ResponseBody::Lines(lines.into_iter().map(ToString::to_string).collect())
    }
}

/// Canned response of a stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubResponse {
    /// Response status
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
    /// Named delay policy applied on playback
    #[serde(
        rename = "delayPolicy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub delay_policy: Option<String>,
}

fn default_status() -> u16 {
    DEFAULT_STATUS
}

/// One request matcher and canned response, in the server's stub format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubData {
    request: StubRequest,
    response: StubResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    module: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recorded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Map<String, Value>>,
}

impl StubData {
    /// Build a stub matching `request_body` and answering `response_body`
    pub fn new(
        request_body: impl Into<String>,
        response_body: impl Into<ResponseBody>,
        method: impl Into<String>,
        status: u16,
    ) -> Self {
        Self {
            request: StubRequest {
                method: method.into(),
                body_patterns: [BodyPattern {
                    contains: vec![request_body.into()],
                }],
            },
            response: StubResponse {
                status,
                body: Some(response_body.into()),
                delay_policy: None,
            },
            module: None,
            recorded: None,
            args: None,
        }
    }

    /// Build a `POST` stub answering with status 200
    pub fn with_defaults(
        request_body: impl Into<String>,
        response_body: impl Into<ResponseBody>,
    ) -> Self {
        Self::new(request_body, response_body, DEFAULT_METHOD, DEFAULT_STATUS)
    }

    /// Parse a stub from its JSON payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload does not have the stub shape
    pub fn from_payload(payload: Value) -> Result<Self> {
        Ok(serde_json::from_value(payload)?)
    }

    /// JSON payload sent to the server
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized
    pub fn payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Request matcher
    #[must_use]
    pub fn request(&self) -> &StubRequest {
        &self.request
    }

    /// Canned response
    #[must_use]
    pub fn response(&self) -> &StubResponse {
        &self.response
    }

    /// Method the stub matches
    #[must_use]
    pub fn request_method(&self) -> &str {
        &self.request.method
    }

    /// Substrings the request body must contain
    #[must_use]
    pub fn contains_matchers(&self) -> &[String] {
        &self.request.body_patterns[0].contains
    }

    /// Replace the matcher substrings
    pub fn set_contains_matchers(&mut self, matchers: Vec<String>) {
        self.request.body_patterns[0].contains = matchers;
    }

    /// Number of matcher substrings
    #[must_use]
    pub fn number_of_matchers(&self) -> usize {
        self.contains_matchers().len()
    }

    /// Response status
    #[must_use]
    pub fn response_status(&self) -> u16 {
        self.response.status
    }

    /// Response body, a scalar body read back as one element
    #[must_use]
    pub fn response_body(&self) -> Option<Vec<String>> {
        self.response.body.as_ref().map(ResponseBody::to_lines)
    }

    /// Replace the response body
    pub fn set_response_body(&mut self, body: impl Into<ResponseBody>) {
        self.response.body = Some(body.into());
    }

    /// Delay policy name
    #[must_use]
    pub fn delay_policy(&self) -> Option<&str> {
        self.response.delay_policy.as_deref()
    }

    /// Set the delay policy name
    pub fn set_delay_policy(&mut self, policy: impl Into<String>) {
        self.response.delay_policy = Some(policy.into());
    }

    /// Extension module descriptor
    #[must_use]
    pub fn module(&self) -> Option<&Value> {
        self.module.as_ref()
    }

    /// Attach an extension module descriptor
    pub fn set_module(&mut self, module: Value) {
        self.module = Some(module);
    }

    /// Recorded-at marker
    #[must_use]
    pub fn recorded(&self) -> Option<&str> {
        self.recorded.as_deref()
    }

    /// Set the recorded-at marker
    pub fn set_recorded(&mut self, recorded: impl Into<String>) {
        self.recorded = Some(recorded.into());
    }

    /// Server-side arguments stored with the stub
    #[must_use]
    pub fn args(&self) -> Map<String, Value> {
        self.args.clone().unwrap_or_default()
    }

    /// Size of the serialized payload in bytes
    #[must_use]
    pub fn space_used(&self) -> usize {
        self.to_string().len()
    }
}

impl fmt::Display for StubData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
