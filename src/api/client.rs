//! Authenticated calls against the stub server

use bytes::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{ClientConfig, Mode};
use crate::network::{HttpRequest, HttpResponse, HttpTransport};
use crate::stub::StubData;
use crate::{Result, StuboError};

use super::operation::{method_to_path, Operation};
use super::STUBO_VERSION_HEADER;

/// Payload of a stub server call
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Raw bytes sent as-is
    Raw(Bytes),
    /// JSON document
    Json(Value),
}

/// Response of a stub server call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    inner: HttpResponse,
}

impl ApiResponse {
    /// HTTP status
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// Raw response body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    /// Body decoded as UTF-8, lossily
    #[must_use]
    pub fn text(&self) -> String {
        self.inner.text()
    }

    /// Body parsed as JSON
    ///
    /// # Errors
    ///
    /// Returns error if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.inner.body)?)
    }

    /// The `data` member of the response envelope, `Null` when absent
    ///
    /// # Errors
    ///
    /// Returns error if the body is not JSON
    pub fn data(&self) -> Result<Value> {
        let mut envelope: Value = self.json()?;
        Ok(envelope
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Underlying HTTP response
    #[must_use]
    pub fn into_inner(self) -> HttpResponse {
        self.inner
    }
}

/// Client for the stub server REST API
#[derive(Clone)]
pub struct StuboClient {
    config: ClientConfig,
    transport: HttpTransport,
}

impl StuboClient {
    /// Create a client for the configured server
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP transport cannot be created
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(config, HttpTransport::new()?))
    }

    /// Create a client sharing an existing transport
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: HttpTransport) -> Self {
        Self { config, transport }
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Underlying transport
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Full URL of an operation path with query parameters
    #[must_use]
    pub fn url(&self, path: &str, params: &[(String, String)]) -> String {
        let mut url = format!(
            "{}://{}/{}/{}",
            self.config.scheme(),
            self.config.host,
            self.config.api_version,
            path
        );

        if !params.is_empty() {
            url.push('?');
            url.push_str(&encode_query(params));
        }
        url
    }

    /// Call an operation
    ///
    /// # Errors
    ///
    /// Returns `Remote` if the server signals an error, or a transport error
    pub async fn call(
        &self,
        operation: Operation,
        params: &[(String, String)],
        body: Option<RequestBody>,
    ) -> Result<ApiResponse> {
        self.invoke(operation.name(), params, body).await
    }

    /// Call an operation by name, including ones not in [`Operation`]
    ///
    /// # Errors
    ///
    /// Returns `Remote` if the server signals an error, or a transport error
    pub async fn invoke(
        &self,
        name: &str,
        params: &[(String, String)],
        body: Option<RequestBody>,
    ) -> Result<ApiResponse> {
        let url = self.url(&method_to_path(name), params);
        self.post(&url, body).await
    }

    async fn post(&self, url: &str, body: Option<RequestBody>) -> Result<ApiResponse> {
        debug!("post url: {url}");

        let mut request = match body {
            Some(RequestBody::Json(value)) => {
                let mut request = HttpRequest::new(Method::POST, url, serde_json::to_vec(&value)?)?;
                request.set_header(CONTENT_TYPE.as_str(), "application/json")?;
                request
            }
            Some(RequestBody::Raw(bytes)) => HttpRequest::new(Method::POST, url, bytes)?,
            None => HttpRequest::new(Method::POST, url, Bytes::new())?,
        };

        if let Some(auth) = &self.config.auth {
            request.set_header(AUTHORIZATION.as_str(), &auth.header_value())?;
        }

        let response = self.transport.send(request).await?;
        raise_on_error(&response)?;
        Ok(ApiResponse { inner: response })
    }

    /// Delete every stub of a scenario
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn delete_stubs(&self, scenario: &str, force: bool) -> Result<ApiResponse> {
        let mut params = vec![param("scenario", scenario)];
        if force {
            params.push(param("force", "true"));
        }
        self.call(Operation::DeleteStubs, &params, None).await
    }

    /// Begin a record or playback session
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn begin_session(
        &self,
        scenario: &str,
        session: &str,
        mode: Mode,
    ) -> Result<ApiResponse> {
        let params = [
            param("scenario", scenario),
            param("session", session),
            param("mode", mode.as_str()),
        ];
        self.call(Operation::BeginSession, &params, None).await
    }

    /// End a session
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn end_session(
        &self,
        scenario: &str,
        session: &str,
        mode: Option<Mode>,
    ) -> Result<ApiResponse> {
        let mut params = vec![param("scenario", scenario), param("session", session)];
        if let Some(mode) = mode {
            params.push(param("mode", mode.as_str()));
        }
        self.call(Operation::EndSession, &params, None).await
    }

    /// Store a stub in a recording session
    ///
    /// `extra` is appended to the query string, e.g. the recorded request's
    /// own query parameters.
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn put_stub(
        &self,
        session: &str,
        stub: &StubData,
        extra: &[(String, String)],
    ) -> Result<ApiResponse> {
        let params = with_extra(vec![param("session", session)], extra);
        self.call(
            Operation::PutStub,
            &params,
            Some(RequestBody::Json(stub.payload()?)),
        )
        .await
    }

    /// Store a stub given in the legacy text format
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn put_stub_raw(
        &self,
        session: &str,
        payload: impl Into<Bytes>,
    ) -> Result<ApiResponse> {
        let params = [param("session", session)];
        self.call(
            Operation::PutStub,
            &params,
            Some(RequestBody::Raw(payload.into())),
        )
        .await
    }

    /// Look up the stored response matching `request_body`
    ///
    /// # Errors
    ///
    /// Returns `Remote` if the session is not in playback or nothing matches
    pub async fn get_response(
        &self,
        session: &str,
        request_body: impl Into<Bytes>,
        extra: &[(String, String)],
    ) -> Result<ApiResponse> {
        let params = with_extra(vec![param("session", session)], extra);
        self.call(
            Operation::GetResponse,
            &params,
            Some(RequestBody::Raw(request_body.into())),
        )
        .await
    }

    /// Server status, optionally narrowed to a scenario or session
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn get_status(
        &self,
        scenario: Option<&str>,
        session: Option<&str>,
    ) -> Result<ApiResponse> {
        let mut params = Vec::new();
        if let Some(scenario) = scenario {
            params.push(param("scenario", scenario));
        }
        if let Some(session) = session {
            params.push(param("session", session));
        }
        self.call(Operation::GetStatus, &params, None).await
    }

    /// Stubs of a scenario
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn get_stublist(&self, scenario: &str) -> Result<ApiResponse> {
        self.call(Operation::GetStublist, &[param("scenario", scenario)], None)
            .await
    }

    /// Export a scenario
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn get_export(&self, scenario: &str) -> Result<ApiResponse> {
        self.call(Operation::GetExport, &[param("scenario", scenario)], None)
            .await
    }

    /// Execute a command file
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn exec_cmds(&self, cmdfile: &str) -> Result<ApiResponse> {
        self.call(Operation::ExecCmds, &[param("cmdfile", cmdfile)], None)
            .await
    }

    /// Read one delay policy, or all of them
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn get_delay_policy(&self, name: Option<&str>) -> Result<ApiResponse> {
        let params: Vec<_> = name.map(|n| param("name", n)).into_iter().collect();
        self.call(Operation::GetDelayPolicy, &params, None).await
    }

    /// Create or replace a delay policy
    ///
    /// `settings` carries the type-specific values, e.g. `milliseconds`.
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn put_delay_policy(
        &self,
        name: &str,
        delay_type: &str,
        settings: &[(String, String)],
    ) -> Result<ApiResponse> {
        let params = with_extra(
            vec![param("name", name), param("delay_type", delay_type)],
            settings,
        );
        self.call(Operation::PutDelayPolicy, &params, None).await
    }

    /// Delete a delay policy
    ///
    /// # Errors
    ///
    /// Returns error if the call fails
    pub async fn delete_delay_policy(&self, name: &str) -> Result<ApiResponse> {
        self.call(Operation::DeleteDelayPolicy, &[param("name", name)], None)
            .await
    }
}

/// Build one query parameter
pub fn param(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

fn with_extra(
    mut params: Vec<(String, String)>,
    extra: &[(String, String)],
) -> Vec<(String, String)> {
    params.extend(extra.iter().cloned());
    params
}

fn encode_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Turn an error reported by the stub server into `StuboError::Remote`
///
/// Only non-200 responses carrying the server's version header and a JSON
/// body are examined; anything else is handed back untouched.
fn raise_on_error(response: &HttpResponse) -> Result<()> {
    if response.status == StatusCode::OK || response.header(STUBO_VERSION_HEADER).is_none() {
        return Ok(());
    }

    let is_json = response
        .header(CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return Ok(());
    }

    let Ok(envelope) = serde_json::from_slice::<Value>(&response.body) else {
        return Ok(());
    };

    match envelope.get("error") {
        Some(error) if !error.is_null() => {
            let code = error
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| i64::from(response.status.as_u16()));
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Err(StuboError::remote(code, message))
        }
        _ => Ok(()),
    }
}
