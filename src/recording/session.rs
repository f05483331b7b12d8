//! Record/playback sessions against the stub server

use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use tracing::{info, warn};

use crate::api::StuboClient;
use crate::config::{ClientConfig, Mode, SessionConfig};
use crate::network::InterceptedClient;
use crate::stub::{StubData, DEFAULT_STATUS};
use crate::{Result, StuboError};

use super::adapter::StuboInterceptor;
use super::call::HttpCall;
use super::{STATUS_DORMANT, STATUS_NOT_FOUND};

/// State shared between a session and its interceptors
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) mode: Option<Mode>,
    pub(crate) calls: Vec<HttpCall>,
    pub(crate) current: Option<HttpCall>,
    pub(crate) started: bool,
}

pub(crate) fn lock_state(state: &Mutex<SessionState>) -> Result<MutexGuard<'_, SessionState>> {
    state
        .lock()
        .map_err(|_| StuboError::Protocol("session state lock poisoned".to_string()))
}

/// Clear the started flag, returning what stop needs if it was set
fn take_started(state: &Mutex<SessionState>) -> Result<Option<(Option<Mode>, Vec<HttpCall>)>> {
    let mut state = lock_state(state)?;
    if !state.started {
        return Ok(None);
    }
    state.started = false;
    Ok(Some((state.mode, state.calls.clone())))
}

/// Push the recorded stubs, then end the session on the server
async fn finish(
    stubo: &StuboClient,
    config: &SessionConfig,
    mode: Option<Mode>,
    calls: &[HttpCall],
) -> Result<()> {
    let recording = mode.is_some_and(Mode::is_record);

    let mut failed = 0;
    let mut first_failure = None;
    if recording {
        for call in calls {
            if let Err(e) = push_stub(stubo, config, call).await {
                warn!(
                    "Failed to push stub for {} {}: {e}",
                    call.request_method, call.request_url
                );
                failed += 1;
                first_failure.get_or_insert(e);
            }
        }
    }

    stubo
        .end_session(&config.scenario, &config.session, mode)
        .await?;

    info!(
        "Stopped session {} ({} stubs pushed)",
        config.session,
        if recording { calls.len() - failed } else { 0 }
    );

    match first_failure {
        Some(first) => Err(StuboError::StubPush {
            failed,
            total: calls.len(),
            first: Box::new(first),
        }),
        None => Ok(()),
    }
}

async fn push_stub(stubo: &StuboClient, config: &SessionConfig, call: &HttpCall) -> Result<()> {
    let mut stub = StubData::new(
        call.request_text(),
        call.response_text(),
        call.request_method.clone(),
        call.response_status.unwrap_or(DEFAULT_STATUS),
    );
    if let Some(module) = &config.module {
        stub.set_module(module.clone());
    }

    stubo
        .put_stub(&config.session, &stub, &call.request_query_args())
        .await?;
    Ok(())
}

/// Finishes a started session whose scoped run was dropped before stopping
///
/// The work is spawned on the current runtime; without one the session is
/// left open on the server.
struct StopGuard {
    stubo: StuboClient,
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        let Ok(Some((mode, calls))) = take_started(&self.state) else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "Session {} dropped while started and no runtime is available to end it",
                self.config.session
            );
            return;
        };

        warn!(
            "Scoped run of session {} was cancelled, ending it in the background",
            self.config.session
        );
        let stubo = self.stubo.clone();
        let config = self.config.clone();
        handle.spawn(async move {
            if let Err(e) = finish(&stubo, &config, mode, &calls).await {
                warn!("Failed to end cancelled session {}: {e}", config.session);
            }
        });
    }
}

/// A named record/playback session within a scenario
///
/// In record mode every request made through [`Session::http_client`] goes to
/// its real destination and is captured; stopping the session turns the
/// captured exchanges into stubs. In playback mode requests are answered by
/// the stub server instead.
pub struct Session {
    config: SessionConfig,
    stubo: StuboClient,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Create a session talking to the configured stub server
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP transport cannot be created
    pub fn new(client: ClientConfig, config: SessionConfig) -> Result<Self> {
        Ok(Self::with_client(StuboClient::new(client)?, config))
    }

    /// Create a session from an existing client
    #[must_use]
    pub fn with_client(stubo: StuboClient, config: SessionConfig) -> Self {
        let state = SessionState {
            mode: config.mode,
            ..SessionState::default()
        };

        Self {
            config,
            stubo,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Scenario name
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.config.scenario
    }

    /// Session name
    #[must_use]
    pub fn session_name(&self) -> &str {
        &self.config.session
    }

    /// Stub server client
    #[must_use]
    pub fn stubo(&self) -> &StuboClient {
        &self.stubo
    }

    /// Whether `start` completed and `stop` has not run yet
    #[must_use]
    pub fn is_started(&self) -> bool {
        lock_state(&self.state).is_ok_and(|state| state.started)
    }

    /// Current mode, `None` until resolved
    ///
    /// # Errors
    ///
    /// Returns error if the session state is poisoned
    pub fn mode(&self) -> Result<Option<Mode>> {
        Ok(lock_state(&self.state)?.mode)
    }

    /// Pin the mode, or clear it so it is discovered on the next run
    ///
    /// # Errors
    ///
    /// Returns error if the session state is poisoned
    pub fn set_mode(&self, mode: Option<Mode>) -> Result<()> {
        lock_state(&self.state)?.mode = mode;
        Ok(())
    }

    /// Exchanges recorded so far, in the order they were observed
    ///
    /// # Errors
    ///
    /// Returns error if the session state is poisoned
    pub fn calls(&self) -> Result<Vec<HttpCall>> {
        Ok(lock_state(&self.state)?.calls.clone())
    }

    /// HTTP client whose requests are recorded or redirected by this session
    #[must_use]
    pub fn http_client(&self) -> InterceptedClient {
        let interceptor = StuboInterceptor::new(
            Arc::downgrade(&self.state),
            self.config.session.clone(),
            self.stubo.config().host.clone(),
            self.stubo.config().auth.clone(),
        );
        InterceptedClient::new(self.stubo.transport().clone(), Arc::new(interceptor))
    }

    /// Status of this session on the server, `notfound` when unknown
    ///
    /// # Errors
    ///
    /// Returns error if the status call fails
    pub async fn session_status(&self) -> Result<String> {
        let data = self
            .stubo
            .get_status(None, Some(&self.config.session))
            .await?
            .data()?;

        Ok(data
            .get("session")
            .and_then(|s| s.get("status"))
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(STATUS_NOT_FOUND)
            .to_string())
    }

    /// Work out the mode from the session's status on the server
    ///
    /// # Errors
    ///
    /// Returns `Remote` if the session is neither unknown nor dormant
    pub async fn discover_mode(&self) -> Result<Mode> {
        let status = self.session_status().await?;
        let mode = match status.as_str() {
            STATUS_NOT_FOUND => Mode::Record,
            STATUS_DORMANT => Mode::Playback,
            other => {
                return Err(StuboError::remote(
                    400,
                    format!(
                        "session '{}' in '{other}' mode should be dormant",
                        self.config.session
                    ),
                ))
            }
        };

        info!(
            "Session {} is {status}, using {mode} mode",
            self.config.session
        );
        Ok(mode)
    }

    /// Register the session with the server
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the mode is unresolved, or the server's error
    pub async fn start(&mut self) -> Result<()> {
        let mode = self.mode()?.ok_or_else(|| {
            StuboError::Protocol(format!(
                "session '{}' started before its mode was resolved",
                self.config.session
            ))
        })?;

        if mode.is_record() && self.config.delete_stubs {
            self.stubo
                .delete_stubs(&self.config.scenario, self.config.delete_stubs_force)
                .await?;
        }

        self.stubo
            .begin_session(&self.config.scenario, &self.config.session, mode)
            .await?;
        lock_state(&self.state)?.started = true;

        info!(
            "Started {mode} session {} in scenario {}",
            self.config.session, self.config.scenario
        );
        Ok(())
    }

    /// Push recorded stubs and end the session on the server
    ///
    /// Does nothing if `start` never completed. A failed stub push does not
    /// stop the remaining pushes or the end-session call; the first failure
    /// is reported once the session has ended.
    ///
    /// # Errors
    ///
    /// Returns the end-session error, else `StubPush` if any push failed
    pub async fn stop(&mut self) -> Result<()> {
        match take_started(&self.state)? {
            Some((mode, calls)) => finish(&self.stubo, &self.config, mode, &calls).await,
            None => Ok(()),
        }
    }

    /// Run `f` with traffic recorded
    ///
    /// # Errors
    ///
    /// Returns the first of: a start failure, a stop failure, or `f`'s error
    pub async fn record<F, Fut, T, E>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(InterceptedClient) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<StuboError>,
    {
        self.set_mode(Some(Mode::Record))?;
        self.run(f).await
    }

    /// Run `f` with traffic answered by the stub server
    ///
    /// # Errors
    ///
    /// Returns the first of: a start failure, a stop failure, or `f`'s error
    pub async fn play<F, Fut, T, E>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(InterceptedClient) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<StuboError>,
    {
        self.set_mode(Some(Mode::Playback))?;
        self.run(f).await
    }

    /// Run `f` in `mode`, the configured mode, or the discovered one
    ///
    /// # Errors
    ///
    /// Returns the first of: a discovery or start failure, a stop failure,
    /// or `f`'s error
    pub async fn record_or_play<F, Fut, T, E>(
        &mut self,
        mode: Option<Mode>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(InterceptedClient) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<StuboError>,
    {
        self.set_mode(mode.or(self.config.mode))?;
        self.run(f).await
    }

    /// Start, run `f`, and stop on every exit path
    ///
    /// A panic in `f` is resumed after the session has been stopped. A stop
    /// failure takes precedence over `f`'s own result. If the returned future
    /// is dropped while the session is started, stopping is spawned onto the
    /// current runtime instead.
    async fn run<F, Fut, T, E>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(InterceptedClient) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<StuboError>,
    {
        let _guard = StopGuard {
            stubo: self.stubo.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
        };

        let outcome = match self.enter().await {
            Ok(()) => {
                let client = self.http_client();
                AssertUnwindSafe(async move { f(client).await })
                    .catch_unwind()
                    .await
            }
            Err(e) => Ok(Err(E::from(e))),
        };

        let stopped = self.stop().await;

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                if let Err(e) = &stopped {
                    warn!("Failed to stop session after panic: {e}");
                }
                resume_unwind(panic)
            }
        };

        stopped.map_err(E::from)?;
        result
    }

    async fn enter(&mut self) -> Result<()> {
        {
            let mut state = lock_state(&self.state)?;
            state.calls.clear();
            state.current = None;
        }

        if self.mode()?.is_none() {
            let mode = self.discover_mode().await?;
            self.set_mode(Some(mode))?;
        }
        self.start().await
    }
}
