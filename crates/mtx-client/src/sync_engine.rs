use std::time::Duration;

use mtx_core::{
    DEFAULT_SYNC_TIMEOUT, PresenceState, RequestError, RetryPolicy, SyncOptions, SyncResponse,
    SyncStateMachine, SyncTicket,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{dispatcher::RequestDispatcher, session::SessionContext};

/// Receives the outcome of every completed sync request.
pub trait SyncHandler: Send + 'static {
    fn on_sync(&mut self, outcome: Result<&SyncResponse, &RequestError>);
}

impl<F> SyncHandler for F
where
    F: FnMut(Result<&SyncResponse, &RequestError>) + Send + 'static,
{
    fn on_sync(&mut self, outcome: Result<&SyncResponse, &RequestError>) {
        self(outcome)
    }
}

/// Tuning of the sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineConfig {
    /// Server-side wait for incremental syncs.
    pub long_poll_timeout: Duration,
    /// Server-side wait for the initial sync and its retries.
    pub initial_timeout: Duration,
    pub filter: Option<String>,
    pub full_state: bool,
    pub set_presence: Option<PresenceState>,
    pub retry: RetryPolicy,
    /// Added to the server-side wait to get the client-side request timeout.
    pub request_timeout_slack: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout: DEFAULT_SYNC_TIMEOUT,
            initial_timeout: Duration::ZERO,
            filter: None,
            full_state: false,
            set_presence: None,
            retry: RetryPolicy::default(),
            request_timeout_slack: Duration::from_secs(30),
        }
    }
}

impl SyncEngineConfig {
    pub fn options_for(&self, ticket: &SyncTicket) -> SyncOptions {
        SyncOptions {
            since: ticket.since.clone(),
            timeout: if ticket.initial {
                self.initial_timeout
            } else {
                self.long_poll_timeout
            },
            filter: self.filter.clone(),
            full_state: self.full_state,
            set_presence: self.set_presence,
        }
    }
}

/// Long-poll loop over `/sync`.
///
/// The loop owns the [`SyncStateMachine`]; each request is awaited before the
/// next one is issued, and the continuation token only advances on success.
pub struct SyncEngine<H> {
    dispatcher: RequestDispatcher,
    session: SessionContext,
    config: SyncEngineConfig,
    handler: H,
    state: SyncStateMachine,
}

impl<H: SyncHandler> SyncEngine<H> {
    pub fn new(
        dispatcher: RequestDispatcher,
        session: SessionContext,
        config: SyncEngineConfig,
        handler: H,
    ) -> Self {
        Self {
            dispatcher,
            session,
            config,
            handler,
            state: SyncStateMachine::default(),
        }
    }

    /// Skip the initial sync and continue from a known token.
    pub fn resume_from(mut self, since: impl Into<String>) -> Self {
        self.state = SyncStateMachine::resume(since);
        self
    }

    /// Run until `stop` is cancelled. Returns the last confirmed token.
    pub async fn run(mut self, stop: CancellationToken) -> Option<String> {
        info!(resume = self.state.since().is_some(), "sync loop started");
        let mut attempt: u32 = 0;

        loop {
            if stop.is_cancelled() {
                break;
            }

            let ticket = match self.state.begin_request() {
                Ok(ticket) => ticket,
                Err(err) => {
                    warn!(code = err.code(), "sync loop cannot issue a request");
                    break;
                }
            };
            let options = self.config.options_for(&ticket);
            let request_timeout = options.timeout + self.config.request_timeout_slack;
            debug!(
                since = ?options.since,
                timeout_ms = options.timeout.as_millis() as u64,
                initial = ticket.initial,
                attempt,
                "issuing sync"
            );

            let outcome = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                outcome = self.dispatcher.sync(&options, Some(request_timeout)) => outcome,
            };

            match outcome {
                Ok(response) => {
                    if let Err(err) = self.state.on_success(response.next_batch.as_str()) {
                        warn!(code = err.code(), "discarding sync response");
                        break;
                    }
                    attempt = 0;
                    self.session
                        .set_next_batch(response.next_batch.clone())
                        .await;
                    debug!(
                        next_batch = %response.next_batch,
                        events = response.timeline_event_count(),
                        "sync completed"
                    );
                    self.handler.on_sync(Ok(&response));
                }
                Err(err) => {
                    if let Err(state_err) = self.state.on_failure() {
                        warn!(code = state_err.code(), "discarding sync failure");
                        break;
                    }
                    warn!(
                        error = %err,
                        category = ?err.category(),
                        since = ?self.state.since(),
                        "sync failed; retrying from last token"
                    );
                    self.handler.on_sync(Err(&err));

                    let delay = self.config.retry.delay_for_attempt(attempt, err.retry_after());
                    attempt = attempt.saturating_add(1);
                    if !delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        let abandoned = self.state.is_in_flight();
        self.state.stop();
        let since = self.state.since().map(ToOwned::to_owned);
        info!(since = ?since, abandoned_request = abandoned, "sync loop stopped");
        since
    }
}
