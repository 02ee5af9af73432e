use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of the sync loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncPhase {
    /// No sync has been issued yet.
    Idle,
    /// The initial sync (no continuation token) is in flight or being retried.
    AwaitingInitialSync,
    /// A continuation token is held and no request is in flight.
    Synced,
    /// An incremental sync is in flight or being retried.
    AwaitingIncrementalSync,
    /// The loop was shut down; no further requests are issued.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncStateError {
    #[error("a sync request is already in flight")]
    RequestInFlight,
    #[error("no sync request is in flight")]
    NoRequestInFlight,
    #[error("sync loop is stopped")]
    Stopped,
}

impl SyncStateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestInFlight => "sync_request_in_flight",
            Self::NoRequestInFlight => "sync_request_not_in_flight",
            Self::Stopped => "sync_stopped",
        }
    }
}

/// Parameters handed out for the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTicket {
    /// Continuation token to send, `None` for the initial sync.
    pub since: Option<String>,
    /// Whether this is the initial sync (or a retry of it).
    pub initial: bool,
}

/// Owner of the continuation token.
///
/// Hands out at most one [`SyncTicket`] at a time and only advances the token
/// on success, so a failed request is always retried from the last token the
/// server confirmed.
#[derive(Debug, Clone)]
pub struct SyncStateMachine {
    phase: SyncPhase,
    since: Option<String>,
    in_flight: bool,
}

impl Default for SyncStateMachine {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            since: None,
            in_flight: false,
        }
    }
}

impl SyncStateMachine {
    /// Continue from a token persisted by an earlier session.
    pub fn resume(since: impl Into<String>) -> Self {
        Self {
            phase: SyncPhase::Synced,
            since: Some(since.into()),
            in_flight: false,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Last continuation token confirmed by the server.
    pub fn since(&self) -> Option<&str> {
        self.since.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn begin_request(&mut self) -> Result<SyncTicket, SyncStateError> {
        if self.in_flight {
            return Err(SyncStateError::RequestInFlight);
        }

        let next = match self.phase {
            SyncPhase::Idle | SyncPhase::AwaitingInitialSync => SyncPhase::AwaitingInitialSync,
            SyncPhase::Synced | SyncPhase::AwaitingIncrementalSync => {
                SyncPhase::AwaitingIncrementalSync
            }
            SyncPhase::Stopped => return Err(SyncStateError::Stopped),
        };

        self.phase = next;
        self.in_flight = true;
        Ok(SyncTicket {
            since: self.since.clone(),
            initial: next == SyncPhase::AwaitingInitialSync,
        })
    }

    pub fn on_success(&mut self, next_batch: impl Into<String>) -> Result<(), SyncStateError> {
        self.finish()?;
        self.since = Some(next_batch.into());
        self.phase = SyncPhase::Synced;
        Ok(())
    }

    /// Record a failed request. The phase stays put so the next ticket is a
    /// retry of the same request.
    pub fn on_failure(&mut self) -> Result<(), SyncStateError> {
        self.finish()
    }

    pub fn stop(&mut self) {
        self.phase = SyncPhase::Stopped;
        self.in_flight = false;
    }

    fn finish(&mut self) -> Result<(), SyncStateError> {
        if self.phase == SyncPhase::Stopped {
            return Err(SyncStateError::Stopped);
        }
        if !self.in_flight {
            return Err(SyncStateError::NoRequestInFlight);
        }
        self.in_flight = false;
        Ok(())
    }
}
