//! Session bookkeeping and phase orchestration

use crate::client::ProbeTransport;
use crate::engine::latency::LatencySampler;
use crate::engine::payload::PayloadCache;
use crate::engine::progress::{ProgressSink, SessionEvent};
use crate::engine::throughput::{DownloadEstimator, UploadEstimator};
use crate::engine::warmup::WarmupController;
use crate::engine::SessionOutcome;
use crate::error::{AppError, Result};
use crate::logging::{Logger, ProbeLogger};
use crate::models::{EngineSettings, LatencyStatistics, PartialResult, TestConfig, TestResult, ThroughputResult};
use crate::types::{Phase, SessionState};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug)]
struct ActiveSession {
    id: Uuid,
    token: CancellationToken,
    state: SessionState,
}

/// Outcome of asking the registry to move a session forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// A newer session has taken over; the caller must unwind quietly
    Superseded,
    /// Not a legal successor of the current state
    Rejected(SessionState),
}

/// Tracks the one session allowed to be live at a time
#[derive(Debug, Default)]
pub struct SessionRegistry {
    current: Mutex<Option<ActiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a new session, cancelling whichever session was live before
    pub fn begin(&self, id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            previous.token.cancel();
        }
        *current = Some(ActiveSession {
            id,
            token: token.clone(),
            state: SessionState::Idle,
        });
        token
    }

    pub fn is_current(&self, id: Uuid) -> bool {
        self.lock().as_ref().map_or(false, |session| session.id == id)
    }

    /// Move the session to `next` if it is still current and the edge is legal.
    ///
    /// Entering `Idle` or `Completed` cancels the session's token.
    pub fn transition(&self, id: Uuid, next: SessionState) -> Transition {
        let mut current = self.lock();
        let session = match current.as_mut() {
            Some(session) if session.id == id => session,
            _ => return Transition::Superseded,
        };

        if !session.state.can_transition_to(next) {
            return Transition::Rejected(session.state);
        }

        session.state = next;
        if next.is_terminal() {
            session.token.cancel();
        }
        Transition::Applied
    }

    /// Force the session back to `Idle`, whatever state it is in
    pub fn reset(&self, id: Uuid) {
        let mut current = self.lock();
        if let Some(session) = current.as_mut() {
            if session.id == id {
                session.state = SessionState::Idle;
                session.token.cancel();
            }
        }
    }

    /// Cancel `id` if it is the live session
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.lock().as_ref() {
            Some(session) if session.id == id => {
                session.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// State of the most recent session, `Idle` if none was started
    pub fn state(&self) -> SessionState {
        self.lock().as_ref().map_or(SessionState::Idle, |session| session.state)
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|session| session.id)
    }
}

/// Everything one session run needs, owned by its task
pub(crate) struct SessionRun {
    pub id: Uuid,
    pub config: TestConfig,
    pub settings: Arc<EngineSettings>,
    pub transport: Arc<dyn ProbeTransport>,
    pub payloads: Arc<PayloadCache>,
    pub registry: Arc<SessionRegistry>,
    pub sink: Arc<dyn ProgressSink>,
    pub token: CancellationToken,
    pub logger: Logger,
    pub probe_logger: ProbeLogger,
}

impl SessionRun {
    /// Drive Warmup → Latency → Download → Upload and report the outcome
    pub async fn run(self) -> Result<SessionOutcome> {
        let started_at = Utc::now();
        let mut partial = PartialResult::new(self.id);

        self.logger.info("Session started")
            .field("connections", self.config.connection_count)
            .field("progressive_download", self.config.progressive_download)
            .field("warmup", self.config.warmup_enabled)
            .field("upload_size_mb", self.config.upload_payload_size_mb)
            .log()
            .await;

        match self.run_phases(&mut partial).await {
            Ok(Some((download, upload))) => {
                let result = TestResult {
                    session_id: self.id,
                    latency: partial.latency.clone().unwrap_or_else(LatencyStatistics::empty),
                    download,
                    upload,
                    config: self.config.clone(),
                    started_at,
                    completed_at: Utc::now(),
                };

                if !self.enter(SessionState::Completed)? {
                    return Ok(self.cancelled(partial).await);
                }
                self.logger.info("Session completed")
                    .field("download_mbps", result.download.megabits_per_second)
                    .field("upload_mbps", result.upload.megabits_per_second)
                    .field("average_rtt_ms", result.latency.average_rtt_ms)
                    .field("degraded", result.is_degraded())
                    .log()
                    .await;
                self.sink.publish(SessionEvent::Completed(result.clone()));
                Ok(SessionOutcome::Completed(result))
            }
            Ok(None) => Ok(self.cancelled(partial).await),
            Err(error) => {
                self.registry.reset(self.id);
                self.sink.publish(SessionEvent::StateChanged { state: SessionState::Idle });
                self.logger.error(&format!("Session aborted: {}", error))
                    .error_info(&error)
                    .log()
                    .await;
                Err(error)
            }
        }
    }

    /// `Ok(None)` when the session stopped early
    async fn run_phases(
        &self,
        partial: &mut PartialResult,
    ) -> Result<Option<(ThroughputResult, ThroughputResult)>> {
        let transport = self.transport.as_ref();
        let sink = self.sink.as_ref();
        let token = &self.token;

        if self.config.warmup_enabled {
            if !self.advance(SessionState::Warming)? {
                return Ok(None);
            }
            WarmupController::new(transport, sink, &self.probe_logger)
                .run(self.settings.settle_delay, token)
                .await;
            if token.is_cancelled() {
                return Ok(None);
            }
        }

        if !self.advance(SessionState::Testing(Phase::Latency))? {
            return Ok(None);
        }
        let latency = LatencySampler::new(transport, sink, &self.probe_logger)
            .run(self.settings.ping_count, self.settings.ping_interval, token)
            .await;
        partial.latency = Some(latency);
        if token.is_cancelled() {
            return Ok(None);
        }

        if !self.advance(SessionState::Testing(Phase::Download))? {
            return Ok(None);
        }
        let download = DownloadEstimator::new(transport, sink, &self.probe_logger, &self.settings)
            .run(&self.config, token)
            .await;
        partial.download = Some(download.clone());
        if token.is_cancelled() {
            return Ok(None);
        }

        if !self.advance(SessionState::Testing(Phase::Upload))? {
            return Ok(None);
        }
        let upload = UploadEstimator::new(transport, sink, &self.probe_logger, &self.payloads)
            .run(&self.config, token)
            .await;
        let upload = match upload {
            Some(upload) if !token.is_cancelled() => upload,
            _ => return Ok(None),
        };

        Ok(Some((download, upload)))
    }

    /// Advance the state machine; `Ok(false)` when the session should unwind
    fn advance(&self, next: SessionState) -> Result<bool> {
        if self.token.is_cancelled() {
            return Ok(false);
        }
        self.enter(next)
    }

    /// Apply a transition and announce it. `Ok(false)` means superseded.
    fn enter(&self, next: SessionState) -> Result<bool> {
        match self.registry.transition(self.id, next) {
            Transition::Applied => {
                self.sink.publish(SessionEvent::StateChanged { state: next });
                Ok(true)
            }
            Transition::Superseded => Ok(false),
            Transition::Rejected(from) => {
                self.registry.reset(self.id);
                Err(AppError::internal(format!("Illegal session transition {} -> {}", from, next)))
            }
        }
    }

    async fn cancelled(&self, partial: PartialResult) -> SessionOutcome {
        if self.registry.transition(self.id, SessionState::Idle) == Transition::Applied {
            self.sink.publish(SessionEvent::StateChanged { state: SessionState::Idle });
        }
        self.token.cancel();

        self.logger.info("Session cancelled")
            .field("latency_finished", partial.latency.is_some())
            .field("download_finished", partial.download.is_some())
            .log()
            .await;
        self.sink.publish(SessionEvent::Cancelled(partial.clone()));
        SessionOutcome::Cancelled(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_cancels_previous_token() {
        let registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        let first_token = registry.begin(first);
        assert!(registry.is_current(first));

        let second = Uuid::new_v4();
        let second_token = registry.begin(second);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!registry.is_current(first));
        assert_eq!(registry.current_id(), Some(second));
    }

    #[test]
    fn test_superseded_session_cannot_transition() {
        let registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        registry.begin(first);
        registry.begin(Uuid::new_v4());

        assert_eq!(registry.transition(first, SessionState::Warming), Transition::Superseded);
        assert_eq!(registry.state(), SessionState::Idle);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.begin(id);

        assert_eq!(
            registry.transition(id, SessionState::Testing(Phase::Upload)),
            Transition::Rejected(SessionState::Idle)
        );
    }

    #[test]
    fn test_terminal_state_cancels_token() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let token = registry.begin(id);

        for state in [
            SessionState::Testing(Phase::Latency),
            SessionState::Testing(Phase::Download),
            SessionState::Testing(Phase::Upload),
        ] {
            assert_eq!(registry.transition(id, state), Transition::Applied);
            assert!(!token.is_cancelled());
        }

        assert_eq!(registry.transition(id, SessionState::Completed), Transition::Applied);
        assert!(token.is_cancelled());
        assert_eq!(registry.state(), SessionState::Completed);
    }

    #[test]
    fn test_reset_and_cancel() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let token = registry.begin(id);
        registry.transition(id, SessionState::Warming);

        assert!(!registry.cancel(Uuid::new_v4()));
        assert!(registry.cancel(id));
        assert!(token.is_cancelled());

        registry.reset(id);
        assert_eq!(registry.state(), SessionState::Idle);
    }
}
