//! Measurement engine
//!
//! A session runs Warmup → Latency → Download → Upload on its own task and
//! reports through an event channel. At most one session is live at a time:
//! starting a new one cancels the previous session's token.

pub mod latency;
pub mod payload;
pub mod progress;
pub mod session;
pub mod throughput;
pub mod warmup;

#[cfg(test)]
pub(crate) mod testing;

use crate::client::ProbeTransport;
use crate::defaults::PREFILL_PAYLOAD_SIZES_MB;
use crate::error::{AppError, ProbeError, ProbeResult, Result};
use crate::logging::LoggerFactory;
use crate::models::{EngineSettings, PartialResult, TestConfig, TestResult};
use crate::types::SessionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use payload::PayloadCache;
pub use progress::{ChannelSink, ProgressSink, ProgressUpdate, RecordingSink, SessionEvent};
pub use session::SessionRegistry;

/// Sleep for `duration` unless the token fires first
pub async fn cancellable_sleep(duration: Duration, token: &CancellationToken) -> ProbeResult<()> {
    if duration.is_zero() {
        return if token.is_cancelled() { Err(ProbeError::Cancelled) } else { Ok(()) };
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProbeError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(TestResult),
    Cancelled(PartialResult),
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }
}

/// Caller's handle on a running session
pub struct SessionHandle {
    id: Uuid,
    token: CancellationToken,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<Result<SessionOutcome>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, `None` once the session task has finished and the stream is drained
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Events already queued, without waiting
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Token shared by every probe of this session
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the session task to finish
    pub async fn wait(self) -> Result<SessionOutcome> {
        self.task.await?
    }
}

/// Entry point for running measurement sessions
pub struct SpeedTestEngine {
    transport: Arc<dyn ProbeTransport>,
    settings: Arc<EngineSettings>,
    payloads: Arc<PayloadCache>,
    registry: Arc<SessionRegistry>,
    loggers: LoggerFactory,
}

impl SpeedTestEngine {
    pub fn new(transport: Arc<dyn ProbeTransport>, settings: EngineSettings, loggers: LoggerFactory) -> Self {
        Self {
            transport,
            settings: Arc::new(settings),
            payloads: Arc::new(PayloadCache::new()),
            registry: Arc::new(SessionRegistry::new()),
            loggers,
        }
    }

    /// Generate the common upload payloads off the async runtime
    pub async fn prefill_payloads(&self) -> Result<()> {
        let payloads = Arc::clone(&self.payloads);
        tokio::task::spawn_blocking(move || payloads.prefill(PREFILL_PAYLOAD_SIZES_MB))
            .await
            .map_err(|e| AppError::internal(format!("Payload generation failed: {}", e)))
    }

    /// Validate `config` and start a session on a new task.
    ///
    /// Invalid configuration is rejected before any network call. A session
    /// that was still running is cancelled; its remaining events are dropped.
    pub fn start_session(&self, config: TestConfig) -> Result<SessionHandle> {
        config.validate()?;

        let id = Uuid::new_v4();
        let token = self.registry.begin(id);
        let (sender, events) = mpsc::unbounded_channel();
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelSink::new(id, Arc::clone(&self.registry), sender));

        let run = session::SessionRun {
            id,
            config,
            settings: Arc::clone(&self.settings),
            transport: Arc::clone(&self.transport),
            payloads: Arc::clone(&self.payloads),
            registry: Arc::clone(&self.registry),
            sink,
            token: token.clone(),
            logger: self.loggers.create_session_logger(&id),
            probe_logger: self.loggers.create_probe_logger(&id),
        };

        let task = tokio::spawn(run.run());
        Ok(SessionHandle { id, token, events, task })
    }

    /// Signal cancellation; the session unwinds and reports a partial result
    pub fn cancel_session(&self, handle: &SessionHandle) {
        handle.token.cancel();
    }

    /// State of the most recently started session
    pub fn state(&self) -> SessionState {
        self.registry.state()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn payloads(&self) -> &PayloadCache {
        &self.payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{CallCounts, ScriptedTransport, StreamScript};
    use crate::models::Config;
    use crate::types::Phase;

    fn quick_settings() -> EngineSettings {
        EngineSettings {
            ping_count: 10,
            ping_interval: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
            ..EngineSettings::default()
        }
    }

    fn engine(transport: Arc<ScriptedTransport>) -> SpeedTestEngine {
        SpeedTestEngine::new(transport, quick_settings(), LoggerFactory::new(Config::default()))
    }

    fn states(events: &[SessionEvent]) -> Vec<SessionState> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn small_upload() -> TestConfig {
        TestConfig { upload_payload_size_mb: 1, ..TestConfig::default() }
    }

    #[tokio::test]
    async fn test_zero_connections_rejected_before_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = engine(Arc::clone(&transport));

        let result = engine.start_session(TestConfig { connection_count: 0, ..TestConfig::default() });
        assert!(matches!(result, Err(AppError::Config(_))));

        assert_eq!(CallCounts::get(&transport.calls.pings), 0);
        assert_eq!(CallCounts::get(&transport.calls.streams), 0);
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_full_session_walks_every_state() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_warmup(StreamScript {
                    chunks: vec![(1_048_576, Duration::from_millis(5))],
                    ..StreamScript::default()
                })
                .with_adaptive(StreamScript {
                    chunks: vec![(1_048_576, Duration::from_millis(500)), (1_048_576, Duration::from_secs(1))],
                    ..StreamScript::default()
                }),
        );
        let engine = engine(Arc::clone(&transport));

        let mut handle = engine.start_session(small_upload()).unwrap();
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        let outcome = handle.wait().await.unwrap();

        assert_eq!(
            states(&events),
            vec![
                SessionState::Warming,
                SessionState::Testing(Phase::Latency),
                SessionState::Testing(Phase::Download),
                SessionState::Testing(Phase::Upload),
                SessionState::Completed,
            ]
        );
        assert!(matches!(events.last(), Some(SessionEvent::Completed(_))));

        let result = match outcome {
            SessionOutcome::Completed(result) => result,
            other => panic!("expected completion, got {:?}", other),
        };
        assert_eq!(result.latency.samples_ms.len(), 10);
        assert_eq!(result.download.megabits_per_second, 16.0);
        assert!(!result.upload.degraded);
        assert_eq!(engine.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_warmup_disabled_skips_warming() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = engine(Arc::clone(&transport));

        let config = TestConfig { warmup_enabled: false, ..small_upload() };
        let handle = engine.start_session(config).unwrap();
        let outcome = handle.wait_with_events().await;

        assert!(outcome.0.is_completed());
        assert_eq!(states(&outcome.1)[0], SessionState::Testing(Phase::Latency));
        // Only the adaptive download stream was requested
        assert_eq!(CallCounts::get(&transport.calls.streams), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_latency_skips_throughput() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_ping_ms(&[30, 40, 50])
                .cancel_at_ping(3),
        );
        let engine = engine(Arc::clone(&transport));

        let config = TestConfig { warmup_enabled: false, ..small_upload() };
        let handle = engine.start_session(config).unwrap();
        let token = handle.cancellation_token();
        let (outcome, events) = handle.wait_with_events().await;

        let partial = match outcome {
            SessionOutcome::Cancelled(partial) => partial,
            other => panic!("expected cancellation, got {:?}", other),
        };
        let latency = partial.latency.unwrap();
        assert_eq!(latency.samples_ms, vec![30.0, 40.0, 50.0]);
        assert!(partial.download.is_none());
        assert!(partial.upload.is_none());

        assert_eq!(CallCounts::get(&transport.calls.streams), 0);
        assert_eq!(CallCounts::get(&transport.calls.downloads), 0);
        assert_eq!(CallCounts::get(&transport.calls.uploads), 0);

        assert!(token.is_cancelled());
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(states(&events).last(), Some(&SessionState::Idle));
        assert!(matches!(events.last(), Some(SessionEvent::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_cancel_session_from_caller() {
        let transport = Arc::new(ScriptedTransport::new());
        let settings = EngineSettings {
            ping_interval: Duration::from_secs(5),
            ..quick_settings()
        };
        let engine = SpeedTestEngine::new(transport, settings, LoggerFactory::new(Config::default()));

        let config = TestConfig { warmup_enabled: false, ..small_upload() };
        let handle = engine.start_session(config).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.cancel_session(&handle);

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .expect("session should unwind promptly")
            .unwrap();
        assert!(!outcome.is_completed());
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_new_session_cancels_previous() {
        let transport = Arc::new(ScriptedTransport::new());
        let settings = EngineSettings {
            ping_interval: Duration::from_secs(5),
            ..quick_settings()
        };
        let engine = SpeedTestEngine::new(transport, settings, LoggerFactory::new(Config::default()));
        let config = TestConfig { warmup_enabled: false, ..small_upload() };

        let first = engine.start_session(config.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first_token = first.cancellation_token();

        let second = engine.start_session(config).unwrap();
        assert!(first_token.is_cancelled());
        assert!(!second.cancellation_token().is_cancelled());

        let (outcome, events) = first.wait_with_events().await;
        assert!(!outcome.is_completed());
        // The superseded session never reports state changes after takeover
        assert!(!states(&events).contains(&SessionState::Idle));

        engine.cancel_session(&second);
        second.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_server_degrades_throughput() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_adaptive(StreamScript {
                    failure: Some(ProbeError::transport("HTTP 502")),
                    ..StreamScript::default()
                })
                .failing_uploads(ProbeError::transport("HTTP 502")),
        );
        let engine = engine(transport);

        let handle = engine.start_session(TestConfig { connection_count: 2, ..small_upload() }).unwrap();
        let result = match handle.wait().await.unwrap() {
            SessionOutcome::Completed(result) => result,
            other => panic!("expected completion, got {:?}", other),
        };

        assert!(result.is_degraded());
        assert_eq!(result.download.megabits_per_second, 42.5);
        assert_eq!(result.upload.megabits_per_second, 28.5);
    }

    #[test]
    fn test_zero_sleep_respects_token() {
        let token = CancellationToken::new();
        assert!(tokio_test::block_on(cancellable_sleep(Duration::ZERO, &token)).is_ok());
        token.cancel();
        assert!(tokio_test::block_on(cancellable_sleep(Duration::ZERO, &token)).is_err());
    }

    impl SessionHandle {
        /// Collect every event until the task finishes, then return the outcome
        async fn wait_with_events(mut self) -> (SessionOutcome, Vec<SessionEvent>) {
            let mut events = Vec::new();
            while let Some(event) = self.next_event().await {
                events.push(event);
            }
            let outcome = self.wait().await.unwrap();
            (outcome, events)
        }
    }
}
