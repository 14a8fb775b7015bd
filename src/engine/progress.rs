//! Session events and the sinks that deliver them

use crate::engine::session::SessionRegistry;
use crate::models::{LatencySnapshot, PartialResult, TestResult};
use crate::types::{Phase, SessionState};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Periodic progress of the running phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// 0 to 100
    pub progress_percent: f64,
    /// Live figure in the phase's unit (ms, Mbps or MB)
    pub instantaneous_value: f64,
}

impl ProgressUpdate {
    pub fn new(phase: Phase, progress_percent: f64, instantaneous_value: f64) -> Self {
        Self {
            phase,
            progress_percent: progress_percent.clamp(0.0, 100.0),
            instantaneous_value,
        }
    }
}

/// Everything a consumer can observe about a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Progress(ProgressUpdate),
    LatencySnapshot(LatencySnapshot),
    StateChanged { state: SessionState },
    Completed(TestResult),
    Cancelled(PartialResult),
}

impl SessionEvent {
    /// Completed and Cancelled end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Completed(_) | SessionEvent::Cancelled(_))
    }
}

/// Receiver of session events
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: SessionEvent);

    fn progress(&self, phase: Phase, progress_percent: f64, instantaneous_value: f64) {
        self.publish(SessionEvent::Progress(ProgressUpdate::new(phase, progress_percent, instantaneous_value)));
    }
}

/// Sink feeding one session's event channel
///
/// Once the session is superseded, non-terminal events are dropped so that
/// unwinding probes never show up as live progress.
pub struct ChannelSink {
    session_id: Uuid,
    registry: Arc<SessionRegistry>,
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(session_id: Uuid, registry: Arc<SessionRegistry>, sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session_id, registry, sender }
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&self, event: SessionEvent) {
        if !event.is_terminal() && !self.registry.is_current(self.session_id) {
            return;
        }
        // A closed receiver only means nobody is listening
        let _ = self.sender.send(event);
    }
}

/// Sink that keeps every event, for inspection in tests and tools
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Progress updates published for one phase, in order
    pub fn progress_for(&self, phase: Phase) -> Vec<ProgressUpdate> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Progress(update) if update.phase == phase => Some(update),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, event: SessionEvent) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event);
    }
}
