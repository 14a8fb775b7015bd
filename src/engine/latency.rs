//! Sequential round-trip sampling

use crate::client::ProbeTransport;
use crate::engine::cancellable_sleep;
use crate::engine::progress::{ProgressSink, SessionEvent};
use crate::error::ProbeError;
use crate::logging::ProbeLogger;
use crate::models::{LatencySnapshot, LatencyStatistics};
use crate::stats;
use crate::types::Phase;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub struct LatencySampler<'a> {
    transport: &'a dyn ProbeTransport,
    sink: &'a dyn ProgressSink,
    logger: &'a ProbeLogger,
}

impl<'a> LatencySampler<'a> {
    pub fn new(transport: &'a dyn ProbeTransport, sink: &'a dyn ProgressSink, logger: &'a ProbeLogger) -> Self {
        Self { transport, sink, logger }
    }

    /// Issue `probe_count` probes one after another, `inter_probe_delay` apart.
    ///
    /// A failed probe is skipped, not retried. On cancellation the statistics
    /// cover whatever was collected so far.
    pub async fn run(&self, probe_count: u32, inter_probe_delay: Duration, token: &CancellationToken) -> LatencyStatistics {
        self.logger.phase_started(Phase::Latency).await;
        let started = Instant::now();

        let mut samples: Vec<f64> = Vec::with_capacity(probe_count as usize);
        let mut attempted: u32 = 0;

        for sequence in 0..probe_count {
            if token.is_cancelled() {
                break;
            }

            match self.transport.measure_round_trip(sequence, token).await {
                Ok(rtt) => {
                    attempted += 1;
                    samples.push(rtt.as_secs_f64() * 1000.0);
                }
                Err(ProbeError::Cancelled) => break,
                Err(error) => {
                    attempted += 1;
                    self.logger.probe_failed(Phase::Latency, Some(sequence), &error).await;
                }
            }

            let running = stats::latency_statistics(&samples, attempted);
            let progress = (sequence + 1) as f64 / probe_count as f64 * 100.0;
            self.sink.progress(Phase::Latency, progress, running.average_rtt_ms);
            self.sink.publish(SessionEvent::LatencySnapshot(LatencySnapshot::from(&running)));

            if sequence + 1 < probe_count && cancellable_sleep(inter_probe_delay, token).await.is_err() {
                break;
            }
        }

        let statistics = stats::latency_statistics(&samples, attempted);
        if token.is_cancelled() {
            self.logger.phase_cancelled(Phase::Latency).await;
        } else {
            self.logger.phase_completed(Phase::Latency, statistics.average_rtt_ms, started.elapsed()).await;
        }
        statistics
    }
}
