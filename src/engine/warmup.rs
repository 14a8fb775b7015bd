//! Best-effort path priming before measurement

use crate::client::{ProbeTransport, StreamTarget};
use crate::defaults::WARMUP_SATURATION_BYTES;
use crate::engine::progress::ProgressSink;
use crate::engine::cancellable_sleep;
use crate::error::ProbeError;
use crate::logging::ProbeLogger;
use crate::types::Phase;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Warmup progress for `received` bytes, saturating at 2 MiB
pub fn warmup_progress(received: u64) -> f64 {
    let ratio = received as f64 / WARMUP_SATURATION_BYTES as f64;
    (ratio * 100.0).min(100.0)
}

pub struct WarmupController<'a> {
    transport: &'a dyn ProbeTransport,
    sink: &'a dyn ProgressSink,
    logger: &'a ProbeLogger,
}

impl<'a> WarmupController<'a> {
    pub fn new(transport: &'a dyn ProbeTransport, sink: &'a dyn ProgressSink, logger: &'a ProbeLogger) -> Self {
        Self { transport, sink, logger }
    }

    /// Drain the warmup stream, then wait `settle_delay`
    ///
    /// Returns the number of bytes drained. Transport failures are logged
    /// and otherwise ignored.
    pub async fn run(&self, settle_delay: Duration, token: &CancellationToken) -> u64 {
        self.logger.phase_started(Phase::Warmup).await;

        let sink = self.sink;
        let mut received: u64 = 0;
        let mut on_bytes = |chunk: u64, _elapsed: Duration| {
            received += chunk;
            sink.progress(Phase::Warmup, warmup_progress(received), received as f64 / BYTES_PER_MB);
        };

        let outcome = self
            .transport
            .measure_streamed_download(&StreamTarget::Warmup, token, &mut on_bytes)
            .await;

        match outcome {
            Ok(total) => {
                self.logger.logger().debug(&format!("Warmup drained {} bytes", total))
                    .phase(Phase::Warmup)
                    .log()
                    .await;
            }
            Err(ProbeError::Cancelled) => {
                self.logger.phase_cancelled(Phase::Warmup).await;
                return received;
            }
            Err(error) => {
                self.logger.probe_failed(Phase::Warmup, None, &error).await;
            }
        }

        if cancellable_sleep(settle_delay, token).await.is_err() {
            self.logger.phase_cancelled(Phase::Warmup).await;
        }

        received
    }
}
