//! Download and upload throughput estimation

use crate::client::{ProbeTransport, StreamTarget, UploadRequest};
use crate::defaults::{DOWNLOAD_FALLBACK_MBPS, UPLOAD_FALLBACK_MBPS};
use crate::engine::payload::PayloadCache;
use crate::engine::progress::{ProgressSink, ProgressUpdate};
use crate::error::{ProbeError, ProbeResult};
use crate::logging::ProbeLogger;
use crate::models::{EngineSettings, TestConfig, ThroughputResult};
use crate::stats::{self, RunningMean};
use crate::types::Phase;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Running state of one progressive download stream
#[derive(Debug, Clone)]
pub struct ProgressiveTracker {
    target_duration: Duration,
    total_bytes: u64,
    last_elapsed: Duration,
    speeds: Vec<f64>,
}

impl ProgressiveTracker {
    pub fn new(target_duration: Duration) -> Self {
        Self {
            target_duration,
            total_bytes: 0,
            last_elapsed: Duration::ZERO,
            speeds: Vec::new(),
        }
    }

    /// Account for one chunk; returns the update to publish, if any
    pub fn record(&mut self, chunk: u64, elapsed: Duration) -> Option<ProgressUpdate> {
        self.total_bytes += chunk;
        self.last_elapsed = elapsed;

        let speed = stats::speed_mbps(self.total_bytes, elapsed)?;
        self.speeds.push(speed);

        let target = self.target_duration.as_secs_f64();
        let fraction = if target > 0.0 {
            (elapsed.as_secs_f64() / target).min(1.0)
        } else {
            1.0
        };
        Some(ProgressUpdate::new(Phase::Download, fraction * 100.0, speed))
    }

    /// Last computed speed, 0 if none was computed
    pub fn current_speed(&self) -> f64 {
        self.speeds.last().copied().unwrap_or(0.0)
    }

    pub fn finish(self) -> ThroughputResult {
        let speed = self.current_speed();
        ThroughputResult::measured(speed, self.speeds, self.total_bytes, self.last_elapsed)
    }
}

/// Why a throughput phase stopped early
enum Interrupted {
    /// Keep what was measured
    Cancelled(ThroughputResult),
    Failed(ProbeError),
}

pub struct DownloadEstimator<'a> {
    transport: &'a dyn ProbeTransport,
    sink: &'a dyn ProgressSink,
    logger: &'a ProbeLogger,
    settings: &'a EngineSettings,
}

impl<'a> DownloadEstimator<'a> {
    pub fn new(
        transport: &'a dyn ProbeTransport,
        sink: &'a dyn ProgressSink,
        logger: &'a ProbeLogger,
        settings: &'a EngineSettings,
    ) -> Self {
        Self { transport, sink, logger, settings }
    }

    /// Measure download throughput with the policy `config` selects
    ///
    /// A transport failure is replaced by [`DOWNLOAD_FALLBACK_MBPS`]; a
    /// cancellation keeps whatever was computed.
    pub async fn run(&self, config: &TestConfig, token: &CancellationToken) -> ThroughputResult {
        self.logger.phase_started(Phase::Download).await;
        let started = Instant::now();

        let outcome = if config.progressive_download {
            self.progressive(token).await
        } else {
            self.multi_size(config.connection_count, token).await
        };

        match outcome {
            Ok(result) => {
                self.logger.phase_completed(Phase::Download, result.megabits_per_second, started.elapsed()).await;
                result
            }
            Err(Interrupted::Cancelled(partial)) => {
                self.logger.phase_cancelled(Phase::Download).await;
                partial
            }
            Err(Interrupted::Failed(error)) => {
                self.logger.fallback_substituted(Phase::Download, DOWNLOAD_FALLBACK_MBPS, &error).await;
                self.sink.progress(Phase::Download, 100.0, DOWNLOAD_FALLBACK_MBPS);
                ThroughputResult::fallback(DOWNLOAD_FALLBACK_MBPS)
            }
        }
    }

    async fn progressive(&self, token: &CancellationToken) -> Result<ThroughputResult, Interrupted> {
        let progressive = &self.settings.progressive;
        let target = StreamTarget::Adaptive(progressive.clone());
        let sink = self.sink;

        let mut tracker = ProgressiveTracker::new(progressive.target_duration());
        let mut on_bytes = |chunk: u64, elapsed: Duration| {
            if let Some(update) = tracker.record(chunk, elapsed) {
                sink.progress(update.phase, update.progress_percent, update.instantaneous_value);
            }
        };

        let outcome = self.transport.measure_streamed_download(&target, token, &mut on_bytes).await;
        match outcome {
            Ok(_) => Ok(tracker.finish()),
            Err(ProbeError::Cancelled) => Err(Interrupted::Cancelled(tracker.finish())),
            Err(error) => Err(Interrupted::Failed(error)),
        }
    }

    async fn multi_size(&self, connections: u32, token: &CancellationToken) -> Result<ThroughputResult, Interrupted> {
        let sizes = &self.settings.download_sizes_mb;
        let mut mean = RunningMean::new();
        let mut speeds = Vec::with_capacity(sizes.len());
        let mut total_bytes: u64 = 0;
        let mut total_elapsed = Duration::ZERO;

        for (index, &size_mb) in sizes.iter().enumerate() {
            let receipt = match self.transport.measure_download(size_mb, connections, token).await {
                Ok(receipt) => receipt,
                Err(ProbeError::Cancelled) => {
                    let partial = ThroughputResult::measured(mean.value(), speeds, total_bytes, total_elapsed);
                    return Err(Interrupted::Cancelled(partial));
                }
                Err(error) => return Err(Interrupted::Failed(error)),
            };

            total_bytes += receipt.bytes;
            total_elapsed += receipt.elapsed;
            if let Some(speed) = stats::speed_mbps(receipt.bytes, receipt.elapsed) {
                speeds.push(speed);
                mean.push(speed);
            }

            let progress = (index + 1) as f64 / sizes.len() as f64 * 100.0;
            self.sink.progress(Phase::Download, progress, mean.value());
        }

        Ok(ThroughputResult::measured(mean.value(), speeds, total_bytes, total_elapsed))
    }
}

/// The server's byte count, or the local payload length when the ack omits
/// it or reports zero
fn reported_or_local(reported: Option<u64>, local_len: u64) -> u64 {
    reported.filter(|&bytes| bytes > 0).unwrap_or(local_len)
}

pub struct UploadEstimator<'a> {
    transport: &'a dyn ProbeTransport,
    sink: &'a dyn ProgressSink,
    logger: &'a ProbeLogger,
    payloads: &'a PayloadCache,
}

impl<'a> UploadEstimator<'a> {
    pub fn new(
        transport: &'a dyn ProbeTransport,
        sink: &'a dyn ProgressSink,
        logger: &'a ProbeLogger,
        payloads: &'a PayloadCache,
    ) -> Self {
        Self { transport, sink, logger, payloads }
    }

    /// Measure upload throughput; `None` when cancelled
    ///
    /// A transport failure is replaced by [`UPLOAD_FALLBACK_MBPS`].
    pub async fn run(&self, config: &TestConfig, token: &CancellationToken) -> Option<ThroughputResult> {
        self.logger.phase_started(Phase::Upload).await;
        self.sink.progress(Phase::Upload, 0.0, 0.0);
        let started = Instant::now();

        let size_mb = config.effective_upload_size_mb();
        let outcome = if config.is_multi_connection() {
            self.multi(config.connection_count, size_mb, token).await
        } else {
            self.single(size_mb, token).await
        };

        match outcome {
            Ok(result) => {
                self.sink.progress(Phase::Upload, 100.0, result.megabits_per_second);
                self.logger.phase_completed(Phase::Upload, result.megabits_per_second, started.elapsed()).await;
                Some(result)
            }
            Err(ProbeError::Cancelled) => {
                self.logger.phase_cancelled(Phase::Upload).await;
                None
            }
            Err(error) => {
                self.logger.fallback_substituted(Phase::Upload, UPLOAD_FALLBACK_MBPS, &error).await;
                self.sink.progress(Phase::Upload, 100.0, UPLOAD_FALLBACK_MBPS);
                Some(ThroughputResult::fallback(UPLOAD_FALLBACK_MBPS))
            }
        }
    }

    async fn single(&self, size_mb: u32, token: &CancellationToken) -> ProbeResult<ThroughputResult> {
        let payload = self.payloads.fetch(size_mb).await?;
        let local_len = payload.len() as u64;

        let receipt = self.transport.measure_upload(UploadRequest::single(payload, size_mb), token).await?;
        let bytes = reported_or_local(receipt.server_reported_bytes, local_len);
        let speed = stats::speed_mbps(bytes, receipt.elapsed).unwrap_or(0.0);

        Ok(ThroughputResult::measured(speed, vec![speed], bytes, receipt.elapsed))
    }

    /// All connections are issued at once and joined at a barrier; one
    /// wall clock spans the whole batch.
    async fn multi(&self, connections: u32, size_mb: u32, token: &CancellationToken) -> ProbeResult<ThroughputResult> {
        let payload = self.payloads.fetch(size_mb).await?;
        let local_len = payload.len() as u64;
        let completed = AtomicU32::new(0);
        let completed = &completed;
        let payload = &payload;
        let sink = self.sink;

        let start = Instant::now();
        let uploads = (0..connections).map(move |connection_id| {
            let request = UploadRequest::multi(payload.clone(), connection_id, connections, size_mb);
            async move {
                let result = self.transport.measure_upload(request, token).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if result.is_ok() && !token.is_cancelled() {
                    sink.progress(Phase::Upload, done as f64 / connections as f64 * 100.0, 0.0);
                }
                result
            }
        });
        let results = join_all(uploads).await;
        let wall_clock = start.elapsed();

        if token.is_cancelled() || results.iter().any(|r| matches!(r, Err(ProbeError::Cancelled))) {
            return Err(ProbeError::Cancelled);
        }

        let mut reported = Vec::with_capacity(results.len());
        let mut per_connection = Vec::with_capacity(results.len());
        for result in results {
            let receipt = result?;
            let bytes = reported_or_local(receipt.server_reported_bytes, local_len);
            reported.push(bytes);
            per_connection.push(stats::speed_mbps(bytes, receipt.elapsed).unwrap_or(0.0));
        }

        let aggregate = stats::aggregate_speed_mbps(&reported, wall_clock).unwrap_or(0.0);
        let total: u64 = reported.iter().sum();
        Ok(ThroughputResult::measured(aggregate, per_connection, total, wall_clock))
    }
}
