//! Scripted transport double for engine tests

use crate::client::{ByteCallback, DownloadReceipt, ProbeTransport, StreamTarget, UploadReceipt, UploadRequest};
use crate::error::{ProbeError, ProbeResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Chunks a scripted stream delivers, `(chunk_size, elapsed_so_far)`
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    pub chunks: Vec<(u64, Duration)>,
    pub failure: Option<ProbeError>,
    /// Cancel the token after this many chunks
    pub cancel_after: Option<usize>,
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub pings: AtomicU32,
    pub streams: AtomicU32,
    pub downloads: AtomicU32,
    pub uploads: AtomicU32,
    in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
}

impl CallCounts {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pings: Mutex<VecDeque<ProbeResult<Duration>>>,
    cancel_at_ping: Option<u32>,
    warmup: StreamScript,
    adaptive: StreamScript,
    downloads: Mutex<VecDeque<ProbeResult<DownloadReceipt>>>,
    upload_reported: Option<u64>,
    upload_omits_size: bool,
    upload_delay: Duration,
    upload_failure: Option<ProbeError>,
    pub calls: CallCounts,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            upload_delay: Duration::from_millis(5),
            ..Self::default()
        }
    }

    pub fn with_pings(self, pings: Vec<ProbeResult<Duration>>) -> Self {
        *self.pings.lock().unwrap() = pings.into();
        self
    }

    pub fn with_ping_ms(self, values: &[u64]) -> Self {
        self.with_pings(values.iter().map(|&ms| Ok(Duration::from_millis(ms))).collect())
    }

    /// The ping with this sequence number cancels the session instead of answering
    pub fn cancel_at_ping(mut self, sequence: u32) -> Self {
        self.cancel_at_ping = Some(sequence);
        self
    }

    pub fn with_warmup(mut self, script: StreamScript) -> Self {
        self.warmup = script;
        self
    }

    pub fn with_adaptive(mut self, script: StreamScript) -> Self {
        self.adaptive = script;
        self
    }

    pub fn with_downloads(self, downloads: Vec<ProbeResult<DownloadReceipt>>) -> Self {
        *self.downloads.lock().unwrap() = downloads.into();
        self
    }

    pub fn with_upload_reported(mut self, bytes: u64) -> Self {
        self.upload_reported = Some(bytes);
        self
    }

    pub fn with_upload_size_omitted(mut self) -> Self {
        self.upload_omits_size = true;
        self
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn failing_uploads(mut self, error: ProbeError) -> Self {
        self.upload_failure = Some(error);
        self
    }

    fn play_stream(script: &StreamScript, token: &CancellationToken, on_bytes: ByteCallback<'_>) -> ProbeResult<u64> {
        if token.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        let mut total = 0;
        for (index, &(chunk, elapsed)) in script.chunks.iter().enumerate() {
            if script.cancel_after == Some(index) {
                token.cancel();
                return Err(ProbeError::Cancelled);
            }
            total += chunk;
            on_bytes(chunk, elapsed);
        }
        if script.cancel_after == Some(script.chunks.len()) {
            token.cancel();
            return Err(ProbeError::Cancelled);
        }
        match &script.failure {
            Some(error) => Err(error.clone()),
            None => Ok(total),
        }
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn measure_round_trip(&self, sequence: u32, token: &CancellationToken) -> ProbeResult<Duration> {
        if token.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        self.calls.pings.fetch_add(1, Ordering::SeqCst);

        if self.cancel_at_ping == Some(sequence) {
            token.cancel();
            return Err(ProbeError::Cancelled);
        }

        let scripted = self.pings.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(Duration::from_millis(20)))
    }

    async fn measure_streamed_download(
        &self,
        target: &StreamTarget,
        token: &CancellationToken,
        on_bytes: ByteCallback<'_>,
    ) -> ProbeResult<u64> {
        self.calls.streams.fetch_add(1, Ordering::SeqCst);
        let script = match target {
            StreamTarget::Warmup => &self.warmup,
            StreamTarget::Adaptive(_) => &self.adaptive,
        };
        Self::play_stream(script, token, on_bytes)
    }

    async fn measure_download(
        &self,
        _size_mb: u32,
        _connections: u32,
        token: &CancellationToken,
    ) -> ProbeResult<DownloadReceipt> {
        if token.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        self.calls.downloads.fetch_add(1, Ordering::SeqCst);

        let scripted = self.downloads.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(DownloadReceipt {
            bytes: 1_048_576,
            elapsed: Duration::from_millis(100),
        }))
    }

    async fn measure_upload(&self, request: UploadRequest, token: &CancellationToken) -> ProbeResult<UploadReceipt> {
        if token.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        self.calls.uploads.fetch_add(1, Ordering::SeqCst);

        let now = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = tokio::select! {
            _ = token.cancelled() => Err(ProbeError::Cancelled),
            _ = tokio::time::sleep(self.upload_delay) => Ok(()),
        };
        self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        if let Some(error) = &self.upload_failure {
            return Err(error.clone());
        }

        let server_reported_bytes = if self.upload_omits_size {
            None
        } else {
            Some(self.upload_reported.unwrap_or(request.payload_len()))
        };

        Ok(UploadReceipt {
            server_reported_bytes,
            elapsed: self.upload_delay,
        })
    }
}
