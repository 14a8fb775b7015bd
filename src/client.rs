//! Probe transport: timed HTTP requests against the measurement server

pub mod endpoints;


use crate::{
    error::{AppError, ProbeError, ProbeResult, Result},
    logging::{Logger, ProbeLogger},
    models::{Config, ProgressiveSettings, ServerInfo},
    types::Phase,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA},
    Client, Response, Url,
};
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub use endpoints::Endpoints;

/// Called on every chunk boundary with `(chunk_size, elapsed_so_far)`
pub type ByteCallback<'a> = &'a mut (dyn FnMut(u64, Duration) + Send);

/// Stream a download should be drained from
#[derive(Debug, Clone, PartialEq)]
pub enum StreamTarget {
    /// Discardable priming stream
    Warmup,
    /// Time-bounded adaptive stream
    Adaptive(ProgressiveSettings),
}

impl StreamTarget {
    pub fn phase(&self) -> Phase {
        match self {
            StreamTarget::Warmup => Phase::Warmup,
            StreamTarget::Adaptive(_) => Phase::Download,
        }
    }
}

/// Bytes received for one fixed-size download and the full-body time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadReceipt {
    pub bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Single,
    Multi,
}

/// One upload request
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub target: UploadTarget,
    pub payload: Bytes,
    /// Index of this connection, only sent for multi-connection uploads
    pub connection_id: u32,
    pub total_connections: u32,
    pub test_size_mb: u32,
}

impl UploadRequest {
    pub fn single(payload: Bytes, test_size_mb: u32) -> Self {
        Self {
            target: UploadTarget::Single,
            payload,
            connection_id: 0,
            total_connections: 1,
            test_size_mb,
        }
    }

    pub fn multi(payload: Bytes, connection_id: u32, total_connections: u32, test_size_mb: u32) -> Self {
        Self {
            target: UploadTarget::Multi,
            payload,
            connection_id,
            total_connections,
            test_size_mb,
        }
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Server acknowledgment of one upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadReceipt {
    /// Byte count the server says it received, when it reports one
    pub server_reported_bytes: Option<u64>,
    pub elapsed: Duration,
}

/// Transport abstraction used by the measurement engine
///
/// Every call takes the session's cancellation token. A call that observes
/// the token fires returns [`ProbeError::Cancelled`], never a transport error.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Time one ping from issuance until the acknowledgment is parsed
    async fn measure_round_trip(&self, sequence: u32, token: &CancellationToken) -> ProbeResult<Duration>;

    /// Drain a stream, reporting every chunk, and return the total bytes
    async fn measure_streamed_download(
        &self,
        target: &StreamTarget,
        token: &CancellationToken,
        on_bytes: ByteCallback<'_>,
    ) -> ProbeResult<u64>;

    /// Fetch a fixed-size body in full
    async fn measure_download(
        &self,
        size_mb: u32,
        connections: u32,
        token: &CancellationToken,
    ) -> ProbeResult<DownloadReceipt>;

    /// Send one payload and wait for the acknowledgment
    async fn measure_upload(&self, request: UploadRequest, token: &CancellationToken) -> ProbeResult<UploadReceipt>;
}

#[derive(Debug, Deserialize)]
struct UploadAck {
    #[serde(default)]
    data: Option<UploadAckData>,
}

#[derive(Debug, Deserialize)]
struct UploadAckData {
    #[serde(default)]
    size: Option<u64>,
}

/// Production transport backed by `reqwest`
pub struct HttpTransport {
    client: Client,
    endpoints: Endpoints,
    logger: ProbeLogger,
}

impl HttpTransport {
    /// Create a transport for the configured server
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(format!("{}/{}", crate::PKG_NAME, crate::VERSION))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: Endpoints::new(&config.server_url)?,
            logger: ProbeLogger::new(Logger::with_config("HTTP".to_string(), config)),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fetch server metadata; used for display only
    pub async fn fetch_server_info(&self) -> Result<ServerInfo> {
        let url = self.endpoints.info()?;
        let start = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        self.logger.request("GET", url.as_str(), Some(status.as_u16()), start.elapsed()).await;

        if !status.is_success() {
            return Err(AppError::http_request(format!("Server info request returned HTTP {}", status)));
        }

        let info = response.json::<ServerInfo>().await?;
        Ok(info)
    }

    /// Reject non-2xx responses, logging every request at debug
    async fn check_status(&self, method: &str, url: &Url, response: Response, start: Instant) -> ProbeResult<Response> {
        let status = response.status();
        self.logger.request(method, url.as_str(), Some(status.as_u16()), start.elapsed()).await;

        if status.is_success() {
            Ok(response)
        } else {
            Err(ProbeError::transport(format!("{} {} returned HTTP {}", method, url.path(), status)))
        }
    }
}

/// Run `operation` unless the token fires first
async fn until_cancelled<T, F>(token: &CancellationToken, operation: F) -> ProbeResult<T>
where
    F: Future<Output = ProbeResult<T>>,
{
    if token.is_cancelled() {
        return Err(ProbeError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProbeError::Cancelled),
        result = operation => result,
    }
}

fn endpoint(url: Result<Url>) -> ProbeResult<Url> {
    url.map_err(|e| ProbeError::transport(e.to_string()))
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn measure_round_trip(&self, sequence: u32, token: &CancellationToken) -> ProbeResult<Duration> {
        let url = endpoint(self.endpoints.ping(Utc::now().timestamp_millis(), sequence))?;

        until_cancelled(token, async {
            let start = Instant::now();
            let response = self.client.get(url.clone()).send().await?;
            let response = self.check_status("GET", &url, response, start).await?;
            let body = response.bytes().await?;
            let _ack: serde_json::Value = serde_json::from_slice(&body)?;
            Ok(start.elapsed())
        })
        .await
    }

    async fn measure_streamed_download(
        &self,
        target: &StreamTarget,
        token: &CancellationToken,
        on_bytes: ByteCallback<'_>,
    ) -> ProbeResult<u64> {
        let url = match target {
            StreamTarget::Warmup => endpoint(self.endpoints.warmup())?,
            StreamTarget::Adaptive(settings) => endpoint(self.endpoints.download_adaptive(settings))?,
        };

        until_cancelled(token, async {
            let issued = Instant::now();
            let response = self.client.get(url.clone()).send().await?;
            let response = self.check_status("GET", &url, response, issued).await?;

            // The clock for chunk timing starts once headers have arrived
            let start = Instant::now();
            let mut total: u64 = 0;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                let len = chunk.len() as u64;
                total += len;
                on_bytes(len, start.elapsed());
            }
            Ok(total)
        })
        .await
    }

    async fn measure_download(
        &self,
        size_mb: u32,
        connections: u32,
        token: &CancellationToken,
    ) -> ProbeResult<DownloadReceipt> {
        let url = endpoint(self.endpoints.download(size_mb, connections))?;

        until_cancelled(token, async {
            let start = Instant::now();
            let response = self.client.get(url.clone()).send().await?;
            let response = self.check_status("GET", &url, response, start).await?;

            let mut bytes: u64 = 0;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                bytes += chunk?.len() as u64;
            }

            Ok(DownloadReceipt { bytes, elapsed: start.elapsed() })
        })
        .await
    }

    async fn measure_upload(&self, request: UploadRequest, token: &CancellationToken) -> ProbeResult<UploadReceipt> {
        let url = match request.target {
            UploadTarget::Single => endpoint(self.endpoints.upload())?,
            UploadTarget::Multi => endpoint(self.endpoints.upload_multi())?,
        };

        let mut builder = self.client.post(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("X-Upload-Start", Utc::now().timestamp_millis().to_string())
            .header("X-Test-Size", request.test_size_mb.to_string())
            .header("X-Pattern", "efficient");

        if request.target == UploadTarget::Multi {
            builder = builder
                .header("X-Connection-Id", request.connection_id.to_string())
                .header("X-Total-Connections", request.total_connections.to_string());
        }

        let builder = builder.body(request.payload);

        until_cancelled(token, async {
            let start = Instant::now();
            let response = builder.send().await?;
            let response = self.check_status("POST", &url, response, start).await?;
            let body = response.bytes().await?;
            let elapsed = start.elapsed();

            let ack: UploadAck = serde_json::from_slice(&body)?;
            Ok(UploadReceipt {
                server_reported_bytes: ack.data.and_then(|data| data.size),
                elapsed,
            })
        })
        .await
    }
}
