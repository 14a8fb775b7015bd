//! End-to-end sessions against a mock measurement server
//!
//! These tests drive the public engine API over real HTTP and check the
//! outcome and the requests the server saw.

use speed_probe::{
    engine::{SessionEvent, SessionOutcome, SpeedTestEngine},
    logging::LoggerFactory,
    Config, HttpTransport, Phase, SessionState, TestConfig,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{header, header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

const MIB: usize = 1024 * 1024;

struct Harness {
    server: MockServer,
}

impl Harness {
    async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    fn config(&self) -> Config {
        Config {
            server_url: format!("{}/api", self.server.uri()),
            ping_count: 5,
            ping_interval_ms: 5,
            settle_delay_ms: 5,
            timeout_seconds: 10,
            ..Config::default()
        }
    }

    fn engine(&self, config: &Config) -> SpeedTestEngine {
        let transport = HttpTransport::new(config).unwrap();
        SpeedTestEngine::new(
            Arc::new(transport),
            config.engine_settings(),
            LoggerFactory::new(config.clone()),
        )
    }

    async fn mount(&self, http_method: &str, request_path: &str, template: ResponseTemplate) {
        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    async fn mock_ping(&self, delay: Duration) {
        let template = ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"pong": true, "serverTime": 0}))
            .set_delay(delay);
        self.mount("GET", "/api/ping", template).await;
    }

    async fn mock_bytes(&self, request_path: &str, bytes: usize) {
        self.mount("GET", request_path, ResponseTemplate::new(200).set_body_bytes(vec![7u8; bytes]))
            .await;
    }

    async fn mock_upload_echo(&self, request_path: &str, size: u64) {
        let body = serde_json::json!({"success": true, "data": {"size": size}});
        self.mount("POST", request_path, ResponseTemplate::new(200).set_body_json(body)).await;
    }
}

async fn collect(mut handle: speed_probe::SessionHandle) -> (SessionOutcome, Vec<SessionEvent>) {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    (handle.wait().await.unwrap(), events)
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged { state } => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_single_connection_progressive_session() {
    let harness = Harness::start().await;
    harness.mock_bytes("/api/warmup", 2 * MIB).await;
    harness.mock_ping(Duration::from_millis(20)).await;
    harness.mock_bytes("/api/download-adaptive", 4 * MIB).await;
    harness.mock_upload_echo("/api/upload", 2 * MIB as u64).await;

    let config = harness.config();
    let engine = harness.engine(&config);
    let test = TestConfig { upload_payload_size_mb: 2, ..TestConfig::default() };

    let (outcome, events) = collect(engine.start_session(test).unwrap()).await;

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

    let result = match outcome {
        SessionOutcome::Completed(result) => result,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(result.latency.sample_count(), 5);
    assert!(result.latency.average_rtt_ms >= 20.0);
    assert!(result.download.megabits_per_second > 0.0);
    assert!(!result.download.degraded);
    assert_eq!(result.download.bytes_transferred, 4 * MIB as u64);
    assert!(!result.upload.degraded);
    assert!(result.upload.megabits_per_second > 0.0);
    assert_eq!(engine.state(), SessionState::Completed);

    let server_requests = harness.server.received_requests().await.unwrap();
    assert!(server_requests.iter().all(|r| r.headers.contains_key("cache-control")));
}

#[tokio::test]
async fn test_multi_connection_session_splits_uploads() {
    let harness = Harness::start().await;
    harness.mock_ping(Duration::from_millis(5)).await;
    harness.mock_bytes("/api/download/2", 2 * MIB).await;
    harness.mock_bytes("/api/download/5", 5 * MIB).await;

    Mock::given(method("POST"))
        .and(path("/api/upload-multi"))
        .and(header("x-total-connections", "3"))
        .and(header_exists("x-connection-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"size": 5 * MIB}})))
        .expect(3)
        .mount(&harness.server)
        .await;

    let config = harness.config();
    let engine = harness.engine(&config);
    let test = TestConfig {
        connection_count: 3,
        progressive_download: false,
        warmup_enabled: false,
        upload_payload_size_mb: 10,
    };

    let (outcome, events) = collect(engine.start_session(test).unwrap()).await;
    assert_eq!(states(&events)[0], SessionState::Testing(Phase::Latency));

    let result = match outcome {
        SessionOutcome::Completed(result) => result,
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(result.download.samples_mbps.len(), 2);
    assert!(!result.download.degraded);
    assert_eq!(result.upload.bytes_transferred, 3 * 5 * MIB as u64);
    assert!(!result.upload.degraded);
}

#[tokio::test]
async fn test_failing_server_falls_back_to_estimates() {
    let harness = Harness::start().await;
    harness.mock_ping(Duration::from_millis(5)).await;
    harness.mount("GET", "/api/download-adaptive", ResponseTemplate::new(503)).await;
    harness.mount("POST", "/api/upload", ResponseTemplate::new(500)).await;

    let config = harness.config();
    let engine = harness.engine(&config);
    let test = TestConfig { warmup_enabled: false, upload_payload_size_mb: 1, ..TestConfig::default() };

    let (outcome, _) = collect(engine.start_session(test).unwrap()).await;
    let result = match outcome {
        SessionOutcome::Completed(result) => result,
        other => panic!("expected completion, got {:?}", other),
    };

    assert!(result.is_degraded());
    assert_eq!(result.download.megabits_per_second, 42.5);
    assert_eq!(result.upload.megabits_per_second, 28.5);
}

#[tokio::test]
async fn test_cancel_during_latency_stops_before_throughput() {
    let harness = Harness::start().await;
    harness.mock_ping(Duration::from_millis(40)).await;

    Mock::given(path("/api/download-adaptive"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;
    Mock::given(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let config = Config { ping_count: 50, ..harness.config() };
    let engine = harness.engine(&config);
    let test = TestConfig { warmup_enabled: false, ..TestConfig::default() };

    let handle = engine.start_session(test).unwrap();
    let token = handle.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
    });

    let (outcome, events) = collect(handle).await;
    let partial = match outcome {
        SessionOutcome::Cancelled(partial) => partial,
        other => panic!("expected cancellation, got {:?}", other),
    };

    let latency = partial.latency.expect("latency collected before cancel");
    assert!(latency.sample_count() < 50);
    assert!(partial.download.is_none());
    assert!(matches!(events.last(), Some(SessionEvent::Cancelled(_))));
    assert_eq!(engine.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_invalid_session_config_sends_no_requests() {
    let harness = Harness::start().await;
    let config = harness.config();
    let engine = harness.engine(&config);

    let result = engine.start_session(TestConfig { connection_count: 0, ..TestConfig::default() });
    assert!(result.is_err());

    assert!(harness.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_info() {
    let harness = Harness::start().await;
    let body = serde_json::json!({
        "server": {"name": "edge-1", "host": "edge.example", "platform": "linux", "arch": "arm64"},
        "uptime": 600.0
    });
    harness.mount("GET", "/api/info", ResponseTemplate::new(200).set_body_json(body)).await;

    let transport = HttpTransport::new(&harness.config()).unwrap();
    let info = transport.fetch_server_info().await.unwrap();

    assert_eq!(info.server.name, "edge-1");
    assert_eq!(info.uptime_minutes(), 10.0);
}
