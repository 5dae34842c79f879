//! HTTP Backend Integration Tests
//!
//! Runs both transports against a local mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use champion_stream::{
    ConnectRequest, ConnectionState, Endpoint, EventSourceBackend, FetchBackend,
    ReconnectConfig, StreamBackend, StreamEnd, StreamMessage, StreamService, TransportError,
    TransportEvents, message_handler,
};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_PATH: &str = "/champion/v1/sse";

/// Records transport callbacks in order.
#[derive(Default)]
struct Collector {
    opened: Mutex<usize>,
    messages: Mutex<Vec<StreamMessage>>,
}

impl TransportEvents for Collector {
    fn opened(&self) {
        *self.opened.lock() += 1;
    }

    fn message(&self, message: StreamMessage) {
        self.messages.lock().push(message);
    }
}

async fn serve(body: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SSE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

fn endpoint(server: &MockServer) -> Endpoint {
    Endpoint::new(format!("{}{SSE_PATH}?account_uuid=acc-1", server.uri()))
}

/// Server that sends one chunked frame and then holds the body open.
async fn stalled_stream(frame: &'static str) -> (Endpoint, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await.unwrap();

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        let chunk = format!("{:x}\r\n{frame}\r\n", frame.len());
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        std::future::pending::<()>().await;
        drop(socket);
    });

    (Endpoint::new(format!("http://{addr}{SSE_PATH}")), server)
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn cancel_mid_body(backend: Arc<dyn StreamBackend>) {
    let (endpoint, server) = stalled_stream("data: {\"seq\":1}\n\n").await;
    let events = Arc::new(Collector::default());
    let cancel = CancellationToken::new();

    let run = tokio::spawn({
        let events = Arc::clone(&events);
        let cancel = cancel.clone();
        async move { backend.run(&endpoint, &*events, &cancel).await }
    });

    wait_until(|| events.messages.lock().len() == 1).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result, Ok(StreamEnd::Cancelled));
    assert_eq!(*events.opened.lock(), 1);
    assert_eq!(
        *events.messages.lock(),
        vec![StreamMessage::payload(r#"{"seq":1}"#)]
    );
    server.abort();
}

// =============================================================================
// Manual-Read Backend
// =============================================================================

#[tokio::test]
async fn test_fetch_delivers_messages_then_completes() {
    let server = serve(concat!(
        ": keep-alive comment\n",
        "data: {\"login_id\":\"CR1\",\"is_completed\":false}\n\n",
        "data: heartbeat\n\n",
        "data: not json\n\n",
        "data: {\"login_id\":\"CR1\",\"is_completed\":true}\n\n",
    ))
    .await;

    let backend = FetchBackend::new().unwrap();
    let events = Collector::default();
    let end = backend
        .run(&endpoint(&server), &events, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(*events.opened.lock(), 1);
    assert_eq!(
        *events.messages.lock(),
        vec![
            StreamMessage::payload(r#"{"login_id":"CR1","is_completed":false}"#),
            StreamMessage::Heartbeat,
            StreamMessage::payload(r#"{"login_id":"CR1","is_completed":true}"#),
        ]
    );
}

#[tokio::test]
async fn test_fetch_error_status_never_opens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let backend = FetchBackend::new().unwrap();
    let events = Collector::default();
    let result = backend
        .run(&endpoint(&server), &events, &CancellationToken::new())
        .await;

    assert_eq!(result, Err(TransportError::Status(500)));
    assert_eq!(result.unwrap_err().to_string(), "HTTP error! status: 500");
    assert_eq!(*events.opened.lock(), 0);
}

#[tokio::test]
async fn test_fetch_sends_protocol_and_caller_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SSE_PATH))
        .and(header("accept", "text/event-stream"))
        .and(header("cache-control", "no-cache"))
        .and(header("champion-url", "https://api.test/"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("data: {}\n", "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = endpoint(&server)
        .with_header("champion-url", "https://api.test/")
        .with_header("Authorization", "Bearer secret");
    let events = Collector::default();
    let end = FetchBackend::new()
        .unwrap()
        .run(&endpoint, &events, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(*events.messages.lock(), vec![StreamMessage::payload("{}")]);
}

#[tokio::test]
async fn test_fetch_cancelled_before_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {}\n", "text/event-stream")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let events = Collector::default();
    let end = FetchBackend::new()
        .unwrap()
        .run(&endpoint(&server), &events, &cancel)
        .await
        .unwrap();

    assert_eq!(end, StreamEnd::Cancelled);
    assert_eq!(*events.opened.lock(), 0);
}

#[tokio::test]
async fn test_fetch_cancelled_while_body_is_pending() {
    cancel_mid_body(Arc::new(FetchBackend::new().unwrap())).await;
}

// =============================================================================
// Native-Transport Backend
// =============================================================================

#[tokio::test]
async fn test_event_source_forwards_unnamed_events_and_reports_end() {
    let server = serve(concat!(
        "data: {\"balance\":\"100.00\"}\n\n",
        "event: progress\n",
        "data: {\"skipped\":true}\n\n",
        "event: message\n",
        "data: {\"balance\":\"101.00\"}\n\n",
    ))
    .await;

    let backend = EventSourceBackend::new().unwrap();
    let events = Collector::default();
    let result = backend
        .run(&endpoint(&server), &events, &CancellationToken::new())
        .await;

    assert_eq!(result, Err(TransportError::StreamEnded));
    assert_eq!(*events.opened.lock(), 1);
    assert_eq!(
        *events.messages.lock(),
        vec![
            StreamMessage::payload(r#"{"balance":"100.00"}"#),
            StreamMessage::payload(r#"{"balance":"101.00"}"#),
        ]
    );
}

#[tokio::test]
async fn test_event_source_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let events = Collector::default();
    let result = EventSourceBackend::new()
        .unwrap()
        .run(&endpoint(&server), &events, &CancellationToken::new())
        .await;

    assert_eq!(result, Err(TransportError::Status(401)));
    assert_eq!(*events.opened.lock(), 0);
}

#[tokio::test]
async fn test_event_source_cancelled_while_body_is_pending() {
    cancel_mid_body(Arc::new(EventSourceBackend::new().unwrap())).await;
}

// =============================================================================
// Through the Service
// =============================================================================

#[tokio::test]
async fn test_service_over_fetch_backend() {
    let server = serve("data: {\"symbol\":\"R_100\"}\n\ndata: heartbeat\n\n").await;
    let backend: Arc<dyn StreamBackend> = Arc::new(FetchBackend::new().unwrap());
    let service = StreamService::new(backend, ReconnectConfig::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut states = service.watch_state();
    service.connect(
        ConnectRequest::new(endpoint(&server))
            .on_message(message_handler(move |message| sink.lock().push(message.clone()))),
    );

    // Completed body without reconnect_on_end leaves the stream closed.
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == ConnectionState::Closed),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            StreamMessage::payload(r#"{"symbol":"R_100"}"#),
            StreamMessage::Heartbeat,
        ]
    );
    assert!(!service.has_pending_reconnect());
    service.disconnect();
}

#[tokio::test]
async fn test_disconnect_mid_body_is_not_an_error() {
    let (endpoint, server) = stalled_stream("data: {\"seq\":1}\n\n").await;
    let backend: Arc<dyn StreamBackend> = Arc::new(EventSourceBackend::new().unwrap());
    let service = StreamService::new(backend, ReconnectConfig::default());

    let delivered = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let on_message = {
        let delivered = Arc::clone(&delivered);
        message_handler(move |_| {
            delivered.fetch_add(1, Ordering::SeqCst);
        })
    };
    let on_error = {
        let errors = Arc::clone(&errors);
        move |_: &TransportError| {
            errors.fetch_add(1, Ordering::SeqCst);
        }
    };

    service.connect(
        ConnectRequest::new(endpoint)
            .on_message(on_message)
            .on_error(on_error),
    );
    wait_until(|| delivered.load(Ordering::SeqCst) == 1).await;
    assert!(service.is_connected());

    service.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(service.state(), ConnectionState::Idle);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert!(!service.has_pending_reconnect());
    server.abort();
}
