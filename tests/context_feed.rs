//! End-to-end context path: WebSocket feed → transport → aggregator →
//! scheduler, including reconnection of the context socket.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evolane::adapters::{EvolutionToken, Scheduler};
use evolane::context::{ContextAggregator, ContextEvent, ContextSnapshot};
use evolane::guards::{ConsentState, SafetyState};
use evolane::transport;
use futures_util::SinkExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct RecordingScheduler {
    events: Mutex<Vec<ContextEvent>>,
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn maybe_rotate_turn(&self, _now: DateTime<Utc>) {}

    async fn set_safety_state(&self, _state: SafetyState) {}

    async fn handle_context_event(&self, event: ContextEvent) {
        self.events.lock().await.push(event);
    }

    async fn try_apply_token(
        &self,
        _now: DateTime<Utc>,
        _consent: &ConsentState,
        _token: &EvolutionToken,
    ) -> bool {
        false
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: &Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

async fn wait_for_snapshot<F>(aggregator: &ContextAggregator, condition: F) -> ContextSnapshot
where
    F: Fn(&ContextSnapshot) -> bool,
{
    for _ in 0..100 {
        let snapshot = aggregator.snapshot();
        if condition(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("snapshot condition not reached in time");
}

fn start_feed(
    scheduler: Arc<RecordingScheduler>,
    url: String,
) -> (Arc<ContextAggregator>, transport::ConnectionHandle) {
    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let conn = transport::connect("test-context", url, Duration::from_millis(50), inbound_tx);
    let aggregator = Arc::new(ContextAggregator::new(scheduler as Arc<dyn Scheduler>));
    tokio::spawn(Arc::clone(&aggregator).run(inbound_rx));
    (aggregator, conn)
}

#[tokio::test]
async fn summaries_and_suggestions_flow_through_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");

        send_json(
            &mut ws,
            &json!({
                "type": "env_summary",
                "obstacle_density": 1.5,
                "ambient_noise": 0.3,
                "crowd_pressure": 0.7,
                "requested_heading_deg": -30.0,
            }),
        )
        .await;
        send_json(
            &mut ws,
            &json!({
                "type": "lane_suggestion",
                "kind": "NavigationSuggested",
                "issuer": "crossing-7",
                "signature_valid": true,
            }),
        )
        .await;
        // Keep the session open while the client drains.
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let scheduler = Arc::new(RecordingScheduler::default());
    let (aggregator, _conn) =
        start_feed(Arc::clone(&scheduler), format!("ws://127.0.0.1:{port}/context"));

    let snapshot =
        wait_for_snapshot(&aggregator, |s| *s != ContextSnapshot::default()).await;
    assert!((snapshot.obstacle_density - 1.0).abs() < f64::EPSILON);
    assert!((snapshot.crowd_pressure - 0.7).abs() < 1e-9);
    assert!((snapshot.requested_heading_deg - 330.0).abs() < 1e-9);

    for _ in 0..100 {
        if !scheduler.events.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let events = scheduler.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "NavigationSuggested");
    assert_eq!(events[0].issued_by, "crossing-7");
}

#[tokio::test]
async fn feed_resumes_after_the_socket_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        // Session 1: one summary, then drop.
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        send_json(
            &mut ws,
            &json!({"type": "env_summary", "obstacle_density": 0.2}),
        )
        .await;
        drop(ws);

        // Session 2: the post-reconnect summary.
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        send_json(
            &mut ws,
            &json!({"type": "env_summary", "obstacle_density": 0.9}),
        )
        .await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let scheduler = Arc::new(RecordingScheduler::default());
    let (aggregator, _conn) =
        start_feed(Arc::clone(&scheduler), format!("ws://127.0.0.1:{port}/context"));

    wait_for_snapshot(&aggregator, |s| (s.obstacle_density - 0.9).abs() < 1e-9).await;
}
