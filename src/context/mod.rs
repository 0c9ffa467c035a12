use crate::adapters::Scheduler;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Latest low-dimensional environmental summary. Replaced wholesale on each
/// inbound `env_summary`; never merged field-by-field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    pub obstacle_density: f64,
    pub ambient_noise: f64,
    pub crowd_pressure: f64,
    pub requested_heading_deg: f64,
}

/// One discrete suggestion from the public-space infrastructure. Forwarded to
/// the scheduler immediately; not retained here.
#[derive(Debug, Clone)]
pub struct ContextEvent {
    pub kind: String,
    pub issued_by: String,
    pub signature_valid: bool,
    /// Stamped at receipt; sender-provided timestamps are never trusted.
    pub received_at: DateTime<Utc>,
}

/// Routes inbound context frames: `lane_suggestion` events go straight to the
/// scheduler, `env_summary` frames replace the current snapshot.
pub struct ContextAggregator {
    latest: ArcSwap<ContextSnapshot>,
    scheduler: Arc<dyn Scheduler>,
}

impl ContextAggregator {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            latest: ArcSwap::from_pointee(ContextSnapshot::default()),
            scheduler,
        }
    }

    /// Copy of the latest snapshot. Each turn works from its own copy so
    /// inbound updates mid-turn cannot shift that turn's decisions.
    pub fn snapshot(&self) -> ContextSnapshot {
        self.latest.load().as_ref().clone()
    }

    /// Drain raw frames from the context socket until the sender side closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<String>) {
        while let Some(raw) = inbound.recv().await {
            self.handle_frame(&raw).await;
        }
    }

    pub async fn handle_frame(&self, raw: &str) {
        let msg: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("context: discarding unparseable frame: {e}");
                return;
            }
        };

        match msg.get("type").and_then(Value::as_str) {
            Some("lane_suggestion") => self.handle_lane_suggestion(&msg).await,
            Some("env_summary") => self.handle_env_summary(&msg),
            other => {
                tracing::debug!("context: ignoring message type {other:?}");
            }
        }
    }

    async fn handle_lane_suggestion(&self, msg: &Value) {
        let event = ContextEvent {
            kind: msg
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            issued_by: msg
                .get("issuer")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            signature_valid: msg
                .get("signature_valid")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            received_at: Utc::now(),
        };
        self.scheduler.handle_context_event(event).await;
    }

    fn handle_env_summary(&self, msg: &Value) {
        let field = |name: &str| msg.get(name).and_then(Value::as_f64).unwrap_or(0.0);
        let snapshot = ContextSnapshot {
            obstacle_density: clamp01(field("obstacle_density")),
            ambient_noise: clamp01(field("ambient_noise")),
            crowd_pressure: clamp01(field("crowd_pressure")),
            requested_heading_deg: normalize_deg(field("requested_heading_deg")),
        };
        self.latest.store(Arc::new(snapshot));
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Normalize a heading into [0, 360), correcting negative remainders.
fn normalize_deg(d: f64) -> f64 {
    let v = d % 360.0;
    if v < 0.0 { v + 360.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EvolutionToken;
    use crate::guards::{ConsentState, SafetyState};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

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

    fn aggregator() -> (Arc<ContextAggregator>, Arc<RecordingScheduler>) {
        let scheduler = Arc::new(RecordingScheduler::default());
        let agg = Arc::new(ContextAggregator::new(
            Arc::clone(&scheduler) as Arc<dyn Scheduler>
        ));
        (agg, scheduler)
    }

    #[tokio::test]
    async fn env_summary_replaces_snapshot_wholesale() {
        let (agg, _) = aggregator();
        agg.handle_frame(
            r#"{"type":"env_summary","obstacle_density":0.4,"ambient_noise":0.2,"crowd_pressure":0.9,"requested_heading_deg":90.0}"#,
        )
        .await;
        agg.handle_frame(r#"{"type":"env_summary","obstacle_density":0.1}"#)
            .await;

        let snapshot = agg.snapshot();
        assert!((snapshot.obstacle_density - 0.1).abs() < f64::EPSILON);
        // Missing fields default to 0.0 rather than keeping the prior value.
        assert!(snapshot.crowd_pressure.abs() < f64::EPSILON);
        assert!(snapshot.requested_heading_deg.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn out_of_range_values_are_clamped() {
        let (agg, _) = aggregator();
        agg.handle_frame(
            r#"{"type":"env_summary","obstacle_density":1.5,"ambient_noise":-0.3,"requested_heading_deg":-30.0}"#,
        )
        .await;

        let snapshot = agg.snapshot();
        assert!((snapshot.obstacle_density - 1.0).abs() < f64::EPSILON);
        assert!(snapshot.ambient_noise.abs() < f64::EPSILON);
        assert!((snapshot.requested_heading_deg - 330.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn overshot_heading_wraps_around() {
        let (agg, _) = aggregator();
        agg.handle_frame(r#"{"type":"env_summary","requested_heading_deg":725.0}"#)
            .await;
        assert!((agg.snapshot().requested_heading_deg - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn lane_suggestion_is_forwarded_with_local_stamp() {
        let (agg, scheduler) = aggregator();
        let before = Utc::now();
        agg.handle_frame(
            r#"{"type":"lane_suggestion","kind":"NavigationSuggested","issuer":"crossing-7","signature_valid":true}"#,
        )
        .await;

        let events = scheduler.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "NavigationSuggested");
        assert_eq!(events[0].issued_by, "crossing-7");
        assert!(events[0].signature_valid);
        assert!(events[0].received_at >= before);
    }

    #[tokio::test]
    async fn missing_issuer_defaults_to_unknown() {
        let (agg, scheduler) = aggregator();
        agg.handle_frame(r#"{"type":"lane_suggestion","kind":"SafetyHighPriority"}"#)
            .await;

        let events = scheduler.events.lock().await;
        assert_eq!(events[0].issued_by, "unknown");
        assert!(!events[0].signature_valid);
    }

    #[tokio::test]
    async fn unknown_type_and_garbage_are_ignored() {
        let (agg, scheduler) = aggregator();
        agg.handle_frame(r#"{"type":"weather_report","rain":true}"#).await;
        agg.handle_frame("{not json").await;

        assert!(scheduler.events.lock().await.is_empty());
        assert_eq!(agg.snapshot(), ContextSnapshot::default());
    }

    #[test]
    fn normalize_deg_boundaries() {
        assert!(normalize_deg(0.0).abs() < f64::EPSILON);
        assert!(normalize_deg(360.0).abs() < f64::EPSILON);
        assert!((normalize_deg(-0.5) - 359.5).abs() < 1e-9);
    }
}
