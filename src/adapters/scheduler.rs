use super::traits::{EvolutionToken, LaneProfile, Scheduler, TraitKind};
use crate::context::ContextEvent;
use crate::guards::{ConsentState, SafetyState};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

/// One evolution window: a bounded span in which a lane profile's token
/// budget applies.
#[derive(Debug, Clone)]
struct EvolutionWindow {
    id: Uuid,
    opened_at: DateTime<Utc>,
    duration: Duration,
    lane_profile: LaneProfile,
    safety_state: SafetyState,
}

impl EvolutionWindow {
    fn open(now: DateTime<Utc>, duration: Duration, lane_profile: LaneProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            opened_at: now,
            duration,
            lane_profile,
            safety_state: SafetyState::Green,
        }
    }

    fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.opened_at && now - self.opened_at <= self.duration
    }

    fn can_accept_token(
        &self,
        now: DateTime<Utc>,
        consent: &ConsentState,
        applied_tokens: u32,
        token: &EvolutionToken,
    ) -> bool {
        if !self.is_active(now) {
            return false;
        }
        if !consent.is_active(now) || !consent.allows_evolution() {
            return false;
        }
        if !self.lane_profile.active_kinds.contains(&token.kind) {
            return false;
        }
        if applied_tokens >= self.lane_profile.max_tokens_per_turn {
            return false;
        }
        match self.safety_state {
            SafetyState::Red => false,
            SafetyState::Yellow => token.expected_effect_band <= 0.25,
            SafetyState::Green => token.expected_effect_band <= 0.5,
        }
    }
}

#[derive(Debug)]
struct SchedulerState {
    window: EvolutionWindow,
    applied_tokens: u32,
    default_lane: LaneProfile,
}

/// Reference gating scheduler: rotating windows over a default lane profile.
/// The environment can only suggest lanes through context events; window
/// rotation and token admission stay under local control.
pub struct TurnScheduler {
    state: Mutex<SchedulerState>,
    window_duration: Duration,
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self::with_window_secs(180)
    }

    pub fn with_window_secs(secs: i64) -> Self {
        let duration = Duration::seconds(secs);
        let lane = LaneProfile::navigation_default();
        Self {
            state: Mutex::new(SchedulerState {
                window: EvolutionWindow::open(Utc::now(), duration, lane.clone()),
                applied_tokens: 0,
                default_lane: lane,
            }),
            window_duration: duration,
        }
    }

    fn lane_for_event(state: &SchedulerState, kind: &str) -> Option<LaneProfile> {
        match kind {
            "NavigationSuggested" => Some(LaneProfile::navigation_default()),
            "SafetyHighPriority" => Some(LaneProfile {
                name: "safety".into(),
                active_kinds: vec![TraitKind::SafetyAlert],
                max_tokens_per_turn: 6,
                budget_bands: state.default_lane.budget_bands,
            }),
            "CommunicationAssist" => Some(LaneProfile {
                name: "communication".into(),
                active_kinds: vec![TraitKind::CommunicationAssist],
                max_tokens_per_turn: 3,
                budget_bands: state.default_lane.budget_bands,
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl Scheduler for TurnScheduler {
    async fn maybe_rotate_turn(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if !state.window.is_active(now) {
            let safety = state.window.safety_state;
            let mut window =
                EvolutionWindow::open(now, self.window_duration, state.default_lane.clone());
            window.safety_state = safety;
            tracing::debug!(window = %window.id, lane = %window.lane_profile.name, "scheduler: opened new turn window");
            state.window = window;
            state.applied_tokens = 0;
        }
    }

    async fn set_safety_state(&self, safety: SafetyState) {
        let mut state = self.state.lock().await;
        state.window.safety_state = safety;
    }

    async fn handle_context_event(&self, event: ContextEvent) {
        if !event.signature_valid {
            tracing::debug!(issuer = %event.issued_by, "scheduler: dropping unsigned context event");
            return;
        }

        let mut state = self.state.lock().await;
        // The environment can only suggest lanes; the swap takes effect at the
        // next rotation, never mid-window.
        if let Some(lane) = Self::lane_for_event(&state, &event.kind) {
            tracing::info!(lane = %lane.name, issuer = %event.issued_by, "scheduler: default lane updated");
            state.default_lane = lane;
        }
    }

    async fn try_apply_token(
        &self,
        now: DateTime<Utc>,
        consent: &ConsentState,
        token: &EvolutionToken,
    ) -> bool {
        let mut state = self.state.lock().await;
        let applied = state.applied_tokens;
        if !state.window.can_accept_token(now, consent, applied, token) {
            return false;
        }
        state.applied_tokens += 1;
        true
    }
}
