use crate::context::{ContextEvent, ContextSnapshot};
use crate::guards::{ConsentState, SafetyState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// High-level device function class a token may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraitKind {
    Navigation,
    SafetyAlert,
    CommunicationAssist,
    SensoryFilter,
    AttentionModulator,
}

/// Band-limited budget semantics for lifeforce/eco consumption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetBands {
    pub lifeforce_band: f64,
    pub eco_band: f64,
}

impl BudgetBands {
    pub fn conservative() -> Self {
        Self {
            lifeforce_band: 0.25,
            eco_band: 0.25,
        }
    }
}

/// One micro-change proposal. Produced per turn, consumed within that turn,
/// never persisted.
#[derive(Debug, Clone)]
pub struct EvolutionToken {
    pub id: Uuid,
    pub kind: TraitKind,
    /// Human-readable delta in a closed grammar, e.g. `nav.sensitivity+0.05`.
    pub delta_label: String,
    pub cost_bands: BudgetBands,
    pub expected_effect_band: f64,
    pub reversible: bool,
}

impl EvolutionToken {
    pub fn navigation_delta(label: &str, effect_band: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TraitKind::Navigation,
            delta_label: label.to_string(),
            cost_bands: BudgetBands::conservative(),
            expected_effect_band: effect_band.clamp(0.0, 1.0),
            reversible: true,
        }
    }
}

/// Per-lane profile defining which trait kinds may change and how much.
#[derive(Debug, Clone)]
pub struct LaneProfile {
    pub name: String,
    pub active_kinds: Vec<TraitKind>,
    pub max_tokens_per_turn: u32,
    pub budget_bands: BudgetBands,
}

impl LaneProfile {
    pub fn navigation_default() -> Self {
        Self {
            name: "navigation".into(),
            active_kinds: vec![TraitKind::Navigation, TraitKind::SafetyAlert],
            max_tokens_per_turn: 4,
            budget_bands: BudgetBands::conservative(),
        }
    }
}

/// Minimal view into the navigation organ's live parameters, read before and
/// after each turn for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct NavParams {
    pub spike_rate_hz: f64,
    pub sensitivity_band: f64,
    pub suppression_band: f64,
}

impl NavParams {
    pub fn clamp(&mut self) {
        self.spike_rate_hz = self.spike_rate_hz.clamp(0.0, 200.0);
        self.sensitivity_band = self.sensitivity_band.clamp(0.0, 1.0);
        self.suppression_band = self.suppression_band.clamp(0.0, 1.0);
    }
}

/// Decides whether proposed tokens are currently allowed. The turn loop calls
/// through this trait and never looks inside the decision.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Evaluate whether a new turn window should roll over at `now`.
    async fn maybe_rotate_turn(&self, now: DateTime<Utc>);

    /// Push the safety state snapshotted at turn start.
    async fn set_safety_state(&self, state: SafetyState);

    /// Receive one discrete context event; called once per event, no replay.
    async fn handle_context_event(&self, event: ContextEvent);

    /// Gate one token under current consent. `false` is a normal branch, not
    /// an error.
    async fn try_apply_token(
        &self,
        now: DateTime<Utc>,
        consent: &ConsentState,
        token: &EvolutionToken,
    ) -> bool;
}

/// Proposes candidate tokens from context and applies admitted ones.
#[async_trait]
pub trait NavAdapter: Send + Sync {
    async fn read_params(&self) -> NavParams;

    async fn propose_tokens(
        &self,
        now: DateTime<Utc>,
        context: &ContextSnapshot,
        max_tokens: u32,
    ) -> Vec<EvolutionToken>;

    /// Apply a gated token. Only called after the scheduler admitted it.
    async fn apply_token(&self, token: &EvolutionToken) -> anyhow::Result<()>;
}
