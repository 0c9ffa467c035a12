use crate::error::LaneError;
use crate::guards::SafetyState;
use crate::rpc::RpcCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub const APPLY_EVOLUTION_FRAME: &str = "ledger.applyEvolutionFrame";

// ─── Frame payload ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBands {
    pub flop_budget: f64,
    pub energy_budget: f64,
    pub eco_intent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectBands {
    pub latency_band: f64,
    pub error_band: f64,
    pub eco_impact_band: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardsSnapshot {
    pub lifeforce_band: f64,
    pub safety_wave: SafetyState,
    pub daily_turn_seq: u64,
}

/// One submission to the ledger. Immutable once built; the frame id is minted
/// per submission and correlates downstream UI notifications, independently
/// of the RPC request id underneath.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionFrame {
    pub host: String,
    pub frame_id: Uuid,
    pub plane: String,
    pub scope: String,
    pub cost: CostBands,
    pub expected_effect: EffectBands,
    pub guards_snapshot: GuardsSnapshot,
}

/// Per-lane submission template; combined with a live guard reading to build
/// a frame.
#[derive(Debug, Clone)]
pub struct LaneSwitchProfile {
    pub plane: String,
    pub scope: String,
    pub cost: CostBands,
    pub expected_effect: EffectBands,
}

/// Live guard values sampled at submission time.
#[derive(Debug, Clone, Copy)]
pub struct GuardReading {
    pub lifeforce_band: f64,
    pub safety_wave: SafetyState,
    pub daily_turn_seq: u64,
}

impl EvolutionFrame {
    pub fn from_profile(host: &str, profile: &LaneSwitchProfile, guards: GuardReading) -> Self {
        Self {
            host: host.to_string(),
            frame_id: Uuid::new_v4(),
            plane: profile.plane.clone(),
            scope: profile.scope.clone(),
            cost: profile.cost.clone(),
            expected_effect: profile.expected_effect.clone(),
            guards_snapshot: GuardsSnapshot {
                lifeforce_band: guards.lifeforce_band,
                safety_wave: guards.safety_wave,
                daily_turn_seq: guards.daily_turn_seq,
            },
        }
    }
}

// ─── Decision payload ───────────────────────────────────────────────────────

/// Ledger verdict for one frame. Verdicts added by newer ledgers decode as
/// `Unknown` and produce no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum Verdict {
    Safe,
    Defer,
    DenyHardStop,
    Unknown,
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "Safe" => Self::Safe,
            "Defer" => Self::Defer,
            "DenyHardStop" => Self::DenyHardStop,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionDecision {
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_deltas: Option<Value>,
}

// ─── Sinks ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiEventKind {
    #[serde(rename = "evolution_safe")]
    Safe,
    #[serde(rename = "evolution_defer")]
    Deferred,
    #[serde(rename = "evolution_denied")]
    Denied,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiEvent {
    #[serde(rename = "type")]
    pub kind: UiEventKind,
    pub frame_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_deltas: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HapticCue {
    Success,
    Neutral,
    Alert,
}

#[async_trait]
pub trait UiSink: Send + Sync {
    async fn notify(&self, event: UiEvent);
}

#[async_trait]
pub trait HapticSink: Send + Sync {
    async fn pulse(&self, cue: HapticCue);
}

/// Default sinks that only write to the log; stand-ins until a real surface
/// registers.
pub struct LogUiSink;

#[async_trait]
impl UiSink for LogUiSink {
    async fn notify(&self, event: UiEvent) {
        tracing::info!(frame = %event.frame_id, kind = ?event.kind, "ui notification");
    }
}

pub struct LogHapticSink;

#[async_trait]
impl HapticSink for LogHapticSink {
    async fn pulse(&self, cue: HapticCue) {
        tracing::info!(%cue, "haptic pulse");
    }
}

// ─── Dispatcher ─────────────────────────────────────────────────────────────

/// Submits evolution frames and routes the ledger's verdict to the optional
/// UI and haptic sinks. The decision is always returned to the caller,
/// whatever sinks are present.
pub struct LedgerDispatcher {
    rpc: Arc<dyn RpcCall>,
    host_id: String,
    ui: Option<Arc<dyn UiSink>>,
    haptics: Option<Arc<dyn HapticSink>>,
}

impl LedgerDispatcher {
    pub fn new(
        rpc: Arc<dyn RpcCall>,
        host_id: String,
        ui: Option<Arc<dyn UiSink>>,
        haptics: Option<Arc<dyn HapticSink>>,
    ) -> Self {
        Self {
            rpc,
            host_id,
            ui,
            haptics,
        }
    }

    /// Build a frame for this lane profile under the given guard reading and
    /// submit it.
    pub async fn suggest_lane_switch(
        &self,
        profile: &LaneSwitchProfile,
        guards: GuardReading,
    ) -> Result<EvolutionDecision, LaneError> {
        let frame = EvolutionFrame::from_profile(&self.host_id, profile, guards);
        self.submit_frame(&frame).await
    }

    pub async fn submit_frame(&self, frame: &EvolutionFrame) -> Result<EvolutionDecision, LaneError> {
        let params = serde_json::to_value(frame)?;
        let result = self.rpc.call(APPLY_EVOLUTION_FRAME, params).await?;
        let decision: EvolutionDecision = serde_json::from_value(result)?;

        match decision.verdict {
            Verdict::Safe => {
                self.notify(UiEventKind::Safe, frame.frame_id, decision.applied_deltas.clone())
                    .await;
                self.pulse(HapticCue::Success).await;
            }
            Verdict::Defer => {
                self.notify(UiEventKind::Deferred, frame.frame_id, None).await;
                self.pulse(HapticCue::Neutral).await;
            }
            Verdict::DenyHardStop => {
                self.notify(UiEventKind::Denied, frame.frame_id, None).await;
                self.pulse(HapticCue::Alert).await;
            }
            Verdict::Unknown => {
                tracing::debug!(frame = %frame.frame_id, "ledger returned unknown verdict");
            }
        }

        Ok(decision)
    }

    async fn notify(&self, kind: UiEventKind, frame_id: Uuid, applied_deltas: Option<Value>) {
        if let Some(ui) = &self.ui {
            ui.notify(UiEvent {
                kind,
                frame_id,
                applied_deltas,
            })
            .await;
        }
    }

    async fn pulse(&self, cue: HapticCue) {
        if let Some(haptics) = &self.haptics {
            haptics.pulse(cue).await;
        }
    }
}
