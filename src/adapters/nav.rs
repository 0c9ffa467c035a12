use super::traits::{EvolutionToken, NavAdapter, NavParams};
use crate::context::ContextSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

const SENSITIVITY_UP: &str = "nav.sensitivity+0.05";
const SENSITIVITY_DOWN: &str = "nav.sensitivity-0.05";
const SUPPRESSION_UP: &str = "nav.suppression+0.05";
const SUPPRESSION_DOWN: &str = "nav.suppression-0.05";

/// Reference actuator holding navigation parameters in local fields. A real
/// deployment bridges this to the device driver instead.
pub struct LocalNavAdapter {
    params: Mutex<NavParams>,
}

impl LocalNavAdapter {
    pub fn new() -> Self {
        Self {
            params: Mutex::new(NavParams {
                spike_rate_hz: 20.0,
                sensitivity_band: 0.5,
                suppression_band: 0.2,
            }),
        }
    }
}

#[async_trait]
impl NavAdapter for LocalNavAdapter {
    async fn read_params(&self) -> NavParams {
        self.params.lock().await.clone()
    }

    async fn propose_tokens(
        &self,
        _now: DateTime<Utc>,
        context: &ContextSnapshot,
        max_tokens: u32,
    ) -> Vec<EvolutionToken> {
        let mut tokens = Vec::new();
        if max_tokens == 0 {
            return tokens;
        }

        // Heuristics: dense obstacles ask for more sensitivity; loud or
        // crowded surroundings ask for more suppression.
        let mut remaining = max_tokens;

        if context.obstacle_density > 0.6 && remaining > 0 {
            tokens.push(EvolutionToken::navigation_delta(SENSITIVITY_UP, 0.15));
            remaining -= 1;
        }

        if (context.ambient_noise > 0.6 || context.crowd_pressure > 0.6) && remaining > 0 {
            tokens.push(EvolutionToken::navigation_delta(SUPPRESSION_UP, 0.15));
        }

        tokens
    }

    async fn apply_token(&self, token: &EvolutionToken) -> anyhow::Result<()> {
        let mut params = self.params.lock().await;
        // Deltas come from a closed grammar; anything else is refused rather
        // than interpreted.
        match token.delta_label.as_str() {
            SENSITIVITY_UP => params.sensitivity_band += 0.05,
            SENSITIVITY_DOWN => params.sensitivity_band -= 0.05,
            SUPPRESSION_UP => params.suppression_band += 0.05,
            SUPPRESSION_DOWN => params.suppression_band -= 0.05,
            other => anyhow::bail!("unsupported delta_label: {other}"),
        }
        params.clamp();
        Ok(())
    }
}
