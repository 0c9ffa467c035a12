use crate::adapters::{NavAdapter, NavParams, Scheduler};
use crate::context::ContextAggregator;
use crate::guards::GuardState;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What happened to one proposed token within a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Applied,
    RejectedByGate,
    ApplyFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct TokenOutcome {
    pub label: String,
    pub status: TokenStatus,
}

/// Record of one completed turn, kept for logging and tests.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub started_at: DateTime<Utc>,
    pub params_before: NavParams,
    pub params_after: NavParams,
    pub outcomes: Vec<TokenOutcome>,
}

impl TurnReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == TokenStatus::Applied)
            .count()
    }
}

/// Drives one evolution turn per period: rotate the window, push safety,
/// snapshot context, gate and apply each proposed token in order.
pub struct TurnOrchestrator {
    scheduler: Arc<dyn Scheduler>,
    adapter: Arc<dyn NavAdapter>,
    guards: Arc<GuardState>,
    context: Arc<ContextAggregator>,
    max_tokens: u32,
}

impl TurnOrchestrator {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        adapter: Arc<dyn NavAdapter>,
        guards: Arc<GuardState>,
        context: Arc<ContextAggregator>,
        max_tokens: u32,
    ) -> Self {
        Self {
            scheduler,
            adapter,
            guards,
            context,
            max_tokens,
        }
    }

    /// Run turns forever on a fixed period. Turns are serialized by this
    /// single task: a turn that outlives its period delays the next tick
    /// rather than skipping it or running it concurrently.
    pub async fn run(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first turn
        // happens one full period after startup.
        interval.tick().await;

        loop {
            interval.tick().await;
            let report = self.run_turn(Utc::now()).await;
            tracing::info!(
                proposed = report.outcomes.len(),
                applied = report.applied(),
                "turn complete"
            );
        }
    }

    /// One indivisible turn. Token failures and gate denials are recorded and
    /// skipped over; they never abort the remaining tokens.
    pub async fn run_turn(&self, now: DateTime<Utc>) -> TurnReport {
        self.scheduler.maybe_rotate_turn(now).await;

        // Guards are snapshotted once per turn; later external writes affect
        // the next turn at the earliest.
        let safety = self.guards.safety();
        self.scheduler.set_safety_state(safety).await;
        let consent = self.guards.consent();

        let snapshot = self.context.snapshot();

        let params_before = self.adapter.read_params().await;
        tracing::info!(?params_before, %safety, "turn starting");

        let tokens = self
            .adapter
            .propose_tokens(now, &snapshot, self.max_tokens)
            .await;

        let mut outcomes = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !self
                .scheduler
                .try_apply_token(now, &consent, &token)
                .await
            {
                tracing::info!(label = %token.delta_label, "token rejected by scheduler");
                outcomes.push(TokenOutcome {
                    label: token.delta_label,
                    status: TokenStatus::RejectedByGate,
                });
                continue;
            }

            match self.adapter.apply_token(&token).await {
                Ok(()) => {
                    tracing::info!(label = %token.delta_label, "token applied");
                    outcomes.push(TokenOutcome {
                        label: token.delta_label,
                        status: TokenStatus::Applied,
                    });
                }
                Err(e) => {
                    tracing::warn!(label = %token.delta_label, "token apply failed: {e}");
                    outcomes.push(TokenOutcome {
                        label: token.delta_label,
                        status: TokenStatus::ApplyFailed {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        let params_after = self.adapter.read_params().await;
        tracing::info!(?params_after, "turn finished");

        TurnReport {
            started_at: now,
            params_before,
            params_after,
            outcomes,
        }
    }
}
