use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Safety state derived from signals outside this crate (telemetry, UI).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum SafetyState {
    Green,
    Yellow,
    Red,
}

/// Consent scope for a class of parameter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentScope {
    None,
    /// Only summaries/features may be computed.
    ReadOnly,
    /// Small, reversible parameter tweaks.
    ConservativeTuning,
    /// Any change within pre-defined safe ranges.
    FullTuning,
}

/// Live consent for one navigation scope. Produced by a [`ConsentProvider`],
/// replaced wholesale on user action, never constructed by the turn loop.
#[derive(Debug, Clone)]
pub struct ConsentState {
    pub scope: ConsentScope,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_descriptor: String,
}

impl ConsentState {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.scope == ConsentScope::None {
            return false;
        }
        match self.expires_at {
            Some(expiry) => now < expiry,
            None => true,
        }
    }

    pub fn allows_evolution(&self) -> bool {
        matches!(
            self.scope,
            ConsentScope::ConservativeTuning | ConsentScope::FullTuning
        )
    }
}

/// Builds the consent representation for a navigation scope.
pub trait ConsentProvider: Send + Sync {
    fn default_consent(&self, scope: ConsentScope) -> ConsentState;
}

/// Default provider: open-ended grant stamped at call time.
pub struct DefaultConsentProvider;

impl ConsentProvider for DefaultConsentProvider {
    fn default_consent(&self, scope: ConsentScope) -> ConsentState {
        ConsentState {
            scope,
            granted_at: Utc::now(),
            expires_at: None,
            user_descriptor: "navigation lane tuning".into(),
        }
    }
}

/// Process-wide consent and safety values. Written by external actors,
/// snapshotted once at the start of each turn so a mid-turn change affects
/// the next turn at the earliest.
pub struct GuardState {
    safety: ArcSwap<SafetyState>,
    consent: ArcSwap<ConsentState>,
}

impl GuardState {
    pub fn new(consent: ConsentState) -> Self {
        Self {
            safety: ArcSwap::from_pointee(SafetyState::Green),
            consent: ArcSwap::from_pointee(consent),
        }
    }

    pub fn safety(&self) -> SafetyState {
        **self.safety.load()
    }

    pub fn set_safety(&self, state: SafetyState) {
        self.safety.store(Arc::new(state));
    }

    pub fn consent(&self) -> ConsentState {
        self.consent.load().as_ref().clone()
    }

    pub fn set_consent(&self, consent: ConsentState) {
        self.consent.store(Arc::new(consent));
    }
}
