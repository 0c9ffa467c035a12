use crate::adapters::{LocalNavAdapter, NavAdapter, Scheduler, TurnScheduler};
use crate::config::Config;
use crate::context::ContextAggregator;
use crate::guards::{ConsentProvider, ConsentScope, DefaultConsentProvider, GuardState};
use crate::ledger::{HapticSink, LedgerDispatcher, LogHapticSink, LogUiSink, UiSink};
use crate::rpc::{RpcCall, RpcClient};
use crate::transport::{self, ConnectionHandle};
use crate::turn::TurnOrchestrator;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DOCTOR_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fully wired runtime: both supervised sockets, the RPC pump, the context
/// pump, and the turn loop. Dropping the daemon drops the connection handles
/// and with them the supervision tasks.
pub struct Daemon {
    config: Config,
    guards: Arc<GuardState>,
    orchestrator: TurnOrchestrator,
    dispatcher: LedgerDispatcher,
    rpc: Arc<RpcClient>,
    ledger_conn: ConnectionHandle,
    context_conn: ConnectionHandle,
}

impl Daemon {
    pub fn start(config: Config) -> Self {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TurnScheduler::new());
        let adapter: Arc<dyn NavAdapter> = Arc::new(LocalNavAdapter::new());
        let guards = Arc::new(GuardState::new(
            DefaultConsentProvider.default_consent(ConsentScope::ConservativeTuning),
        ));

        let (rpc_tx, rpc_rx) = mpsc::channel(64);
        let ledger_conn = transport::connect(
            "ledger",
            config.ledger_url.clone(),
            Duration::from_secs(config.reliability.ledger_reconnect_secs),
            rpc_tx,
        );
        let rpc = RpcClient::new(ledger_conn.clone());
        tokio::spawn(Arc::clone(&rpc).run(rpc_rx));

        let (context_tx, context_rx) = mpsc::channel(64);
        let context_conn = transport::connect(
            "context",
            config.context_url.clone(),
            Duration::from_secs(config.reliability.context_reconnect_secs),
            context_tx,
        );
        let aggregator = Arc::new(ContextAggregator::new(Arc::clone(&scheduler)));
        tokio::spawn(Arc::clone(&aggregator).run(context_rx));

        let dispatcher = LedgerDispatcher::new(
            Arc::clone(&rpc) as Arc<dyn RpcCall>,
            config.host_id.clone(),
            Some(Arc::new(LogUiSink) as Arc<dyn UiSink>),
            Some(Arc::new(LogHapticSink) as Arc<dyn HapticSink>),
        );

        let orchestrator = TurnOrchestrator::new(
            scheduler,
            adapter,
            Arc::clone(&guards),
            aggregator,
            config.turn.max_tokens_per_turn,
        );

        Self {
            config,
            guards,
            orchestrator,
            dispatcher,
            rpc,
            ledger_conn,
            context_conn,
        }
    }

    /// Consent/safety cell for external actors (UI, telemetry) to update.
    pub fn guards(&self) -> Arc<GuardState> {
        Arc::clone(&self.guards)
    }

    /// Frame submission surface for embedding callers.
    pub fn dispatcher(&self) -> &LedgerDispatcher {
        &self.dispatcher
    }

    /// Run the turn loop until interrupted.
    pub async fn run(&self) -> Result<()> {
        let period = Duration::from_secs(self.config.turn.period_secs);
        tracing::info!(
            host = %self.config.host_id,
            period_secs = self.config.turn.period_secs,
            max_tokens = self.config.turn.max_tokens_per_turn,
            "daemon starting"
        );

        tokio::select! {
            () = self.orchestrator.run(period) => {}
            _ = tokio::signal::ctrl_c() => {
                let pending = self.rpc.pending_calls().await;
                tracing::info!(
                    pending_calls = pending,
                    ledger = %self.ledger_conn.state(),
                    context = %self.context_conn.state(),
                    "shutting down"
                );
            }
        }
        Ok(())
    }
}

/// Probe both endpoints and report reachability, without starting turns.
pub async fn doctor(config: &Config) -> Result<()> {
    println!("◆ evolane doctor");
    println!();

    let mut healthy = 0_u32;
    let mut unreachable = 0_u32;

    for (name, url, delay) in [
        (
            "ledger",
            &config.ledger_url,
            config.reliability.ledger_reconnect_secs,
        ),
        (
            "context",
            &config.context_url,
            config.reliability.context_reconnect_secs,
        ),
    ] {
        let (tx, _rx) = mpsc::channel(8);
        let conn = transport::connect(name, url.clone(), Duration::from_secs(delay), tx);

        match tokio::time::timeout(DOCTOR_PROBE_TIMEOUT, conn.wait_open()).await {
            Ok(true) => {
                healthy += 1;
                println!("  ✓ {name:<8} reachable ({url})");
            }
            Ok(false) | Err(_) => {
                unreachable += 1;
                println!("  ✗ {name:<8} unreachable ({url})");
            }
        }
    }

    println!();
    println!("{healthy} reachable, {unreachable} unreachable");
    Ok(())
}
