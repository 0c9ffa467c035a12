use serde_json::Value;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `evolane`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum LaneError {
    // ── Transport ───────────────────────────────────────────────────────
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // ── Ledger RPC ──────────────────────────────────────────────────────
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    // ── Config ──────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Wire payloads ───────────────────────────────────────────────────
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Transport errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection state machine is not in `Open`; nothing was queued.
    #[error("connection not open")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),
}

// ─── RPC errors ─────────────────────────────────────────────────────────────

/// Failure modes of a single correlated call. Every variant settles the call
/// exactly once; none of them disturb other in-flight calls.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("ledger rpc not connected")]
    NotConnected,

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The remote answered with an `error` envelope; payload kept verbatim.
    #[error("remote error: {0}")]
    Remote(Value),

    /// The client was torn down while this call was still pending.
    #[error("response channel closed")]
    ChannelClosed,
}

// ─── Config errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
