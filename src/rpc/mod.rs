use crate::error::RpcError;
use crate::transport::ConnectionHandle;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};

const PROTOCOL_VERSION: &str = "2.0";

type PendingTable = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// Seam the decision dispatcher calls through; lets tests substitute the
/// ledger without a socket.
#[async_trait]
pub trait RpcCall: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// JSON-RPC 2.0 client multiplexing concurrent calls over one supervised
/// connection. Each call is correlated by a monotonically increasing id;
/// responses may arrive in any order.
pub struct RpcClient {
    conn: ConnectionHandle,
    pending: Mutex<PendingTable>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(conn: ConnectionHandle) -> Arc<Self> {
        Arc::new(Self {
            conn,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one correlated call. Fails fast when the transport is not open;
    /// a send failure removes the pending entry so the call is never left
    /// dangling. Otherwise the returned future settles exactly once, with the
    /// remote result or the remote error payload verbatim.
    ///
    /// Pending calls survive reconnects indefinitely; callers wanting a bound
    /// wrap this in `tokio::time::timeout`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if !self.conn.is_open() {
            return Err(RpcError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let envelope = json!({
            "jsonrpc": PROTOCOL_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });

        if let Err(e) = self.conn.send(envelope.to_string()).await {
            self.pending.lock().await.remove(&id);
            return Err(RpcError::Transport(e));
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::ChannelClosed),
        }
    }

    /// Number of calls still waiting for a response.
    pub async fn pending_calls(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drain raw frames from the ledger socket until the sender side closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<String>) {
        while let Some(raw) = inbound.recv().await {
            self.handle_frame(&raw).await;
        }
    }

    /// Settle the pending call matching this response, if any. Unknown ids,
    /// missing ids, and unparseable payloads are dropped; nothing here may
    /// disturb other pending calls or the connection.
    pub async fn handle_frame(&self, raw: &str) {
        let msg: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("rpc: discarding unparseable frame: {e}");
                return;
            }
        };

        let Some(id) = msg.get("id").and_then(Value::as_u64) else {
            tracing::debug!("rpc: frame without usable id ignored");
            return;
        };

        let Some(tx) = self.pending.lock().await.remove(&id) else {
            tracing::debug!("rpc: no pending call for id {id}");
            return;
        };

        let outcome = match msg.get("error") {
            Some(err) => Err(RpcError::Remote(err.clone())),
            None => Ok(msg.get("result").cloned().unwrap_or(Value::Null)),
        };
        // The caller may have stopped awaiting; that only abandons this call.
        let _ = tx.send(outcome);
    }
}

#[async_trait]
impl RpcCall for RpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        RpcClient::call(self, method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn dead_client() -> Arc<RpcClient> {
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let conn = transport::connect(
            "test",
            "ws://127.0.0.1:9/never".into(),
            Duration::from_secs(60),
            inbound_tx,
        );
        RpcClient::new(conn)
    }

    #[tokio::test]
    async fn call_fails_fast_when_disconnected() {
        let client = dead_client();
        let err = client
            .call("ledger.applyEvolutionFrame", json!({}))
            .await
            .expect_err("must fail fast");
        assert!(matches!(err, RpcError::NotConnected));
        // The pending table was never touched.
        assert_eq!(client.pending_calls().await, 0);
    }

    #[tokio::test]
    async fn stray_frames_are_harmless() {
        let client = dead_client();
        client.handle_frame("{not json").await;
        client.handle_frame(r#"{"jsonrpc":"2.0","result":1}"#).await;
        client.handle_frame(r#"{"jsonrpc":"2.0","id":"abc","result":1}"#).await;
        client.handle_frame(r#"{"jsonrpc":"2.0","id":999,"result":1}"#).await;
        assert_eq!(client.pending_calls().await, 0);
    }
}
