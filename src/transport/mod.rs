use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle. `Open` is the only state in which sends are queued;
/// everything else fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnState {
    Connecting,
    Open,
    Closed,
}

struct OutboundFrame {
    text: String,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// Why one WebSocket session ended.
enum SessionEnd {
    /// Every handle was dropped; the supervision task should exit.
    HandleDropped,
    /// Peer closed or the stream errored; reconnect after the fixed delay.
    PeerClosed,
    /// A queued frame failed at the socket; reconnect after the fixed delay.
    SendFailed,
}

/// Cloneable handle to one supervised connection. Dropping every clone shuts
/// the connection task down.
#[derive(Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<OutboundFrame>,
    state: watch::Receiver<ConnState>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnState::Open
    }

    /// Transmit one raw text frame. Fails immediately with `NotConnected`
    /// when the connection is not `Open`; otherwise reports the result of the
    /// actual socket send.
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send(OutboundFrame { text, ack: ack_tx })
            .await
            .map_err(|_| TransportError::NotConnected)?;
        ack_rx.await.map_err(|_| TransportError::NotConnected)?
    }

    /// Wait until the connection reports `Open`. Returns `false` if the
    /// supervision task has exited instead.
    pub async fn wait_open(&self) -> bool {
        let mut state = self.state.clone();
        loop {
            if *state.borrow() == ConnState::Open {
                return true;
            }
            if state.changed().await.is_err() {
                return false;
            }
        }
    }
}

/// Open a supervised connection to `url`. Inbound text frames are delivered
/// to `inbound` in receipt order; the task reconnects after `reconnect_delay`
/// on every loss, indefinitely.
pub fn connect(
    name: &str,
    url: String,
    reconnect_delay: Duration,
    inbound: mpsc::Sender<String>,
) -> ConnectionHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (state_tx, state_rx) = watch::channel(ConnState::Connecting);

    tokio::spawn(supervise(
        name.to_string(),
        url,
        reconnect_delay,
        outbound_rx,
        inbound,
        state_tx,
    ));

    ConnectionHandle {
        outbound: outbound_tx,
        state: state_rx,
    }
}

async fn supervise(
    name: String,
    url: String,
    reconnect_delay: Duration,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    inbound: mpsc::Sender<String>,
    state: watch::Sender<ConnState>,
) {
    loop {
        let _ = state.send(ConnState::Connecting);

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                // Frames queued while the previous session died are stale;
                // reject them rather than replaying on the fresh socket.
                reject_queued(&mut outbound);

                tracing::info!("{name}: connected");
                let _ = state.send(ConnState::Open);

                match session(ws, &mut outbound, &inbound).await {
                    SessionEnd::HandleDropped => break,
                    SessionEnd::PeerClosed | SessionEnd::SendFailed => {
                        tracing::warn!(
                            "{name}: connection lost, retrying in {}s",
                            reconnect_delay.as_secs()
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "{name}: connect failed: {e}, retrying in {}s",
                    reconnect_delay.as_secs()
                );
            }
        }

        let _ = state.send(ConnState::Closed);
        if !idle(&mut outbound, reconnect_delay).await {
            break;
        }
    }

    let _ = state.send(ConnState::Closed);
    tracing::debug!("{name}: connection task exiting");
}

async fn session(
    ws: WsStream,
    outbound: &mut mpsc::Receiver<OutboundFrame>,
    inbound: &mpsc::Sender<String>,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return SessionEnd::HandleDropped;
                };
                match write.send(Message::Text(frame.text.into())).await {
                    Ok(()) => {
                        let _ = frame.ack.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = frame.ack.send(Err(TransportError::SendFailed(e.to_string())));
                        return SessionEnd::SendFailed;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(text.to_string()).await.is_err() {
                            return SessionEnd::HandleDropped;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return SessionEnd::PeerClosed;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::PeerClosed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("read error: {e}");
                        return SessionEnd::PeerClosed;
                    }
                }
            }
        }
    }
}

/// Wait out the reconnect delay while rejecting sends attempted in the gap.
/// Returns `false` once every handle has been dropped.
async fn idle(outbound: &mut mpsc::Receiver<OutboundFrame>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return true,
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        let _ = frame.ack.send(Err(TransportError::NotConnected));
                    }
                    None => return false,
                }
            }
        }
    }
}

fn reject_queued(outbound: &mut mpsc::Receiver<OutboundFrame>) {
    while let Ok(frame) = outbound.try_recv() {
        let _ = frame.ack.send(Err(TransportError::NotConnected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_fast_while_not_open() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        // Nothing listens on this port; the connection never reaches Open.
        let handle = connect(
            "test",
            "ws://127.0.0.1:9/never".into(),
            Duration::from_secs(60),
            inbound_tx,
        );

        assert!(!handle.is_open());
        let err = handle.send("{}".into()).await.expect_err("must fail fast");
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn task_exits_once_every_handle_is_dropped() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let handle = connect(
            "test",
            "ws://127.0.0.1:9/never".into(),
            Duration::from_millis(10),
            inbound_tx,
        );

        // Keep only the state watch; dropping the handle drops the last
        // outbound sender, which stops the task at its next idle window.
        let mut state = handle.state.clone();
        drop(handle);

        tokio::time::timeout(Duration::from_secs(2), async {
            while state.changed().await.is_ok() {}
        })
        .await
        .expect("task should exit after handles drop");
    }
}
