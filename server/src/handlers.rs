use crate::app_state::{Peer, RelayFrame, SharedState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    tracing::info!("Client connecting: {}", addr);
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Relay loop for one peer: whatever it sends goes to every other peer
/// unchanged, and whatever the others send comes back down its socket.
pub async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: SharedState) {
    let session_id = Uuid::new_v4();

    // Subscribe before registering so a registered peer never misses a frame
    let mut rx = state.tx.subscribe();
    state.peers.insert(
        session_id,
        Arc::new(Peer {
            addr,
            connected_at: Instant::now(),
        }),
    );
    tracing::info!("Peer joined: {} ({}), {} connected", session_id, addr, state.peers.len());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // 1. Frames from the other peers
            relayed = rx.recv() => match relayed {
                Ok(frame) if frame.from == session_id => {}
                Ok(frame) => {
                    if sender.send(frame.message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Peer {} lagged, {} frames skipped", session_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },

            // 2. Frames from this peer
            incoming = receiver.next() => match incoming {
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    tracing::trace!("Relaying frame from {}", session_id);
                    let _ = state.tx.send(RelayFrame { from: session_id, message });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!("Socket error from {}: {}", session_id, err);
                    break;
                }
            },
        }
    }

    if let Some((_, peer)) = state.peers.remove(&session_id) {
        tracing::info!(
            "Peer left: {} after {:?}",
            session_id,
            peer.connected_at.elapsed()
        );
    }
}
