use crate::library::Library;
use axum::extract::ws::Message;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

pub type SharedState = Arc<AppState>;

pub struct Peer {
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

/// A frame one peer sent, on its way to everybody else.
#[derive(Debug, Clone)]
pub struct RelayFrame {
    pub from: Uuid,
    pub message: Message,
}

pub struct AppState {
    // Connected peers by session id
    pub peers: DashMap<Uuid, Arc<Peer>>,
    // Fan-out of every frame received from any peer
    pub tx: broadcast::Sender<RelayFrame>,
    pub library: RwLock<Library>,
}

impl AppState {
    pub fn new(library: Library) -> SharedState {
        let (tx, _) = broadcast::channel(100);
        Arc::new(Self {
            peers: DashMap::new(),
            tx,
            library: RwLock::new(library),
        })
    }
}
