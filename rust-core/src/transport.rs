//! Websocket connection to the relay.
//!
//! One [`TransportChannel`] per view. The connection task is spawned on the
//! first call to [`TransportChannel::outbound`] or
//! [`TransportChannel::inbound`] and lives until [`TransportChannel::shutdown`]
//! or drop. Lost connections are re-established with exponential backoff.
//! Delivery is best effort: only messages submitted while the very first
//! connect is in flight wait for it. Anything submitted after a connect has
//! failed or a connection was lost is discarded, never resent.

use crate::backoff::Backoff;
use crate::codec;
use crate::messages::SyncMessage;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

/// A raw frame received from the relay. Content is not interpreted here.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TransportChannel {
    url: Url,
    backoff: Backoff,
    connection: Option<Connection>,
}

struct Connection {
    outbound: mpsc::UnboundedSender<SyncMessage>,
    inbound: Option<mpsc::UnboundedReceiver<Frame>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TransportChannel {
    pub fn new(url: Url, backoff: Backoff) -> Self {
        Self {
            url,
            backoff,
            connection: None,
        }
    }

    pub fn parse(url: &str, backoff: Backoff) -> Result<Self, TransportError> {
        Ok(Self::new(Url::parse(url)?, backoff))
    }

    pub fn is_started(&self) -> bool {
        self.connection.is_some()
    }

    /// Sender for messages to broadcast to the other peers.
    pub fn outbound(&mut self) -> mpsc::UnboundedSender<SyncMessage> {
        self.connection().outbound.clone()
    }

    /// Frames received from the relay. There is a single subscriber; later
    /// calls return `None`.
    pub fn inbound(&mut self) -> Option<mpsc::UnboundedReceiver<Frame>> {
        self.connection().inbound.take()
    }

    /// Close the connection and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(conn) = self.connection.take() {
            let _ = conn.shutdown.send(true);
            let _ = conn.task.await;
        }
    }

    fn connection(&mut self) -> &mut Connection {
        let url = &self.url;
        let backoff = self.backoff;
        self.connection
            .get_or_insert_with(|| Connection::spawn(url.clone(), backoff))
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.task.abort();
        }
    }
}

impl Connection {
    fn spawn(url: Url, backoff: Backoff) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        debug!(%url, "starting relay connection");
        let task = tokio::spawn(run_connection(url, backoff, outbound_rx, inbound_tx, shutdown_rx));
        Self {
            outbound,
            inbound: Some(inbound),
            shutdown,
            task,
        }
    }
}

enum PumpExit {
    Shutdown,
    Closed,
}

async fn run_connection(
    url: Url,
    backoff: Backoff,
    mut outbound_rx: mpsc::UnboundedReceiver<SyncMessage>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;

    loop {
        let connected = tokio::select! {
            res = connect_async(url.as_str()) => res,
            _ = shutdown.changed() => return,
        };

        match connected {
            Ok((socket, _)) => {
                info!(%url, "connected to relay");
                // Only the very first attempt may flush what was queued
                // while it was in flight.
                if attempt > 0 {
                    discard_queued(&mut outbound_rx);
                }
                attempt = 0;
                match pump(socket, &mut outbound_rx, &inbound_tx, &mut shutdown).await {
                    Ok(PumpExit::Shutdown) => return,
                    Ok(PumpExit::Closed) => info!("relay closed the connection"),
                    Err(e) => warn!(error = %e, "relay connection lost"),
                }
            }
            Err(e) => {
                warn!(error = %e, attempt, "failed to connect to relay");
                discard_queued(&mut outbound_rx);
            }
        }

        let delay = backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!("reconnecting in {:?}", delay);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = shutdown.changed() => return,
                msg = outbound_rx.recv() => match msg {
                    Some(msg) => warn!(video_id = %msg.video_id, "not connected; message dropped"),
                    None => return,
                },
            }
        }
    }
}

async fn pump(
    socket: Socket,
    outbound_rx: &mut mpsc::UnboundedReceiver<SyncMessage>,
    inbound_tx: &mpsc::UnboundedSender<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<PumpExit, TransportError> {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(PumpExit::Shutdown);
            }
            msg = outbound_rx.recv() => match msg {
                Some(msg) => {
                    let text = codec::encode(&msg);
                    trace!(%text, "sending frame");
                    write.send(Message::Text(text)).await?;
                }
                None => return Ok(PumpExit::Shutdown),
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => deliver(inbound_tx, Frame::Text(text)),
                Some(Ok(Message::Binary(bytes))) => deliver(inbound_tx, Frame::Binary(bytes)),
                Some(Ok(Message::Close(_))) | None => return Ok(PumpExit::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

fn deliver(inbound_tx: &mpsc::UnboundedSender<Frame>, frame: Frame) {
    if inbound_tx.send(frame).is_err() {
        trace!("no subscriber; inbound frame dropped");
    }
}

fn discard_queued(outbound_rx: &mut mpsc::UnboundedReceiver<SyncMessage>) {
    let mut dropped = 0;
    while outbound_rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "discarded messages queued while disconnected");
    }
}
