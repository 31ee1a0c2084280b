//! Best-effort fan-out of normalized readings to remote listeners.
//!
//! The acquisition loop hands each line to a bounded broadcast channel and
//! never waits. Listeners that fall behind lose the oldest lines; listeners
//! that disconnect are dropped.

use std::io;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};

/// Sending half of the live reading feed.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: broadcast::Sender<Arc<str>>,
}

impl Publisher {
    /// `capacity` lines are buffered per listener before the oldest drop.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Queue a line for every listener. Returns how many listeners it
    /// reached; zero is not an error.
    pub fn publish(&self, line: impl Into<Arc<str>>) -> usize {
        self.tx.send(line.into()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Comma-separated percentages in channel order, one decimal each.
pub fn format_readings(percentages: &[f64]) -> String {
    percentages
        .iter()
        .map(|p| format!("{p:.1}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Accept TCP listeners forever, streaming every published line to each.
pub async fn serve(listener: TcpListener, publisher: Publisher) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Listener connected: {peer}");
        let rx = publisher.subscribe();
        tokio::spawn(async move {
            match forward(stream, rx).await {
                Ok(()) => info!("Listener {peer} finished"),
                Err(e) => debug!("Listener {peer} dropped: {e}"),
            }
        });
    }
}

async fn forward(mut stream: TcpStream, mut rx: broadcast::Receiver<Arc<str>>) -> io::Result<()> {
    loop {
        match rx.recv().await {
            Ok(line) => {
                stream.write_all(line.as_bytes()).await?;
                stream.write_all(b"\n").await?;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Listener fell behind, skipped {skipped} readings");
            }
            Err(RecvError::Closed) => return stream.shutdown().await,
        }
    }
}
