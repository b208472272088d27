// MIT License - Copyright (c) 2026 Peter Wright
// Write coordinator: serialized sends and ACK rendezvous

use std::io;

use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, error, warn};

use crate::error::{PanelError, Result};
use crate::protocol::Action;
use crate::transport::LineWriter;

/// The single ACK slot. The protocol carries no message id, so only one
/// frame may be waiting for its ACK at a time.
#[derive(Default)]
struct PendingAck {
    waiter: Option<oneshot::Sender<()>>,
    closed: bool,
}

/// Serializes all writes to the panel and pairs each with the next ACK.
pub struct CommandEngine {
    /// Exclusive section: held from write until ACK or timeout
    writer: Mutex<LineWriter>,
    pending: Mutex<PendingAck>,
    /// When the panel last sent anything
    last_response: Mutex<Instant>,
    ack_timeout: Duration,
}

impl CommandEngine {
    pub fn new(writer: LineWriter, ack_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(writer),
            pending: Mutex::new(PendingAck::default()),
            last_response: Mutex::new(Instant::now()),
            ack_timeout,
        }
    }

    /// Send an action and wait for the panel's ACK.
    pub async fn send_action(&self, action: &Action) -> Result<()> {
        let line = action.encode()?;
        self.send_line(&line, action.name()).await
    }

    /// Send the empty keepalive frame and wait for its ACK.
    pub async fn probe(&self) -> Result<()> {
        self.send_line("", "heartbeat").await
    }

    async fn send_line(&self, line: &str, label: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;

        let ack_rx = {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(PanelError::Disconnected);
            }
            let (tx, rx) = oneshot::channel();
            pending.waiter = Some(tx);
            rx
        };

        debug!("Sending {}: {}", label, line);
        let written = match timeout(self.ack_timeout, writer.write_line(line)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };
        if let Err(e) = written {
            error!("Failed to write {}: {}", label, e);
            self.pending.lock().await.waiter = None;
            return Err(PanelError::Io(e));
        }

        match timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(())) => {
                debug!("ACK received for {}", label);
                Ok(())
            }
            Ok(Err(_)) => {
                // Waiter dropped by teardown
                debug!("Session closed while {} awaited ACK", label);
                Err(PanelError::Disconnected)
            }
            Err(_) => {
                self.pending.lock().await.waiter = None;
                warn!("No ACK for {} within {:?}", label, self.ack_timeout);
                Err(PanelError::AckTimeout {
                    command: label.to_string(),
                })
            }
        }
    }

    /// Hand an inbound ACK to the waiting sender. Returns false when no
    /// send was waiting; the ACK is then dropped.
    pub async fn release_ack(&self) -> bool {
        match self.pending.lock().await.waiter.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Whether a send is currently waiting for its ACK.
    pub async fn is_awaiting_ack(&self) -> bool {
        self.pending.lock().await.waiter.is_some()
    }

    /// Record inbound traffic.
    pub async fn touch(&self) {
        *self.last_response.lock().await = Instant::now();
    }

    /// Time since the panel last sent anything.
    pub async fn silence(&self) -> Duration {
        self.last_response.lock().await.elapsed()
    }

    /// Refuse further sends and wake any pending one with `Disconnected`.
    pub async fn abort_pending(&self) {
        let mut pending = self.pending.lock().await;
        pending.closed = true;
        pending.waiter = None;
    }

    /// Abort pending sends and shut the socket's write side. Idempotent.
    pub async fn close(&self) {
        self.abort_pending().await;
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!("Error closing transport: {}", e);
        }
    }
}
