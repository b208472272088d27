// MIT License - Copyright (c) 2026 Peter Wright
// Read loop: the single consumer of inbound lines

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::client::SessionLink;
use crate::event::DisconnectReason;
use crate::listener::ListenerRegistry;
use crate::protocol::{decode, is_ack};
use crate::transport::{Frame, LineReader};

/// Run the read loop for one session, then tear the session down if the
/// loop ended on a transport failure.
pub(crate) async fn run(reader: LineReader, link: SessionLink, listeners: Arc<ListenerRegistry>) {
    if let Some(reason) = read_loop(reader, &link, &listeners).await {
        link.teardown(reason).await;
    }
}

/// Consume lines until EOF, a read error, or shutdown.
///
/// Returns the fatal condition, or `None` when shut down from outside.
pub(crate) async fn read_loop(
    mut reader: LineReader,
    link: &SessionLink,
    listeners: &ListenerRegistry,
) -> Option<DisconnectReason> {
    let mut shutdown = link.shutdown.clone();
    loop {
        tokio::select! {
            frame = reader.next_line() => match frame {
                Ok(Some(Frame::Line(line))) => {
                    link.engine.touch().await;
                    if is_ack(&line) {
                        if !link.engine.release_ack().await {
                            debug!("Reader: ACK with no pending send");
                        }
                    } else if line.trim().is_empty() {
                        trace!("Reader: blank line");
                    } else if let Some(event) = decode(&line) {
                        debug!("Reader: {} event", event.name());
                        listeners.dispatch(&event);
                    }
                }
                Ok(Some(Frame::NotUtf8)) => {
                    link.engine.touch().await;
                    warn!("Reader: discarding line that is not UTF-8");
                }
                Ok(Some(Frame::Oversized)) => {
                    link.engine.touch().await;
                    warn!("Reader: discarding oversized line");
                }
                Ok(None) => {
                    info!("Reader: connection closed by panel");
                    return Some(DisconnectReason::ConnectionClosed);
                }
                Err(e) => {
                    error!("Reader: read error: {}", e);
                    return Some(DisconnectReason::ReadFailed {
                        details: e.to_string(),
                    });
                }
            },
            _ = shutdown.changed() => {
                debug!("Reader: shutting down");
                return None;
            }
        }
    }
}
