// MIT License - Copyright (c) 2026 Peter Wright
// Panel client: session lifecycle, sends and listener management

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{ClientConfig, DisconnectedSendPolicy};
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::{PanelError, Result};
use crate::event::{DisconnectReason, EventReceiver, EventSender, event_channel};
use crate::heartbeat;
use crate::listener::{ChannelListener, ListenerRegistry, PanelListener};
use crate::protocol::Action;
use crate::transport::command::CommandEngine;
use crate::transport::{BoxedIo, PanelIo, reader, split_lines, tls};

/// One live connection and the tasks serving it.
struct Session {
    id: u64,
    engine: Arc<CommandEngine>,
    shutdown_tx: watch::Sender<bool>,
    reader_handle: JoinHandle<()>,
    heartbeat_handle: JoinHandle<()>,
}

impl Session {
    /// Stop both tasks and close the socket.
    async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        self.engine.close().await;
    }
}

/// What a session task needs to reach its session.
#[derive(Clone)]
pub(crate) struct SessionLink {
    pub(crate) id: u64,
    pub(crate) engine: Arc<CommandEngine>,
    pub(crate) client: Weak<ClientInner>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl SessionLink {
    /// End the session after a fatal transport condition.
    pub(crate) async fn teardown(&self, reason: DisconnectReason) {
        match self.client.upgrade() {
            Some(inner) => inner.teardown(self.id, &self.engine, reason).await,
            None => self.engine.close().await,
        }
    }
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    /// Holds the live session, if any. Connect and disconnect run under
    /// this lock; a session leaves it exactly once.
    session: Mutex<Option<Session>>,
    connected: AtomicBool,
    listeners: Arc<ListenerRegistry>,
    event_tx: EventSender,
    next_session_id: AtomicU64,
}

impl ClientInner {
    async fn teardown(&self, session_id: u64, engine: &CommandEngine, reason: DisconnectReason) {
        // Wake any blocked sender before contending for the session lock
        engine.abort_pending().await;

        let removed = {
            let mut slot = self.session.lock().await;
            if slot.as_ref().is_some_and(|s| s.id == session_id) {
                self.connected.store(false, Ordering::SeqCst);
                slot.take()
            } else {
                None
            }
        };

        match removed {
            Some(session) => {
                warn!("Panel session ended: {}", reason);
                session.close().await;
                self.listeners.notify_disconnected(&reason);
            }
            None => {
                debug!("Session {} already closed ({})", session_id, reason);
                engine.close().await;
            }
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.shutdown_tx.send(true);
            session.reader_handle.abort();
            session.heartbeat_handle.abort();
        }
    }
}

/// Client for a Qolsys IQ panel's local control protocol.
///
/// Cheap to clone; clones share one session and one set of listeners.
///
/// Lifecycle:
/// 1. [`connect`](Self::connect) opens TLS, starts the read loop, checks
///    that the panel ACKs an empty probe, then starts the heartbeat.
/// 2. [`send`](Self::send) writes one action and waits for its ACK. Sends
///    from any number of tasks are serialized; at most one is in flight.
/// 3. EOF, a read error, or a failed heartbeat ends the session and every
///    listener's `disconnected` runs once. Reconnecting is up to the caller.
#[derive(Clone)]
pub struct PanelClient {
    inner: Arc<ClientInner>,
}

impl PanelClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, _) = event_channel(EVENT_CHANNEL_CAPACITY);
        let listeners = Arc::new(ListenerRegistry::new());
        listeners.subscribe(Arc::new(ChannelListener::new(event_tx.clone())));
        Self {
            inner: Arc::new(ClientInner {
                config,
                session: Mutex::new(None),
                connected: AtomicBool::new(false),
                listeners,
                event_tx,
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Whether a session is currently live.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Connect to the configured panel. A no-op if already connected.
    pub async fn connect(&self) -> Result<()> {
        self.inner.config.validate()?;
        let mut slot = self.inner.session.lock().await;
        if slot.is_some() {
            debug!("Already connected; ignoring connect");
            return Ok(());
        }
        let stream = tls::open(&self.inner.config).await?;
        self.install(&mut slot, Box::new(stream)).await
    }

    /// Start a session over an already-established stream.
    ///
    /// Behaves like [`connect`](Self::connect) minus the TCP and TLS
    /// steps; used for tunnels and tests.
    pub async fn connect_with<S: PanelIo>(&self, stream: S) -> Result<()> {
        self.inner.config.validate()?;
        let mut slot = self.inner.session.lock().await;
        if slot.is_some() {
            debug!("Already connected; ignoring connect");
            return Ok(());
        }
        self.install(&mut slot, Box::new(stream)).await
    }

    async fn install(&self, slot: &mut Option<Session>, stream: BoxedIo) -> Result<()> {
        let session = self.start_session(stream).await?;
        info!("Connected to panel (session {})", session.id);
        *slot = Some(session);
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn start_session(&self, stream: BoxedIo) -> Result<Session> {
        let config = &self.inner.config;
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("panel", name = %config.name, session = id);

        let (lines, writer) = split_lines(stream);
        let engine = Arc::new(CommandEngine::new(writer, config.ack_timeout()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let link = SessionLink {
            id,
            engine: engine.clone(),
            client: Arc::downgrade(&self.inner),
            shutdown: shutdown_rx,
        };

        let reader_handle = spawn_on(
            config.runtime.as_ref(),
            reader::run(lines, link.clone(), self.inner.listeners.clone()).instrument(span.clone()),
        );

        // The panel must ACK an empty frame before the session counts as up
        if let Err(e) = engine.probe().instrument(span.clone()).await {
            warn!("Panel did not acknowledge the initial probe: {}", e);
            let _ = shutdown_tx.send(true);
            engine.close().await;
            return Err(e);
        }

        let heartbeat_handle = spawn_on(
            config.runtime.as_ref(),
            heartbeat::run(link, config.heartbeat_interval()).instrument(span),
        );

        Ok(Session {
            id,
            engine,
            shutdown_tx,
            reader_handle,
            heartbeat_handle,
        })
    }

    /// Close the session, if any. Listeners are told once, with
    /// [`DisconnectReason::Requested`].
    pub async fn disconnect(&self) {
        let removed = {
            let mut slot = self.inner.session.lock().await;
            self.inner.connected.store(false, Ordering::SeqCst);
            slot.take()
        };
        match removed {
            Some(session) => {
                info!("Disconnecting from panel (session {})", session.id);
                session.close().await;
                self.inner
                    .listeners
                    .notify_disconnected(&DisconnectReason::Requested);
            }
            None => debug!("Not connected; ignoring disconnect"),
        }
    }

    /// Send an action and wait for the panel's ACK.
    ///
    /// With no live session nothing is written; the result then depends on
    /// the configured [`DisconnectedSendPolicy`]. An ACK timeout is
    /// returned to the caller and leaves the session up.
    pub async fn send(&self, action: &Action) -> Result<()> {
        let engine = self
            .inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.engine.clone());

        let Some(engine) = engine else {
            return match self.inner.config.disconnected_send {
                DisconnectedSendPolicy::Reject => Err(PanelError::NotConnected),
                DisconnectedSendPolicy::Drop => {
                    debug!("Not connected; dropping {}", action.name());
                    Ok(())
                }
            };
        };
        engine.send_action(action).await
    }

    /// Register a listener for panel events and disconnects.
    pub fn subscribe(&self, listener: Arc<dyn PanelListener>) {
        self.inner.listeners.subscribe(listener);
    }

    /// Remove a listener. Returns false if it wasn't registered.
    pub fn unsubscribe(&self, listener: &Arc<dyn PanelListener>) -> bool {
        self.inner.listeners.unsubscribe(listener)
    }

    /// Receive events and disconnects on a broadcast channel.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.inner.event_tx.subscribe()
    }
}

fn spawn_on<F>(runtime: Option<&Handle>, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    match runtime {
        Some(handle) => handle.spawn(future),
        None => tokio::spawn(future),
    }
}
