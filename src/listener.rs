// MIT License - Copyright (c) 2026 Peter Wright
// Listener registry and event fan-out

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::event::{
    AlarmEvent, ArmingEvent, ClientEvent, DisconnectReason, ErrorEvent, Event, EventSender,
    SecureArmInfo, SummaryInfo, ZoneActiveEvent, ZoneAddEvent, ZoneUpdateEvent,
};

/// Callbacks for panel events. Every method defaults to doing nothing, so
/// implementors only override what they care about.
///
/// Callbacks run on the client's read task and should return quickly;
/// hand long work off to a channel or another task.
pub trait PanelListener: Send + Sync {
    fn alarm_event(&self, _event: &AlarmEvent) {}

    fn arming_event(&self, _event: &ArmingEvent) {}

    fn error_event(&self, _event: &ErrorEvent) {}

    fn summary_info_event(&self, _event: &SummaryInfo) {}

    fn secure_arm_info_event(&self, _event: &SecureArmInfo) {}

    fn zone_active_event(&self, _event: &ZoneActiveEvent) {}

    fn zone_update_event(&self, _event: &ZoneUpdateEvent) {}

    fn zone_add_event(&self, _event: &ZoneAddEvent) {}

    /// The session ended. Called once per session.
    fn disconnected(&self, _reason: &DisconnectReason) {}
}

/// Thread-safe set of listeners.
///
/// Dispatch works on a snapshot, so listeners may subscribe or unsubscribe
/// (including from inside a callback) while an event is being delivered.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn PanelListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same listener twice is a no-op.
    pub fn subscribe(&self, listener: Arc<dyn PanelListener>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener. Returns false if it wasn't registered.
    pub fn unsubscribe(&self, listener: &Arc<dyn PanelListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn PanelListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deliver an event to every current listener.
    pub fn dispatch(&self, event: &Event) {
        let listeners = self.snapshot();
        trace!("Dispatching {} to {} listeners", event.name(), listeners.len());
        for listener in &listeners {
            match event {
                Event::Alarm(e) => listener.alarm_event(e),
                Event::Arming(e) => listener.arming_event(e),
                Event::Error(e) => listener.error_event(e),
                Event::Summary(e) => listener.summary_info_event(e),
                Event::SecureArm(e) => listener.secure_arm_info_event(e),
                Event::ZoneActive(e) => listener.zone_active_event(e),
                Event::ZoneUpdate(e) => listener.zone_update_event(e),
                Event::ZoneAdd(e) => listener.zone_add_event(e),
            }
        }
    }

    /// Tell every current listener the session is gone. The caller
    /// guarantees this runs once per session.
    pub fn notify_disconnected(&self, reason: &DisconnectReason) {
        let listeners = self.snapshot();
        debug!("Notifying {} listeners of disconnect: {}", listeners.len(), reason);
        for listener in &listeners {
            listener.disconnected(reason);
        }
    }
}

/// Compare by allocation, ignoring vtable pointers.
fn same_listener(a: &Arc<dyn PanelListener>, b: &Arc<dyn PanelListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Forwards callbacks onto a broadcast channel for async consumers.
pub struct ChannelListener {
    tx: EventSender,
}

impl ChannelListener {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }

    fn forward(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

impl PanelListener for ChannelListener {
    fn alarm_event(&self, event: &AlarmEvent) {
        self.forward(ClientEvent::Panel(Event::Alarm(event.clone())));
    }

    fn arming_event(&self, event: &ArmingEvent) {
        self.forward(ClientEvent::Panel(Event::Arming(event.clone())));
    }

    fn error_event(&self, event: &ErrorEvent) {
        self.forward(ClientEvent::Panel(Event::Error(event.clone())));
    }

    fn summary_info_event(&self, event: &SummaryInfo) {
        self.forward(ClientEvent::Panel(Event::Summary(event.clone())));
    }

    fn secure_arm_info_event(&self, event: &SecureArmInfo) {
        self.forward(ClientEvent::Panel(Event::SecureArm(event.clone())));
    }

    fn zone_active_event(&self, event: &ZoneActiveEvent) {
        self.forward(ClientEvent::Panel(Event::ZoneActive(event.clone())));
    }

    fn zone_update_event(&self, event: &ZoneUpdateEvent) {
        self.forward(ClientEvent::Panel(Event::ZoneUpdate(event.clone())));
    }

    fn zone_add_event(&self, event: &ZoneAddEvent) {
        self.forward(ClientEvent::Panel(Event::ZoneAdd(event.clone())));
    }

    fn disconnected(&self, reason: &DisconnectReason) {
        self.forward(ClientEvent::Disconnected(reason.clone()));
    }
}
