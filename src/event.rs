// MIT License - Copyright (c) 2026 Peter Wright
// Panel events

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::devices::{Partition, PartitionStatus, Zone, ZoneActive};

/// Alarm category of an `ALARM` event. The panel sends an empty string
/// when the alarm has no specific category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmType {
    #[serde(rename = "")]
    None,
    Police,
    Fire,
    Auxiliary,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    #[serde(default)]
    pub alarm_type: AlarmType,
    pub partition_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmingEvent {
    pub arming_type: PartitionStatus,
    pub partition_id: u32,
    /// Entry/exit delay in seconds, present on delay transitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error_type: String,
    pub partition_id: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryInfo {
    pub partition_list: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureArmInfo {
    pub partition_id: u32,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneActiveEvent {
    pub zone: ZoneActive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpdateEvent {
    pub zone: Zone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAddEvent {
    pub zone: Zone,
}

/// A decoded notification pushed by the panel.
///
/// The variant set is closed: frames whose discriminators don't map onto
/// one of these are dropped by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Alarm(AlarmEvent),
    Arming(ArmingEvent),
    Error(ErrorEvent),
    Summary(SummaryInfo),
    SecureArm(SecureArmInfo),
    ZoneActive(ZoneActiveEvent),
    ZoneUpdate(ZoneUpdateEvent),
    ZoneAdd(ZoneAddEvent),
}

impl Event {
    /// Short upper-case name, used as the MQTT `op` and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Alarm(_) => "ALARM",
            Self::Arming(_) => "ARMING",
            Self::Error(_) => "ERROR",
            Self::Summary(_) => "SUMMARY",
            Self::SecureArm(_) => "SECURE_ARM",
            Self::ZoneActive(_) => "ZONE_ACTIVE",
            Self::ZoneUpdate(_) => "ZONE_UPDATE",
            Self::ZoneAdd(_) => "ZONE_ADD",
        }
    }

    /// Partition the event concerns, if it concerns exactly one.
    pub fn partition_id(&self) -> Option<u32> {
        match self {
            Self::Alarm(e) => Some(e.partition_id),
            Self::Arming(e) => Some(e.partition_id),
            Self::Error(e) => Some(e.partition_id),
            Self::SecureArm(e) => Some(e.partition_id),
            Self::ZoneUpdate(e) => Some(e.zone.partition_id),
            Self::ZoneAdd(e) => Some(e.zone.partition_id),
            Self::Summary(_) | Self::ZoneActive(_) => None,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Requested,
    /// The panel closed the connection (EOF)
    ConnectionClosed,
    /// Reading from the socket failed
    ReadFailed { details: String },
    /// Nothing was received for longer than heartbeat + grace
    HeartbeatExpired { silent_for: Duration },
    /// The heartbeat probe was not acknowledged
    HeartbeatFailed { details: String },
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "disconnect requested"),
            Self::ConnectionClosed => write!(f, "connection closed by panel"),
            Self::ReadFailed { details } => write!(f, "read failed: {}", details),
            Self::HeartbeatExpired { silent_for } => {
                write!(f, "no data from panel for {:.1}s", silent_for.as_secs_f64())
            }
            Self::HeartbeatFailed { details } => write!(f, "heartbeat failed: {}", details),
        }
    }
}

/// Everything a `ChannelListener` forwards.
///
/// Users subscribe via `client.subscribe_events()` to receive a
/// `tokio::sync::broadcast::Receiver<ClientEvent>`.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Panel(Event),
    Disconnected(DisconnectReason),
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<ClientEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<ClientEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
