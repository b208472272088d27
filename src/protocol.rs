// MIT License - Copyright (c) 2026 Peter Wright
// Wire codec: inbound events, outbound actions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::{
    ACK, ACTION_SOURCE, ACTION_VERSION, EVENT_FIELD, INFO_TYPE_FIELD, ZONE_EVENT_TYPE_FIELD,
};
use crate::error::Result;
use crate::event::{
    AlarmEvent, ArmingEvent, ErrorEvent, Event, SecureArmInfo, SummaryInfo, ZoneActiveEvent,
    ZoneAddEvent, ZoneUpdateEvent,
};

/// Arming commands accepted by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmingType {
    ArmAway,
    ArmStay,
    Disarm,
}

/// Alarms that can be raised from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmCommandType {
    Police,
    Fire,
    Auxiliary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfoType {
    Summary,
}

/// The type-specific part of an outbound action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Info {
        info_type: InfoType,
    },
    Arming {
        arming_type: ArmingType,
        partition_id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        usercode: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delay: Option<u32>,
    },
    Alarm {
        alarm_type: AlarmCommandType,
        partition_id: u32,
    },
}

impl Command {
    /// Name of the action, used in logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Info { .. } => "INFO",
            Self::Arming { .. } => "ARMING",
            Self::Alarm { .. } => "ALARM",
        }
    }
}

/// An outbound command, envelope included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    #[serde(flatten)]
    pub command: Command,
    pub nonce: String,
    pub source: String,
    pub version: u32,
    pub token: String,
}

impl Action {
    pub fn new(command: Command, token: impl Into<String>) -> Self {
        Self {
            command,
            nonce: String::new(),
            source: ACTION_SOURCE.to_string(),
            version: ACTION_VERSION,
            token: token.into(),
        }
    }

    /// Ask the panel for a full partition and zone summary.
    pub fn summary(token: impl Into<String>) -> Self {
        Self::new(
            Command::Info {
                info_type: InfoType::Summary,
            },
            token,
        )
    }

    pub fn arming(
        token: impl Into<String>,
        arming_type: ArmingType,
        partition_id: u32,
        usercode: Option<String>,
    ) -> Self {
        Self::new(
            Command::Arming {
                arming_type,
                partition_id,
                usercode,
                delay: None,
            },
            token,
        )
    }

    pub fn alarm(token: impl Into<String>, alarm_type: AlarmCommandType, partition_id: u32) -> Self {
        Self::new(
            Command::Alarm {
                alarm_type,
                partition_id,
            },
            token,
        )
    }

    /// Override the entry/exit delay of an arming action. No effect on
    /// other actions.
    pub fn with_delay(mut self, seconds: u32) -> Self {
        if let Command::Arming { delay, .. } = &mut self.command {
            *delay = Some(seconds);
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.command.name()
    }

    /// Serialize to a single wire line (without the trailing newline).
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whether an inbound line is the panel's acknowledgement.
pub fn is_ack(line: &str) -> bool {
    line.trim() == ACK
}

/// Decode one inbound line into an event.
///
/// Returns `None` for anything that isn't a recognised event: invalid JSON,
/// a missing or unknown discriminator, or a payload that doesn't fit the
/// variant. These are logged and never fatal to the session.
pub fn decode(line: &str) -> Option<Event> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("Dropping unparseable frame ({}): {}", e, line);
            return None;
        }
    };

    let Some(event_type) = value.get(EVENT_FIELD).and_then(Value::as_str) else {
        warn!("Dropping frame without '{}' field: {}", EVENT_FIELD, line);
        return None;
    };

    let decoded = match event_type {
        "ALARM" => AlarmEvent::deserialize(&value).map(Event::Alarm),
        "ARMING" => ArmingEvent::deserialize(&value).map(Event::Arming),
        "ERROR" => ErrorEvent::deserialize(&value).map(Event::Error),
        "INFO" => match value.get(INFO_TYPE_FIELD).and_then(Value::as_str) {
            Some("SUMMARY") => SummaryInfo::deserialize(&value).map(Event::Summary),
            Some("SECURE_ARM") => SecureArmInfo::deserialize(&value).map(Event::SecureArm),
            other => {
                debug!("Ignoring INFO frame with info_type {:?}", other);
                return None;
            }
        },
        "ZONE_EVENT" => match value.get(ZONE_EVENT_TYPE_FIELD).and_then(Value::as_str) {
            Some("ZONE_ACTIVE") => ZoneActiveEvent::deserialize(&value).map(Event::ZoneActive),
            Some("ZONE_UPDATE") => ZoneUpdateEvent::deserialize(&value).map(Event::ZoneUpdate),
            Some("ZONE_ADD") => ZoneAddEvent::deserialize(&value).map(Event::ZoneAdd),
            other => {
                debug!("Ignoring ZONE_EVENT frame with zone_event_type {:?}", other);
                return None;
            }
        },
        other => {
            debug!("Ignoring unknown event type {}", other);
            return None;
        }
    };

    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping malformed {} frame ({}): {}", event_type, e, line);
            None
        }
    }
}

/// The panel-side wire form of an event, discriminators included.
pub fn encode_event_value(event: &Event) -> Result<Value> {
    let (payload, event_type, sub_type) = match event {
        Event::Alarm(e) => (serde_json::to_value(e)?, "ALARM", None),
        Event::Arming(e) => (serde_json::to_value(e)?, "ARMING", None),
        Event::Error(e) => (serde_json::to_value(e)?, "ERROR", None),
        Event::Summary(e) => (
            serde_json::to_value(e)?,
            "INFO",
            Some((INFO_TYPE_FIELD, "SUMMARY")),
        ),
        Event::SecureArm(e) => (
            serde_json::to_value(e)?,
            "INFO",
            Some((INFO_TYPE_FIELD, "SECURE_ARM")),
        ),
        Event::ZoneActive(e) => (
            serde_json::to_value(e)?,
            "ZONE_EVENT",
            Some((ZONE_EVENT_TYPE_FIELD, "ZONE_ACTIVE")),
        ),
        Event::ZoneUpdate(e) => (
            serde_json::to_value(e)?,
            "ZONE_EVENT",
            Some((ZONE_EVENT_TYPE_FIELD, "ZONE_UPDATE")),
        ),
        Event::ZoneAdd(e) => (
            serde_json::to_value(e)?,
            "ZONE_EVENT",
            Some((ZONE_EVENT_TYPE_FIELD, "ZONE_ADD")),
        ),
    };

    let mut frame = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    frame.insert(EVENT_FIELD.to_string(), Value::from(event_type));
    if let Some((field, value)) = sub_type {
        frame.insert(field.to_string(), Value::from(value));
    }
    Ok(Value::Object(frame))
}

/// `encode_event_value` rendered as a wire line.
pub fn encode_event(event: &Event) -> Result<String> {
    Ok(encode_event_value(event)?.to_string())
}
