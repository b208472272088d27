// MIT License - Copyright (c) 2026 Peter Wright
// Zone payloads

use serde::{Deserialize, Serialize};

/// Zone status as reported by the panel.
///
/// Wire strings are capitalised words (`"Open"`, `"Closed"`, ...). Anything
/// the panel adds in later firmware decodes to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ZoneStatus {
    Active,
    Closed,
    Open,
    Inactive,
    Activated,
    Idle,
    Normal,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ZoneStatus {
    /// Whether the sensor is currently tripped (door open, motion seen).
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::Active | Self::Activated)
    }
}

/// A zone (sensor) definition as carried in summaries and zone updates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Zone {
    /// Panel-internal identifier, e.g. `"1-1"`
    pub id: String,
    /// Sensor category, e.g. `"Door_Window"`
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// Sensor group, e.g. `"entryexitdelay"`
    pub group: String,
    pub status: ZoneStatus,
    pub state: String,
    pub zone_id: u32,
    pub zone_physical_type: u32,
    pub zone_alarm_type: u32,
    pub zone_type: u32,
    pub partition_id: u32,
}

impl Zone {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// The short zone form carried by `ZONE_ACTIVE` events.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneActive {
    pub zone_id: u32,
    pub status: ZoneStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_status_wire_strings() {
        let status: ZoneStatus = serde_json::from_str("\"Open\"").unwrap();
        assert_eq!(status, ZoneStatus::Open);
        assert_eq!(serde_json::to_string(&ZoneStatus::Closed).unwrap(), "\"Closed\"");
    }

    #[test]
    fn test_unknown_zone_status() {
        let status: ZoneStatus = serde_json::from_str("\"Tampered\"").unwrap();
        assert_eq!(status, ZoneStatus::Unknown);
    }

    #[test]
    fn test_zone_is_open() {
        assert!(ZoneStatus::Open.is_open());
        assert!(ZoneStatus::Active.is_open());
        assert!(!ZoneStatus::Closed.is_open());
        assert!(!ZoneStatus::Idle.is_open());
    }

    #[test]
    fn test_zone_tolerates_missing_fields() {
        let zone: Zone = serde_json::from_str(r#"{"zone_id": 4, "name": "Kitchen"}"#).unwrap();
        assert_eq!(zone.zone_id, 4);
        assert_eq!(zone.name, "Kitchen");
        assert_eq!(zone.status, ZoneStatus::Unknown);
    }

    #[test]
    fn test_zone_full_payload() {
        let zone: Zone = serde_json::from_str(
            r#"{
                "id": "1-1",
                "type": "Door_Window",
                "name": "Front Door",
                "group": "entryexitdelay",
                "status": "Closed",
                "state": "0",
                "zone_id": 1,
                "zone_physical_type": 1,
                "zone_alarm_type": 3,
                "zone_type": 1,
                "partition_id": 0
            }"#,
        )
        .unwrap();
        assert_eq!(zone.kind, "Door_Window");
        assert_eq!(zone.group, "entryexitdelay");
        assert_eq!(zone.zone_alarm_type, 3);
        assert!(!zone.is_open());
    }
}
