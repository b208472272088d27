// MIT License - Copyright (c) 2026 Peter Wright
// Partition payloads

use serde::{Deserialize, Serialize};

use super::zone::Zone;

/// Arming state of a partition. Also used as the `arming_type` of
/// `ARMING` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionStatus {
    ArmStay,
    ArmAway,
    Disarm,
    EntryDelay,
    ExitDelay,
    Alarm,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PartitionStatus {
    /// Armed in any mode, including while a delay is counting down.
    pub fn is_armed(&self) -> bool {
        matches!(
            self,
            Self::ArmStay | Self::ArmAway | Self::EntryDelay | Self::ExitDelay | Self::Alarm
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArmStay => "ARM_STAY",
            Self::ArmAway => "ARM_AWAY",
            Self::Disarm => "DISARM",
            Self::EntryDelay => "ENTRY_DELAY",
            Self::ExitDelay => "EXIT_DELAY",
            Self::Alarm => "ALARM",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A partition and its zones, as carried by `INFO/SUMMARY`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Partition {
    pub partition_id: u32,
    pub name: String,
    pub status: PartitionStatus,
    pub secure_arm: bool,
    pub zone_list: Vec<Zone>,
}
