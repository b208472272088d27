// MIT License - Copyright (c) 2026 Peter Wright
// Device payloads

pub mod partition;
pub mod zone;

pub use partition::{Partition, PartitionStatus};
pub use zone::{Zone, ZoneActive, ZoneStatus};
