// MIT License - Copyright (c) 2026 Peter Wright
// Protocol constants

use std::time::Duration;

/// The acknowledgement line the panel sends for every frame it receives.
pub const ACK: &str = "ACK";

/// Default TCP port of the panel's third-party control interface.
pub const DEFAULT_PORT: u16 = 12345;

/// Default interval between heartbeat probes.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// How long a send waits for the panel's ACK.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra silence tolerated on top of the heartbeat interval before the
/// session is declared dead.
pub const HEARTBEAT_GRACE: Duration = Duration::from_secs(5);

/// Longest heartbeat interval accepted. One day.
pub const MAX_HEARTBEAT_SECS: u64 = 86_400;

/// Longest inbound line kept, terminator excluded. Longer lines are skipped.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Bound on TCP connect and on the TLS handshake, each.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `source` field stamped on every outbound action.
pub const ACTION_SOURCE: &str = "C4";

/// Protocol version stamped on every outbound action.
pub const ACTION_VERSION: u32 = 0;

/// Capacity of the broadcast channel behind `PanelClient::subscribe_events`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// Wire discriminators
pub const EVENT_FIELD: &str = "event";
pub const INFO_TYPE_FIELD: &str = "info_type";
pub const ZONE_EVENT_TYPE_FIELD: &str = "zone_event_type";
