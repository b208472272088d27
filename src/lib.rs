// MIT License - Copyright (c) 2026 Peter Wright
// Qolsys IQ panel client
//
//! # qolsys-iq-client
//!
//! Persistent client for the local control protocol of Qolsys IQ alarm
//! panels: newline-delimited JSON over TLS, with every outbound frame
//! acknowledged by an `ACK` line.
//!
//! The client keeps one session open, serializes sends (one in flight at
//! a time), watches liveness with an empty-frame heartbeat, and fans
//! decoded panel events out to listeners. A lost session is reported once
//! through [`PanelListener::disconnected`]; reconnecting is left to the
//! caller.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qolsys_iq_client::{Action, ArmingType, ClientConfig, ClientEvent, PanelClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .host("192.168.0.50")
//!         .heartbeat_secs(30)
//!         .build();
//!
//!     let client = PanelClient::new(config);
//!     let mut events = client.subscribe_events();
//!     client.connect().await?;
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let ClientEvent::Panel(event) = event {
//!                 println!("Event: {:?}", event);
//!             }
//!         }
//!     });
//!
//!     client.send(&Action::summary("panel-token")).await?;
//!     client
//!         .send(&Action::arming("panel-token", ArmingType::ArmStay, 0, Some("1234".into())))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
mod heartbeat;
pub mod listener;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use client::PanelClient;
pub use config::{ClientConfig, ClientConfigBuilder, DisconnectedSendPolicy, TrustPolicy};
pub use devices::{Partition, PartitionStatus, Zone, ZoneActive, ZoneStatus};
pub use error::{PanelError, Result};
pub use event::{
    AlarmEvent, AlarmType, ArmingEvent, ClientEvent, DisconnectReason, ErrorEvent, Event,
    EventReceiver, SecureArmInfo, SummaryInfo, ZoneActiveEvent, ZoneAddEvent, ZoneUpdateEvent,
};
pub use listener::{ChannelListener, ListenerRegistry, PanelListener};
pub use protocol::{Action, AlarmCommandType, ArmingType, Command, InfoType};
