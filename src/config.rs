// MIT License - Copyright (c) 2026 Peter Wright
// Client configuration

use std::path::Path;
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use tokio::runtime::Handle;

use crate::constants::{
    ACK_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_SECS, DEFAULT_PORT, MAX_HEARTBEAT_SECS,
};
use crate::error::{PanelError, Result};

/// How the panel's TLS certificate is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Accept whatever certificate the panel presents.
    ///
    /// The panel is a locally installed appliance with a self-signed
    /// certificate that no CA vouches for, so there is nothing to verify
    /// against. Handshake signatures are still checked.
    AcceptAny,
    /// Accept only this exact end-entity certificate (DER).
    Pinned(CertificateDer<'static>),
}

impl TrustPolicy {
    /// Pin the first certificate found in a PEM file.
    pub fn pinned_from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cert = CertificateDer::from_pem_file(path).map_err(|e| PanelError::InvalidConfig {
            details: format!("failed to read certificate {}: {}", path.display(), e),
        })?;
        Ok(Self::Pinned(cert))
    }
}

/// What `send` does when there is no live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectedSendPolicy {
    /// Fail with `PanelError::NotConnected`.
    Reject,
    /// Return `Ok(())` without sending anything.
    Drop,
}

/// Configuration for connecting to a Qolsys IQ panel.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Panel host name or IP address
    pub host: String,
    /// Panel TLS port (default: 12345)
    pub port: u16,
    /// Seconds between heartbeat probes, 1 to 86400
    pub heartbeat_secs: u64,
    /// How long a send waits for ACK, in milliseconds (default: 5000)
    pub ack_timeout_ms: u64,
    /// Bound on TCP connect and TLS handshake, in milliseconds
    pub connect_timeout_ms: u64,
    /// Label attached to the client's tracing spans
    pub name: String,
    pub trust: TrustPolicy,
    pub disconnected_send: DisconnectedSendPolicy,
    /// Runtime the background tasks are spawned on. Defaults to the
    /// runtime `connect` is called from.
    pub runtime: Option<Handle>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.10".to_string(),
            port: DEFAULT_PORT,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            ack_timeout_ms: ACK_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            name: "qolsys".to_string(),
            trust: TrustPolicy::AcceptAny,
            disconnected_send: DisconnectedSendPolicy::Reject,
            runtime: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Reject values the session tasks can't run with. Checked by
    /// `connect` before anything is opened.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_HEARTBEAT_SECS).contains(&self.heartbeat_secs) {
            return Err(PanelError::InvalidConfig {
                details: format!(
                    "heartbeat_secs must be between 1 and {}, got {}",
                    MAX_HEARTBEAT_SECS, self.heartbeat_secs
                ),
            });
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Heartbeat period in seconds, clamped to 1..=86400.
    pub fn heartbeat_secs(mut self, secs: u64) -> Self {
        self.config.heartbeat_secs = secs.clamp(1, MAX_HEARTBEAT_SECS);
        self
    }

    pub fn ack_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ack_timeout_ms = ms;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn trust(mut self, trust: TrustPolicy) -> Self {
        self.config.trust = trust;
        self
    }

    pub fn disconnected_send(mut self, policy: DisconnectedSendPolicy) -> Self {
        self.config.disconnected_send = policy;
        self
    }

    pub fn runtime(mut self, handle: Handle) -> Self {
        self.config.runtime = Some(handle);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
