// MIT License - Copyright (c) 2026 Peter Wright
// TLS connection to the panel

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, error, info};

use crate::config::{ClientConfig, TrustPolicy};
use crate::error::{PanelError, Result};

/// Open a TLS connection to the panel.
///
/// Sequence: TCP connect → TLS handshake. Each step is bounded by the
/// configured connect timeout. No tasks are spawned.
pub async fn open(config: &ClientConfig) -> Result<TlsStream<TcpStream>> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Connecting to panel at {}", addr);

    let tcp = timeout(config.connect_timeout(), TcpStream::connect(&addr))
        .await
        .map_err(|_| PanelError::ConnectionTimeout)?
        .map_err(|e| {
            error!("TCP connect failed: {}", e);
            PanelError::Io(e)
        })?;
    tcp.set_nodelay(true)?;
    debug!("TCP socket connected");

    let server_name =
        ServerName::try_from(config.host.clone()).map_err(|e| PanelError::InvalidConfig {
            details: format!("invalid panel host {}: {}", config.host, e),
        })?;
    let connector = TlsConnector::from(Arc::new(client_tls_config(&config.trust)?));

    let stream = timeout(config.connect_timeout(), connector.connect(server_name, tcp))
        .await
        .map_err(|_| PanelError::ConnectionTimeout)?
        .map_err(|e| {
            error!("TLS handshake failed: {}", e);
            PanelError::Tls {
                details: e.to_string(),
            }
        })?;

    debug!("TLS handshake complete");
    Ok(stream)
}

/// Build the rustls client configuration for a trust policy.
pub fn client_tls_config(trust: &TrustPolicy) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PanelCertVerifier {
        pinned: match trust {
            TrustPolicy::AcceptAny => None,
            TrustPolicy::Pinned(cert) => Some(cert.clone()),
        },
        provider: provider.clone(),
    };

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| PanelError::Tls {
            details: e.to_string(),
        })?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(config)
}

/// Certificate check for a locally provisioned panel.
///
/// Without a pin any certificate is accepted; with a pin the end-entity
/// certificate must match it byte for byte. Either way the handshake
/// signature is verified against the presented certificate.
#[derive(Debug)]
struct PanelCertVerifier {
    pinned: Option<CertificateDer<'static>>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PanelCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match &self.pinned {
            Some(pinned) if pinned.as_ref() != end_entity.as_ref() => {
                error!("Panel certificate does not match the pinned certificate");
                Err(rustls::Error::InvalidCertificate(
                    CertificateError::ApplicationVerificationFailure,
                ))
            }
            _ => Ok(ServerCertVerified::assertion()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
