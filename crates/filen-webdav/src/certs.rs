//! Self-signed certificate cache for HTTPS listeners.
//!
//! Certificates are generated for `local.webdav.filen.io`, persisted next to
//! the scratch tier (`cert`, `privateKey`, `expiry`), and regenerated once
//! the recorded expiry passes. The certificate itself is valid for a year;
//! the recorded expiry is five days shorter so rotation happens before
//! clients ever see an expired chain.

use crate::error::{WebDavError, WebDavResult};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

/// Common name on the generated certificate.
const COMMON_NAME: &str = "local.webdav.filen.io";

/// How long a generated certificate is trusted before regeneration.
const ROTATE_AFTER_DAYS: u64 = 360;

/// PEM-encoded certificate and private key.
#[derive(Debug, Clone)]
pub struct CertBundle {
    pub cert_pem: String,
    pub key_pem: String,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Load the cached certificate, or generate and persist a fresh one when
/// missing or past its recorded expiry.
pub async fn load_or_generate(dir: &Path) -> WebDavResult<CertBundle> {
    let cert_path = dir.join("cert");
    let key_path = dir.join("privateKey");
    let expiry_path = dir.join("expiry");

    if let (Ok(cert_pem), Ok(key_pem), Ok(expiry)) = (
        tokio::fs::read_to_string(&cert_path).await,
        tokio::fs::read_to_string(&key_path).await,
        tokio::fs::read_to_string(&expiry_path).await,
    ) {
        if let Ok(expiry_ms) = expiry.trim().parse::<i64>() {
            if now_ms() < expiry_ms {
                debug!("using cached self-signed certificate");
                return Ok(CertBundle { cert_pem, key_pem });
            }
        }
        info!("cached certificate expired, regenerating");
    }

    let generated = rcgen::generate_simple_self_signed(vec![COMMON_NAME.to_string()])
        .map_err(|e| WebDavError::Internal(format!("certificate generation: {e}")))?;
    let bundle = CertBundle {
        cert_pem: generated.cert.pem(),
        key_pem: generated.key_pair.serialize_pem(),
    };

    let expiry_ms = now_ms() + (ROTATE_AFTER_DAYS * 24 * 60 * 60 * 1000) as i64;
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&cert_path, &bundle.cert_pem).await?;
    tokio::fs::write(&key_path, &bundle.key_pem).await?;
    tokio::fs::write(&expiry_path, expiry_ms.to_string()).await?;
    info!(cn = COMMON_NAME, "generated self-signed certificate");

    Ok(bundle)
}

/// Build a TLS acceptor from a PEM bundle.
pub fn tls_acceptor(bundle: &CertBundle) -> WebDavResult<TlsAcceptor> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut bundle.cert_pem.as_bytes())
            .collect::<Result<_, _>>()
            .map_err(WebDavError::Io)?;
    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut bundle.key_pem.as_bytes())
            .map_err(WebDavError::Io)?
            .ok_or_else(|| {
                WebDavError::Io(io::Error::new(io::ErrorKind::InvalidData, "no private key"))
            })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| WebDavError::Internal(format!("tls config: {e}")))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
