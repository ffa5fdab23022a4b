//! HTTP transport construction.
//!
//! Builds the shared [`reqwest::Client`] from credential material. No network
//! I/O happens here; failures come only from reading or parsing certificates.

use crate::Result;
use bcc_core::config::{ManagerConfig, TlsConfig};
use bcc_core::Error;
use reqwest::tls::Version;
use reqwest::{Certificate, Client, ClientBuilder, Identity};
use std::path::Path;
use tracing::{debug, warn};

/// Default User-Agent sent when the configuration does not override it.
pub const USER_AGENT: &str = concat!("bcc-client/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client for an engine instance.
///
/// The negotiated TLS version never drops below 1.2. When a CA bundle is
/// supplied it becomes the only trusted root. `insecure` disables server
/// certificate verification outright, whatever else is configured.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] for an unusable certificate combination and
/// [`Error::CertificateError`] when PEM material cannot be read or parsed.
pub fn build_http_client(tls: &TlsConfig, config: &ManagerConfig) -> Result<Client> {
    tls.check_pairing()?;

    let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);

    let mut builder = ClientBuilder::new()
        .use_rustls_tls()
        .min_tls_version(Version::TLS_1_2)
        .user_agent(user_agent)
        .pool_idle_timeout(config.pool_idle_timeout())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .connect_timeout(config.connect_timeout());

    if let Some(ca_cert) = &tls.ca_cert {
        let bundle = load_material(ca_cert, "CA certificate")?;
        let certificates = parse_ca_bundle(&bundle)?;
        debug!(count = certificates.len(), "trusting supplied CA bundle");
        builder = builder.tls_built_in_root_certs(false);
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }

    if let (Some(cert), Some(key)) = (&tls.client_cert, &tls.client_key) {
        builder = builder.identity(load_identity(cert, key)?);
    }

    if tls.insecure {
        warn!("TLS verification disabled for BCC client");
        builder = builder.danger_accept_invalid_certs(true);
    }

    let has_material = tls.ca_cert.is_some() || tls.client_cert.is_some();
    builder.build().map_err(|err| {
        let message = format!("Failed to build HTTP client: {err}");
        if has_material {
            Error::CertificateError(message)
        } else {
            Error::ConfigError(message)
        }
    })
}

/// Read `value` from disk when it names a file, otherwise treat it as PEM text.
fn load_material(value: &str, what: &str) -> Result<Vec<u8>> {
    let path = Path::new(value);
    if path.is_file() {
        debug!("loading {what} from {}", path.display());
        std::fs::read(path).map_err(|err| {
            Error::CertificateError(format!(
                "Failed to read {what} {}: {err}",
                path.display()
            ))
        })
    } else {
        Ok(value.as_bytes().to_vec())
    }
}

fn parse_ca_bundle(bundle: &[u8]) -> Result<Vec<Certificate>> {
    let certificates = Certificate::from_pem_bundle(bundle)
        .map_err(|err| Error::CertificateError(format!("Invalid CA certificate: {err}")))?;
    if certificates.is_empty() {
        return Err(Error::CertificateError(
            "Failed to append CA certificate: no PEM certificate found".to_string(),
        ));
    }
    Ok(certificates)
}

fn load_identity(cert: &str, key: &str) -> Result<Identity> {
    let mut pem = load_material(cert, "client certificate")?;
    pem.push(b'\n');
    pem.extend(load_material(key, "client key")?);

    Identity::from_pem(&pem).map_err(|err| {
        Error::CertificateError(format!("Failed to load client certificate: {err}"))
    })
}
