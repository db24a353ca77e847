//! TLS configuration for connections to MariaDB/MySQL.
//!
//! TLS is negotiated in-band: after reading the server greeting the client
//! sends an SSLRequest and then runs the rustls handshake on the same socket.

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs;
use std::net::IpAddr;
use std::sync::Arc;

/// SSL/TLS connection mode.
///
/// Accepts both the libpq-style spellings (`disable`, `require`, `verify-ca`,
/// `verify-full`) and the MySQL client spellings (`DISABLED`, `PREFERRED`,
/// `REQUIRED`, `VERIFY_CA`, `VERIFY_IDENTITY`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// No TLS (plaintext connection)
    #[default]
    Disable,
    /// TLS when the server offers it, plaintext otherwise; certificate not verified
    Preferred,
    /// TLS required, but server certificate is not verified
    Require,
    /// TLS required, server certificate must be signed by a trusted CA
    VerifyCa,
    /// TLS required, server certificate must be signed by a trusted CA and hostname must match
    VerifyFull,
}

impl SslMode {
    /// Whether this mode requires certificate verification (CA or full)
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    /// Whether the client attempts TLS at all
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disable)
    }

    /// Whether a server without TLS support is an error
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Require | Self::VerifyCa | Self::VerifyFull)
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disable => write!(f, "disable"),
            Self::Preferred => write!(f, "preferred"),
            Self::Require => write!(f, "require"),
            Self::VerifyCa => write!(f, "verify-ca"),
            Self::VerifyFull => write!(f, "verify-full"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" => Ok(Self::Disable),
            "prefer" | "preferred" => Ok(Self::Preferred),
            "require" | "required" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" | "verify-identity" => Ok(Self::VerifyFull),
            _ => Err(Error::Config(format!(
                "invalid sslmode '{}': expected disable, preferred, require, verify-ca, or verify-full",
                s
            ))),
        }
    }
}

/// TLS configuration for MariaDB connections.
///
/// By default, server certificates are validated against the system roots
/// (falling back to the bundled Mozilla roots) and the hostname must match.
///
/// # Examples
///
/// ```ignore
/// use mariadb_wire::connection::TlsConfig;
///
/// // With custom CA certificate, hostname not checked (sslmode=verify-ca)
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/mysql/ca.pem")
///     .verify_hostname(false)
///     .build()?;
///
/// // Encrypt only (sslmode=require)
/// let tls = TlsConfig::builder()
///     .danger_accept_invalid_certs(true)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// Path to CA certificate file (None = use system roots)
    ca_cert_path: Option<String>,
    /// Whether to verify hostname matches certificate
    verify_hostname: bool,
    /// Whether to accept any certificate
    danger_accept_invalid_certs: bool,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Builder preset for an sslmode
    ///
    /// Returns `None` for [`SslMode::Disable`].
    pub fn for_mode(mode: SslMode, ca_cert_path: Option<&str>) -> Result<Option<TlsConfig>> {
        let builder = match mode {
            SslMode::Disable => return Ok(None),
            SslMode::Preferred | SslMode::Require => {
                TlsConfig::builder().danger_accept_invalid_certs(true)
            }
            SslMode::VerifyCa => TlsConfig::builder().verify_hostname(false),
            SslMode::VerifyFull => TlsConfig::builder().verify_hostname(true),
        };
        let builder = match ca_cert_path {
            Some(path) => builder.ca_cert_path(path),
            None => builder,
        };
        builder.build().map(Some)
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Check if hostname verification is enabled.
    pub fn verify_hostname(&self) -> bool {
        self.verify_hostname
    }

    /// Check if invalid certificates are accepted.
    pub fn danger_accept_invalid_certs(&self) -> bool {
        self.danger_accept_invalid_certs
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("verify_hostname", &self.verify_hostname)
            .field(
                "danger_accept_invalid_certs",
                &self.danger_accept_invalid_certs,
            )
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
    verify_hostname: bool,
    danger_accept_invalid_certs: bool,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            verify_hostname: true,
            danger_accept_invalid_certs: false,
        }
    }
}

impl TlsConfigBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Enable or disable hostname verification (default: enabled).
    ///
    /// When disabled the certificate chain is still verified against the
    /// trusted roots.
    pub fn verify_hostname(mut self, verify: bool) -> Self {
        self.verify_hostname = verify;
        self
    }

    /// ⚠️ **DANGER**: Accept any server certificate.
    ///
    /// The connection is encrypted but not authenticated, so it is open to
    /// man-in-the-middle attacks. This is what `sslmode=require` means.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - CA certificate file cannot be read
    /// - CA certificate file holds no certificates
    /// - the crypto provider rejects the protocol versions
    pub fn build(self) -> Result<TlsConfig> {
        let provider = crypto_provider();
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("failed to configure TLS: {}", e)))?;

        let client_config = if self.danger_accept_invalid_certs {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
                .with_no_client_auth()
        } else {
            let root_store = match &self.ca_cert_path {
                Some(ca_path) => load_custom_ca(ca_path)?,
                None => load_system_roots(),
            };

            if self.verify_hostname {
                builder
                    .with_root_certificates(root_store)
                    .with_no_client_auth()
            } else {
                let inner = WebPkiServerVerifier::builder_with_provider(
                    Arc::new(root_store),
                    provider,
                )
                .build()
                .map_err(|e| Error::Tls(format!("failed to build certificate verifier: {}", e)))?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(IgnoreHostname(inner)))
                    .with_no_client_auth()
            }
        };

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            verify_hostname: self.verify_hostname,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            client_config: Arc::new(client_config),
        })
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// System roots, or the bundled Mozilla roots when none can be loaded
fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    let (added, _ignored) = store.add_parsable_certificates(result.certs);

    if added == 0 {
        tracing::debug!(
            errors = result.errors.len(),
            "no system root certificates, using bundled roots"
        );
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    store
}

/// Load a custom CA certificate from a PEM file.
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Config(format!(
            "failed to read CA certificate file '{}': {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let (added, _) = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += added;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "no valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(root_store)
}

/// Accepts any certificate but still checks handshake signatures
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Full chain verification without the hostname check
#[derive(Debug)]
struct IgnoreHostname(Arc<WebPkiServerVerifier>);

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .0
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            // NotValidForName and NotValidForNameContext
            Err(rustls::Error::InvalidCertificate(e))
                if format!("{:?}", e).starts_with("NotValidForName") =>
            {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_verify_schemes()
    }
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
///
/// IP addresses are passed through unchanged.
///
/// # Errors
///
/// Returns an error if the hostname is invalid.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(hostname.to_string());
    }

    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Tls(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Tls(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
