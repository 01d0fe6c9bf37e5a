//! TLS for catalog connections.
//!
//! `ssl_mode` follows libpq: `require` encrypts without authenticating the
//! server, `verify-ca` checks the chain against the trust roots, and
//! `verify-full` additionally checks that the certificate names the host.
//! Trust roots are the bundled Mozilla set plus any PEM certificates in
//! `ssl_root_cert`.

use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::error::{CodegenError, Result};

/// libpq `sslmode` values the catalog connector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    #[default]
    Disable,
    /// Encrypt, but accept any server certificate.
    Require,
    /// Verify the certificate chain, not the hostname.
    VerifyCa,
    /// Verify the chain and the hostname.
    VerifyFull,
}

impl SslMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" | "" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(CodegenError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

/// rustls connector for the catalog pool, or `None` when TLS is off.
pub fn catalog_connector(source: &SourceConfig) -> Result<Option<MakeRustlsConnect>> {
    let mode = SslMode::parse(&source.ssl_mode)?;
    if !mode.requires_tls() {
        return Ok(None);
    }
    let config = client_config(mode, source.ssl_root_cert.as_deref())?;
    Ok(Some(MakeRustlsConnect::new(config)))
}

fn client_config(mode: SslMode, extra_roots: Option<&Path>) -> Result<ClientConfig> {
    let provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| CodegenError::Config(format!("TLS setup failed: {}", e)))?;

    let verifier: Arc<dyn ServerCertVerifier> = match mode {
        SslMode::Disable => {
            return Err(CodegenError::Config(
                "Cannot build TLS config for ssl_mode=disable".into(),
            ));
        }
        SslMode::Require => {
            warn!(
                "ssl_mode=require encrypts the catalog connection without checking the \
                 server certificate"
            );
            Arc::new(AcceptAnyCert { provider })
        }
        SslMode::VerifyCa | SslMode::VerifyFull => {
            let roots = Arc::new(trust_roots(extra_roots)?);
            let webpki = WebPkiServerVerifier::builder_with_provider(roots, provider)
                .build()
                .map_err(|e| CodegenError::Config(format!("TLS verifier: {}", e)))?;
            info!(ssl_mode = ?mode, "Catalog TLS with certificate verification");
            if mode == SslMode::VerifyCa {
                Arc::new(ChainOnly { inner: webpki })
            } else {
                webpki
            }
        }
    };

    Ok(builder
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

fn trust_roots(extra: Option<&Path>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = extra {
        let invalid = |e: &dyn std::fmt::Display| {
            CodegenError::Config(format!("ssl_root_cert {}: {}", path.display(), e))
        };
        let certs = CertificateDer::pem_file_iter(path)
            .map_err(|e| invalid(&e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid(&e))?;
        if certs.is_empty() {
            return Err(invalid(&"no certificates found"));
        }
        let (added, ignored) = roots.add_parsable_certificates(certs);
        info!(path = %path.display(), added, ignored, "Loaded extra trust roots");
    }
    Ok(roots)
}

/// Whether a verification failure is only a hostname mismatch.
fn is_name_mismatch(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
        )
    )
}

/// `verify-ca`: full chain verification with the hostname check waived.
#[derive(Debug)]
struct ChainOnly {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnly {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(e) if is_name_mismatch(&e) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// `require`: any certificate is accepted, but handshake signatures are
/// still checked so the session key belongs to whoever holds the cert.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn source(mode: &str) -> SourceConfig {
        SourceConfig {
            connection_string: "host=db.internal user=app dbname=shop".into(),
            ssl_mode: mode.into(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_ssl_mode_parsing() {
        assert_eq!(SslMode::parse("disable").unwrap(), SslMode::Disable);
        assert_eq!(SslMode::parse("Require").unwrap(), SslMode::Require);
        assert_eq!(SslMode::parse("verify-ca").unwrap(), SslMode::VerifyCa);
        assert_eq!(SslMode::parse("verify-full").unwrap(), SslMode::VerifyFull);
        assert_eq!(SslMode::parse("").unwrap(), SslMode::Disable);
        assert!(matches!(
            SslMode::parse("prefer"),
            Err(CodegenError::Config(_))
        ));
    }

    #[test]
    fn test_disable_builds_no_connector() {
        assert!(catalog_connector(&source("disable")).unwrap().is_none());
    }

    #[test]
    fn test_require_builds_connector() {
        assert!(catalog_connector(&source("require")).unwrap().is_some());
    }

    #[test]
    fn test_verify_ca_builds_connector() {
        assert!(catalog_connector(&source("verify-ca")).unwrap().is_some());
    }

    #[test]
    fn test_verify_full_builds_connector() {
        assert!(catalog_connector(&source("verify-full")).unwrap().is_some());
    }

    #[test]
    fn test_verify_ca_waives_only_the_hostname() {
        assert!(is_name_mismatch(&rustls::Error::InvalidCertificate(
            CertificateError::NotValidForName
        )));
        assert!(!is_name_mismatch(&rustls::Error::InvalidCertificate(
            CertificateError::UnknownIssuer
        )));
        assert!(!is_name_mismatch(&rustls::Error::InvalidCertificate(
            CertificateError::Expired
        )));
    }

    #[test]
    fn test_missing_root_cert_file_is_config_error() {
        let mut cfg = source("verify-ca");
        cfg.ssl_root_cert = Some("/nonexistent/root.pem".into());
        assert!(matches!(
            catalog_connector(&cfg),
            Err(CodegenError::Config(_))
        ));
    }

    #[test]
    fn test_root_cert_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();

        let mut cfg = source("verify-full");
        cfg.ssl_root_cert = Some(path);
        let err = catalog_connector(&cfg).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("no certificates found"), "error was: {err}");
    }
}
