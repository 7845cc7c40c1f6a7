//! # TLS material
//!
//! Module dedicated to the locally-issued TLS identity the IMAP and
//! SMTP listeners present to mail clients. The material is a
//! self-signed CA certificate with its RSA key, written next to the
//! other bridge state and reused until it nears expiry. Clients are
//! expected to pin it; nothing here involves a public CA.

mod error;

use std::{path::PathBuf, sync::Arc};

use rand::{rngs::OsRng, RngCore};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::{
    pkcs1::EncodeRsaPrivateKey,
    pkcs8::{EncodePrivateKey, LineEnding},
    RsaPrivateKey,
};
use rustls::{
    pki_types::CertificateDer, server::WebPkiClientVerifier, RootCertStore, ServerConfig,
};
use time::{Duration, OffsetDateTime};
use tokio::fs;
use tracing::{debug, warn};

#[doc(inline)]
pub use self::error::{Error, Result};

/// The default certificate validity.
const DEFAULT_VALIDITY: Duration = Duration::days(20 * 365);

/// The minimum remaining leaf lifetime below which the material is
/// refused and must be regenerated.
const MIN_REMAINING_VALIDITY: Duration = Duration::days(31);

/// The size of the generated RSA keys, in bits.
const RSA_KEY_BITS: usize = 2048;

/// A certificate template.
#[derive(Clone, Debug)]
pub struct Template {
    /// The organization put in the subject.
    pub organization: String,

    /// The common name, also used as the SAN DNS name.
    pub common_name: String,

    /// The certificate validity.
    pub validity: Duration,
}

impl Template {
    /// Creates a template with the default 20-year validity.
    pub fn new(organization: impl ToString, common_name: impl ToString) -> Self {
        Self {
            organization: organization.to_string(),
            common_name: common_name.to_string(),
            validity: DEFAULT_VALIDITY,
        }
    }

    /// Overrides the certificate validity.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }
}

/// The TLS material manager.
pub struct Tls {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl Tls {
    /// Creates a manager over the two configured paths.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Returns `true` when both material files exist.
    pub fn has_certs(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }

    /// Generates a fresh RSA-2048 self-signed CA certificate from the
    /// given template and writes both PEM files, the key (PKCS#1,
    /// `RSA PRIVATE KEY`) with owner-only permissions.
    pub async fn generate_certs(&self, template: &Template) -> Result<()> {
        debug!(cn = template.common_name, "generating TLS certificates");

        let rsa_key =
            RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(Error::GenerateRsaKeyError)?;

        let key_pem = rsa_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(Error::EncodePkcs1Error)?;
        let pkcs8_pem = rsa_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(Error::EncodePkcs8Error)?;

        let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(&pkcs8_pem, &PKCS_RSA_SHA256)
            .map_err(Error::ParseKeyPairError)?;

        let mut serial = [0; 16];
        OsRng.fill_bytes(&mut serial);

        let mut subject = DistinguishedName::new();
        subject.push(DnType::CountryName, "CH");
        subject.push(DnType::OrganizationName, template.organization.clone());
        subject.push(DnType::OrganizationalUnitName, "mail");
        subject.push(DnType::CommonName, template.common_name.clone());

        let mut params = CertificateParams::default();
        params.distinguished_name = subject;
        params.serial_number = Some(SerialNumber::from_slice(&serial));
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + template.validity;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.subject_alt_names = vec![SanType::DnsName(
            template
                .common_name
                .clone()
                .try_into()
                .map_err(Error::BuildCertificateError)?,
        )];

        let cert = params
            .self_signed(&key_pair)
            .map_err(Error::BuildCertificateError)?;

        fs::write(&self.cert_path, cert.pem())
            .await
            .map_err(|err| Error::WriteCertError(err, self.cert_path.clone()))?;

        fs::write(&self.key_path, key_pem.as_bytes())
            .await
            .map_err(|err| Error::WriteKeyError(err, self.key_path.clone()))?;

        set_owner_only(&self.key_path)
            .await
            .map_err(|err| Error::WriteKeyError(err, self.key_path.clone()))?;

        Ok(())
    }

    /// Loads the material and assembles the server TLS configuration
    /// of the listeners.
    ///
    /// The configuration presents the key pair as server identity,
    /// trusts the leaf itself as the only CA, and verifies a client
    /// certificate only when one is presented. A leaf expiring within
    /// 31 days is refused so the caller regenerates in time instead
    /// of serving a certificate about to go stale.
    pub async fn config(&self) -> Result<Arc<ServerConfig>> {
        let cert_pem = fs::read(&self.cert_path)
            .await
            .map_err(|err| Error::ReadCertError(err, self.cert_path.clone()))?;
        let key_pem = fs::read(&self.key_path)
            .await
            .map_err(|err| Error::ReadKeyError(err, self.key_path.clone()))?;

        self.check_leaf_expiry(&cert_pem)?;

        let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
            .collect::<std::io::Result<Vec<CertificateDer>>>()
            .map_err(|err| Error::ReadCertError(err, self.cert_path.clone()))?;

        let leaf = certs
            .first()
            .cloned()
            .ok_or_else(|| {
                Error::ParseCertError("no certificate block".into(), self.cert_path.clone())
            })?;

        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|err| Error::ReadKeyError(err, self.key_path.clone()))?
            .ok_or_else(|| Error::MissingKeyError(self.key_path.clone()))?;

        let mut roots = RootCertStore::empty();
        roots.add(leaf).map_err(Error::BuildServerConfigError)?;

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .allow_unauthenticated()
            .build()
            .map_err(Error::BuildClientVerifierError)?;

        let config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(Error::BuildServerConfigError)?;

        Ok(Arc::new(config))
    }

    /// Loads the server configuration, generating or regenerating the
    /// material as needed: missing files are generated, an unloadable
    /// or expiring set is regenerated once, a second failure
    /// surfaces.
    pub async fn load_config(&self, template: &Template) -> Result<Arc<ServerConfig>> {
        if !self.has_certs() {
            self.generate_certs(template).await?;
        }

        match self.config().await {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!(error = %err, "cannot load TLS material, regenerating certificates");
                self.generate_certs(template).await?;
                self.config().await
            }
        }
    }

    fn check_leaf_expiry(&self, cert_pem: &[u8]) -> Result<()> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem)
            .map_err(|err| Error::ParseCertError(err.to_string(), self.cert_path.clone()))?;
        let cert = pem
            .parse_x509()
            .map_err(|err| Error::ParseCertError(err.to_string(), self.cert_path.clone()))?;

        let not_after = cert.validity().not_after.to_datetime();
        let remaining = not_after - OffsetDateTime::now_utc();

        if remaining < MIN_REMAINING_VALIDITY {
            return Err(Error::CertAboutToExpireError(
                self.cert_path.clone(),
                MIN_REMAINING_VALIDITY.whole_days(),
            ));
        }

        Ok(())
    }
}

#[cfg(unix)]
async fn set_owner_only(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
