//! # Error
//!
//! Module dedicated to TLS material errors.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The module `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors related to TLS material management.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot generate RSA key pair")]
    GenerateRsaKeyError(#[source] rsa::Error),
    #[error("cannot encode RSA key to PKCS#1")]
    EncodePkcs1Error(#[source] rsa::pkcs1::Error),
    #[error("cannot encode RSA key to PKCS#8")]
    EncodePkcs8Error(#[source] rsa::pkcs8::Error),
    #[error("cannot load certificate key pair")]
    ParseKeyPairError(#[source] rcgen::Error),
    #[error("cannot self-sign certificate")]
    BuildCertificateError(#[source] rcgen::Error),
    #[error("cannot write certificate at {1}")]
    WriteCertError(#[source] io::Error, PathBuf),
    #[error("cannot write private key at {1}")]
    WriteKeyError(#[source] io::Error, PathBuf),
    #[error("cannot read certificate at {1}")]
    ReadCertError(#[source] io::Error, PathBuf),
    #[error("cannot read private key at {1}")]
    ReadKeyError(#[source] io::Error, PathBuf),
    #[error("cannot parse certificate at {1}: {0}")]
    ParseCertError(String, PathBuf),
    #[error("cannot find a private key in {0}")]
    MissingKeyError(PathBuf),
    #[error("certificate at {0} expires within {1} days, regenerate it")]
    CertAboutToExpireError(PathBuf, i64),
    #[error("cannot build client certificate verifier")]
    BuildClientVerifierError(#[source] rustls::server::VerifierBuilderError),
    #[error("cannot build server TLS configuration")]
    BuildServerConfigError(#[source] rustls::Error),
}
