//! Rust toolkit for SUNAT electronic invoicing: UBL document assembly,
//! enveloped XML-DSig signing, transport packaging, and the billService
//! SOAP protocol (submission and consultation).
//!
//! # Examples
//! ```rust
//! use factura_core::config::{Config, Environment, SolCredentials};
//!
//! let config = Config::new(
//!     Environment::Beta,
//!     SolCredentials::new("20123456789", "MODDATOS", "moddatos"),
//! );
//! # let _ = config;
//! ```
pub mod client;
pub mod config;
pub mod document;
pub mod package;
pub mod sign;
pub mod soap;
pub mod tracker;

use thiserror::Error;

pub use client::{ClientError, SunatClient};
pub use config::{Config, Environment, SolCredentials};
pub use document::{CreditNote, DebitNote, DocumentId, Invoice};

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Document(#[from] document::DocumentError),
    #[error(transparent)]
    Xml(#[from] document::xml::DocumentXmlError),
    #[error(transparent)]
    Certificate(#[from] sign::CertificateError),
    #[error(transparent)]
    Signing(#[from] sign::SigningError),
    #[error(transparent)]
    Package(#[from] package::PackageError),
    #[error(transparent)]
    Soap(#[from] soap::SoapError),
    #[error(transparent)]
    Tracker(#[from] tracker::TrackerError),
    #[error(transparent)]
    Client(#[from] client::ClientError),
    #[error(transparent)]
    Environment(#[from] config::EnvironmentParseError),
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::client::ClientError;
    use crate::document::DocumentError;
    use crate::package::PackageError;
    use crate::sign::{CertificateError, SigningError};
    use crate::soap::SoapError;
    use crate::tracker::TrackerError;

    #[test]
    fn error_conversions_cover_variants() {
        let err: Error = DocumentError::EmptyLines.into();
        assert!(matches!(err, Error::Document(_)));

        let err: Error = CertificateError::MissingCertificate.into();
        assert!(matches!(err, Error::Certificate(_)));

        let err: Error = SigningError::Parse("bad".into()).into();
        assert!(matches!(err, Error::Signing(_)));

        let err: Error = PackageError::EmptyArchive.into();
        assert!(matches!(err, Error::Package(_)));

        let err: Error = SoapError::Protocol("no body".into()).into();
        assert!(matches!(err, Error::Soap(_)));

        let err: Error = TrackerError::InvalidTransition {
            from: "accepted",
            to: "pending",
        }
        .into();
        assert!(matches!(err, Error::Tracker(_)));

        let err: Error = ClientError::Response("shape".into()).into();
        assert!(matches!(err, Error::Client(_)));
    }
}
