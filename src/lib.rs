// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Locally-trusted TLS certificates for development domains.
//!
//! ```rust,no_run
//! use devcert::{DevCert, Options, ReturnCa};
//!
//! # async fn run() -> devcert::Result<()> {
//! let devcert = DevCert::new()?;
//! let issued = devcert
//!     .certificate_for(
//!         "my-app.test",
//!         &Options {
//!             return_ca: Some(ReturnCa::Path),
//!             ..Options::default()
//!         },
//!     )
//!     .await?;
//! assert!(devcert.has_certificate_for("my-app.test"));
//! # drop(issued);
//! # Ok(())
//! # }
//! ```

/// Root certificate authority management.
pub mod ca;
/// Domain certificate issuance.
pub mod cert;
/// Public facade.
pub mod certificates;
/// Configuration and certificate store layout.
pub mod config;
/// Error types.
pub mod error;
/// Filesystem utilities.
pub mod fs;
pub mod hosts;
/// OpenSSL invocation.
pub mod openssl;
pub mod process;
/// Passphrase session and at-rest encryption of protected files.
pub mod protect;
/// OS and browser trust store installation.
pub mod trust;
pub mod ui;
/// X.509 certificate parsing.
pub mod x509;

pub use ca::{CA_COMMON_NAME, CA_ORG_NAME};
pub use certificates::{CaMaterial, DevCert, IssuedCertificate, Options, ReturnCa};
pub use config::{Config, Paths};
pub use error::{Error, Result};
pub use protect::PassphraseSession;
pub use trust::{Platform, TrustOptions};
pub use ui::{TerminalUi, UserInterface};
pub use x509::{parse_cert_file, parse_cert_pem, CertInfo};
