// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Public entry point: issue, look up, list and remove domain certificates.

use crate::ca::{self, Context};
use crate::cert;
use crate::config::{Config, Paths};
use crate::error::{Error, Result};
use crate::openssl::OpenSsl;
use crate::protect::PassphraseSession;
use crate::trust::{self, Platform, TrustOptions};
use crate::ui::{TerminalUi, UserInterface};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How the root certificate is returned alongside a domain certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCa {
    /// Path to the root certificate file.
    Path,
    /// Contents of the root certificate file.
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaMaterial {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Per-request options for [`DevCert::certificate_for`].
#[derive(Default, Clone, Copy)]
pub struct Options<'a> {
    pub return_ca: Option<ReturnCa>,
    /// Never install NSS tooling; fall back to the manual Firefox import.
    pub skip_certutil_install: bool,
    /// Leave the hosts file alone.
    pub skip_hosts_file: bool,
    /// Replaces the default UI for this request only.
    pub ui: Option<&'a dyn UserInterface>,
}

/// Key and certificate for one domain, PEM encoded.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub key: Vec<u8>,
    pub cert: Vec<u8>,
    pub ca: Option<CaMaterial>,
}

pub struct DevCert {
    paths: Paths,
    config: Config,
    platform: Option<Box<dyn Platform>>,
    ui: Box<dyn UserInterface>,
}

impl DevCert {
    /// Store under the per-user data directory (or `DEVCERT_ROOT`), the
    /// running OS's platform and the terminal UI.
    ///
    /// An unsupported OS is only reported once a certificate is requested.
    pub fn new() -> Result<Self> {
        let paths = Paths::new()?;
        let config = Config::load(&paths.config)?;
        let platform = match trust::current() {
            Ok(platform) => Some(platform),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };
        Ok(Self {
            paths,
            config,
            platform,
            ui: Box::new(TerminalUi),
        })
    }

    pub fn with_parts(
        paths: Paths,
        config: Config,
        platform: Box<dyn Platform>,
        ui: Box<dyn UserInterface>,
    ) -> Self {
        Self {
            paths,
            config,
            platform: Some(platform),
            ui,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key and certificate for `domain`, creating and trusting the root CA
    /// and issuing the certificate first if needed.
    ///
    /// Fails before touching any state when the OS is unsupported or the
    /// `openssl` binary cannot be found.
    pub async fn certificate_for(
        &self,
        domain: &str,
        options: &Options<'_>,
    ) -> Result<IssuedCertificate> {
        let platform = self
            .platform
            .as_deref()
            .ok_or_else(|| Error::UnsupportedPlatform(std::env::consts::OS.to_string()))?;
        OpenSsl::ensure_available().await?;
        Paths::validate_domain(domain)?;

        let ui = options.ui.unwrap_or(self.ui.as_ref());
        let session = PassphraseSession::new();
        let openssl = OpenSsl::new(&self.paths.rand_file);
        let ctx = Context {
            paths: &self.paths,
            config: &self.config,
            openssl: &openssl,
            platform,
            ui,
            session: &session,
        };
        let trust = TrustOptions {
            skip_certutil_install: options.skip_certutil_install,
            firefox_close_timeout: self.config.firefox_close_timeout(),
        };

        ca::ensure_ca(&ctx, &trust).await?;
        cert::ensure_domain_certificate(&ctx, domain).await?;

        if options.skip_hosts_file {
            debug!("skipping hosts file update for {}", domain);
        } else {
            platform.add_domain_to_host_file_if_missing(domain).await?;
        }

        let ca = match options.return_ca {
            None => None,
            Some(ReturnCa::Path) => Some(CaMaterial::Path(self.paths.ca_cert.clone())),
            Some(ReturnCa::Read) => Some(CaMaterial::Bytes(read(&self.paths.ca_cert)?)),
        };

        Ok(IssuedCertificate {
            key: read(&self.paths.domain_key(domain)?)?,
            cert: read(&self.paths.domain_cert(domain)?)?,
            ca,
        })
    }

    /// Whether a certificate file exists for `domain`. Invalid names have none.
    pub fn has_certificate_for(&self, domain: &str) -> bool {
        self.paths
            .domain_cert(domain)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Every domain with a directory in the store, sorted.
    pub fn configured_domains(&self) -> Result<Vec<String>> {
        self.paths.list_domains()
    }

    /// Delete the domain's key and certificate. Missing is not an error.
    pub fn remove_domain(&self, domain: &str) -> Result<()> {
        self.paths.remove_domain(domain)
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::testing::RecordingUi;
    use async_trait::async_trait;

    struct NoopPlatform;

    #[async_trait]
    impl Platform for NoopPlatform {
        async fn add_to_trust_stores(
            &self,
            _cert_path: &Path,
            _options: &TrustOptions,
            _ui: &dyn UserInterface,
        ) -> Result<()> {
            Ok(())
        }

        async fn add_domain_to_host_file_if_missing(&self, _domain: &str) -> Result<()> {
            Ok(())
        }

        async fn read_protected_file(
            &self,
            path: &Path,
            _ui: &dyn UserInterface,
            _session: &PassphraseSession,
        ) -> Result<Vec<u8>> {
            read(path)
        }

        async fn write_protected_file(
            &self,
            path: &Path,
            contents: &[u8],
            _ui: &dyn UserInterface,
            _session: &PassphraseSession,
        ) -> Result<()> {
            crate::fs::atomic_write_secret(path, contents)
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    fn devcert(root: &Path) -> DevCert {
        DevCert::with_parts(
            Paths::with_base(root),
            Config::default(),
            Box::new(NoopPlatform),
            Box::new(RecordingUi::default()),
        )
    }

    #[test]
    fn test_has_certificate_for_checks_cert_file_only() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let devcert = devcert(dir.path());
        assert!(!devcert.has_certificate_for("example.test"));

        // A key without a certificate is an unfinished issuance
        let domain_dir = devcert
            .paths()
            .ensure_domain_dir("example.test")
            .expect("domain dir should be created");
        std::fs::write(domain_dir.join("private-key.key"), b"key").expect("key should be written");
        assert!(!devcert.has_certificate_for("example.test"));

        std::fs::write(domain_dir.join("certificate.crt"), b"cert")
            .expect("cert should be written");
        assert!(devcert.has_certificate_for("example.test"));
    }

    #[test]
    fn test_invalid_domain_has_no_certificate() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        assert!(!devcert(dir.path()).has_certificate_for("../etc"));
    }

    #[test]
    fn test_remove_domain_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let devcert = devcert(dir.path());
        devcert
            .paths()
            .ensure_domain_dir("gone.test")
            .expect("domain dir should be created");
        assert_eq!(
            devcert.configured_domains().expect("listing should work"),
            vec!["gone.test".to_string()]
        );

        devcert.remove_domain("gone.test").expect("removal should work");
        devcert
            .remove_domain("gone.test")
            .expect("second removal should be a no-op");
        assert!(devcert
            .configured_domains()
            .expect("listing should work")
            .is_empty());
    }

    #[tokio::test]
    async fn test_certificate_for_rejects_invalid_domain_before_writing() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let devcert = devcert(&dir.path().join("store"));
        if OpenSsl::ensure_available().await.is_err() {
            eprintln!("skipping: openssl not installed");
            return;
        }

        let err = devcert
            .certificate_for("bad/domain", &Options::default())
            .await
            .expect_err("invalid domain should fail");
        assert!(matches!(err, Error::InvalidDomain { .. }));
        assert!(!dir.path().join("store").exists());
    }
}
