// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::process::{self, elevated};
use crate::protect::PassphraseSession;
use crate::trust::{firefox, nss, validate_cert_path, Platform, TrustOptions};
use crate::ui::UserInterface;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TRUST_STORE_CERT_NAME: &str = "devcert.crt";
const FIREFOX_BIN_PATH: &str = "/usr/bin/firefox";
const CHROME_BIN_PATH: &str = "/usr/bin/google-chrome";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinuxDistro {
    Debian, // Ubuntu, Mint, Pop!_OS, etc.
    Fedora, // RHEL, CentOS, Rocky, Alma
    Arch,   // Manjaro, EndeavourOS
    Unknown,
}

impl LinuxDistro {
    fn trust_store_dir(&self) -> Option<&'static Path> {
        match self {
            LinuxDistro::Debian => Some(Path::new("/usr/local/share/ca-certificates")),
            LinuxDistro::Fedora => Some(Path::new("/etc/pki/ca-trust/source/anchors")),
            LinuxDistro::Arch => Some(Path::new("/etc/ca-certificates/trust-source/anchors")),
            LinuxDistro::Unknown => None,
        }
    }

    fn cert_path(&self) -> Option<PathBuf> {
        self.trust_store_dir()
            .map(|dir| dir.join(TRUST_STORE_CERT_NAME))
    }

    fn update_command(&self) -> Option<&'static [&'static str]> {
        match self {
            LinuxDistro::Debian => Some(&["update-ca-certificates"]),
            LinuxDistro::Fedora => Some(&["update-ca-trust", "extract"]),
            LinuxDistro::Arch => Some(&["trust", "extract-compat"]),
            LinuxDistro::Unknown => None,
        }
    }

    /// Package manager invocation that provides NSS `certutil`.
    fn nss_install_command(&self) -> Option<&'static [&'static str]> {
        match self {
            LinuxDistro::Debian => Some(&["apt", "install", "-y", "libnss3-tools"]),
            LinuxDistro::Fedora => Some(&["dnf", "install", "-y", "nss-tools"]),
            LinuxDistro::Arch => Some(&["pacman", "-S", "--noconfirm", "nss"]),
            LinuxDistro::Unknown => None,
        }
    }

    fn from_os_release(content: &str) -> Option<Self> {
        let content = content.to_lowercase();

        if content.contains("debian")
            || content.contains("ubuntu")
            || content.contains("mint")
            || content.contains("pop!_os")
        {
            return Some(LinuxDistro::Debian);
        }

        if content.contains("fedora")
            || content.contains("rhel")
            || content.contains("centos")
            || content.contains("rocky")
            || content.contains("alma")
        {
            return Some(LinuxDistro::Fedora);
        }

        if content.contains("arch") || content.contains("manjaro") || content.contains("endeavour")
        {
            return Some(LinuxDistro::Arch);
        }

        None
    }
}

fn detect_distro() -> LinuxDistro {
    if let Some(distro) = std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|content| LinuxDistro::from_os_release(&content))
    {
        return distro;
    }

    // Fallback: check for update commands
    if Path::new("/usr/sbin/update-ca-certificates").exists() {
        return LinuxDistro::Debian;
    }
    if Path::new("/usr/bin/update-ca-trust").exists() {
        return LinuxDistro::Fedora;
    }
    if Path::new("/usr/bin/trust").exists() {
        return LinuxDistro::Arch;
    }

    LinuxDistro::Unknown
}

/// Firefox profile roots: native, Snap and Flatpak installs.
fn firefox_profile_roots(home: &Path) -> Vec<PathBuf> {
    vec![
        home.join(".mozilla").join("firefox"),
        home.join("snap")
            .join("firefox")
            .join("common")
            .join(".mozilla")
            .join("firefox"),
        home.join(".var")
            .join("app")
            .join("org.mozilla.firefox")
            .join(".mozilla")
            .join("firefox"),
    ]
}

/// Chrome keeps one NSS database per user rather than one per profile.
fn chrome_nss_dir(home: &Path) -> PathBuf {
    home.join(".pki").join("nssdb")
}

pub struct LinuxPlatform {
    distro: LinuxDistro,
    home: Option<PathBuf>,
    firefox_bin: PathBuf,
    chrome_bin: PathBuf,
    /// NSS certutil, looked up on the PATH by default
    certutil: String,
    firefox_processes: &'static [&'static str],
}

impl LinuxPlatform {
    pub fn detect() -> Self {
        Self {
            distro: detect_distro(),
            home: crate::trust::user_home(),
            firefox_bin: PathBuf::from(FIREFOX_BIN_PATH),
            chrome_bin: PathBuf::from(CHROME_BIN_PATH),
            certutil: "certutil".to_string(),
            firefox_processes: nss::FIREFOX_PROCESSES,
        }
    }

    async fn add_to_system_store(&self, cert_path: &Path) -> Result<()> {
        debug!("adding devcert root CA to the Linux system trust store");
        let dest = self.distro.cert_path().ok_or_else(|| {
            Error::TrustStore(
                "Unknown Linux distribution. Please manually install the CA certificate.".into(),
            )
        })?;
        let (cmd, args) = self
            .distro
            .update_command()
            .and_then(|c| c.split_first())
            .ok_or_else(|| {
                Error::TrustStore("No update command available for this distribution.".into())
            })?;

        elevated("cp", [cert_path, dest.as_path()]).await?;
        elevated(cmd, args).await?;
        info!("Added devcert CA to the system trust store ({})", self.name());
        Ok(())
    }

    async fn install_nss_tools(&self) -> Result<()> {
        let (cmd, args) = self
            .distro
            .nss_install_command()
            .and_then(|c| c.split_first())
            .ok_or_else(|| Error::CommandNotFound {
                command: "certutil".to_string(),
                hint: process::install_hint("certutil"),
            })?;
        debug!("NSS tooling is not installed, installing it with {}", cmd);
        elevated(cmd, args).await?;
        Ok(())
    }

    async fn add_to_firefox(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        debug!("Firefox install detected, adding devcert root CA to Firefox trust stores");

        if !process::command_exists(&self.certutil).await {
            if options.skip_certutil_install {
                debug!("certutil is missing and installing it was skipped, using the manual flow");
                let firefox_bin = self.firefox_bin.to_string_lossy().into_owned();
                return firefox::open_certificate_in_firefox(
                    &[firefox_bin.as_str()],
                    cert_path,
                    ui,
                )
                .await;
            }
            self.install_nss_tools().await?;
        }

        let Some(home) = &self.home else {
            warn!("Could not determine the home directory, skipping Firefox profiles");
            return Ok(());
        };

        nss::close_processes(ui, self.firefox_processes, options.firefox_close_timeout).await?;
        for root in firefox_profile_roots(home) {
            nss::add_certificate_to_nss_cert_db(
                &nss::children_glob(&root),
                cert_path,
                &self.certutil,
            )
            .await?;
        }
        Ok(())
    }

    async fn add_to_chrome(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        debug!("Chrome install detected, adding devcert root CA to the Chrome trust store");

        if !process::command_exists(&self.certutil).await {
            return ui.warn_chrome_on_linux_without_certutil().await;
        }

        let Some(home) = &self.home else {
            warn!("Could not determine the home directory, skipping Chrome");
            return Ok(());
        };

        nss::close_processes(ui, self.firefox_processes, options.firefox_close_timeout).await?;
        let pattern = glob::Pattern::escape(&chrome_nss_dir(home).to_string_lossy());
        nss::add_certificate_to_nss_cert_db(&pattern, cert_path, &self.certutil).await?;
        Ok(())
    }

    /// Firefox then Chrome. Chrome is attempted even when Firefox failed; the
    /// Firefox error wins.
    async fn add_to_browsers(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        let firefox_result = if self.firefox_bin.exists() {
            self.add_to_firefox(cert_path, options, ui).await
        } else {
            debug!("Firefox does not appear to be installed, skipping Firefox-specific steps");
            Ok(())
        };
        if let Err(e) = &firefox_result {
            warn!("Firefox trust store installation failed: {}", e);
        }

        let chrome_result = if self.chrome_bin.exists() {
            self.add_to_chrome(cert_path, options, ui).await
        } else {
            debug!("Chrome does not appear to be installed, skipping Chrome-specific steps");
            Ok(())
        };

        firefox_result.and(chrome_result)
    }
}

#[async_trait]
impl Platform for LinuxPlatform {
    async fn add_to_trust_stores(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        let cert_path = validate_cert_path(cert_path)?;

        self.add_to_system_store(&cert_path).await?;
        self.add_to_browsers(&cert_path, options, ui).await
    }

    async fn add_domain_to_host_file_if_missing(&self, domain: &str) -> Result<()> {
        crate::trust::append_hosts_entry(&crate::hosts::system_hosts_path(), domain).await
    }

    async fn read_protected_file(
        &self,
        path: &Path,
        _ui: &dyn UserInterface,
        _session: &PassphraseSession,
    ) -> Result<Vec<u8>> {
        crate::trust::read_root_owned(path).await
    }

    async fn write_protected_file(
        &self,
        path: &Path,
        contents: &[u8],
        _ui: &dyn UserInterface,
        _session: &PassphraseSession,
    ) -> Result<()> {
        crate::trust::write_root_owned(path, contents).await
    }

    fn name(&self) -> &'static str {
        match self.distro {
            LinuxDistro::Debian => "Debian/Ubuntu ca-certificates",
            LinuxDistro::Fedora => "Fedora/RHEL ca-trust",
            LinuxDistro::Arch => "Arch trust",
            LinuxDistro::Unknown => "Linux (unknown)",
        }
    }
}
