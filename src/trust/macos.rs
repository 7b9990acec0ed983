// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::Result;
use crate::process::{self, elevated};
use crate::protect::PassphraseSession;
use crate::trust::{firefox, nss, validate_cert_path, Platform, TrustOptions};
use crate::ui::UserInterface;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";
const FIREFOX_BUNDLE_PATH: &str = "/Applications/Firefox.app";

fn firefox_bin_path() -> PathBuf {
    Path::new(FIREFOX_BUNDLE_PATH)
        .join("Contents")
        .join("MacOS")
        .join("firefox")
}

fn firefox_profiles_root(home: &Path) -> PathBuf {
    home.join("Library")
        .join("Application Support")
        .join("Firefox")
        .join("Profiles")
}

/// `brew list -1` prints one formula per line.
fn brew_list_has_nss(listing: &str) -> bool {
    listing.lines().any(|line| line.trim() == "nss")
}

pub struct MacOsPlatform {
    home: Option<PathBuf>,
}

impl MacOsPlatform {
    pub fn new() -> Self {
        Self {
            home: crate::trust::user_home(),
        }
    }

    async fn is_nss_installed(&self) -> bool {
        match process::run("brew", ["list", "-1"]).await {
            Ok(output) => brew_list_has_nss(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                debug!("could not list Homebrew formulae: {}", e);
                false
            }
        }
    }

    async fn certutil_path(&self) -> Result<String> {
        let output = process::run("brew", ["--prefix", "nss"]).await?;
        let prefix = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Path::new(&prefix)
            .join("bin")
            .join("certutil")
            .to_string_lossy()
            .into_owned())
    }

    async fn add_to_firefox(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        debug!("Firefox install detected, adding devcert root CA to the Firefox trust store");

        if !self.is_nss_installed().await {
            let brew_available = process::command_exists("brew").await;
            if options.skip_certutil_install || !brew_available {
                if !brew_available {
                    debug!("Homebrew is not installed, so NSS cannot be installed automatically");
                }
                debug!("using the manual Firefox flow instead of certutil");
                let firefox_bin = firefox_bin_path().to_string_lossy().into_owned();
                return firefox::open_certificate_in_firefox(
                    &[firefox_bin.as_str()],
                    cert_path,
                    ui,
                )
                .await;
            }
            debug!("certutil is not installed, installing NSS with Homebrew");
            process::run("brew", ["install", "nss"]).await?;
        }

        let Some(home) = &self.home else {
            warn!("Could not determine the home directory, skipping Firefox profiles");
            return Ok(());
        };

        let certutil = self.certutil_path().await?;
        nss::close_firefox(ui, options.firefox_close_timeout).await?;
        nss::add_certificate_to_nss_cert_db(
            &nss::children_glob(&firefox_profiles_root(home)),
            cert_path,
            &certutil,
        )
        .await?;
        Ok(())
    }
}

impl Default for MacOsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for MacOsPlatform {
    async fn add_to_trust_stores(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        let cert_path = validate_cert_path(cert_path)?;

        debug!("adding devcert root CA to the macOS system keychain");
        elevated(
            "security",
            [
                OsStr::new("add-trusted-cert"),
                OsStr::new("-d"),
                OsStr::new("-r"),
                OsStr::new("trustRoot"),
                OsStr::new("-k"),
                OsStr::new(SYSTEM_KEYCHAIN),
                OsStr::new("-p"),
                OsStr::new("ssl"),
                OsStr::new("-p"),
                OsStr::new("basic"),
                cert_path.as_os_str(),
            ],
        )
        .await?;
        info!("Added devcert CA to the macOS system keychain");

        if Path::new(FIREFOX_BUNDLE_PATH).exists() {
            self.add_to_firefox(&cert_path, options, ui).await?;
        } else {
            debug!("Firefox does not appear to be installed, skipping Firefox-specific steps");
        }
        Ok(())
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
        "macOS Keychain"
    }
}
