// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::Result;
use crate::process::{self, elevated};
use crate::protect::{self, PassphraseSession};
use crate::trust::{firefox, nss, validate_cert_path, Platform, TrustOptions};
use crate::ui::UserInterface;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// `cmd /C start "" firefox <url>`; the empty string is the window title.
const FIREFOX_LAUNCHER: &[&str] = &["cmd", "/C", "start", "", "firefox"];

fn firefox_profiles_root(appdata: Option<&OsStr>) -> Option<PathBuf> {
    appdata.map(|appdata| {
        PathBuf::from(appdata)
            .join("Mozilla")
            .join("Firefox")
            .join("Profiles")
    })
}

/// `NSS_CERTUTIL` with surrounding quotes removed, if set.
fn nss_certutil_from_env(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Argument for `powershell -EncodedCommand`: base64 of the UTF-16LE script.
fn encode_powershell(script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    BASE64.encode(utf16)
}

pub struct WindowsPlatform {
    hosts_path: PathBuf,
    /// Windows' own certutil, which manages the OS certificate stores
    certutil: String,
    /// NSS certutil from `NSS_CERTUTIL`; without it Firefox is set up by hand
    nss_certutil: Option<String>,
    firefox_profiles: Option<PathBuf>,
    firefox_launcher: Vec<String>,
    firefox_processes: &'static [&'static str],
}

impl WindowsPlatform {
    pub fn new() -> Self {
        Self {
            hosts_path: crate::hosts::system_hosts_path(),
            certutil: "certutil".to_string(),
            nss_certutil: nss_certutil_from_env(std::env::var("NSS_CERTUTIL").ok().as_deref()),
            firefox_profiles: firefox_profiles_root(std::env::var_os("APPDATA").as_deref()),
            firefox_launcher: FIREFOX_LAUNCHER.iter().map(|s| s.to_string()).collect(),
            firefox_processes: nss::FIREFOX_PROCESSES,
        }
    }

    async fn add_to_firefox(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        match (&self.nss_certutil, &self.firefox_profiles) {
            (Some(certutil), Some(root)) => {
                nss::close_processes(ui, self.firefox_processes, options.firefox_close_timeout)
                    .await?;
                nss::add_certificate_to_nss_cert_db(&nss::children_glob(root), cert_path, certutil)
                    .await?;
                Ok(())
            }
            _ => {
                debug!("NSS_CERTUTIL is not set, using the manual Firefox flow");
                let launcher: Vec<&str> =
                    self.firefox_launcher.iter().map(String::as_str).collect();
                firefox::open_certificate_in_firefox(&launcher, cert_path, ui).await
            }
        }
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for WindowsPlatform {
    async fn add_to_trust_stores(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()> {
        let cert_path = validate_cert_path(cert_path)?;

        debug!("adding devcert root CA to the Windows user root store");
        match process::run(
            &self.certutil,
            [
                OsStr::new("-addstore"),
                OsStr::new("-user"),
                OsStr::new("root"),
                cert_path.as_os_str(),
            ],
        )
        .await
        {
            Ok(_) => info!("Added devcert CA to the Windows certificate store"),
            Err(e) => warn!("Failed to add devcert CA to the Windows certificate store: {}", e),
        }

        // Firefox is an extra on Windows; nothing here fails the install
        if let Err(e) = self.add_to_firefox(&cert_path, options, ui).await {
            debug!("Firefox install failed, continuing without it: {}", e);
        }
        Ok(())
    }

    async fn add_domain_to_host_file_if_missing(&self, domain: &str) -> Result<()> {
        let existing = crate::hosts::read(&self.hosts_path)?;
        if crate::hosts::contains(&existing, domain) {
            debug!("{} already present in {}", domain, self.hosts_path.display());
            return Ok(());
        }

        let hosts_path = crate::fs::path_to_str(&self.hosts_path)?;
        let text = crate::hosts::append_text(&existing, domain);
        let script = format!(
            "Add-Content -NoNewline -Path {} -Value {}",
            quote_powershell(hosts_path),
            quote_powershell(&text)
        );
        let encoded = encode_powershell(&script);
        elevated(
            "powershell",
            [
                "-NoProfile",
                "-NonInteractive",
                "-EncodedCommand",
                encoded.as_str(),
            ],
        )
        .await?;
        info!(
            "Added {} to {}",
            crate::hosts::entry_line(domain),
            self.hosts_path.display()
        );
        Ok(())
    }

    async fn read_protected_file(
        &self,
        path: &Path,
        ui: &dyn UserInterface,
        session: &PassphraseSession,
    ) -> Result<Vec<u8>> {
        protect::read_encrypted(path, ui, session).await
    }

    async fn write_protected_file(
        &self,
        path: &Path,
        contents: &[u8],
        ui: &dyn UserInterface,
        session: &PassphraseSession,
    ) -> Result<()> {
        protect::write_encrypted(path, contents, ui, session).await
    }

    fn name(&self) -> &'static str {
        "Windows Certificate Store"
    }
}
