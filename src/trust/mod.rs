// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

pub mod firefox;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
pub mod nss;
// Built on every platform under test so its sequencing runs against stub tools
#[cfg(any(windows, test))]
#[cfg_attr(not(windows), allow(dead_code))]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;
#[cfg(target_os = "macos")]
pub use macos::MacOsPlatform;
#[cfg(windows)]
pub use windows::WindowsPlatform;

use crate::error::{Error, Result};
use crate::protect::PassphraseSession;
use crate::ui::UserInterface;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Knobs for [`Platform::add_to_trust_stores`].
#[derive(Debug, Clone, Default)]
pub struct TrustOptions {
    /// Never install NSS tooling; use the manual Firefox flow instead.
    pub skip_certutil_install: bool,
    /// Give up waiting for Firefox to exit after this long.
    pub firefox_close_timeout: Option<Duration>,
}

/// Operating-system specific trust and privileged-file operations.
///
/// Every method may run elevated commands and therefore block on a password
/// prompt.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Trust the CA at `cert_path` in the system store and in any browser
    /// store that can be reached.
    async fn add_to_trust_stores(
        &self,
        cert_path: &Path,
        options: &TrustOptions,
        ui: &dyn UserInterface,
    ) -> Result<()>;

    /// Append a loopback entry for `domain` unless the hosts file already
    /// mentions it.
    async fn add_domain_to_host_file_if_missing(&self, domain: &str) -> Result<()>;

    async fn read_protected_file(
        &self,
        path: &Path,
        ui: &dyn UserInterface,
        session: &PassphraseSession,
    ) -> Result<Vec<u8>>;

    async fn write_protected_file(
        &self,
        path: &Path,
        contents: &[u8],
        ui: &dyn UserInterface,
        session: &PassphraseSession,
    ) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// The platform implementation for the running operating system.
pub fn current() -> Result<Box<dyn Platform>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::MacOsPlatform::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxPlatform::detect()))
    }

    #[cfg(windows)]
    {
        Ok(Box::new(windows::WindowsPlatform::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
    {
        Err(Error::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }
}

/// Validate a certificate path before handing it to trust store tools.
pub fn validate_cert_path(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(Error::TrustStore(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }

    let canonical = path.canonicalize().map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Would be read as an option by certutil and friends
    if canonical.to_string_lossy().starts_with('-') {
        return Err(Error::TrustStore(format!(
            "Path cannot start with dash: {}",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Home directory of the invoking user, even under sudo.
#[cfg(unix)]
pub fn user_home() -> Option<PathBuf> {
    if let Ok(sudo_user) = std::env::var("SUDO_USER") {
        if sudo_user
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            for root in ["/home", "/Users"] {
                let home = PathBuf::from(root).join(&sudo_user);
                if home.is_dir() {
                    return Some(home);
                }
            }
        }
    }

    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Read a root-owned file through `sudo cat`.
#[cfg(unix)]
pub(crate) async fn read_root_owned(path: &Path) -> Result<Vec<u8>> {
    let output = crate::process::elevated("cat", [path]).await?;
    Ok(output.stdout)
}

/// Replace `path` with `contents`, owned by root with mode 0600.
#[cfg(unix)]
pub(crate) async fn write_root_owned(path: &Path, contents: &[u8]) -> Result<()> {
    use crate::process::elevated;

    if path.exists() {
        elevated("rm", [path]).await?;
    }
    crate::fs::write_secret_file(path, contents)?;
    elevated("chown", [Path::new("0"), path]).await?;
    elevated("chmod", [Path::new("600"), path]).await?;
    Ok(())
}

/// Append a loopback entry with `sudo tee -a` when `domain` is missing.
#[cfg(unix)]
pub(crate) async fn append_hosts_entry(hosts_path: &Path, domain: &str) -> Result<()> {
    let existing = crate::hosts::read(hosts_path)?;
    if crate::hosts::contains(&existing, domain) {
        tracing::debug!("{} already present in {}", domain, hosts_path.display());
        return Ok(());
    }

    let text = crate::hosts::append_text(&existing, domain);
    crate::process::elevated_with_input(
        "tee",
        [std::ffi::OsStr::new("-a"), hosts_path.as_os_str()],
        text.as_bytes(),
    )
    .await?;
    tracing::info!("Added {} to {}", crate::hosts::entry_line(domain), hosts_path.display());
    Ok(())
}
