// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config file version. Increment when making breaking changes.
const CONFIG_VERSION: u32 = 1;

/// Maximum validity period for the CA and leaf certificates (10 years).
pub const MAX_DAYS: u32 = 3650;

/// RSA modulus sizes accepted for generated keys.
pub const ALLOWED_KEY_BITS: &[u32] = &[2048, 3072, 4096];

/// File names inside a domain directory.
pub const DOMAIN_KEY_FILE: &str = "private-key.key";
pub const DOMAIN_CERT_FILE: &str = "certificate.crt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config file version for future migration support
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default = "default_cert_days")]
    pub cert_days: u32,
    #[serde(default = "default_ca_days")]
    pub ca_days: u32,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    /// Give up waiting for Firefox to quit after this many seconds.
    /// Absent means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firefox_close_timeout_secs: Option<u64>,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_cert_days() -> u32 {
    365
}

fn default_ca_days() -> u32 {
    3650
}

fn default_key_bits() -> u32 {
    2048
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            cert_days: default_cert_days(),
            ca_days: default_ca_days(),
            key_bits: default_key_bits(),
            firefox_close_timeout_secs: None,
        }
    }
}

/// Validate that the validity period is within allowed bounds.
pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::InvalidDays("days cannot be 0".into()));
    }
    if days > MAX_DAYS {
        return Err(Error::InvalidDays(format!(
            "days cannot exceed {} (10 years)",
            MAX_DAYS
        )));
    }
    Ok(())
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        if config.config_version > CONFIG_VERSION {
            tracing::warn!(
                "config.toml version {} is newer than supported version {}; some settings may be ignored",
                config.config_version,
                CONFIG_VERSION
            );
        } else if config.config_version < CONFIG_VERSION {
            config.config_version = CONFIG_VERSION;
            if path.exists() {
                config.save(path)?;
            }
        }

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_days(self.cert_days)?;
        if self.ca_days == 0 || self.ca_days > MAX_DAYS {
            return Err(Error::InvalidDays(format!(
                "ca_days must be between 1 and {}, got {}",
                MAX_DAYS, self.ca_days
            )));
        }

        if !ALLOWED_KEY_BITS.contains(&self.key_bits) {
            return Err(Error::Config(format!(
                "key_bits must be one of {:?}, got {}",
                ALLOWED_KEY_BITS, self.key_bits
            )));
        }

        if self.firefox_close_timeout_secs == Some(0) {
            return Err(Error::Config(
                "firefox_close_timeout_secs must be at least 1 (omit it to wait forever)".into(),
            ));
        }

        Ok(())
    }

    pub fn firefox_close_timeout(&self) -> Option<Duration> {
        self.firefox_close_timeout_secs.map(Duration::from_secs)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        crate::fs::atomic_write(path, content.as_bytes())
    }
}

/// On-disk layout of the certificate store.
///
/// ```text
/// <base>/
///   rootCA.key, rootCA.crt, .rnd, config.toml, certificate-authority.cnf
///   domains/<domain>/private-key.key
///   domains/<domain>/certificate.crt
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    pub ca_key: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_config: PathBuf,
    pub rand_file: PathBuf,
    pub domains: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        Ok(Self::with_base(Self::base_dir()?))
    }

    /// Layout rooted at an explicit directory.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            ca_key: base.join("rootCA.key"),
            ca_cert: base.join("rootCA.crt"),
            ca_config: base.join("certificate-authority.cnf"),
            rand_file: base.join(".rnd"),
            domains: base.join("domains"),
            config: base.join("config.toml"),
            base,
        }
    }

    /// Check that a domain name is safe to use as a directory name.
    ///
    /// The name is never rewritten; it is either accepted as-is or rejected.
    pub fn validate_domain(domain: &str) -> Result<()> {
        let reject = |reason: &str| {
            Err(Error::InvalidDomain {
                domain: domain.to_string(),
                reason: reason.into(),
            })
        };

        if domain.is_empty() {
            return reject("domain cannot be empty");
        }
        if domain.contains('\0') {
            return reject("domain contains null byte");
        }
        if domain.contains('%') {
            return reject("domain contains percent encoding (potential path traversal)");
        }
        if domain.contains("..") {
            return reject("domain contains path traversal sequence");
        }
        if domain.contains('/') || domain.contains('\\') {
            return reject("domain contains path separator");
        }
        if domain.starts_with('.') || domain.ends_with('.') {
            return reject("domain cannot start or end with a dot");
        }

        for c in domain.chars() {
            if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != '_' {
                return Err(Error::InvalidDomain {
                    domain: domain.to_string(),
                    reason: format!("domain contains invalid character: '{}'", c),
                });
            }
        }

        Ok(())
    }

    fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_root) = std::env::var("DEVCERT_ROOT") {
            let path = PathBuf::from(&custom_root);
            if !path.is_absolute() {
                return Err(Error::Config(format!(
                    "DEVCERT_ROOT must be an absolute path, got: {}",
                    custom_root
                )));
            }
            return Ok(path);
        }

        // When running with sudo, use the original user's store
        #[cfg(unix)]
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            if sudo_user
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            {
                let user_home = PathBuf::from("/home").join(&sudo_user);
                if user_home.is_dir() {
                    return Ok(user_home.join(".local").join("share").join("devcert"));
                }
            }
        }

        if let Some(proj_dirs) = ProjectDirs::from("", "", "devcert") {
            Ok(proj_dirs.data_dir().to_path_buf())
        } else if let Some(base_dirs) = BaseDirs::new() {
            Ok(base_dirs.data_local_dir().join("devcert"))
        } else {
            Err(Error::Config(
                "Could not determine a per-user data directory. Set DEVCERT_ROOT to choose one."
                    .into(),
            ))
        }
    }

    /// Create the store root (and parents) if missing.
    pub fn ensure_dir(&self) -> Result<()> {
        create_dir_all(&self.base)
    }

    /// `domains/<domain>`, without touching the filesystem.
    pub fn domain_dir(&self, domain: &str) -> Result<PathBuf> {
        Self::validate_domain(domain)?;
        Ok(self.domains.join(domain))
    }

    /// `domains/<domain>/<file>`, without touching the filesystem.
    pub fn path_for_domain(&self, domain: &str, file: &str) -> Result<PathBuf> {
        Ok(self.domain_dir(domain)?.join(file))
    }

    /// Like [`Paths::domain_dir`] but creates the directory.
    pub fn ensure_domain_dir(&self, domain: &str) -> Result<PathBuf> {
        let dir = self.domain_dir(domain)?;
        create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn domain_key(&self, domain: &str) -> Result<PathBuf> {
        self.path_for_domain(domain, DOMAIN_KEY_FILE)
    }

    pub fn domain_cert(&self, domain: &str) -> Result<PathBuf> {
        self.path_for_domain(domain, DOMAIN_CERT_FILE)
    }

    pub fn ca_exists(&self) -> bool {
        self.ca_cert.exists()
    }

    /// Names of every directory under `domains/`, sorted.
    ///
    /// A listed domain may lack a certificate if an earlier run failed midway.
    pub fn list_domains(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.domains) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::ReadDir {
                    path: self.domains.clone(),
                    source: e,
                })
            }
        };

        let mut domains = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::ReadDir {
                path: self.domains.clone(),
                source: e,
            })?;
            if entry.path().is_dir() {
                domains.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        domains.sort();
        Ok(domains)
    }

    /// Delete a domain's directory recursively. Missing is not an error.
    pub fn remove_domain(&self, domain: &str) -> Result<()> {
        let dir = self.domain_dir(domain)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Remove {
                path: dir,
                source: e,
            }),
        }
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cert_days, 365);
        assert_eq!(config.ca_days, 3650);
        assert_eq!(config.key_bits, 2048);
        assert!(config.firefox_close_timeout().is_none());
    }

    #[test]
    fn test_config_load_missing_file() {
        let path = PathBuf::from("/nonexistent/config.toml");
        let config =
            Config::load(&path).expect("Config should load with defaults for missing file");

        assert_eq!(config.cert_days, 365);
        assert_eq!(config.ca_days, 3650);
    }

    #[test]
    fn test_config_load_custom_values() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "cert_days = 7").expect("write cert_days should succeed");
        writeln!(file, "ca_days = 365").expect("write ca_days should succeed");
        writeln!(file, "key_bits = 4096").expect("write key_bits should succeed");
        writeln!(file, "firefox_close_timeout_secs = 120").expect("write timeout should succeed");

        let config = Config::load(file.path()).expect("Config should load successfully");
        assert_eq!(config.cert_days, 7);
        assert_eq!(config.ca_days, 365);
        assert_eq!(config.key_bits, 4096);
        assert_eq!(config.firefox_close_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_config_save_and_load() {
        let file = NamedTempFile::new().expect("temp file should be created");
        let config = Config {
            cert_days: 90,
            ca_days: 730,
            ..Config::default()
        };

        config
            .save(file.path())
            .expect("Config should save successfully");
        let loaded = Config::load(file.path()).expect("Config should load after save");

        assert_eq!(loaded.config_version, 1);
        assert_eq!(loaded.cert_days, 90);
        assert_eq!(loaded.ca_days, 730);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        for line in [
            "cert_days = 0",
            "cert_days = 999999",
            "ca_days = 0",
            "key_bits = 1024",
            "firefox_close_timeout_secs = 0",
        ] {
            let mut file = NamedTempFile::new().expect("temp file should be created");
            writeln!(file, "{}", line).expect("write should succeed");
            assert!(Config::load(file.path()).is_err(), "{} should be rejected", line);
        }
    }

    #[test]
    fn test_paths_respects_devcert_root_env() {
        let original = std::env::var("DEVCERT_ROOT").ok();

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let custom_path = temp_dir.path().join("devcert");
        std::env::set_var("DEVCERT_ROOT", &custom_path);

        let paths = Paths::new().expect("Paths should be created from DEVCERT_ROOT");
        assert_eq!(paths.base, custom_path);
        assert_eq!(paths.ca_cert, custom_path.join("rootCA.crt"));
        assert_eq!(paths.ca_key, custom_path.join("rootCA.key"));
        assert_eq!(paths.rand_file, custom_path.join(".rnd"));
        assert_eq!(paths.domains, custom_path.join("domains"));

        match original {
            Some(val) => std::env::set_var("DEVCERT_ROOT", val),
            None => std::env::remove_var("DEVCERT_ROOT"),
        }
    }

    #[test]
    fn test_validate_domain_accepts_dev_names() {
        for domain in ["example.test", "app.local", "my-app.localhost", "my_app", "localhost"] {
            assert!(Paths::validate_domain(domain).is_ok(), "{}", domain);
        }
    }

    #[test]
    fn test_validate_domain_rejects_unsafe_names() {
        for domain in [
            "",
            "..",
            "../etc/passwd",
            "a..b",
            "foo/bar",
            "foo\\bar",
            "foo\0bar",
            "foo%2fbar",
            ".leading",
            "trailing.",
            "foo bar",
            "foo:bar",
        ] {
            assert!(Paths::validate_domain(domain).is_err(), "{:?}", domain);
        }
    }

    #[test]
    fn test_domain_paths_do_not_touch_filesystem() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let paths = Paths::with_base(temp_dir.path());

        let cert = paths
            .domain_cert("example.test")
            .expect("example.test should be a valid domain");
        assert_eq!(
            cert,
            temp_dir
                .path()
                .join("domains")
                .join("example.test")
                .join("certificate.crt")
        );
        assert!(!paths.domains.exists());
        assert!(paths.list_domains().expect("listing should succeed").is_empty());
    }

    #[test]
    fn test_ensure_domain_dir_then_list_and_remove() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let paths = Paths::with_base(temp_dir.path());

        paths
            .ensure_domain_dir("b.test")
            .expect("domain dir should be created");
        paths
            .ensure_domain_dir("a.test")
            .expect("domain dir should be created");

        assert_eq!(
            paths.list_domains().expect("listing should succeed"),
            vec!["a.test".to_string(), "b.test".to_string()]
        );

        paths.remove_domain("a.test").expect("removal should succeed");
        paths
            .remove_domain("never-issued.test")
            .expect("removing a missing domain should succeed");

        assert_eq!(
            paths.list_domains().expect("listing should succeed"),
            vec!["b.test".to_string()]
        );
    }
}
