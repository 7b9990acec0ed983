// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Loopback entries in the system hosts file.
//!
//! Membership is a plain substring test on the file contents. It does not
//! normalise case or trailing dots, so `app.local` is considered present when
//! `myapp.local` is already listed.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const LOOPBACK: &str = "127.0.0.1";

#[cfg(windows)]
pub fn system_hosts_path() -> PathBuf {
    let root = std::env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
    PathBuf::from(root)
        .join("System32")
        .join("drivers")
        .join("etc")
        .join("hosts")
}

#[cfg(not(windows))]
pub fn system_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

/// The line appended for `domain`, without a trailing newline.
pub fn entry_line(domain: &str) -> String {
    format!("{} {}", LOOPBACK, domain)
}

pub fn contains(contents: &str, domain: &str) -> bool {
    contents.contains(domain)
}

/// Text to append so that `entry_line(domain)` ends up on its own line.
pub fn append_text(existing: &str, domain: &str) -> String {
    let mut text = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&entry_line(domain));
    text.push('\n');
    text
}

/// Read a hosts file; a missing file reads as empty.
pub fn read(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::ReadFile {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Append `domain` to a hosts file the current user can write.
///
/// Returns `false` when the domain was already present.
pub fn add_if_missing(path: &Path, domain: &str) -> Result<bool> {
    use std::io::Write;

    let existing = read(path)?;
    if contains(&existing, domain) {
        return Ok(false);
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
    file.write_all(append_text(&existing, domain).as_bytes())
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(true)
}
