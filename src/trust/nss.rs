// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! NSS certificate databases (Firefox profiles, the Chrome user database) and
//! keeping Firefox closed while they are modified.

use crate::error::{Error, Result};
use crate::process;
use crate::ui::UserInterface;
use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Nickname the CA is stored under in every NSS database.
pub const NICKNAME: &str = "devcert";

/// Delay between Firefox liveness checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A directory holding one or both NSS database formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NssDatabase {
    pub dir: PathBuf,
    /// `cert8.db` (Berkeley DB format)
    pub legacy: bool,
    /// `cert9.db` (SQLite format)
    pub modern: bool,
}

impl NssDatabase {
    fn probe(dir: PathBuf) -> Option<Self> {
        let legacy = dir.join("cert8.db").is_file();
        let modern = dir.join("cert9.db").is_file();
        (legacy || modern).then_some(Self {
            dir,
            legacy,
            modern,
        })
    }

    /// `-d` arguments for certutil, one per format present.
    pub fn certutil_targets(&self) -> Vec<String> {
        let dir = self.dir.to_string_lossy();
        let mut targets = Vec::new();
        if self.legacy {
            targets.push(dir.to_string());
        }
        if self.modern {
            targets.push(format!("sql:{}", dir));
        }
        targets
    }
}

/// Glob matching every direct child of `root`, with `root` itself escaped.
pub fn children_glob(root: &Path) -> String {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    format!("{}{}*", escaped, std::path::MAIN_SEPARATOR)
}

/// Expand `dir_glob` and keep the directories that contain an NSS database.
pub fn nss_databases(dir_glob: &str) -> Vec<NssDatabase> {
    let paths = match glob::glob(dir_glob) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Invalid NSS directory pattern {}: {}", dir_glob, e);
            return Vec::new();
        }
    };

    paths
        .flatten()
        .filter(|p| p.is_dir())
        .filter_map(|dir| {
            debug!("checking to see if {} is an NSS database directory", dir.display());
            NssDatabase::probe(dir)
        })
        .collect()
}

/// Install `cert_path` as a trusted CA in every NSS database under `dir_glob`.
///
/// Each database is handled on its own; a failure is logged and the remaining
/// databases are still attempted. Returns how many databases were updated.
pub async fn add_certificate_to_nss_cert_db(
    dir_glob: &str,
    cert_path: &Path,
    certutil: &str,
) -> Result<usize> {
    debug!("trying to install certificate into NSS databases in {}", dir_glob);

    let mut updated = 0;
    for database in nss_databases(dir_glob) {
        for target in database.certutil_targets() {
            // A stale entry from an earlier CA would shadow the new one
            let _ = process::run(certutil, ["-D", "-d", target.as_str(), "-n", NICKNAME]).await;

            let added = process::run(
                certutil,
                [
                    OsStr::new("-A"),
                    OsStr::new("-d"),
                    OsStr::new(&target),
                    OsStr::new("-t"),
                    OsStr::new("C,,"),
                    OsStr::new("-i"),
                    cert_path.as_os_str(),
                    OsStr::new("-n"),
                    OsStr::new(NICKNAME),
                ],
            )
            .await;

            match added {
                Ok(_) => {
                    info!("Added devcert CA to NSS database {}", target);
                    updated += 1;
                }
                Err(e) => warn!("Failed to add devcert CA to NSS database {}: {}", target, e),
            }
        }
    }

    debug!("finished installing certificate in NSS databases in {}", dir_glob);
    Ok(updated)
}

/// Executable names a running Firefox shows up under.
pub const FIREFOX_PROCESSES: &[&str] = &["firefox", "firefox-bin", "firefox-esr"];

/// Whether any line of a process listing names one of `names`.
///
/// Accepts `ps -A -o comm=` output (one executable per line, possibly a full
/// path) and `tasklist /NH /FO CSV` output (quoted image name first). Only the
/// executable's base name is compared, so arguments never match.
pub fn listing_has_process(listing: &str, names: &[&str]) -> bool {
    listing.lines().any(|line| {
        let line = line.trim();
        let image = match line.strip_prefix('"') {
            Some(rest) => rest.split('"').next().unwrap_or(rest),
            None => line,
        };
        let base = image.rsplit(['/', '\\']).next().unwrap_or(image);
        let lower = base.to_ascii_lowercase();
        let base = lower.strip_suffix(".exe").unwrap_or(&lower);
        names.iter().any(|name| base.eq_ignore_ascii_case(name))
    })
}

/// Whether a process whose executable is one of `names` is running.
pub async fn is_process_running(names: &[&str]) -> bool {
    #[cfg(windows)]
    let listing = process::run("tasklist", ["/NH", "/FO", "CSV"]).await;
    #[cfg(not(windows))]
    let listing = process::run("ps", ["-A", "-o", "comm="]).await;

    match listing {
        Ok(output) => listing_has_process(&String::from_utf8_lossy(&output.stdout), names),
        Err(e) => {
            debug!("could not list processes: {}", e);
            false
        }
    }
}

/// Whether a Firefox process is running.
pub async fn is_firefox_open() -> bool {
    is_process_running(FIREFOX_PROCESSES).await
}

/// Ask the user to quit Firefox and wait until it has exited.
///
/// Firefox keeps its NSS database in memory and writes it back on exit, which
/// would undo a concurrent certutil change. With `timeout` unset the wait is
/// unbounded.
pub async fn close_firefox(ui: &dyn UserInterface, timeout: Option<Duration>) -> Result<()> {
    close_processes(ui, FIREFOX_PROCESSES, timeout).await
}

/// [`close_firefox`] for an explicit set of executable names.
pub async fn close_processes(
    ui: &dyn UserInterface,
    names: &[&str],
    timeout: Option<Duration>,
) -> Result<()> {
    wait_for_exit(ui, timeout, || is_process_running(names)).await
}

pub(crate) async fn wait_for_exit<F, Fut>(
    ui: &dyn UserInterface,
    timeout: Option<Duration>,
    mut is_open: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !is_open().await {
        return Ok(());
    }

    ui.close_firefox_before_continuing().await?;

    let started = tokio::time::Instant::now();
    while is_open().await {
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return Err(Error::FirefoxStillRunning {
                    seconds: limit.as_secs(),
                });
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}
