// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))
}

/// Sibling path with a random suffix, on the same filesystem as `path`.
fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    Ok(parent.join(format!(".tmp-{:x}", random_suffix)))
}

/// Atomically write data to a file using a temporary file and rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs;
    use std::io::Write;

    let temp_path = temp_sibling(path)?;

    let mut file = fs::File::create(&temp_path).map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    file.sync_all().map_err(|e| Error::WriteFile {
        path: temp_path.clone(),
        source: e,
    })?;

    drop(file);

    rename_into_place(&temp_path, path)
}

/// Atomically write a secret file (owner read/write only) via temp file and rename.
pub fn atomic_write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_sibling(path)?;
    write_secret_file(&temp_path, contents)?;
    rename_into_place(&temp_path, path)
}

/// Move a finished temp file over `dest`, cleaning the temp file up on failure.
pub fn rename_into_place(temp_path: &Path, dest: &Path) -> Result<()> {
    std::fs::rename(temp_path, dest).map_err(|e| {
        if temp_path.exists() {
            let _ = std::fs::remove_file(temp_path);
        }
        Error::WriteFile {
            path: dest.to_path_buf(),
            source: e,
        }
    })
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(unix)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

// Secrets on Windows are encrypted at rest by the platform layer instead of
// relying on ACLs, see `protect`.
#[cfg(not(unix))]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// A file that is deleted when the guard goes out of scope.
///
/// Used for material that must only exist on disk while an external tool
/// needs it, such as the decrypted CA key during signing.
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    /// Write `contents` as a secret file next to `near` and guard it.
    pub fn secret_near(near: &Path, contents: &[u8]) -> Result<Self> {
        let path = temp_sibling(near)?;
        write_secret_file(&path, contents)?;
        Ok(Self { path })
    }

    /// Pick an unused path next to `near` for a tool to write into.
    pub fn reserve_near(near: &Path) -> Result<Self> {
        Ok(Self {
            path: temp_sibling(near)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_file_if_exists(&self.path) {
            tracing::warn!("{}", e);
        }
    }
}
