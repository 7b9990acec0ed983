// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Platform not supported: \"{0}\"")]
    UnsupportedPlatform(String),

    #[error("OpenSSL not found: OpenSSL is required to generate SSL certificates - make sure it is installed and available in your PATH")]
    OpenSslNotFound,

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid validity period: {0}")]
    InvalidDays(String),

    #[error("Invalid path (non-UTF8): {0}")]
    InvalidPath(PathBuf),

    #[error("Trust store operation failed: {0}")]
    TrustStore(String),

    #[error("Sudo authentication failed or was cancelled.\nTrust store installation requires elevated privileges.")]
    SudoFailed,

    #[error("Command '{command}' not found.\n{hint}")]
    CommandNotFound { command: String, hint: String },

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Incorrect password or corrupted encrypted file")]
    PasswordIncorrect,

    #[error("Encryption failed: {0}")]
    KeyEncryption(String),

    #[error("Decryption failed: {0}")]
    KeyDecryption(String),

    #[error("Firefox is still running after {seconds} seconds. Quit Firefox and try again.")]
    FirefoxStillRunning { seconds: u64 },

    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("User prompt failed: {0}")]
    Prompt(String),

    #[error("{0} | This is a bug in devcert, please report the issue")]
    Reportable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
