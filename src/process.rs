// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Run external commands (OpenSSL, OS trust utilities, certutil, sudo).

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

fn display_command(command: &Command) -> String {
    let std_command = command.as_std();
    let mut line = std_command.get_program().to_string_lossy().into_owned();
    for arg in std_command.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Get installation hint for missing commands
pub fn install_hint(command: &str) -> String {
    match command {
        "openssl" => "Install OpenSSL and make sure it is on your PATH".to_string(),
        "sudo" => {
            "Sudo is required for trust store operations. Please install sudo or run as root."
                .to_string()
        }
        "update-ca-certificates" => {
            "Install ca-certificates package: sudo apt install ca-certificates".to_string()
        }
        "update-ca-trust" => {
            "Install ca-certificates package: sudo dnf install ca-certificates".to_string()
        }
        "trust" => "Install p11-kit-trust package: sudo pacman -S p11-kit".to_string(),
        "certutil" => {
            "Install the NSS tools (libnss3-tools, nss-tools or nss) to manage browser trust stores"
                .to_string()
        }
        "brew" => "Install Homebrew from https://brew.sh".to_string(),
        _ => format!("Please install the '{}' command", command),
    }
}

/// Check if sudo error indicates authentication failure
fn is_sudo_auth_failure(stderr: &str) -> bool {
    stderr.contains("sudo: no password was provided")
        || stderr.contains("sudo: a password is required")
        || stderr.contains("Sorry, try again")
        || stderr.contains("sudo: 3 incorrect password attempts")
        || stderr.contains("Authentication failure")
}

/// Spawn `command`, wait for it, and fail on a non-zero exit status.
pub async fn exec(mut command: Command, input: Option<&[u8]>) -> Result<Output> {
    let line = display_command(&command);
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    debug!("exec: `{}`", line);

    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CommandNotFound {
                hint: install_hint(&program),
                command: program.clone(),
            }
        } else {
            Error::Command {
                command: line.clone(),
                stderr: e.to_string(),
            }
        }
    })?;

    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await.map_err(|e| Error::Command {
                command: line.clone(),
                stderr: e.to_string(),
            })?;
            // Dropping closes the pipe so the child sees EOF
            drop(stdin);
        }
    }

    let output = child.wait_with_output().await.map_err(|e| Error::Command {
        command: line.clone(),
        stderr: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if program == "sudo" && is_sudo_auth_failure(&stderr) {
            return Err(Error::SudoFailed);
        }
        let stderr = if stderr.trim().is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr.trim().to_string()
        };
        return Err(Error::Command {
            command: line,
            stderr,
        });
    }

    Ok(output)
}

/// Run a program to completion.
pub async fn run<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    exec(command, None).await
}

/// Run a program, feeding `input` on stdin.
pub async fn run_with_input<I, S>(program: &str, args: I, input: &[u8]) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    exec(command, Some(input)).await
}

/// Run a program with elevated privileges.
///
/// On Unix this goes through `sudo`, which may prompt on the inherited terminal.
#[cfg(unix)]
pub async fn elevated<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new("sudo");
    command.arg(program).args(args);
    exec(command, None).await
}

/// Like [`elevated`], feeding `input` on stdin.
#[cfg(unix)]
pub async fn elevated_with_input<I, S>(program: &str, args: I, input: &[u8]) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new("sudo");
    command.arg(program).args(args);
    exec(command, Some(input)).await
}

/// Run a program with elevated privileges.
///
/// On Windows this raises a UAC prompt through PowerShell and waits for the
/// elevated process to exit.
#[cfg(windows)]
pub async fn elevated<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let quoted: Vec<String> = args
        .into_iter()
        .map(|a| format!("'{}'", a.as_ref().to_string_lossy().replace('\'', "''")))
        .collect();
    let script = if quoted.is_empty() {
        format!(
            "$p = Start-Process -FilePath '{}' -Verb RunAs -Wait -PassThru; exit $p.ExitCode",
            program
        )
    } else {
        format!(
            "$p = Start-Process -FilePath '{}' -ArgumentList {} -Verb RunAs -Wait -PassThru; exit $p.ExitCode",
            program,
            quoted.join(",")
        )
    };
    run(
        "powershell",
        ["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
    )
    .await
}

/// Start a program without waiting for it to exit (browsers).
pub fn launch<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let line = display_command(&command);
    debug!("launch: `{}`", line);

    command.spawn().map(drop).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CommandNotFound {
                command: program.to_string(),
                hint: install_hint(program),
            }
        } else {
            Error::Command {
                command: line,
                stderr: e.to_string(),
            }
        }
    })
}

/// Check whether `name` resolves to an executable on the PATH.
///
/// A name with a directory component is checked as a file path instead.
pub async fn command_exists(name: &str) -> bool {
    let path = std::path::Path::new(name);
    if path.components().count() > 1 {
        return path.is_file();
    }

    #[cfg(windows)]
    let finder = "where";
    #[cfg(not(windows))]
    let finder = "which";

    Command::new(finder)
        .arg(name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = run("sh", ["-c", "printf hello"])
            .await
            .expect("sh should run");
        assert_eq!(output.stdout, b"hello");
    }

    #[tokio::test]
    async fn test_run_reports_stderr_on_failure() {
        let err = run("sh", ["-c", "echo broken >&2; exit 3"])
            .await
            .expect_err("non-zero exit should fail");
        match err {
            Error::Command { command, stderr } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary_is_command_not_found() {
        let err = run("devcert-definitely-missing-binary", Vec::<&str>::new())
            .await
            .expect_err("missing binary should fail");
        assert!(matches!(err, Error::CommandNotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_with_input_feeds_stdin() {
        let output = run_with_input("cat", Vec::<&str>::new(), b"piped")
            .await
            .expect("cat should run");
        assert_eq!(output.stdout, b"piped");
    }

    #[tokio::test]
    async fn test_command_exists() {
        assert!(command_exists("sh").await);
        assert!(!command_exists("devcert-definitely-missing-binary").await);

        let dir = tempfile::tempdir().expect("temp dir should be created");
        let tool = dir.path().join("tool");
        assert!(!command_exists(&tool.to_string_lossy()).await);
        std::fs::write(&tool, b"#!/bin/sh\n").expect("tool should be written");
        assert!(command_exists(&tool.to_string_lossy()).await);
    }

    #[tokio::test]
    async fn test_launch_missing_binary_fails() {
        let err = launch("devcert-definitely-missing-binary", ["http://localhost"])
            .expect_err("missing browser should fail");
        assert!(matches!(err, Error::CommandNotFound { .. }));
    }
}
