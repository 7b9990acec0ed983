// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Prompts and wizard pages shown to the person running devcert.

use crate::error::{Error, Result};
use crate::protect::ZeroizingString;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Everything devcert needs to ask or tell the user.
///
/// [`TerminalUi`] is the default. Callers embedding devcert in a GUI or a
/// non-interactive harness can supply their own implementation per request.
#[async_trait]
pub trait UserInterface: Send + Sync {
    /// Passphrase used to encrypt protected files on Windows.
    async fn get_windows_encryption_password(&self) -> Result<ZeroizingString>;

    /// Chrome on Linux needs NSS certutil and there is no manual fallback.
    async fn warn_chrome_on_linux_without_certutil(&self) -> Result<()>;

    /// Ask the user to quit Firefox. Returns once the prompt has been shown;
    /// the caller polls until Firefox has exited.
    async fn close_firefox_before_continuing(&self) -> Result<()>;

    /// HTML served at the root of the manual-import server.
    fn firefox_wizard_prompt_page(&self, certificate_url: &str) -> String;

    /// Tell the user Firefox is about to open `url` for the import wizard.
    async fn start_firefox_wizard(&self, url: &str) -> Result<()>;

    /// Block until the user confirms the import wizard is finished.
    async fn wait_for_firefox_wizard(&self) -> Result<()>;
}

/// Interactive prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalUi;

impl TerminalUi {
    async fn wait_for_enter(message: &str) -> Result<()> {
        eprint!("{}", message);
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Prompt(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserInterface for TerminalUi {
    async fn get_windows_encryption_password(&self) -> Result<ZeroizingString> {
        let password = tokio::task::spawn_blocking(|| {
            rpassword::prompt_password("Passphrase protecting the devcert CA key: ")
        })
        .await
        .map_err(|e| Error::Prompt(e.to_string()))?
        .map_err(|e| Error::Prompt(e.to_string()))?;
        Ok(ZeroizingString::new(password))
    }

    async fn warn_chrome_on_linux_without_certutil(&self) -> Result<()> {
        eprintln!(
            "WARNING: Chrome is installed but NSS certutil is not, and installing it\n\
             was skipped. Chrome will keep showing devcert certificates as untrusted\n\
             until certutil is installed and devcert is run again."
        );
        Ok(())
    }

    async fn close_firefox_before_continuing(&self) -> Result<()> {
        eprintln!("Please close Firefox before continuing");
        Ok(())
    }

    fn firefox_wizard_prompt_page(&self, certificate_url: &str) -> String {
        wizard_page(certificate_url)
    }

    async fn start_firefox_wizard(&self, url: &str) -> Result<()> {
        eprintln!(
            "\nFirefox could not be configured automatically, so it will walk you\n\
             through importing the devcert certificate authority instead.\n\n\
             Firefox opens a page with a link to the certificate. Follow the link,\n\
             tick \"Trust this CA to identify websites\", then come back here.\n\n\
             If Firefox does not start, open {url} yourself.\n"
        );
        Self::wait_for_enter("<Press Enter to launch Firefox>").await
    }

    async fn wait_for_firefox_wizard(&self) -> Result<()> {
        Self::wait_for_enter("<Press Enter once Firefox has imported the certificate>").await
    }
}

/// Default import wizard page linking to the hosted certificate.
pub fn wizard_page(certificate_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>devcert: trust the local development CA</title>
  </head>
  <body>
    <h1>Trust devcert's certificate authority</h1>
    <ol>
      <li>Click the link below. Firefox will offer to import a certificate authority.</li>
      <li>Tick <strong>Trust this CA to identify websites</strong> and press <strong>OK</strong>.</li>
      <li>Return to the terminal and press Enter.</li>
    </ol>
    <p><a href="{certificate_url}">Import the devcert certificate</a></p>
  </body>
</html>
"#
    )
}
