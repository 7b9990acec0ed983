// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Config, Paths};
use crate::error::{Error, Result};
use crate::fs::{rename_into_place, TempFileGuard};
use crate::openssl::OpenSsl;
use crate::protect::PassphraseSession;
use crate::trust::{Platform, TrustOptions};
use crate::ui::UserInterface;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const CA_COMMON_NAME: &str = "devcert Local Development CA";
pub const CA_ORG_NAME: &str = "devcert";

/// OpenSSL request config used to self-sign the root certificate.
pub fn ca_request_config() -> String {
    format!(
        "[ req ]
prompt = no
distinguished_name = req_distinguished_name
x509_extensions = v3_ca

[ req_distinguished_name ]
O = {CA_ORG_NAME}
CN = {CA_COMMON_NAME}

[ v3_ca ]
basicConstraints = critical, CA:true
keyUsage = critical, keyCertSign, cRLSign, digitalSignature
subjectKeyIdentifier = hash
authorityKeyIdentifier = keyid:always
"
    )
}

/// Collaborators shared by every step of one certificate request.
pub struct Context<'a> {
    pub paths: &'a Paths,
    pub config: &'a Config,
    pub openssl: &'a OpenSsl,
    pub platform: &'a dyn Platform,
    pub ui: &'a dyn UserInterface,
    pub session: &'a PassphraseSession,
}

/// Create and trust the root CA unless it already exists.
///
/// The CA is considered present when its certificate is on disk. The key is
/// only ever written through the platform's protected-file operation.
pub async fn ensure_ca(ctx: &Context<'_>, trust: &TrustOptions) -> Result<()> {
    let paths = ctx.paths;
    if paths.ca_exists() {
        debug!("root CA found at {}", paths.ca_cert.display());
        return Ok(());
    }

    info!("Creating the devcert root certificate authority");
    paths.ensure_dir()?;
    crate::fs::atomic_write(&paths.ca_config, ca_request_config().as_bytes())?;

    debug!("generating a {}-bit RSA key for the root CA", ctx.config.key_bits);
    let key = Zeroizing::new(ctx.openssl.generate_key(ctx.config.key_bits).await?);
    ctx.platform
        .write_protected_file(&paths.ca_key, &key, ctx.ui, ctx.session)
        .await?;

    let key_file = TempFileGuard::secret_near(&paths.ca_key, &key)?;
    let cert_file = TempFileGuard::reserve_near(&paths.ca_cert)?;
    ctx.openssl
        .self_sign_ca(
            key_file.path(),
            &paths.ca_config,
            ctx.config.ca_days,
            cert_file.path(),
        )
        .await?;
    drop(key_file);

    let info = crate::x509::parse_cert_file(cert_file.path())?;
    if !info.is_ca {
        return Err(Error::Reportable(
            "openssl produced a root certificate without CA:true".to_string(),
        ));
    }
    rename_into_place(cert_file.path(), &paths.ca_cert)?;
    debug!(
        "root CA written to {} (expires {})",
        paths.ca_cert.display(),
        info.expiry_string()
    );

    debug!("adding the root CA to trust stores ({})", ctx.platform.name());
    ctx.platform
        .add_to_trust_stores(&paths.ca_cert, trust, ctx.ui)
        .await?;
    info!("Root CA installed in {}", ctx.platform.name());
    Ok(())
}

/// Decrypt (or read through elevation) the CA key into a temporary 0600 file.
///
/// The file is removed when the returned guard is dropped.
pub async fn ca_key_file(ctx: &Context<'_>) -> Result<TempFileGuard> {
    let key = Zeroizing::new(
        ctx.platform
            .read_protected_file(&ctx.paths.ca_key, ctx.ui, ctx.session)
            .await?,
    );
    TempFileGuard::secret_near(&ctx.paths.ca_key, &key)
}

/// Subject of the stored root certificate, as leaf issuers must render it.
pub fn ca_subject(paths: &Paths) -> Result<String> {
    Ok(crate::x509::parse_cert_file(&paths.ca_cert)?.subject)
}

/// Days left on the stored root certificate.
pub fn ca_days_remaining(paths: &Paths) -> Result<i64> {
    Ok(crate::x509::parse_cert_file(&paths.ca_cert)?.days_remaining())
}
