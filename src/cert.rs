// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::ca::{self, Context};
use crate::error::{Error, Result};
use crate::fs::{
    atomic_write, atomic_write_secret, remove_file_if_exists, rename_into_place, TempFileGuard,
};
use crate::openssl::SignRequest;
use std::path::Path;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Transient intermediates, removed once the certificate is signed.
const REQUEST_CONFIG_FILE: &str = "certificate.cnf";
const CSR_FILE: &str = "certificate.csr";

/// OpenSSL request config for a single-name server certificate.
///
/// `domain` must already have passed [`crate::config::Paths::validate_domain`].
pub fn leaf_request_config(domain: &str) -> String {
    format!(
        "[ req ]
prompt = no
distinguished_name = req_distinguished_name
req_extensions = v3_req

[ req_distinguished_name ]
CN = {domain}

[ v3_req ]
basicConstraints = CA:FALSE
keyUsage = digitalSignature, keyEncipherment
extendedKeyUsage = serverAuth
subjectAltName = @alt_names

[ alt_names ]
DNS.1 = {domain}
"
    )
}

/// Check if a certificate with the given validity will outlive the CA.
/// Returns a warning message if so, None otherwise.
fn ca_expiry_warning(days: u32, ca_days_remaining: i64) -> Option<String> {
    if (days as i64) > ca_days_remaining {
        Some(format!(
            "Certificate validity ({} days) exceeds CA's remaining validity ({} days). \
             The certificate will become invalid when the CA expires.",
            days, ca_days_remaining
        ))
    } else {
        None
    }
}

/// Issue a key and certificate for `domain` unless both already exist.
///
/// The certificate file is the cache marker: it only appears once it has been
/// signed, parsed and checked against the requested name and the CA.
pub async fn ensure_domain_certificate(ctx: &Context<'_>, domain: &str) -> Result<()> {
    let paths = ctx.paths;
    let cert_path = paths.domain_cert(domain)?;
    if cert_path.exists() {
        debug!("certificate for {} found at {}", domain, cert_path.display());
        return Ok(());
    }

    info!("Issuing a certificate for {}", domain);
    let dir = paths.ensure_domain_dir(domain)?;
    let key_path = paths.domain_key(domain)?;

    debug!("generating private key for {}", domain);
    let key = Zeroizing::new(ctx.openssl.generate_key(ctx.config.key_bits).await?);
    atomic_write_secret(&key_path, &key)?;

    let request_config = dir.join(REQUEST_CONFIG_FILE);
    let csr = dir.join(CSR_FILE);
    let signed = sign(ctx, domain, &key_path, &request_config, &csr, &cert_path).await;
    remove_file_if_exists(&request_config)?;
    remove_file_if_exists(&csr)?;
    signed?;

    match ca::ca_days_remaining(paths) {
        Ok(remaining) => {
            if let Some(warning) = ca_expiry_warning(ctx.config.cert_days, remaining) {
                warn!("{}", warning);
            }
        }
        Err(e) => debug!("could not read CA expiry: {}", e),
    }

    info!("Certificate for {} written to {}", domain, cert_path.display());
    Ok(())
}

async fn sign(
    ctx: &Context<'_>,
    domain: &str,
    key_path: &Path,
    request_config: &Path,
    csr: &Path,
    cert_path: &Path,
) -> Result<()> {
    atomic_write(request_config, leaf_request_config(domain).as_bytes())?;

    debug!("generating certificate signing request for {}", domain);
    ctx.openssl.create_csr(key_path, request_config, csr).await?;

    let ca_key = ca::ca_key_file(ctx).await?;
    let signed = TempFileGuard::reserve_near(cert_path)?;
    debug!("signing certificate for {} with the root CA", domain);
    ctx.openssl
        .sign_csr(SignRequest {
            csr,
            ca_cert: &ctx.paths.ca_cert,
            ca_key: ca_key.path(),
            extfile: request_config,
            days: ctx.config.cert_days,
            out: signed.path(),
        })
        .await?;
    drop(ca_key);

    let info = crate::x509::parse_cert_file(signed.path())?;
    if !info.covers(domain) {
        return Err(Error::Reportable(format!(
            "openssl issued a certificate for {} without a matching subjectAltName (found {:?})",
            domain, info.subject_alt_names
        )));
    }
    let ca_subject = ca::ca_subject(ctx.paths)?;
    if info.issuer != ca_subject {
        return Err(Error::Reportable(format!(
            "certificate for {} was issued by \"{}\", expected \"{}\"",
            domain, info.issuer, ca_subject
        )));
    }

    rename_into_place(signed.path(), cert_path)
}
