// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse X.509 certificates without shelling out to openssl.

use crate::error::{Error, Result};
use std::path::Path;
use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_after_timestamp: i64,
    pub not_before_timestamp: i64,
    /// RFC 4514 rendering of the subject DN
    pub subject: String,
    /// RFC 4514 rendering of the issuer DN
    pub issuer: String,
    pub common_name: Option<String>,
    /// DNS names from the Subject Alternative Name extension
    pub subject_alt_names: Vec<String>,
    pub is_ca: bool,
}

impl CertInfo {
    pub fn expiry_string(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
            Err(_) => "Invalid date".to_string(),
        }
    }

    pub fn days_remaining(&self) -> i64 {
        let now = ::time::OffsetDateTime::now_utc();
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(expiry) => (expiry - now).whole_days(),
            Err(_) => -1, // Treat invalid timestamps as expired
        }
    }

    pub fn is_expired(&self) -> bool {
        self.days_remaining() < 0
    }

    pub fn covers(&self, domain: &str) -> bool {
        self.subject_alt_names.iter().any(|san| san == domain)
    }
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    let pem_data = std::fs::read(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_cert_pem(&pem_data)
}

pub fn parse_cert_pem(pem_data: &[u8]) -> Result<CertInfo> {
    let pem = ::pem::parse(pem_data)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    let (_, cert) = X509Certificate::from_der(pem.contents())
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let mut subject_alt_names = Vec::new();
    let mut is_ca = false;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        subject_alt_names.push(dns.to_string());
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                is_ca = bc.ca;
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        not_after_timestamp: cert.validity().not_after.timestamp(),
        not_before_timestamp: cert.validity().not_before.timestamp(),
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        subject_alt_names,
        is_ca,
    })
}
