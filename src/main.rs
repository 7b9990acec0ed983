// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use devcert::{CaMaterial, DevCert, Options, ReturnCa, Result};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "devcert")]
#[command(about = "Locally-trusted TLS certificates for development domains")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    devcert cert my-app.test       # Create the CA if needed and issue a cert
    devcert has my-app.test        # Exit 0 if a cert exists, 1 otherwise
    devcert list                   # Domains with issued certs
    devcert remove my-app.test     # Delete a domain's key and cert

ENVIRONMENT:
    DEVCERT_ROOT    Absolute path of the certificate store
    NSS_CERTUTIL    Path to NSS certutil (Windows)
    RUST_LOG        Log filter, defaults to devcert=info")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue (or reuse) a certificate for a domain
    Cert {
        domain: String,

        /// Do not install NSS tooling; import the CA into Firefox by hand
        #[arg(long)]
        skip_certutil_install: bool,

        /// Do not add a 127.0.0.1 entry to the hosts file
        #[arg(long)]
        skip_hosts_file: bool,

        /// Also print the root CA certificate path
        #[arg(long)]
        print_ca: bool,
    },

    /// Check whether a certificate exists for a domain
    Has { domain: String },

    /// List domains with certificates
    List,

    /// Remove a domain's key and certificate
    Remove { domain: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devcert=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let devcert = DevCert::new()?;

    match cli.command {
        Commands::Cert {
            domain,
            skip_certutil_install,
            skip_hosts_file,
            print_ca,
        } => {
            cmd_cert(
                &devcert,
                &domain,
                Options {
                    return_ca: print_ca.then_some(ReturnCa::Path),
                    skip_certutil_install,
                    skip_hosts_file,
                    ui: None,
                },
            )
            .await?;
            Ok(0)
        }
        Commands::Has { domain } => {
            if devcert.has_certificate_for(&domain) {
                println!("{}", domain);
                Ok(0)
            } else {
                Ok(1)
            }
        }
        Commands::List => {
            cmd_list(&devcert)?;
            Ok(0)
        }
        Commands::Remove { domain } => {
            devcert.remove_domain(&domain)?;
            println!("Removed {}", domain);
            Ok(0)
        }
    }
}

async fn cmd_cert(devcert: &DevCert, domain: &str, options: Options<'_>) -> Result<()> {
    let issued = devcert.certificate_for(domain, &options).await?;
    let paths = devcert.paths();

    // Paths only; key material stays on disk
    println!("Certificate: {}", paths.domain_cert(domain)?.display());
    println!("Key:         {}", paths.domain_key(domain)?.display());
    if let Some(CaMaterial::Path(ca)) = &issued.ca {
        println!("CA:          {}", ca.display());
    }
    Ok(())
}

fn cmd_list(devcert: &DevCert) -> Result<()> {
    let domains = devcert.configured_domains()?;
    if domains.is_empty() {
        println!("No certificates found.");
        println!("Run 'devcert cert <domain>' to create one.");
        return Ok(());
    }

    println!("{:<32} {:<12} {:>6}", "DOMAIN", "EXPIRES", "DAYS");
    println!("{}", "-".repeat(52));
    for domain in domains {
        let info = devcert
            .paths()
            .domain_cert(&domain)
            .ok()
            .and_then(|path| devcert::parse_cert_file(&path).ok());
        match info {
            Some(info) => {
                let days = info.days_remaining();
                let days_str = if info.is_expired() {
                    format!("{} (EXPIRED)", days)
                } else {
                    days.to_string()
                };
                println!("{:<32} {:<12} {:>6}", domain, info.expiry_string(), days_str);
            }
            // Left behind by an interrupted issuance
            None => println!("{:<32} {:<12} {:>6}", domain, "incomplete", "-"),
        }
    }
    Ok(())
}
