// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Manual Firefox import: serve the CA over loopback HTTP and let Firefox's
//! own "trust this CA" dialog do the install.

use crate::error::{Error, Result};
use crate::process;
use crate::ui::UserInterface;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

pub const CERTIFICATE_PATH: &str = "/certificate";

/// MIME type that makes Firefox offer to import a CA.
pub const CA_CERT_MIME: &str = "application/x-x509-ca-cert";

struct Content {
    certificate: Bytes,
    page: Bytes,
}

/// Loopback HTTP server hosting the CA certificate and the wizard page.
///
/// Dropping the server aborts it; [`CertificateServer::shutdown`] stops it
/// gracefully.
pub struct CertificateServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CertificateServer {
    /// Bind an ephemeral loopback port and start serving `cert_path`.
    pub async fn start(cert_path: &Path, ui: &dyn UserInterface) -> Result<Self> {
        let certificate = tokio::fs::read(cert_path)
            .await
            .map_err(|e| Error::ReadFile {
                path: cert_path.to_path_buf(),
                source: e,
            })?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| Error::BindFailed {
                addr: "127.0.0.1:0".to_string(),
                reason: e.to_string(),
            })?;
        let addr = listener.local_addr().map_err(|e| Error::BindFailed {
            addr: "127.0.0.1:0".to_string(),
            reason: e.to_string(),
        })?;

        let certificate_url = format!("http://localhost:{}{}", addr.port(), CERTIFICATE_PATH);
        let content = Arc::new(Content {
            certificate: Bytes::from(certificate),
            page: Bytes::from(ui.firefox_wizard_prompt_page(&certificate_url)),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(serve(listener, content, shutdown_rx));
        debug!("certificate server listening on {}", addr);

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Root URL, where the wizard page is served.
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.addr.port())
    }

    /// Stop accepting connections and wait for the accept loop to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("certificate server on {} stopped", self.addr);
    }
}

impl Drop for CertificateServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn serve(
    listener: TcpListener,
    content: Arc<Content>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut connections: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,

            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        debug!("certificate server accept error: {}", e);
                        continue;
                    }
                };

                let content = content.clone();
                connections.spawn(async move {
                    let io = TokioIo::new(stream);
                    let svc = service_fn(move |req| {
                        let content = content.clone();
                        async move { respond(req, &content) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        debug!("certificate server connection error: {}", e);
                    }
                });

                while connections.try_join_next().is_some() {}
            }
        }
    }

    // Dropping the listener releases the port; in-flight requests are cut off.
    connections.abort_all();
}

fn respond(
    req: Request<Incoming>,
    content: &Content,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let (content_type, body) = if req.uri().path() == CERTIFICATE_PATH {
        (CA_CERT_MIME, content.certificate.clone())
    } else {
        ("text/html; charset=utf-8", content.page.clone())
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(body))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Internal Server Error")))))
}

/// Walk the user through importing `cert_path` in Firefox's GUI.
///
/// `launcher` is the program and leading arguments that open a URL in
/// Firefox; the server URL is appended. The server is shut down on every
/// exit path. The wait for the user has no timeout.
pub async fn open_certificate_in_firefox(
    launcher: &[&str],
    cert_path: &Path,
    ui: &dyn UserInterface,
) -> Result<()> {
    debug!("adding devcert to Firefox manually, starting a server to host the certificate");
    let server = CertificateServer::start(cert_path, ui).await?;
    let url = server.url();

    let result = async {
        ui.start_firefox_wizard(&url).await?;

        let (program, leading) = launcher
            .split_first()
            .ok_or_else(|| Error::Reportable("empty Firefox launch command".to_string()))?;
        let mut args: Vec<&str> = leading.to_vec();
        args.push(&url);
        process::launch(program, args)?;

        ui.wait_for_firefox_wizard().await
    }
    .await;

    server.shutdown().await;
    result
}
