// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::http_utils::{
    html_response, json_response, log_and_create_http_response, normalize_path, HttpResponse,
};

const INDEX_PATH: &str = "/";
const SYSTEM_STATS_PATH: &str = "/api/system-stats";
const TAILSCALE_PATH: &str = "/api/tailscale-ip";
const HEALTH_PATH: &str = "/api/health";
const INDEX_FILE: &str = "index.html";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct ServerState {
    aggregator: Arc<Aggregator>,
    static_dir: PathBuf,
}

/// HTTP front end for the aggregator.
pub struct MonitorServer {
    config: Arc<Config>,
    state: Arc<ServerState>,
}

impl MonitorServer {
    pub fn new(config: Arc<Config>, aggregator: Arc<Aggregator>) -> Self {
        let state = Arc::new(ServerState {
            aggregator,
            static_dir: config.static_dir.clone(),
        });
        Self { config, state }
    }

    /// Binds the configured address and serves until `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), BoxError> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Monitor server listening on {}", listener.local_addr()?);
        self.serve(listener, cancel).await
    }

    /// Serves connections from `listener` until `cancel` fires. Open connections are dropped on
    /// shutdown.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), BoxError> {
        let state = Arc::clone(&self.state);
        let service = service_fn(move |req| {
            // called for each http request
            let state = Arc::clone(&state);
            async move { endpoint_handler(req, state).await }
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }

        debug!("Shutting down monitor server");
        joinset.shutdown().await;
        Ok(())
    }
}

async fn endpoint_handler<B>(
    req: Request<B>,
    state: Arc<ServerState>,
) -> http::Result<HttpResponse> {
    let now = Instant::now();
    let method = req.method().clone();
    let path = normalize_path(req.uri().path()).to_string();
    let response = match (&method, path.as_str()) {
        (&Method::GET, INDEX_PATH) => index_handler(&state.static_dir).await,
        (&Method::GET, SYSTEM_STATS_PATH) => {
            let snapshot = state.aggregator.get_snapshot().await;
            json_response(StatusCode::OK, &*snapshot)
        }
        (&Method::GET, TAILSCALE_PATH) => {
            json_response(StatusCode::OK, &state.aggregator.vpn_status().await)
        }
        (&Method::GET, HEALTH_PATH) => json_response(StatusCode::OK, &json!({ "ok": true })),
        (_, INDEX_PATH | SYSTEM_STATS_PATH | TAILSCALE_PATH | HEALTH_PATH) => {
            log_and_create_http_response("Method not allowed", StatusCode::METHOD_NOT_ALLOWED)
        }
        _ => log_and_create_http_response("Not found", StatusCode::NOT_FOUND),
    };
    debug!("{method} {path} handled in {} ms", now.elapsed().as_millis());
    response
}

async fn index_handler(static_dir: &Path) -> http::Result<HttpResponse> {
    let index = static_dir.join(INDEX_FILE);
    match tokio::fs::read(&index).await {
        Ok(body) => html_response(body),
        Err(e) => {
            debug!("Could not read {}: {e}", index.display());
            log_and_create_http_response("index.html not found", StatusCode::NOT_FOUND)
        }
    }
}
