// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{HeaderMap, Request, StatusCode};
use hyper_util::rt::TokioIo;
use monitor_agent::aggregator::Aggregator;
use monitor_agent::config::Config;
use monitor_agent::server::MonitorServer;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

pub struct RunningServer {
    pub port: u16,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl RunningServer {
    pub async fn stop(self) {
        self.cancel.cancel();
        timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task failed");
    }
}

/// Starts the server on an ephemeral localhost port.
pub async fn start_server(aggregator: Aggregator, static_dir: &Path) -> RunningServer {
    let config = Config {
        static_dir: static_dir.to_path_buf(),
        ..Config::default()
    };
    let server = MonitorServer::new(Arc::new(config), Arc::new(aggregator));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let port = listener.local_addr().unwrap().port();
    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, server_cancel)
            .await
            .expect("server failed");
    });

    RunningServer {
        port,
        cancel,
        handle,
    }
}

/// Send an HTTP request over TCP and return the collected response
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
) -> Result<TestResponse, Box<dyn std::error::Error + Send + Sync>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", format!("127.0.0.1:{port}"))
        .body(Empty::<Bytes>::new())?;
    let response = timeout(Duration::from_secs(10), sender.send_request(request)).await??;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await?.to_bytes();

    Ok(TestResponse {
        status,
        headers,
        body,
    })
}

pub async fn send_get(port: u16, uri: &str) -> TestResponse {
    send_tcp_request(port, uri, "GET")
        .await
        .unwrap_or_else(|e| panic!("GET {uri} failed: {e}"))
}
