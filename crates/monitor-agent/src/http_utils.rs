// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, http, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

/// Prefix added by the reverse proxy in front of the dashboard.
const PROXY_PREFIX: &str = "/monitor";

/// Starts a response carrying the headers every endpoint sends so that dashboards never see a
/// cached reading.
fn no_store_builder(status: StatusCode) -> http::response::Builder {
    Response::builder()
        .status(status)
        .header(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
}

/// Serializes `body` as pretty-printed JSON.
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    body: &T,
) -> http::Result<HttpResponse> {
    match serde_json::to_vec_pretty(body) {
        Ok(body) => no_store_builder(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body))),
        Err(e) => log_and_create_http_response(
            &format!("Failed to serialize response: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

/// Does two things:
/// 1. Logs the given message. Server errors are logged at error level, anything else at debug.
/// 2. Returns the message in a JSON body with the given status code.
///
/// Response body format:
/// {
///   "error": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_server_error() {
        error!("{message}");
    } else {
        debug!("{message}");
    }
    let body = serde_json::to_vec_pretty(&json!({ "error": message })).unwrap_or_default();
    no_store_builder(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

pub fn html_response(body: Vec<u8>) -> http::Result<HttpResponse> {
    no_store_builder(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
}

/// Strips the reverse proxy prefix and any query string: `/monitor` becomes `/` and
/// `/monitor/api/health?x=1` becomes `/api/health`.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    match path.strip_prefix(PROXY_PREFIX) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}
