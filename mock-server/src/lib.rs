use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// What `/echo` saw, returned as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Echo {
    /// All values of a header, compared case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Tags of `/delay` requests in the order they finished.
pub type Completions = Arc<RwLock<Vec<String>>>;

pub fn app() -> Router {
    let completions: Completions = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/echo", any(echo))
        .route("/cookies", get(cookies))
        .route("/delay/{ms}/{tag}", get(delay))
        .route("/completions", get(completions_order))
        .route("/status/{code}", any(status))
        .route("/redirect/{n}", any(redirect))
        .with_state(completions)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let echo = Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let request_id = HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    (
        [(HeaderName::from_static("x-request-id"), request_id)],
        Json(echo),
    )
        .into_response()
}

async fn cookies() -> Response {
    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, HeaderValue::from_static("session=abc"));
    headers.append(header::SET_COOKIE, HeaderValue::from_static("theme=dark"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    (headers, "two cookies").into_response()
}

async fn delay(
    State(completions): State<Completions>,
    Path((ms, tag)): Path<(u64, String)>,
) -> String {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    completions.write().await.push(tag.clone());
    tag
}

async fn completions_order(State(completions): State<Completions>) -> Json<Vec<String>> {
    Json(completions.read().await.clone())
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

/// `/redirect/{n}` hops `n` times with 303s and lands on `/echo`.
async fn redirect(Path(n): Path<u32>) -> Redirect {
    if n <= 1 {
        Redirect::to("/echo")
    } else {
        Redirect::to(&format!("/redirect/{}", n - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_headers_as_pairs() {
        let echo = Echo {
            method: "GET".to_string(),
            path: "/echo".to_string(),
            query: None,
            headers: vec![("accept".to_string(), "*/*".to_string())],
            body: String::new(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["headers"][0][0], "accept");
        assert_eq!(json["headers"][0][1], "*/*");
        assert!(json["query"].is_null());
    }

    #[test]
    fn header_values_are_case_insensitive() {
        let echo = Echo {
            method: "POST".to_string(),
            path: "/echo".to_string(),
            query: None,
            headers: vec![
                ("x-tag".to_string(), "a".to_string()),
                ("content-type".to_string(), "text/plain".to_string()),
                ("x-tag".to_string(), "b".to_string()),
            ],
            body: "hi".to_string(),
        };
        assert_eq!(echo.header_values("X-Tag"), ["a", "b"]);
        assert!(echo.header_values("missing").is_empty());
    }
}
