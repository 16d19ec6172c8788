// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exchange timeouts and disposal over the reqwest transport.

use axum::{routing::post, Router};
use rwt_remote::{ExchangeError, HttpMethod, HttpTransport, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(30)).await;
    "late"
}

async fn echo(body: String) -> String {
    body
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/slow", post(slow))
        .route("/echo", post(echo).get(|| async { "pong" }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_post_echoes_body() {
    let addr = spawn_server().await;
    let transport = Arc::new(HttpTransport::new().unwrap());

    let response = Request::new(transport, format!("http://{}/echo", addr))
        .with_data(r#"{"head":{},"operations":[]}"#)
        .send_sync()
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.response_text, r#"{"head":{},"operations":[]}"#);
    assert!(response.header("Content-Type").is_some());
}

#[tokio::test]
async fn test_get_with_query() {
    let addr = spawn_server().await;
    let transport = Arc::new(HttpTransport::new().unwrap());

    let mut exchange = Request::new(transport, format!("http://{}/echo", addr))
        .with_method(HttpMethod::Get)
        .with_data("servicehandler=org.eclipse.rap.serverpush")
        .send();
    let response = exchange.completion().await.unwrap();
    assert_eq!(response.response_text, "pong");
}

#[tokio::test]
async fn test_timeout_is_connection_error() {
    let addr = spawn_server().await;
    let transport = Arc::new(HttpTransport::new().unwrap());

    let err = Request::new(transport, format!("http://{}/slow", addr))
        .with_timeout(Duration::from_millis(50))
        .send_sync()
        .await
        .unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(err.status(), 0);
}

#[tokio::test]
async fn test_dispose_abandons_exchange() {
    let addr = spawn_server().await;
    let transport = Arc::new(HttpTransport::new().unwrap());

    let mut exchange = Request::new(transport, format!("http://{}/slow", addr)).send();
    assert!(exchange.is_pending());

    exchange.dispose();
    exchange.dispose();
    assert!(!exchange.is_pending());
    assert_eq!(exchange.completion().await, Err(ExchangeError::Disposed));
}

#[tokio::test]
async fn test_not_found_is_status_error() {
    let addr = spawn_server().await;
    let transport = Arc::new(HttpTransport::new().unwrap());

    let err = Request::new(transport, format!("http://{}/missing", addr))
        .send_sync()
        .await
        .unwrap_err();
    assert!(!err.is_connection_error());
    assert_eq!(err.status(), 404);
    match err {
        ExchangeError::Status(response) => assert_eq!(response.target, format!("http://{}/missing", addr)),
        other => panic!("Expected Status, got {:?}", other),
    }
}
