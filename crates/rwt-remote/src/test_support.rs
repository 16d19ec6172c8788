// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory transport for unit tests.
//!
//! POST requests (the request cycle) and GET requests (server push) are
//! answered from two separate scripts. An exhausted POST script answers with
//! an empty server message; an exhausted push script never answers.

use crate::transport::{HttpMethod, HttpRequest, NetworkError, Response, Transport};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

const EMPTY_MESSAGE: &str = r#"{"head":{},"operations":[]}"#;

#[derive(Debug)]
enum Scripted {
    Respond(u16, String),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
    responses: Mutex<VecDeque<Scripted>>,
    push: Mutex<VecDeque<Scripted>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Scripted::Respond(status, text.to_string()));
    }

    pub fn push_json(&self, message: Value) {
        self.push_response(200, &message.to_string());
    }

    pub fn push_network_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub fn script_push(&self, status: u16) {
        self.push
            .lock()
            .unwrap()
            .push_back(Scripted::Respond(status, String::new()));
    }

    pub fn script_push_error(&self, message: &str) {
        self.push
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn request_times(&self, method: HttpMethod) -> Vec<Instant> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.method == method)
            .map(|(at, _)| *at)
            .collect()
    }

    /// Bodies of every POST, parsed as JSON.
    pub fn posted_messages(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, r)| r.body.as_deref())
            .map(|body| serde_json::from_str(body).unwrap())
            .collect()
    }

    pub fn push_count(&self) -> usize {
        self.request_times(HttpMethod::Get).len()
    }
}

impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<Response, NetworkError> {
        let is_push = request.method == HttpMethod::Get;
        let url = request.url.clone();
        let next = {
            self.requests.lock().unwrap().push((Instant::now(), request));
            if is_push {
                self.push.lock().unwrap().pop_front()
            } else {
                self.responses.lock().unwrap().pop_front()
            }
        };

        let no_headers = std::iter::empty::<(String, String)>();
        match next {
            Some(Scripted::Respond(status, text)) => Ok(Response::new(url, status, text, no_headers)),
            Some(Scripted::Fail(message)) => Err(NetworkError(message)),
            None if is_push => std::future::pending().await,
            None => Ok(Response::new(url, 200, EMPTY_MESSAGE, no_headers)),
        }
    }
}
