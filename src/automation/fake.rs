// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process WebDriver hub for tests.
//!
//! Pages are not modelled: a fixed set of selectors "exists", everything else
//! answers `no such element`. State-changing commands are recorded in order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::webdriver::ELEMENT_KEY;

#[derive(Default)]
struct Browser {
    present: HashSet<String>,
    hidden: HashSet<String>,
    elements: Vec<String>,
    commands: Vec<String>,
    capabilities: Value,
}

type Shared = Arc<Mutex<Browser>>;
type Reply = (StatusCode, Json<Value>);

fn ok(value: Value) -> Reply {
    (StatusCode::OK, Json(json!({ "value": value })))
}

fn no_such_element(what: &str) -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "value": {
                "error": "no such element",
                "message": format!("Unable to locate {what}"),
                "stacktrace": ""
            }
        })),
    )
}

impl Browser {
    fn element(&mut self, selector: &str) -> Value {
        let id = self.elements.len();
        self.elements.push(selector.to_string());
        json!({ ELEMENT_KEY: id.to_string() })
    }

    fn selector(&self, id: &str) -> Option<String> {
        id.parse::<usize>()
            .ok()
            .and_then(|index| self.elements.get(index).cloned())
    }
}

async fn new_session(State(state): State<Shared>, Json(body): Json<Value>) -> Reply {
    let mut browser = state.lock().unwrap();
    browser.commands.push("new session".to_string());
    browser.capabilities = body["capabilities"]["alwaysMatch"].clone();
    ok(json!({ "sessionId": "fake-session", "capabilities": {} }))
}

async fn delete_session(State(state): State<Shared>, Path(_session): Path<String>) -> Reply {
    state
        .lock()
        .unwrap()
        .commands
        .push("delete session".to_string());
    ok(Value::Null)
}

async fn timeouts(
    State(state): State<Shared>,
    Path(_session): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    state
        .lock()
        .unwrap()
        .commands
        .push(format!("timeouts {}", body["implicit"]));
    ok(Value::Null)
}

async fn navigate(
    State(state): State<Shared>,
    Path(_session): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let url = body["url"].as_str().unwrap_or_default();
    state.lock().unwrap().commands.push(format!("url {url}"));
    ok(Value::Null)
}

async fn find_element(
    State(state): State<Shared>,
    Path(_session): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let selector = body["value"].as_str().unwrap_or_default();
    let mut browser = state.lock().unwrap();
    if browser.present.contains(selector) {
        let element = browser.element(selector);
        ok(element)
    } else {
        no_such_element(selector)
    }
}

async fn find_elements(
    State(state): State<Shared>,
    Path(_session): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let selector = body["value"].as_str().unwrap_or_default();
    let mut browser = state.lock().unwrap();
    if browser.present.contains(selector) {
        let element = browser.element(selector);
        ok(json!([element]))
    } else {
        ok(json!([]))
    }
}

async fn click(
    State(state): State<Shared>,
    Path((_session, id)): Path<(String, String)>,
) -> Reply {
    let mut browser = state.lock().unwrap();
    match browser.selector(&id) {
        Some(selector) => {
            browser.commands.push(format!("click {selector}"));
            ok(Value::Null)
        }
        None => no_such_element(&id),
    }
}

async fn send_keys(
    State(state): State<Shared>,
    Path((_session, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Reply {
    let mut browser = state.lock().unwrap();
    match browser.selector(&id) {
        Some(selector) => {
            let text = body["text"].as_str().unwrap_or_default();
            browser.commands.push(format!("value {selector} = {text}"));
            ok(Value::Null)
        }
        None => no_such_element(&id),
    }
}

async fn displayed(
    State(state): State<Shared>,
    Path((_session, id)): Path<(String, String)>,
) -> Reply {
    let browser = state.lock().unwrap();
    match browser.selector(&id) {
        Some(selector) => ok(json!(!browser.hidden.contains(&selector))),
        None => no_such_element(&id),
    }
}

/// A running fake hub.
pub struct FakeWebDriver {
    state: Shared,
    pub hub_url: String,
}

impl FakeWebDriver {
    /// Start a hub on which exactly the given selectors exist.
    pub async fn spawn<I, S>(present: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state: Shared = Arc::new(Mutex::new(Browser {
            present: present.into_iter().map(Into::into).collect(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/wd/hub/session", post(new_session))
            .route(
                "/wd/hub/session/{session}",
                axum::routing::delete(delete_session),
            )
            .route("/wd/hub/session/{session}/timeouts", post(timeouts))
            .route("/wd/hub/session/{session}/url", post(navigate))
            .route("/wd/hub/session/{session}/element", post(find_element))
            .route("/wd/hub/session/{session}/elements", post(find_elements))
            .route("/wd/hub/session/{session}/element/{id}/click", post(click))
            .route("/wd/hub/session/{session}/element/{id}/value", post(send_keys))
            .route(
                "/wd/hub/session/{session}/element/{id}/displayed",
                get(displayed),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self {
            state,
            hub_url: format!("http://{addr}/wd/hub"),
        }
    }

    /// `host:port` of the hub, as a session handle would carry it.
    pub fn endpoint(&self) -> String {
        self.hub_url
            .trim_start_matches("http://")
            .trim_end_matches("/wd/hub")
            .to_string()
    }

    /// Make an existing selector report as not displayed.
    pub fn hide(&self, selector: &str) {
        self.state.lock().unwrap().hidden.insert(selector.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn capabilities(&self) -> Value {
        self.state.lock().unwrap().capabilities.clone()
    }
}
