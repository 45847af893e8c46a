//! In-process fake sandbox speaking the `/api/v2` execution API
//!
//! Each test builds a `FakeSandbox`, tweaks the canned responses it needs and
//! calls `start()`, which serves it on an ephemeral localhost port and
//! returns a `Config` pointing at it.

#![allow(dead_code)]

use autograder_common::Config;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type ExecuteHandler = Arc<dyn Fn(usize, &Value) -> (StatusCode, Value) + Send + Sync>;

#[derive(Clone)]
pub struct FakeSandbox {
    pub packages: (StatusCode, Value),
    pub runtimes: (StatusCode, Value),
    pub install: (StatusCode, Value),
    pub execute: ExecuteHandler,
    pub execute_delay: Option<Duration>,
}

pub struct Recorded {
    pub execute_calls: AtomicUsize,
    pub package_calls: AtomicUsize,
    pub executes: Mutex<Vec<Value>>,
    pub installs: Mutex<Vec<Value>>,
}

impl Recorded {
    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn package_calls(&self) -> usize {
        self.package_calls.load(Ordering::SeqCst)
    }

    pub fn last_execute(&self) -> Value {
        self.executes.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }

    pub fn executes(&self) -> Vec<Value> {
        self.executes.lock().unwrap().clone()
    }

    pub fn installs(&self) -> Vec<Value> {
        self.installs.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct Shared {
    sandbox: FakeSandbox,
    recorded: Arc<Recorded>,
}

pub struct Running {
    pub config: Config,
    pub recorded: Arc<Recorded>,
}

impl Default for FakeSandbox {
    fn default() -> Self {
        Self {
            packages: (
                StatusCode::OK,
                json!([
                    {"language": "python", "language_version": "3.12.0", "installed": true},
                    {"language": "java", "language_version": "15.0.2", "installed": true}
                ]),
            ),
            runtimes: (
                StatusCode::OK,
                json!([
                    {"language": "python", "version": "3.12.0", "aliases": ["py", "python3"]},
                    {"language": "java", "version": "15.0.2", "aliases": []}
                ]),
            ),
            install: (StatusCode::OK, json!({"language": "java", "version": "15.0.2"})),
            execute: Arc::new(|_, _| (StatusCode::OK, run_response("", "", 0))),
            execute_delay: None,
        }
    }
}

impl FakeSandbox {
    pub fn with_execute<F>(mut self, handler: F) -> Self
    where
        F: Fn(usize, &Value) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        self.execute = Arc::new(handler);
        self
    }

    pub async fn start(self) -> Running {
        let recorded = Arc::new(Recorded {
            execute_calls: AtomicUsize::new(0),
            package_calls: AtomicUsize::new(0),
            executes: Mutex::new(Vec::new()),
            installs: Mutex::new(Vec::new()),
        });
        let shared = Shared {
            sandbox: self,
            recorded: recorded.clone(),
        };

        let app = Router::new()
            .route("/api/v2/runtimes", get(runtimes))
            .route("/api/v2/packages", get(packages).post(install))
            .route("/api/v2/execute", axum::routing::post(execute))
            .with_state(shared);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Running {
            config: test_config(&format!("http://{}", addr)),
            recorded,
        }
    }
}

pub fn test_config(sandbox_url: &str) -> Config {
    Config {
        sandbox_url: sandbox_url.to_string(),
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        ..Config::default()
    }
}

/// A URL nothing is listening on
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn run_response(stdout: &str, stderr: &str, code: i64) -> Value {
    json!({
        "language": "python",
        "version": "3.12.0",
        "run": {"stdout": stdout, "stderr": stderr, "code": code, "signal": null, "output": stdout}
    })
}

async fn runtimes(State(shared): State<Shared>) -> (StatusCode, Json<Value>) {
    let (status, body) = shared.sandbox.runtimes.clone();
    (status, Json(body))
}

async fn packages(State(shared): State<Shared>) -> (StatusCode, Json<Value>) {
    shared.recorded.package_calls.fetch_add(1, Ordering::SeqCst);
    let (status, body) = shared.sandbox.packages.clone();
    (status, Json(body))
}

async fn install(State(shared): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    shared.recorded.installs.lock().unwrap().push(body);
    let (status, body) = shared.sandbox.install.clone();
    (status, Json(body))
}

async fn execute(State(shared): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let call = shared.recorded.execute_calls.fetch_add(1, Ordering::SeqCst);
    shared.recorded.executes.lock().unwrap().push(body.clone());
    if let Some(delay) = shared.sandbox.execute_delay {
        tokio::time::sleep(delay).await;
    }
    let (status, response) = (shared.sandbox.execute)(call, &body);
    (status, Json(response))
}
