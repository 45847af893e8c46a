/// Sandbox Client - Pooled HTTP Access to the Code-Execution Sandbox
///
/// **Core Responsibility:**
/// Submit one harness source file and return the sandbox's raw result,
/// classified into an `ExecutionStatus`.
///
/// **Failure Model:**
/// - Breaker open: no request is sent, a synthetic result explains the delay
/// - Timeouts, connect errors and 5xx responses count as breaker failures
/// - 2xx and 4xx responses count as successes (the sandbox answered)
/// - `execute` never fails; every failure becomes a synthetic result
///
/// **Concurrency:**
/// One instance is shared by `Arc` across all grading calls. The reqwest
/// pool bounds idle keep-alives per host and a semaphore bounds in-flight
/// requests.

use super::breaker::{BreakerSnapshot, BreakerStatus, CircuitBreaker};
use super::SandboxError;
use crate::catalog::LanguageCatalog;
use crate::metrics;
use autograder_common::{Config, ExecutionOutcome, ExecutionStatus, Language, RawExecutionResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const RUNTIME_UNKNOWN: &str = "runtime is unknown";
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Body of `POST /execute`
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<SourceFile>,
    pub stdin: String,
    pub args: Vec<String>,
    pub compile_timeout: u64,
    pub run_timeout: u64,
    pub compile_memory_limit: i64,
    pub run_memory_limit: i64,
}

/// An installed runtime as listed by `GET /runtimes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub language: String,
    pub version: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A package as listed by `GET /packages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub language: String,
    pub language_version: String,
    pub installed: Option<bool>,
}

impl Package {
    fn from_value(value: &Value) -> Option<Package> {
        let language = value.get("language")?.as_str()?.to_string();
        let version = value
            .get("language_version")
            .or_else(|| value.get("version"))?
            .as_str()?
            .to_string();
        Some(Package {
            language,
            language_version: version,
            installed: value.get("installed").and_then(Value::as_bool),
        })
    }
}

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub message: String,
}

pub struct SandboxClient {
    http: reqwest::Client,
    config: Config,
    breaker: CircuitBreaker,
    permits: Arc<Semaphore>,
}

impl SandboxClient {
    pub fn new(config: Config) -> Result<Self, SandboxError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SandboxError::Request(format!("failed to build HTTP client: {}", e)))?;

        info!(
            base = %config.api_base(),
            max_connections = config.max_connections,
            max_idle_per_host = config.max_idle_per_host,
            "Sandbox client initialized"
        );

        metrics::init_metrics();
        Ok(Self {
            http,
            breaker: CircuitBreaker::new(config.breaker.clone()),
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    pub fn catalog(&self) -> LanguageCatalog<'_> {
        LanguageCatalog::new(self)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base(), path)
    }

    fn ensure_closed(&self) -> Result<(), SandboxError> {
        match self.breaker.check() {
            BreakerStatus::Closed => Ok(()),
            BreakerStatus::Open { retry_in } => Err(SandboxError::Unavailable {
                retry_in_secs: retry_in.as_secs().max(1),
            }),
        }
    }

    /// Send one request and read its body, feeding the breaker and metrics
    async fn send(&self, endpoint: &str, request: reqwest::RequestBuilder) -> Result<Value, SandboxError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SandboxError::Request("request limiter closed".to_string()))?;

        let started = Instant::now();
        let result = self.send_inner(request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(SandboxError::Timeout(_)) => "timeout",
            Err(SandboxError::Connect(_)) => "connect_error",
            Err(SandboxError::Status { .. }) => "http_error",
            Err(_) => "error",
        };
        metrics::record_sandbox_request(endpoint, outcome, elapsed_ms);

        match &result {
            Err(e) if e.counts_as_failure() => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }

        debug!(endpoint, outcome, elapsed_ms = elapsed_ms as u64, "Sandbox request finished");
        result
    }

    async fn send_inner(&self, request: reqwest::RequestBuilder) -> Result<Value, SandboxError> {
        let response = request.send().await.map_err(SandboxError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(SandboxError::from_reqwest)?;

        if !status.is_success() {
            return Err(SandboxError::Status {
                status: status.as_u16(),
                body: excerpt(&text, BODY_EXCERPT_CHARS),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| SandboxError::Decode(e.to_string()))
    }

    /// `GET /runtimes`
    pub async fn runtimes(&self) -> Result<Vec<Runtime>, SandboxError> {
        self.ensure_closed()?;
        let body = self.send("runtimes", self.http.get(self.url("/runtimes"))).await?;
        serde_json::from_value(body).map_err(|e| SandboxError::Decode(e.to_string()))
    }

    /// `GET /packages`; accepts a bare list or `{"packages": [...]}`
    pub async fn packages(&self) -> Result<Vec<Package>, SandboxError> {
        self.ensure_closed()?;
        let body = self.send("packages", self.http.get(self.url("/packages"))).await?;

        let entries = match &body {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("packages") {
                Some(Value::Array(items)) => items,
                _ => return Err(SandboxError::Decode("packages response has no list".to_string())),
            },
            _ => return Err(SandboxError::Decode("unexpected packages response".to_string())),
        };

        Ok(entries.iter().filter_map(Package::from_value).collect())
    }

    /// `POST /packages`; an "already installed" answer counts as success
    pub async fn install_package(&self, language: &Language, version: &str) -> Result<(), SandboxError> {
        self.ensure_closed()?;
        let body = serde_json::json!({
            "language": language.package_name(),
            "version": version,
        });
        let request = self.http.post(self.url("/packages")).json(&body);

        match self.send("install", request).await {
            Ok(_) => {
                info!(language = %language, version, "Package installed");
                Ok(())
            }
            Err(SandboxError::Status { body, .. }) if body.to_lowercase().contains("already installed") => {
                info!(language = %language, version, "Package already installed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Probe `GET /runtimes` and describe the sandbox's availability
    pub async fn health(&self) -> HealthStatus {
        match self.runtimes().await {
            Ok(runtimes) => HealthStatus {
                available: true,
                message: format!("Grading service available ({} runtimes)", runtimes.len()),
            },
            Err(SandboxError::Unavailable { retry_in_secs }) => HealthStatus {
                available: false,
                message: format!(
                    "Grading service temporarily unavailable. Retry in {}s",
                    retry_in_secs
                ),
            },
            Err(SandboxError::Timeout(_)) => HealthStatus {
                available: false,
                message: "Grading service timed out".to_string(),
            },
            Err(SandboxError::Connect(detail)) => HealthStatus {
                available: false,
                message: format!("Cannot connect to grading service: {}", detail),
            },
            Err(SandboxError::Status { status, .. }) => HealthStatus {
                available: false,
                message: format!("Grading service error: status {}", status),
            },
            Err(e) => HealthStatus {
                available: false,
                message: format!("Grading service error: {}", e),
            },
        }
    }

    /// Execute a harness source file and classify the result
    pub async fn execute(
        &self,
        language: &Language,
        version: &str,
        source: &str,
        timeout_ms: u64,
    ) -> ExecutionOutcome {
        if let BreakerStatus::Open { retry_in } = self.breaker.check() {
            let secs = retry_in.as_secs().max(1);
            warn!(language = %language, retry_in_secs = secs, "Circuit breaker open, skipping sandbox");
            metrics::record_sandbox_request("execute", "breaker_open", 0.0);
            return ExecutionOutcome {
                status: ExecutionStatus::ServiceUnavailable,
                language_version: version.to_string(),
                raw: RawExecutionResult::synthetic(format!(
                    "Grading service temporarily unavailable. Retry in {}s",
                    secs
                )),
            };
        }

        let mut version = version.to_string();
        let mut response = self.post_execute(language, &version, source, timeout_ms).await;

        let runtime_unknown = matches!(
            &response,
            Err(SandboxError::Status { status, body })
                if *status == StatusCode::BAD_REQUEST.as_u16() && body.contains(RUNTIME_UNKNOWN)
        );
        if runtime_unknown {
            let resolved = self.catalog().resolve_version(language, None).await;
            warn!(
                language = %language,
                rejected = %version,
                version = %resolved,
                "Sandbox rejected runtime version, retrying once"
            );
            version = resolved;
            response = self.post_execute(language, &version, source, timeout_ms).await;
        }

        match response {
            Ok(body) => {
                let (status, raw) = classify_response(&body);
                info!(language = %language, version = %version, status = %status, "Sandbox execution finished");
                ExecutionOutcome {
                    status,
                    language_version: version,
                    raw,
                }
            }
            Err(e) => {
                warn!(language = %language, version = %version, error = %e, "Sandbox execution failed");
                ExecutionOutcome {
                    status: e.execution_status(),
                    language_version: version,
                    raw: RawExecutionResult::synthetic(e.to_string()),
                }
            }
        }
    }

    async fn post_execute(
        &self,
        language: &Language,
        version: &str,
        source: &str,
        timeout_ms: u64,
    ) -> Result<Value, SandboxError> {
        let request = ExecuteRequest {
            language: language.sandbox_name().to_string(),
            version: version.to_string(),
            files: vec![SourceFile {
                name: language.file_name(),
                content: source.to_string(),
            }],
            stdin: String::new(),
            args: Vec::new(),
            compile_timeout: self.config.compile_timeout_ms,
            run_timeout: self.config.effective_run_timeout(timeout_ms),
            compile_memory_limit: -1,
            run_memory_limit: -1,
        };

        debug!(
            language = %request.language,
            version = %request.version,
            run_timeout = request.run_timeout,
            source_size = source.len(),
            "Submitting to sandbox"
        );

        self.send("execute", self.http.post(self.url("/execute")).json(&request))
            .await
    }
}

struct Stage {
    stdout: String,
    stderr: String,
    code: Option<i64>,
    signal: Option<String>,
}

impl Stage {
    fn from_value(value: &Value) -> Option<Stage> {
        let object = value.as_object()?;
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Stage {
            stdout: text("stdout"),
            stderr: text("stderr"),
            code: object.get("code").and_then(Value::as_i64),
            signal: object
                .get("signal")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Map a sandbox response body onto the status taxonomy
pub fn classify_response(body: &Value) -> (ExecutionStatus, RawExecutionResult) {
    let mut raw = RawExecutionResult::default();

    if let Some(compile) = body.get("compile").and_then(Stage::from_value) {
        raw.compile_stdout = compile.stdout;
        raw.compile_stderr = compile.stderr;
        raw.compile_exit_code = compile.code;
        if raw.compile_failed() {
            return (ExecutionStatus::CompileError, raw);
        }
    }

    let Some(run) = body.get("run").and_then(Stage::from_value) else {
        raw.exit_code = Some(-1);
        return (ExecutionStatus::RuntimeError, raw);
    };

    raw.stdout = run.stdout;
    raw.stderr = run.stderr;
    raw.signal = run.signal;
    raw.exit_code = Some(run.code.unwrap_or(-1));

    let killed = raw.signal.as_deref() == Some("SIGKILL") || raw.stderr.contains("Timed out");
    let status = if killed {
        ExecutionStatus::TimeLimitExceeded
    } else if run.code == Some(0) {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::RuntimeError
    };
    (status, raw)
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
