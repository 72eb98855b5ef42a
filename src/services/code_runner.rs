use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::services::grading::{CodeExecutor, ExecutionReport, ExecutionRequest};

const STATUS_IN_QUEUE: i64 = 1;
const STATUS_PROCESSING: i64 = 2;
const STATUS_ACCEPTED: i64 = 3;
const STATUS_WRONG_ANSWER: i64 = 4;

const RESULT_FIELDS: &str = "token,status,stdout,stderr,compile_output,message,time,memory";

/// Sandbox language ids for the language tags questions use.
pub(crate) fn language_id(language: &str) -> Option<u32> {
    let id = match language.trim().to_ascii_lowercase().as_str() {
        "c" => 50,
        "cpp" | "c++" => 54,
        "csharp" | "c#" => 51,
        "go" => 60,
        "java" => 62,
        "javascript" | "js" | "node" => 63,
        "python" | "python3" | "py" => 71,
        "ruby" => 72,
        "rust" => 73,
        "typescript" | "ts" => 74,
        "kotlin" => 78,
        _ => return None,
    };
    Some(id)
}

/// Reads a sandbox result. `None` while the run is still queued or processing.
pub(crate) fn parse_result(body: &Value) -> Option<ExecutionReport> {
    let status_id = body.pointer("/status/id").and_then(Value::as_i64)?;
    if status_id == STATUS_IN_QUEUE || status_id == STATUS_PROCESSING {
        return None;
    }

    let text = |key: &str| {
        body.get(key).and_then(Value::as_str).map(str::to_string).filter(|value| !value.is_empty())
    };

    let passed = match status_id {
        STATUS_ACCEPTED => Some(true),
        STATUS_WRONG_ANSWER => Some(false),
        _ => None,
    };

    Some(ExecutionReport {
        status: body
            .pointer("/status/description")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        stdout: text("stdout"),
        stderr: text("stderr").or_else(|| text("message")),
        compile_output: text("compile_output"),
        time_seconds: match body.get("time") {
            Some(Value::String(raw)) => raw.parse::<f64>().ok(),
            Some(Value::Number(number)) => number.as_f64(),
            _ => None,
        },
        memory_kb: body.get("memory").and_then(Value::as_i64),
        passed,
    })
}

#[derive(Debug, Clone)]
pub(crate) struct SandboxClient {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl SandboxClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let sandbox = settings.sandbox();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(sandbox.timeout_seconds))
            .build()
            .context("Failed to build sandbox HTTP client")?;

        Ok(Self {
            client,
            base_url: sandbox.base_url.trim_end_matches('/').to_string(),
            api_key: sandbox.api_key.clone(),
            poll_interval: Duration::from_millis(sandbox.poll_interval_ms),
            max_poll_attempts: sandbox.max_poll_attempts,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header("X-Auth-Token", &self.api_key)
        }
    }

    async fn submit(&self, request: &ExecutionRequest) -> Result<String> {
        let language = language_id(&request.language)
            .with_context(|| format!("Unsupported language '{}'", request.language))?;

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/submissions?base64_encoded=false&wait=false", self.base_url)),
            )
            .json(&json!({
                "source_code": request.source_code,
                "language_id": language,
                "stdin": request.stdin,
                "expected_output": request.expected_output,
            }))
            .send()
            .await
            .context("Failed to call sandbox submit endpoint")?;

        let status = response.status();
        let body: Value = response.json().await.context("Sandbox returned non-JSON body")?;
        if !status.is_success() {
            anyhow::bail!("Sandbox submit failed (status {status}): {body}");
        }

        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Sandbox submit response missing token")
    }

    async fn poll(&self, token: &str) -> Result<ExecutionReport> {
        let url = format!(
            "{}/submissions/{token}?base64_encoded=false&fields={RESULT_FIELDS}",
            self.base_url
        );

        for attempt in 0..self.max_poll_attempts {
            let response = self
                .authorized(self.client.get(&url))
                .send()
                .await
                .context("Failed to call sandbox result endpoint")?;

            let status = response.status();
            let body: Value = response.json().await.context("Sandbox returned non-JSON body")?;
            if !status.is_success() {
                anyhow::bail!("Sandbox poll failed (status {status}): {body}");
            }

            if let Some(report) = parse_result(&body) {
                return Ok(report);
            }

            if attempt + 1 < self.max_poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        anyhow::bail!(
            "Sandbox run {token} did not finish after {} polls",
            self.max_poll_attempts
        )
    }
}

#[async_trait]
impl CodeExecutor for SandboxClient {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport> {
        if self.base_url.is_empty() {
            anyhow::bail!("Code sandbox is not configured");
        }

        let token = self.submit(&request).await?;
        tracing::debug!(token = %token, language = %request.language, "Sandbox run submitted");
        self.poll(&token).await
    }
}
