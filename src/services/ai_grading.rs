use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::db::types::ExamKind;
use crate::services::grading::{clamp_score, AnswerEvaluator, Evaluation, EvaluationRequest};

const MAX_RETRIES: u32 = 3;

const EVALUATION_SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading a single exam answer.
Grade strictly against the question and, when present, the reference solution.
For code answers you also receive the sandbox execution report; a program that does
not compile or produces the wrong output cannot receive full marks.

Respond with a strict JSON object:
{
  "score": <number between 0 and the maximum points>,
  "feedback": "<short explanation addressed to the student>"
}
"#;

#[derive(Debug, Clone)]
pub(crate) struct AiEvaluator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AiEvaluator {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let ai = settings.ai();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: ai.api_key.clone(),
            base_url: ai.base_url.trim_end_matches('/').to_string(),
            model: ai.model.clone(),
            max_tokens: ai.max_tokens,
        })
    }

    async fn complete(&self, payload: &Value) -> Result<Value> {
        if self.api_key.is_empty() {
            anyhow::bail!("AI evaluation is not configured");
        }

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let body: Value = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        return Ok(body);
                    }
                    last_error = Some(anyhow::anyhow!("Completion API error ({status}): {body}"));
                    // Client errors will not improve on retry.
                    if status.is_client_error() && status.as_u16() != 429 {
                        break;
                    }
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call completion API"));
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown completion API error")))
    }
}

fn user_prompt(request: &EvaluationRequest) -> String {
    let mut prompt = format!(
        "Answer type: {}\nMaximum points: {}\n\nQuestion:\n{}\n",
        match request.kind {
            ExamKind::Code => "program source code",
            ExamKind::Quiz | ExamKind::Document => "written text",
        },
        request.max_points,
        request.question
    );

    if let Some(reference) = &request.reference_solution {
        prompt.push_str(&format!("\nReference solution:\n{reference}\n"));
    }

    prompt.push_str(&format!("\nStudent answer:\n{}\n", request.answer));

    if let Some(report) = &request.execution {
        let report = serde_json::to_string_pretty(report).unwrap_or_default();
        prompt.push_str(&format!("\nExecution report:\n{report}\n"));
    }

    prompt
}

/// Pulls `{score, feedback}` out of a chat completion body and clamps the score.
pub(crate) fn parse_evaluation(body: &Value, max_points: f64) -> Result<Evaluation> {
    let content = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .context("Missing completion content")?;

    let parsed: Value = serde_json::from_str(content).context("Failed to parse evaluation JSON")?;

    let score = match parsed.get("score") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .context("Evaluation is missing a numeric score")?;

    let feedback = parsed
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Ok(Evaluation { score: clamp_score(score, max_points), feedback })
}

#[async_trait]
impl AnswerEvaluator for AiEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<Evaluation> {
        let timer = Instant::now();
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": EVALUATION_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(&request)}
            ],
            "max_completion_tokens": self.max_tokens,
            "response_format": {"type": "json_object"}
        });

        let body = self.complete(&payload).await?;
        let evaluation = parse_evaluation(&body, request.max_points)?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64);
        tracing::debug!(
            model = %self.model,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used,
            "Answer evaluated"
        );

        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grading::ExecutionReport;

    fn completion(content: &str) -> Value {
        json!({"choices": [{"message": {"content": content}}]})
    }

    #[test]
    fn parses_score_and_feedback() {
        let body = completion(r#"{"score": 3.5, "feedback": " Good start "}"#);
        let evaluation = parse_evaluation(&body, 5.0).expect("parsed");
        assert_eq!(evaluation, Evaluation { score: 3.5, feedback: "Good start".to_string() });
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let body = completion(r#"{"score": 12, "feedback": "ok"}"#);
        assert_eq!(parse_evaluation(&body, 5.0).unwrap().score, 5.0);

        let body = completion(r#"{"score": -2, "feedback": "ok"}"#);
        assert_eq!(parse_evaluation(&body, 5.0).unwrap().score, 0.0);
    }

    #[test]
    fn accepts_numeric_strings() {
        let body = completion(r#"{"score": "4", "feedback": "ok"}"#);
        assert_eq!(parse_evaluation(&body, 5.0).unwrap().score, 4.0);
    }

    #[test]
    fn rejects_missing_score_or_content() {
        assert!(parse_evaluation(&completion(r#"{"feedback": "no score"}"#), 5.0).is_err());
        assert!(parse_evaluation(&completion("not json"), 5.0).is_err());
        assert!(parse_evaluation(&json!({"choices": []}), 5.0).is_err());
    }

    #[test]
    fn prompt_includes_reference_and_execution_report() {
        let prompt = user_prompt(&EvaluationRequest {
            kind: ExamKind::Code,
            question: "Print 42".to_string(),
            max_points: 5.0,
            answer: "print(42)".to_string(),
            reference_solution: Some("print(6*7)".to_string()),
            execution: Some(ExecutionReport {
                status: "Accepted".to_string(),
                stdout: Some("42".to_string()),
                stderr: None,
                compile_output: None,
                time_seconds: None,
                memory_kb: None,
                passed: Some(true),
            }),
        });

        assert!(prompt.contains("program source code"));
        assert!(prompt.contains("Reference solution:\nprint(6*7)"));
        assert!(prompt.contains("Execution report:"));
        assert!(prompt.contains("\"passed\": true"));
    }
}
