use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use wavespeed_contracts::clock::Clock;
use wavespeed_contracts::models::ModelDescriptor;
use wavespeed_contracts::tasks::{TaskRecord, TaskStatus};

use crate::transport::{truncate_text, HttpReply, Transport};

const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("non-JSON response (status {status})")]
    NonJson { status: u16 },
    #[error("task {task_id} did not finish within {}s", .limit.as_secs())]
    PollTimeout { task_id: String, limit: Duration },
    #[error("submission response did not include a task id")]
    MissingTaskId,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl TaskError {
    /// Failures worth another poll: network errors, throttling, server
    /// errors and garbled bodies.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::NonJson { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::PollTimeout { .. } | Self::MissingTaskId => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2_000),
            timeout: Duration::from_secs(600),
            max_retries: 3,
            retry_backoff: Duration::from_millis(2_000),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl PollPolicy {
    /// Linear in the retry count, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(attempt.max(1))
            .min(self.max_backoff)
    }
}

/// Submits remote jobs and polls them to a terminal status.
pub struct TaskClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl TaskClient {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, policy: PollPolicy) -> Self {
        Self {
            transport,
            clock,
            policy,
        }
    }

    pub fn submit_task(
        &self,
        model: &ModelDescriptor,
        endpoint_path: &str,
        payload: &Value,
    ) -> Result<TaskRecord, TaskError> {
        let url = format!(
            "{}/{}",
            model.base_url(),
            endpoint_path.trim_start_matches('/')
        );
        tracing::info!(model = %model.id, %url, "submitting task");
        let reply = self
            .transport
            .post_json(&url, Some(model.api_key.expose()), payload)?;
        let record = parse_task_reply(reply)?;
        if record.id.trim().is_empty() {
            return Err(TaskError::MissingTaskId);
        }
        tracing::debug!(task_id = %record.id, status = %record.status, "task submitted");
        Ok(record)
    }

    pub fn fetch_result(
        &self,
        model: &ModelDescriptor,
        task_id: &str,
    ) -> Result<TaskRecord, TaskError> {
        let url = format!("{}/predictions/{}/result", model.base_url(), task_id);
        let reply = self
            .transport
            .get_text(&url, Some(model.api_key.expose()))?;
        let mut record = parse_task_reply(reply)?;
        if record.id.trim().is_empty() {
            record.id = task_id.to_string();
        }
        Ok(record)
    }

    /// Polls until the task reports a terminal status.
    ///
    /// The wall-clock ceiling and the transient-failure budget are
    /// independent: retries never extend the ceiling, and a successful
    /// non-terminal poll restores the full retry budget.
    pub fn poll_until_done(
        &self,
        model: &ModelDescriptor,
        task_id: &str,
    ) -> Result<TaskRecord, TaskError> {
        let started = self.clock.now_ms();
        let limit_ms = self.policy.timeout.as_millis() as u64;
        let mut retries: u32 = 0;
        let mut last_status: Option<TaskStatus> = None;
        loop {
            if self.clock.now_ms().saturating_sub(started) >= limit_ms {
                tracing::warn!(task_id, limit_secs = self.policy.timeout.as_secs(), "poll timed out");
                return Err(TaskError::PollTimeout {
                    task_id: task_id.to_string(),
                    limit: self.policy.timeout,
                });
            }
            match self.fetch_result(model, task_id) {
                Ok(record) => {
                    if last_status.as_ref() != Some(&record.status) {
                        tracing::debug!(task_id, status = %record.status, "task status");
                        last_status = Some(record.status.clone());
                    }
                    if record.status.is_terminal() {
                        return Ok(record);
                    }
                    retries = 0;
                    self.clock.sleep(self.policy.interval);
                }
                Err(err) if err.is_transient() && retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = self.policy.backoff(retries);
                    tracing::warn!(
                        task_id,
                        attempt = retries,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient poll failure; retrying"
                    );
                    self.clock.sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn parse_task_reply(reply: HttpReply) -> Result<TaskRecord, TaskError> {
    let parsed = serde_json::from_str::<Value>(&reply.body);
    if !reply.is_success() {
        let message = parsed
            .ok()
            .as_ref()
            .and_then(best_message)
            .unwrap_or_else(|| fallback_message(&reply));
        return Err(TaskError::Http {
            status: reply.status,
            message,
        });
    }
    let value = parsed.map_err(|_| TaskError::NonJson {
        status: reply.status,
    })?;
    if let Some(code) = envelope_error_code(&value) {
        return Err(TaskError::Http {
            status: code,
            message: best_message(&value).unwrap_or_else(|| format!("API returned code {code}")),
        });
    }
    TaskRecord::from_response(value).map_err(|err| {
        TaskError::Transport(anyhow::Error::new(err).context("unexpected task record shape"))
    })
}

/// Envelopes carry their own `code`; anything outside 2xx is a failure even
/// when the HTTP status was 200.
fn envelope_error_code(value: &Value) -> Option<u16> {
    let code = value.get("code").and_then(Value::as_u64)?;
    let code = u16::try_from(code).ok()?;
    (!(200..300).contains(&code)).then_some(code)
}

fn best_message(value: &Value) -> Option<String> {
    let text = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };
    text(value.get("message"))
        .or_else(|| text(value.get("error")))
        .or_else(|| text(value.get("detail")))
        .or_else(|| text(value.get("data").and_then(|data| data.get("error"))))
}

fn fallback_message(reply: &HttpReply) -> String {
    let body = reply.body.trim();
    if body.is_empty() {
        format!("HTTP {}", reply.status)
    } else {
        truncate_text(body, ERROR_BODY_MAX_CHARS)
    }
}
