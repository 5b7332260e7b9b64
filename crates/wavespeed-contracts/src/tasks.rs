use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::Capability;

/// The four operation kinds, each with its own command name and submit
/// endpoint suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Generate,
    Edit,
    GenerateSequential,
    EditSequential,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Generate,
        Operation::Edit,
        Operation::GenerateSequential,
        Operation::EditSequential,
    ];

    pub fn command_name(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Edit => "edit",
            Self::GenerateSequential => "generate-sequential",
            Self::EditSequential => "edit-sequential",
        }
    }

    pub fn endpoint_suffix(self) -> &'static str {
        match self {
            Self::Generate => "",
            Self::Edit => "/edit",
            Self::GenerateSequential => "/sequential",
            Self::EditSequential => "/edit-sequential",
        }
    }

    pub fn takes_images(self) -> bool {
        matches!(self, Self::Edit | Self::EditSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(self, Self::GenerateSequential | Self::EditSequential)
    }

    pub fn required_capabilities(self) -> &'static [Capability] {
        match self {
            Self::Generate => &[Capability::Generate],
            Self::Edit => &[Capability::Edit],
            Self::GenerateSequential => &[Capability::Generate, Capability::Sequential],
            Self::EditSequential => &[Capability::Edit, Capability::Sequential],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Created,
    Processing,
    Completed,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// `completed` and `succeeded` are both accepted as success.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Succeeded | Self::Failed)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTimings {
    #[serde(default)]
    pub inference: Option<f64>,
}

/// One remote job as last reported by the API. Replaced wholesale on each
/// poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub outputs: Vec<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub error: Option<String>,
    #[serde(default, rename = "has_nsfw_contents")]
    pub nsfw_flags: Option<Vec<bool>>,
    #[serde(default)]
    pub timings: Option<TaskTimings>,
}

impl TaskRecord {
    /// Accepts both `{data: {...}}` envelopes and flat records.
    pub fn from_response(value: Value) -> serde_json::Result<Self> {
        let inner = match value {
            Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
                map.remove("data").unwrap_or_default()
            }
            other => other,
        };
        serde_json::from_value(inner)
    }

    pub fn inference_ms(&self) -> Option<f64> {
        self.timings.as_ref().and_then(|timings| timings.inference)
    }
}

/// Uniform result of every operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub task_id: String,
    pub status: TaskStatus,
    pub outputs: Vec<String>,
    pub timing_ms: Option<f64>,
    pub nsfw_flags: Option<Vec<bool>>,
    pub error: Option<String>,
}

impl OperationResult {
    pub fn from_record(record: TaskRecord) -> Self {
        let success = record.status.is_success();
        let timing_ms = record.inference_ms();
        let error = if success {
            None
        } else {
            Some(
                record
                    .error
                    .unwrap_or_else(|| format!("task ended with status '{}'", record.status)),
            )
        };
        Self {
            success,
            task_id: record.id,
            status: record.status,
            outputs: record.outputs,
            timing_ms,
            nsfw_flags: record.nsfw_flags,
            error,
        }
    }

    pub fn failure(task_id: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            task_id: task_id.unwrap_or_default().to_string(),
            status: TaskStatus::Failed,
            outputs: Vec::new(),
            timing_ms: None,
            nsfw_flags: None,
            error: Some(error.into()),
        }
    }
}

fn status_or_default<'de, D>(deserializer: D) -> Result<TaskStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => TaskStatus::Created,
        Some(value) => serde_json::from_value(Value::String(value)).unwrap_or(TaskStatus::Unknown),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}
