use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use wavespeed_contracts::models::{ModelDescriptor, ModelRegistry};
use wavespeed_contracts::tasks::{Operation, OperationResult};

use crate::tasks::TaskClient;
use crate::transport::truncate_text;

pub const DEFAULT_SIZE: &str = "2048*2048";
pub const MAX_SEQUENTIAL_IMAGES: u32 = 15;
const SIZE_MIN_SIDE: u32 = 256;
const SIZE_MAX_SIDE: u32 = 4096;

/// Typed parameters shared by all four operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: Option<String>,
    /// URLs or data URIs. Only sent for edit variants.
    pub images: Vec<String>,
    /// Only sent for sequential variants.
    pub max_images: Option<u32>,
    pub seed: Option<i64>,
    pub enable_base64_output: bool,
    pub enable_sync_mode: bool,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Checks and canonicalises the request for `operation`: trims the
    /// prompt, rewrites `WxH` sizes to `W*H` and inlines local image files.
    pub fn normalized(mut self, operation: Operation) -> Result<Self> {
        self.prompt = self.prompt.trim().to_string();
        if self.prompt.is_empty() {
            bail!("prompt must not be empty");
        }
        if let Some(size) = self.size.take() {
            self.size = Some(normalize_size(&size)?);
        }
        if operation.takes_images() {
            if self.images.is_empty() {
                bail!("{operation} requires at least one input image");
            }
            self.images = self
                .images
                .iter()
                .map(|value| image_input_value(value))
                .collect::<Result<Vec<_>>>()?;
        } else if !self.images.is_empty() {
            bail!("{operation} does not take input images");
        }
        if let Some(max_images) = self.max_images {
            if !operation.is_sequential() {
                bail!("--max-images only applies to sequential operations");
            }
            if !(1..=MAX_SEQUENTIAL_IMAGES).contains(&max_images) {
                bail!("max images must be between 1 and {MAX_SEQUENTIAL_IMAGES}");
            }
        }
        Ok(self)
    }
}

/// Accepts `W*H` or `WxH` with each side in range; returns `W*H`.
pub fn normalize_size(raw: &str) -> Result<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    let Some((w, h)) = lowered.split_once(['*', 'x']) else {
        bail!("size '{raw}' must look like 1024*1024");
    };
    let parse = |side: &str| side.trim().parse::<u32>().ok();
    let (Some(width), Some(height)) = (parse(w), parse(h)) else {
        bail!("size '{raw}' must look like 1024*1024");
    };
    for side in [width, height] {
        if !(SIZE_MIN_SIDE..=SIZE_MAX_SIDE).contains(&side) {
            bail!("size '{raw}' sides must be between {SIZE_MIN_SIDE} and {SIZE_MAX_SIDE}");
        }
    }
    Ok(format!("{width}*{height}"))
}

/// Passes URLs and data URIs through; reads local files into data URIs.
pub fn image_input_value(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("image input value is empty");
    }
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("http://")
        || lowered.starts_with("https://")
        || lowered.starts_with("data:image/")
    {
        return Ok(trimmed.to_string());
    }
    let path = Path::new(trimmed);
    if path.is_file() {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime = mime_for_path(path).unwrap_or("image/png");
        return Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)));
    }
    bail!(
        "image input '{}' must be a URL, data URL, or local file path",
        truncate_text(trimmed, 80)
    );
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Builds the submission body. The descriptor's request defaults only fill
/// keys the operation left unset.
pub fn build_payload(operation: Operation, model: &ModelDescriptor, request: &ImageRequest) -> Value {
    let mut payload = Map::new();
    payload.insert("prompt".to_string(), json!(request.prompt));
    payload.insert(
        "size".to_string(),
        json!(request.size.as_deref().unwrap_or(DEFAULT_SIZE)),
    );
    payload.insert(
        "enable_base64_output".to_string(),
        json!(request.enable_base64_output),
    );
    payload.insert("enable_sync_mode".to_string(), json!(request.enable_sync_mode));
    payload.insert("model".to_string(), json!(model.remote_model()));
    if operation.takes_images() {
        payload.insert("images".to_string(), json!(request.images));
    }
    if operation.is_sequential() {
        if let Some(max_images) = request.max_images {
            payload.insert("max_images".to_string(), json!(max_images));
        }
    }
    if let Some(seed) = request.seed {
        payload.insert("seed".to_string(), json!(seed));
    }
    for (key, value) in &model.request_defaults {
        payload.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Value::Object(payload)
}

pub fn endpoint_path(operation: Operation, model: &ModelDescriptor) -> String {
    format!(
        "{}{}",
        model.remote_model().trim_matches('/'),
        operation.endpoint_suffix()
    )
}

/// Logs a warning when a registry model does not list the capabilities an
/// operation needs. Unknown models are not second-guessed.
pub fn warn_on_missing_capability(
    registry: &ModelRegistry,
    operation: Operation,
    model: &ModelDescriptor,
) -> bool {
    let Some(entry) = registry.get(&model.id) else {
        return false;
    };
    let missing: Vec<String> = operation
        .required_capabilities()
        .iter()
        .filter(|capability| !entry.supports(**capability))
        .map(|capability| format!("{capability:?}").to_ascii_lowercase())
        .collect();
    if missing.is_empty() {
        return false;
    }
    tracing::warn!(
        model = %model.id,
        operation = %operation,
        missing = %missing.join(","),
        "model does not advertise the capabilities this operation needs"
    );
    true
}

/// Submit, poll, and fold every execution failure into the result.
pub fn run_operation(
    tasks: &TaskClient,
    operation: Operation,
    model: &ModelDescriptor,
    request: &ImageRequest,
) -> OperationResult {
    let payload = build_payload(operation, model, request);
    let path = endpoint_path(operation, model);
    let submitted = match tasks.submit_task(model, &path, &payload) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(operation = %operation, error = %err, "task submission failed");
            return OperationResult::failure(None, err.to_string());
        }
    };
    if submitted.status.is_terminal() {
        return OperationResult::from_record(submitted);
    }
    match tasks.poll_until_done(model, &submitted.id) {
        Ok(record) => {
            let result = OperationResult::from_record(record);
            if !result.success {
                tracing::warn!(
                    task_id = %result.task_id,
                    error = result.error.as_deref().unwrap_or_default(),
                    "task failed"
                );
            }
            result
        }
        Err(err) => {
            tracing::warn!(task_id = %submitted.id, error = %err, "task did not complete");
            OperationResult::failure(Some(&submitted.id), err.to_string())
        }
    }
}

pub fn generate_image(tasks: &TaskClient, model: &ModelDescriptor, request: &ImageRequest) -> OperationResult {
    run_operation(tasks, Operation::Generate, model, request)
}

pub fn edit_image(tasks: &TaskClient, model: &ModelDescriptor, request: &ImageRequest) -> OperationResult {
    run_operation(tasks, Operation::Edit, model, request)
}

pub fn generate_sequential(
    tasks: &TaskClient,
    model: &ModelDescriptor,
    request: &ImageRequest,
) -> OperationResult {
    run_operation(tasks, Operation::GenerateSequential, model, request)
}

pub fn edit_sequential(
    tasks: &TaskClient,
    model: &ModelDescriptor,
    request: &ImageRequest,
) -> OperationResult {
    run_operation(tasks, Operation::EditSequential, model, request)
}
