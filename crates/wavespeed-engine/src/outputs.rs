use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, ImageReader};
use serde::Serialize;
use wavespeed_contracts::tasks::OperationResult;

use crate::transport::{truncate_text, Transport};

/// How a task output string carries its image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPayload<'a> {
    Url(&'a str),
    DataUri { mime: &'a str, data: &'a str },
    Base64(&'a str),
}

pub fn classify_output(raw: &str) -> OutputPayload<'_> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return OutputPayload::Url(trimmed);
    }
    if lowered.starts_with("data:") {
        if let Some((header, data)) = trimmed[5..].split_once(',') {
            let mime = header.split(';').next().unwrap_or_default();
            return OutputPayload::DataUri { mime, data };
        }
    }
    OutputPayload::Base64(trimmed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedOutput {
    pub index: usize,
    pub path: PathBuf,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

/// Image bytes for one output, downloaded or decoded.
pub fn output_bytes(transport: &dyn Transport, raw: &str) -> Result<Vec<u8>> {
    match classify_output(raw) {
        OutputPayload::Url(url) => {
            let reply = transport.get_bytes(url)?;
            if !(200..300).contains(&reply.status) {
                bail!("image download failed ({}): {}", reply.status, truncate_text(url, 120));
            }
            Ok(reply.bytes)
        }
        OutputPayload::DataUri { data, .. } => BASE64
            .decode(data.trim().as_bytes())
            .context("output data URI is not valid base64"),
        OutputPayload::Base64(data) => BASE64
            .decode(data.as_bytes())
            .context("output is neither a URL nor valid base64"),
    }
}

/// Sniffs the format and reads dimensions without a full decode.
pub fn inspect_image(bytes: &[u8]) -> Result<(ImageFormat, u32, u32)> {
    let format = image::guess_format(bytes).context("unrecognised image data")?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .context("failed reading image dimensions")?;
    Ok((format, width, height))
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        other => other.extensions_str().first().copied().unwrap_or("bin"),
    }
}

/// Writes every output of a successful result as `{taskId}-{index}.{ext}`.
pub fn save_outputs(
    transport: &dyn Transport,
    result: &OperationResult,
    out_dir: &Path,
) -> Result<Vec<SavedOutput>> {
    if !result.success {
        bail!("refusing to save outputs of an unsuccessful task");
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating {}", out_dir.display()))?;
    let stem = if result.task_id.is_empty() {
        "output"
    } else {
        result.task_id.as_str()
    };
    let mut saved = Vec::with_capacity(result.outputs.len());
    for (index, raw) in result.outputs.iter().enumerate() {
        let bytes = output_bytes(transport, raw)
            .with_context(|| format!("output {index} of task {stem}"))?;
        let (format, width, height) = inspect_image(&bytes)
            .with_context(|| format!("output {index} of task {stem}"))?;
        let path = out_dir.join(format!("{stem}-{index}.{}", extension_for(format)));
        fs::write(&path, &bytes).with_context(|| format!("failed to save {}", path.display()))?;
        tracing::info!(path = %path.display(), width, height, "saved output");
        saved.push(SavedOutput {
            index,
            path,
            format: extension_for(format).to_string(),
            width,
            height,
            bytes: bytes.len(),
        });
    }
    Ok(saved)
}
