use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

const USER_AGENT: &str = concat!("wavespeed/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw HTTP reply. Status interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryReply {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Network seam for every remote call the engine makes.
pub trait Transport: Send + Sync {
    fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<HttpReply>;
    fn get_text(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply>;
    fn get_bytes(&self, url: &str) -> Result<BinaryReply>;
}

pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<HttpReply> {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("POST request failed ({url})"))?;
        read_reply(response, url)
    }

    fn get_text(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply> {
        let mut request = self.http.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("GET request failed ({url})"))?;
        read_reply(response, url)
    }

    fn get_bytes(&self, url: &str) -> Result<BinaryReply> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("download failed ({url})"))?;
        let status = response.status().as_u16();
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading download body ({url})"))?
            .to_vec();
        Ok(BinaryReply {
            status,
            bytes,
            mime_type,
        })
    }
}

fn read_reply(response: HttpResponse, url: &str) -> Result<HttpReply> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .with_context(|| format!("response body read failed ({url})"))?;
    Ok(HttpReply { status, body })
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push('…');
    out
}
