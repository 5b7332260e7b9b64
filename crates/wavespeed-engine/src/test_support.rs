use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use wavespeed_contracts::models::{ApiKey, ModelDescriptor, Provider};

use crate::transport::{BinaryReply, HttpReply, Transport};

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: &'static str,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

/// Replays queued replies in order; an exhausted queue is a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    posts: Mutex<VecDeque<Result<HttpReply>>>,
    gets: Mutex<VecDeque<Result<HttpReply>>>,
    downloads: Mutex<VecDeque<Result<BinaryReply>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_post(self, status: u16, body: &str) -> Self {
        self.posts.lock().unwrap().push_back(Ok(reply(status, body)));
        self
    }

    pub fn on_get(self, status: u16, body: &str) -> Self {
        self.gets.lock().unwrap().push_back(Ok(reply(status, body)));
        self
    }

    pub fn on_get_error(self, message: &str) -> Self {
        self.gets
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
        self
    }

    pub fn on_download(self, bytes: Vec<u8>) -> Self {
        self.downloads.lock().unwrap().push_back(Ok(BinaryReply {
            status: 200,
            bytes,
            mime_type: None,
        }));
        self
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|request| request.method == "GET")
            .count()
    }

    fn record(&self, method: &'static str, url: &str, bearer: Option<&str>, body: Option<&Value>) {
        self.sent.lock().unwrap().push(SentRequest {
            method,
            url: url.to_string(),
            bearer: bearer.map(str::to_string),
            body: body.cloned(),
        });
    }
}

impl Transport for ScriptedTransport {
    fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<HttpReply> {
        self.record("POST", url, bearer, Some(body));
        self.posts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted POST reply for {url}")))
    }

    fn get_text(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply> {
        self.record("GET", url, bearer, None);
        self.gets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted GET reply for {url}")))
    }

    fn get_bytes(&self, url: &str) -> Result<BinaryReply> {
        self.record("DOWNLOAD", url, None, None);
        self.downloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted download for {url}")))
    }
}

fn reply(status: u16, body: &str) -> HttpReply {
    HttpReply {
        status,
        body: body.to_string(),
    }
}

pub fn native_model() -> ModelDescriptor {
    ModelDescriptor {
        id: "default".to_string(),
        provider: Provider::WavespeedNative,
        base_url: "https://api.test/api/v3/".to_string(),
        api_key: ApiKey::new("sk-test-1234"),
        api_key_env_name: "WAVESPEED_API_KEY".to_string(),
        model_name: Some("bytedance/seedream-v4".to_string()),
        request_defaults: Map::new(),
        sourced_from_config: false,
    }
}
