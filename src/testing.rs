//! Test doubles shared across modules.

use crate::clock::ManualClock;
use crate::error::{Error, Result};
use crate::provider::{ChatRequest, VisionApi};
use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Canned outcome for one completion call.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// 2xx with this content in `choices[0].message.content`.
    Text(String),
    /// 2xx with an arbitrary raw body.
    Body(String),
    Status(u16, String),
    Quota,
    Transport,
}

impl Reply {
    pub(crate) fn text(content: &str) -> Self {
        Self::Text(content.to_string())
    }

    pub(crate) fn status(code: u16, message: &str) -> Self {
        Self::Status(code, message.to_string())
    }

    /// 2xx body without any choices.
    pub(crate) fn malformed() -> Self {
        Self::Body(r#"{"id":"gen-1","choices":[]}"#.to_string())
    }
}

/// Scripted upstream. Models without queued replies answer with a default
/// description.
pub(crate) struct ScriptedApi {
    models: Mutex<Vec<Value>>,
    listing_failure: Mutex<Option<u16>>,
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ChatRequest>>,
    list_calls: AtomicUsize,
    credential: bool,
    latency: Option<(Arc<ManualClock>, TimeDelta)>,
}

impl ScriptedApi {
    pub(crate) fn new(models: Vec<Value>) -> Self {
        Self {
            models: Mutex::new(models),
            listing_failure: Mutex::new(None),
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            credential: true,
            latency: None,
        }
    }

    pub(crate) fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    /// Every completion call advances `clock` by `per_call`.
    pub(crate) fn with_latency(mut self, clock: Arc<ManualClock>, per_call: TimeDelta) -> Self {
        self.latency = Some((clock, per_call));
        self
    }

    pub(crate) fn reply(self, model: &str, reply: Reply) -> Self {
        self.push_reply(model, reply);
        self
    }

    pub(crate) fn push_reply(&self, model: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn set_models(&self, models: Vec<Value>) {
        *self.models.lock().unwrap() = models;
    }

    /// Make listing calls fail with `status` until cleared with `None`.
    pub(crate) fn fail_listing(&self, status: Option<u16>) {
        *self.listing_failure.lock().unwrap() = status;
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Model ids of every completion call, in order.
    pub(crate) fn attempted(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.model).collect()
    }
}

#[async_trait]
impl VisionApi for ScriptedApi {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn list_models(&self) -> Result<Vec<Value>> {
        if !self.credential {
            return Err(Error::NoCredential);
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.listing_failure.lock().unwrap() {
            return Err(Error::UpstreamHttp {
                status,
                message: "listing unavailable".into(),
            });
        }
        Ok(self.models.lock().unwrap().clone())
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if !self.credential {
            return Err(Error::NoCredential);
        }
        self.requests.lock().unwrap().push(request.clone());
        if let Some((clock, per_call)) = &self.latency {
            clock.advance(*per_call);
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.model)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::text("A generated description"));

        match reply {
            Reply::Text(content) => Ok(completion_body(&request.model, &content)),
            Reply::Body(body) => Ok(body),
            Reply::Status(status, message) => Err(Error::UpstreamHttp { status, message }),
            Reply::Quota => Err(Error::QuotaExceeded {
                model: request.model.clone(),
                message: "Rate limit exceeded".into(),
            }),
            Reply::Transport => Err(Error::Transport("connection reset".into())),
        }
    }
}

pub(crate) fn model_json(id: &str, context_length: u64, description: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "description": description,
        "context_length": context_length,
    })
}

/// Free vision model with a large context.
pub(crate) fn free_vision(id: &str) -> Value {
    model_json(id, 128_000, "Multimodal model with vision support")
}

pub(crate) fn completion_body(model: &str, content: &str) -> String {
    json!({
        "id": "gen-1",
        "model": model,
        "choices": [{"message": {"role": "assistant", "content": content}}],
    })
    .to_string()
}

/// A small realistic catalog: ranked free vision models, a paid one, and
/// entries that fail one predicate each.
pub(crate) fn sample_catalog() -> Vec<Value> {
    vec![
        model_json("meta-llama/llama-3.2-11b-vision-instruct:free", 131_072, "Llama vision"),
        model_json("google/gemini-2.0-flash-exp:free", 1_048_576, "Gemini with vision"),
        model_json("mistralai/pixtral-12b:free", 128_000, "Vision model from Mistral"),
        model_json("qwen/qwen-2-vl-7b:free", 32_768, "Small vision model"),
        model_json("deepseek/deepseek-r1:free", 163_840, "Reasoning model"),
        model_json("openai/gpt-4o", 128_000, "GPT-4o with vision"),
        model_json("bad id:free", 128_000, "vision"),
    ]
}
