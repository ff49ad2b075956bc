use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{DispatchError, Result};
use crate::models::ChatCompletionRequest;
use crate::transport::{RawResponse, Transport};

/// Scripted reply for one chat exchange
#[derive(Debug, Clone)]
pub enum ChatReply {
    /// Answer with the child's name as the title
    Echo,
    Timeout,
    Status(u16, String),
    Body(String),
}

/// Transport double that echoes the child's name back as the story title,
/// so tests can check dispatch order end to end.
pub struct FakeTransport {
    probe_status: Mutex<u16>,
    script: Mutex<VecDeque<ChatReply>>,
    calls: Mutex<Vec<String>>,
    probes: Mutex<usize>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_probe_status(200)
    }

    pub fn with_probe_status(status: u16) -> Self {
        Self {
            probe_status: Mutex::new(status),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
        }
    }

    /// Replies are consumed in order; `Echo` once the script runs out
    pub fn script(&self, replies: impl IntoIterator<Item = ChatReply>) {
        self.script.lock().unwrap().extend(replies);
    }

    pub fn set_probe_status(&self, status: u16) {
        *self.probe_status.lock().unwrap() = status;
    }

    /// Child names seen by `chat`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probes(&self) -> usize {
        *self.probes.lock().unwrap()
    }
}

pub fn child_name(req: &ChatCompletionRequest) -> String {
    req.messages
        .iter()
        .flat_map(|m| m.content.lines())
        .find_map(|line| line.strip_prefix("- Child's name: "))
        .unwrap_or("?")
        .to_string()
}

pub fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

#[async_trait]
impl Transport for FakeTransport {
    async fn chat(&self, req: &ChatCompletionRequest) -> Result<RawResponse> {
        let name = child_name(req);
        self.calls.lock().unwrap().push(name.clone());

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ChatReply::Echo);
        match reply {
            ChatReply::Echo => Ok(RawResponse::new(
                200,
                completion_body(&format!("{name}\n\nOnce upon a time.\n\nThe end.")),
            )),
            ChatReply::Timeout => Err(DispatchError::Transport("operation timed out".into())),
            ChatReply::Status(status, body) => Ok(RawResponse::new(status, body)),
            ChatReply::Body(body) => Ok(RawResponse::new(200, body)),
        }
    }

    async fn list_models(&self) -> Result<RawResponse> {
        *self.probes.lock().unwrap() += 1;
        Ok(RawResponse::new(*self.probe_status.lock().unwrap(), ""))
    }

    fn has_credentials(&self) -> bool {
        true
    }
}
