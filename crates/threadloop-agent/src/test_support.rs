//! Scripted model used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::llm::client::ModelClient;
use crate::llm::types::{ChatRequest, TurnEvent};

/// Replays canned turn events in order and records every request.
pub struct ScriptedModel {
    script: Mutex<VecDeque<TurnEvent>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(events: Vec<TurnEvent>) -> Self {
        Self {
            script: Mutex::new(events.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn next_turn(&self, request: &ChatRequest) -> Result<TurnEvent> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::LlmRequestFailed {
                reason: "script exhausted".into(),
            })
    }
}
