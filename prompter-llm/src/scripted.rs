//! Scripted gateway: replays canned replies and records what it was sent.
//!
//! Useful for tests and offline demos: no network, fully deterministic.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use prompter_core::{GatewayError, Message, ModelGateway, ResponseSchema};

/// One recorded gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Conversation received.
    pub messages: Vec<Message>,
    /// Schema received.
    pub schema: ResponseSchema,
}

/// In-memory gateway answering from a queue of scripted results.
///
/// When the script runs dry every call fails with
/// [`GatewayError::Unavailable`].
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    model: String,
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    /// Empty script for `model`.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Queue a successful reply.
    #[must_use]
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn fail(self, error: GatewayError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Queue a reply on a shared gateway.
    pub fn push(&self, result: Result<String, GatewayError>) {
        self.script.lock().push_back(result);
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Scripted results not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<String, GatewayError> {
        self.calls.lock().push(RecordedCall {
            messages: messages.to_vec(),
            schema: schema.clone(),
        });
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Unavailable("script exhausted".into())))
    }
}
