//! OpenAI chat-completions gateway with forced function calling.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use prompter_core::config::OpenAiConfig;
use prompter_core::{GatewayError, Message, ModelGateway, ResponseSchema};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Gateway to the OpenAI chat-completions API (or any compatible server).
///
/// Structured schemas are sent as the only entry of `functions` and forced
/// through `function_call`, so the reply is the function's argument JSON.
/// Bare type-name schemas are sent without a function: the type name goes
/// out in a trailing system turn and the plain message content is returned.
#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    http: Client,
    model: String,
    config: OpenAiConfig,
}

impl OpenAiGateway {
    /// Gateway for `model` with the default OpenAI settings.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_config(model, OpenAiConfig::default())
    }

    /// Gateway for `model` with explicit transport settings.
    #[must_use]
    pub fn with_config(model: impl Into<String>, config: OpenAiConfig) -> Self {
        Self {
            http: Client::new(),
            model: model.into(),
            config,
        }
    }

    /// Transport settings in use.
    #[must_use]
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// JSON body for one chat-completions request.
    #[must_use]
    pub fn request_body(&self, messages: &[Message], schema: &ResponseSchema) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        match schema {
            ResponseSchema::Function(function) => {
                body["functions"] = json!([function]);
                body["function_call"] = json!({ "name": function.name });
            }
            ResponseSchema::TypeName(type_name) => {
                if let Some(turns) = body["messages"].as_array_mut() {
                    turns.push(json!({
                        "role": "system",
                        "content": type_hint(type_name),
                    }));
                }
            }
        }

        body
    }

    fn api_key(&self) -> Result<String, GatewayError> {
        std::env::var(&self.config.api_key_env)
            .map_err(|_| GatewayError::MissingCredential(self.config.api_key_env.clone()))
    }

    fn transport_error(&self, err: &reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.request_timeout_ms)
        } else if err.is_connect() {
            GatewayError::Unavailable(err.to_string())
        } else {
            GatewayError::RequestFailed(err.to_string())
        }
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<String, GatewayError> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(messages, schema);

        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .send()
            .await
            .map_err(|e| {
                let err = self.transport_error(&e);
                warn!("OpenAI API request failed: {}", err);
                err
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("OpenAI API returned error: HTTP {}", status);
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        debug!(
            model = %self.model,
            latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "OpenAI call completed"
        );

        extract_output(&json, schema)
    }
}

fn type_hint(type_name: &str) -> String {
    format!("Reply with a single {type_name} value and nothing else.")
}

/// Pull the answer text out of a chat-completions response.
///
/// For function schemas this is `message.function_call.arguments`, falling
/// back to the first `tool_calls` entry; otherwise `message.content`.
///
/// # Errors
/// Returns `GatewayError::MalformedResponse` if the expected field is absent.
pub fn extract_output(json: &Value, schema: &ResponseSchema) -> Result<String, GatewayError> {
    let message = &json["choices"][0]["message"];
    if message.is_null() {
        return Err(GatewayError::MalformedResponse(
            "response has no choices[0].message".into(),
        ));
    }

    let text = match schema {
        ResponseSchema::Function(function) => message["function_call"]["arguments"]
            .as_str()
            .or_else(|| message["tool_calls"][0]["function"]["arguments"].as_str())
            .ok_or_else(|| {
                GatewayError::MalformedResponse(format!(
                    "model did not call function '{}'",
                    function.name
                ))
            })?,
        ResponseSchema::TypeName(_) => message["content"].as_str().ok_or_else(|| {
            GatewayError::MalformedResponse("response message has no text content".into())
        })?,
    };

    Ok(text.to_string())
}
