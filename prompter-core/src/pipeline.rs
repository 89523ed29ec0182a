//! The typed call pipeline: compile -> call -> cast, with retry and
//! prompt enrichment on terminal failure.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PrompterError, Result};
use crate::gateway::ModelGateway;
use crate::prompt::{PromptCompiler, TemplateMode};
use crate::retry::RetryPolicy;
use crate::schema::{ResponseSchema, ReturnSpec};
use crate::types::{Bindings, Message};

/// One registered prompt, callable with keyword bindings.
///
/// The response schema is derived once at build time and shared by every
/// call and every retry. Calls keep no state on the pipeline, so a single
/// pipeline may serve concurrent callers.
pub struct CallPipeline<T> {
    name: String,
    compiler: PromptCompiler,
    returns: Arc<ReturnSpec<T>>,
    schema: Arc<ResponseSchema>,
    gateway: Arc<dyn ModelGateway>,
    retry: RetryPolicy,
}

impl<T> CallPipeline<T> {
    /// Start building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder<T> {
        PipelineBuilder::default()
    }

    /// Label used in logs (defaults to the response schema name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The precomputed response schema.
    #[must_use]
    pub fn schema(&self) -> &ResponseSchema {
        &self.schema
    }

    /// Retry policy applied to each call.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Compile the conversation that would be sent for `bindings`.
    ///
    /// # Errors
    /// `Template` or `PromptParse` failures.
    pub fn compile(&self, bindings: &Bindings) -> Result<Vec<Message>> {
        self.compiler.compile(bindings)
    }

    /// The prompt as it appears in enriched errors.
    ///
    /// # Errors
    /// `Template` or `PromptParse` failures.
    pub fn render_prompt(&self, bindings: &Bindings) -> Result<String> {
        self.compiler.render_debug(bindings)
    }

    /// Run the prompt against the gateway and return the typed result.
    ///
    /// Every attempt recompiles the prompt, calls the gateway and casts the
    /// answer. Failures are retried per the [`RetryPolicy`]; the last one is
    /// returned as [`PrompterError::Enriched`] with the rendered prompt
    /// appended, unless the prompt itself cannot be rendered.
    ///
    /// # Errors
    /// The final failure after all attempts.
    pub async fn call(&self, bindings: &Bindings) -> Result<T> {
        self.retry
            .run(&self.name, |attempt| self.attempt(attempt, bindings))
            .await
            .map_err(|error| self.enrich(error, bindings))
    }

    async fn attempt(&self, attempt: u32, bindings: &Bindings) -> Result<T> {
        let messages = self.compiler.compile(bindings)?;
        debug!(
            prompt = %self.name,
            attempt,
            provider = self.gateway.provider(),
            model = self.gateway.model(),
            turns = messages.len(),
            "calling model"
        );
        let text = self.gateway.call(&messages, &self.schema).await?;
        debug!(prompt = %self.name, bytes = text.len(), "casting model response");
        self.returns.cast(&text)
    }

    fn enrich(&self, error: PrompterError, bindings: &Bindings) -> PrompterError {
        match self.compiler.render_debug(bindings) {
            Ok(prompt) => {
                warn!(prompt = %self.name, kind = ?error.kind(), "prompt call failed");
                error.enrich(prompt)
            }
            Err(render_error) => {
                warn!(
                    prompt = %self.name,
                    kind = ?error.kind(),
                    render_error = %render_error,
                    "prompt call failed and the prompt could not be re-rendered"
                );
                error
            }
        }
    }
}

impl<T> Clone for CallPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            compiler: self.compiler.clone(),
            returns: Arc::clone(&self.returns),
            schema: Arc::clone(&self.schema),
            gateway: Arc::clone(&self.gateway),
            retry: self.retry,
        }
    }
}

impl<T> fmt::Debug for CallPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPipeline")
            .field("name", &self.name)
            .field("mode", &self.compiler.mode())
            .field("returns", &self.returns)
            .field("provider", &self.gateway.provider())
            .field("model", &self.gateway.model())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Collects the pieces of a [`CallPipeline`] and validates them in
/// [`PipelineBuilder::build`].
pub struct PipelineBuilder<T> {
    name: Option<String>,
    template: Option<String>,
    mode: TemplateMode,
    returns: Option<ReturnSpec<T>>,
    gateway: Option<Arc<dyn ModelGateway>>,
    retry: RetryPolicy,
}

impl<T> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self {
            name: None,
            template: None,
            mode: TemplateMode::default(),
            returns: None,
            gateway: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl<T> PipelineBuilder<T> {
    /// Label used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The prompt template (required).
    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Placeholder resolution mode.
    #[must_use]
    pub fn mode(mut self, mode: TemplateMode) -> Self {
        self.mode = mode;
        self
    }

    /// The declared return type (required).
    #[must_use]
    pub fn returns(mut self, returns: ReturnSpec<T>) -> Self {
        self.returns = Some(returns);
        self
    }

    /// The gateway used for every call (required).
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn ModelGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Override the default retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate and derive the response schema.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` if the template, return
    /// declaration or gateway is missing.
    pub fn build(self) -> Result<CallPipeline<T>> {
        let template = self
            .template
            .ok_or_else(|| PrompterError::Configuration("prompt has no template".into()))?;
        let returns = self.returns.ok_or_else(|| {
            PrompterError::Configuration("prompt has no declared return type".into())
        })?;
        let gateway = self
            .gateway
            .ok_or_else(|| PrompterError::Configuration("prompt has no model gateway".into()))?;

        let schema = returns.llm_schema();
        let name = self.name.unwrap_or_else(|| schema.name().to_string());
        debug!(prompt = %name, mode = ?self.mode, "registered prompt");

        Ok(CallPipeline {
            name,
            compiler: PromptCompiler::new(template, self.mode),
            returns: Arc::new(returns),
            schema: Arc::new(schema),
            gateway,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use schemars::JsonSchema;
    use serde::Deserialize;

    use super::*;
    use crate::error::{ErrorKind, GatewayError};

    #[derive(Debug, PartialEq, Deserialize, JsonSchema)]
    struct Answer {
        value: i64,
    }

    struct StubGateway {
        replies: Mutex<VecDeque<std::result::Result<String, GatewayError>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl StubGateway {
        fn new(replies: Vec<std::result::Result<String, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelGateway for StubGateway {
        fn provider(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-1"
        }

        async fn call(
            &self,
            messages: &[Message],
            _schema: &ResponseSchema,
        ) -> std::result::Result<String, GatewayError> {
            self.seen.lock().push(messages.to_vec());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Unavailable("script exhausted".into())))
        }
    }

    fn answer_pipeline(gateway: Arc<StubGateway>, template: &str) -> CallPipeline<Answer> {
        CallPipeline::builder()
            .template(template)
            .returns(ReturnSpec::structured().expect("schema"))
            .gateway(gateway)
            .retry(RetryPolicy::new(3, Duration::ZERO))
            .build()
            .expect("valid pipeline")
    }

    #[tokio::test]
    async fn structured_answer_is_returned() {
        let gateway = StubGateway::new(vec![Ok("{\"value\": 5}".into())]);
        let pipeline = answer_pipeline(Arc::clone(&gateway), ">> user: {q}");

        let answer = pipeline.call(&Bindings::new().with("q", "two plus three")).await;

        assert_eq!(answer.expect("valid answer"), Answer { value: 5 });
        let seen = gateway.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec![Message::new("user", "\"two plus three\"")]);
    }

    #[tokio::test]
    async fn malformed_output_on_every_attempt_is_enriched_validation_error() {
        let gateway = StubGateway::new(vec![
            Ok("nope".into()),
            Ok("nope".into()),
            Ok("nope".into()),
        ]);
        let pipeline = answer_pipeline(Arc::clone(&gateway), ">> system: hello\n>> user: {q}");

        let err = pipeline
            .call(&Bindings::new().with("q", "hi"))
            .await
            .expect_err("never valid");

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("system: \"hello\"\nuser: \"hi\""));
        assert_eq!(gateway.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn missing_binding_fails_before_any_gateway_call() {
        let gateway = StubGateway::new(vec![Ok("{\"value\": 1}".into())]);
        let pipeline = answer_pipeline(Arc::clone(&gateway), ">> user: {name}");

        let err = pipeline.call(&Bindings::new()).await.expect_err("no binding");

        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(err.prompt().is_none(), "unrenderable prompt cannot be appended");
        assert!(gateway.seen.lock().is_empty());
    }

    #[test]
    fn build_requires_return_type() {
        let gateway = StubGateway::new(Vec::new());
        let err = CallPipeline::<Answer>::builder()
            .template(">> user: hi")
            .gateway(gateway)
            .build()
            .expect_err("no return type");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn build_requires_template_and_gateway() {
        let err = CallPipeline::<u32>::builder()
            .returns(ReturnSpec::primitive())
            .gateway(StubGateway::new(Vec::new()))
            .build()
            .expect_err("no template");
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = CallPipeline::<u32>::builder()
            .template(">> user: hi")
            .returns(ReturnSpec::primitive())
            .build()
            .expect_err("no gateway");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn name_defaults_to_schema_name() {
        let pipeline = answer_pipeline(StubGateway::new(Vec::new()), ">> user: hi");
        assert_eq!(pipeline.name(), "Answer");
        assert_eq!(pipeline.schema().name(), "Answer");
    }

    #[test]
    fn render_prompt_shows_compiled_turns() {
        let pipeline = answer_pipeline(
            StubGateway::new(Vec::new()),
            ">> system: hello\n>> user: {q}",
        );
        let prompt = pipeline
            .render_prompt(&Bindings::new().with("q", "hi"))
            .expect("renders");
        assert_eq!(prompt, "system: \"hello\"\nuser: \"hi\"");
    }
}
