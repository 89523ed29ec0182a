//! `Prompter` binds a gateway and a template mode, then registers prompts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use prompter_core::error::{PrompterError, Result};
use prompter_core::{
    CallPipeline, ModelGateway, PipelineBuilder, PrompterConfig, RetryPolicy, ReturnSpec,
    TemplateMode,
};
use tracing::debug;

use crate::client::OpenAiGateway;

/// Providers a [`Prompter`] can be built for by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI chat completions (or a compatible server).
    OpenAi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = PrompterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            _ => Err(PrompterError::Configuration(format!("unknown LLM provider: '{s}'"))),
        }
    }
}

/// Factory that wires registered prompts to one shared gateway.
///
/// # Example
///
/// ```no_run
/// use prompter_llm::Prompter;
/// use prompter_core::{Bindings, ReturnSpec, TemplateMode};
///
/// # async fn demo() -> prompter_core::error::Result<()> {
/// let prompter = Prompter::new("openai", "gpt-4o-mini", TemplateMode::Literal)?;
/// let capital = prompter.register::<String>(
///     ">> system: Reply with a city name only.\n>> user: Capital of {country}?",
///     ReturnSpec::primitive(),
/// )?;
/// let city = capital.call(&Bindings::new().with("country", "France")).await?;
/// # let _ = city;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Prompter {
    gateway: Arc<dyn ModelGateway>,
    mode: TemplateMode,
    retry: RetryPolicy,
}

impl Prompter {
    /// Build for a provider name (`"openai"`) and model.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` for an unknown provider.
    pub fn new(provider: &str, model: &str, mode: TemplateMode) -> Result<Self> {
        let config = PrompterConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            templated: mode == TemplateMode::Templated,
            ..PrompterConfig::default()
        };
        Self::from_config(&config)
    }

    /// Build from configuration.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` for an unknown provider.
    pub fn from_config(config: &PrompterConfig) -> Result<Self> {
        let gateway: Arc<dyn ModelGateway> = match config.provider.parse::<ProviderKind>()? {
            ProviderKind::OpenAi => Arc::new(OpenAiGateway::with_config(
                config.model.clone(),
                config.openai.clone(),
            )),
        };
        debug!(provider = %config.provider, model = %config.model, "prompter configured");

        Ok(Self {
            gateway,
            mode: config.mode(),
            retry: config.retry,
        })
    }

    /// Bind an arbitrary gateway.
    #[must_use]
    pub fn with_gateway(gateway: Arc<dyn ModelGateway>, mode: TemplateMode) -> Self {
        Self {
            gateway,
            mode,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy given to every registered prompt.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The shared gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    /// Template mode for registered prompts.
    #[must_use]
    pub fn mode(&self) -> TemplateMode {
        self.mode
    }

    /// Retry policy for registered prompts.
    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// A pipeline builder pre-wired with this prompter's gateway, mode and
    /// retry policy.
    #[must_use]
    pub fn builder<T>(&self) -> PipelineBuilder<T> {
        CallPipeline::builder()
            .gateway(Arc::clone(&self.gateway))
            .mode(self.mode)
            .retry(self.retry)
    }

    /// Register a prompt with its template and declared return type.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` if the pipeline is incomplete.
    pub fn register<T>(
        &self,
        template: impl Into<String>,
        returns: ReturnSpec<T>,
    ) -> Result<CallPipeline<T>> {
        self.builder().template(template).returns(returns).build()
    }
}

impl fmt::Debug for Prompter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompter")
            .field("provider", &self.gateway.provider())
            .field("model", &self.gateway.model())
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .finish()
    }
}
