//! Error types for prompt compilation, schema casting and gateway calls.

use thiserror::Error;

/// Coarse classification of a [`PrompterError`], stable through enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup-time mistake; never retried.
    Configuration,
    /// Template rendering failed.
    Template,
    /// A rendered turn segment was not a one-key YAML mapping.
    PromptParse,
    /// Provider text did not deserialize into the structured return type.
    Validation,
    /// Provider text could not be parsed into the primitive return type.
    Cast,
    /// Transport, authentication or provider-side failure.
    Gateway,
}

/// Failures raised by a [`ModelGateway`](crate::gateway::ModelGateway).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The credential environment variable is not set.
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// Provider answered with a non-success HTTP status.
    #[error("provider returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Request timed out.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// Provider could not be reached.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed for another reason.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// Response body did not have the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Top-level error type for all prompter operations.
#[derive(Debug, Error)]
pub enum PrompterError {
    /// Registration or construction is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The template could not be rendered against the bindings.
    #[error("template error: {0}")]
    Template(String),

    /// A turn segment is not valid YAML or not shaped `role: content`.
    #[error("failed to parse prompt segment: {reason}\n\n{segment}\n\nrendered prompt:\n\n{rendered}")]
    PromptParse {
        /// Parser or shape complaint.
        reason: String,
        /// The offending, trimmed segment.
        segment: String,
        /// The full rendered template.
        rendered: String,
    },

    /// Provider text failed structured validation.
    #[error("failed to validate JSON ({reason}):\n\n{text}")]
    Validation {
        /// Deserializer complaint.
        reason: String,
        /// Raw provider text.
        text: String,
    },

    /// Provider text could not be cast into a primitive type.
    #[error("failed to parse {type_name} ({reason}):\n\n{text}")]
    Cast {
        /// Advertised type name.
        type_name: String,
        /// `FromStr` complaint.
        reason: String,
        /// Raw provider text.
        text: String,
    },

    /// Gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Terminal failure with the rendered prompt appended.
    #[error("{source}\n\nPrompt:\n\n{prompt}")]
    Enriched {
        /// The failure that exhausted the retries.
        source: Box<PrompterError>,
        /// Debug rendering of the prompt that was (or would have been) sent.
        prompt: String,
    },
}

impl PrompterError {
    /// Classification of the underlying failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Template(_) => ErrorKind::Template,
            Self::PromptParse { .. } => ErrorKind::PromptParse,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Cast { .. } => ErrorKind::Cast,
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::Enriched { source, .. } => source.kind(),
        }
    }

    /// The error with any enrichment stripped.
    #[must_use]
    pub fn root(&self) -> &PrompterError {
        match self {
            Self::Enriched { source, .. } => source.root(),
            other => other,
        }
    }

    /// The appended prompt text, if this error was enriched.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::Enriched { prompt, .. } => Some(prompt),
            _ => None,
        }
    }

    /// Whether the call pipeline may retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Configuration
    }

    /// Wrap `self` with the prompt that produced it.
    #[must_use]
    pub fn enrich(self, prompt: impl Into<String>) -> Self {
        Self::Enriched {
            source: Box::new(self),
            prompt: prompt.into(),
        }
    }
}

impl From<toml::de::Error> for PrompterError {
    fn from(err: toml::de::Error) -> Self {
        PrompterError::Configuration(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, PrompterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enriched_message_appends_prompt() {
        let err = PrompterError::Template("undefined value `name`".into())
            .enrich("system: \"hello\"");
        let text = err.to_string();
        assert!(text.starts_with("template error: undefined value `name`"));
        assert!(text.ends_with("Prompt:\n\nsystem: \"hello\""));
    }

    #[test]
    fn kind_and_root_see_through_enrichment() {
        let err = PrompterError::from(GatewayError::Timeout(500)).enrich("user: \"hi\"");
        assert_eq!(err.kind(), ErrorKind::Gateway);
        assert!(matches!(err.root(), PrompterError::Gateway(GatewayError::Timeout(500))));
        assert_eq!(err.prompt(), Some("user: \"hi\""));
    }

    #[test]
    fn configuration_is_not_retryable() {
        assert!(!PrompterError::Configuration("no return type".into()).is_retryable());
        assert!(PrompterError::Cast {
            type_name: "u32".into(),
            reason: "invalid digit".into(),
            text: "five".into(),
        }
        .is_retryable());
    }
}
