//! Configuration for prompter, loadable from TOML.
//!
//! ```toml
//! provider = "openai"
//! model = "gpt-4o-mini"
//! templated = true
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 1000
//!
//! [openai]
//! base_url = "https://api.openai.com"
//! api_key_env = "OPENAI_API_KEY"
//! request_timeout_ms = 60000
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PrompterError, Result};
use crate::prompt::TemplateMode;
use crate::retry::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrompterConfig {
    /// Provider name; only `"openai"` is recognized.
    #[serde(default = "default_openai")]
    pub provider: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Render templates with Jinja syntax instead of `{name}` substitution.
    #[serde(default)]
    pub templated: bool,
    /// Retry policy for every registered prompt.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// OpenAI-compatible transport settings.
    #[serde(default)]
    pub openai: OpenAiConfig,
}

impl Default for PrompterConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            model: default_model(),
            templated: false,
            retry: RetryPolicy::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl PrompterConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `PrompterError::Configuration` if the file cannot be read or
    /// parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PrompterError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Template mode implied by `templated`.
    #[must_use]
    pub fn mode(&self) -> TemplateMode {
        TemplateMode::from(self.templated)
    }
}

/// Settings for the OpenAI chat-completions transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API root, without the `/v1/...` path.
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Hard timeout for a single HTTP request in milliseconds.
    #[serde(default = "default_60000")]
    pub request_timeout_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            api_key_env: default_api_key_env(),
            request_timeout_ms: 60_000,
        }
    }
}

fn default_openai() -> String { "openai".to_string() }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_openai_url() -> String { "https://api.openai.com".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_60000() -> u64 { 60_000 }

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = PrompterConfig::from_toml("").expect("empty is valid");
        assert_eq!(config, PrompterConfig::default());
        assert_eq!(config.mode(), TemplateMode::Literal);
        assert_eq!(config.openai.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn partial_toml_overrides() {
        let config = PrompterConfig::from_toml(
            r#"
            model = "gpt-4o-mini"
            templated = true

            [retry]
            delay_ms = 10

            [openai]
            base_url = "http://localhost:8080"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.mode(), TemplateMode::Templated);
        assert_eq!(config.retry, RetryPolicy::new(3, Duration::from_millis(10)));
        assert_eq!(config.openai.base_url, "http://localhost:8080");
        assert_eq!(config.openai.request_timeout_ms, 60_000);
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        let err = PrompterConfig::from_toml("model = [").expect_err("broken toml");
        assert!(matches!(err, PrompterError::Configuration(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "provider = \"openai\"\nmodel = \"gpt-4\"").expect("write");
        let config = PrompterConfig::from_file(file.path()).expect("loads");
        assert_eq!(config.model, "gpt-4");
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = PrompterConfig::from_file(std::path::Path::new("/nonexistent/prompter.toml"))
            .expect_err("no such file");
        assert!(matches!(err, PrompterError::Configuration(_)));
    }
}
