use crate::error::{AnnotatorError, Result};

/// Models the extractor may be run with.
pub const ALLOWED_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"];

pub const DEFAULT_MODEL: &str = "gpt-4o";

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com";

/// Check a model tag against [`ALLOWED_MODELS`].
pub fn validate_model_tag(model: &str) -> Result<()> {
    if ALLOWED_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(AnnotatorError::InvalidModel {
            name: model.to_string(),
            allowed: ALLOWED_MODELS.iter().map(|m| (*m).to_string()).collect(),
        })
    }
}

/// Configuration for LLM-based criteria extraction.
///
/// The model is not part of it: each extraction names its model tag.
#[derive(Clone)]
pub struct ExtractorConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Requests per record, counting the first one and each repair request.
    pub max_attempts: u32,
}

impl std::fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl ExtractorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AnnotatorError::Config("OPENAI_API_KEY not set".into()))?;

        let api_base_url =
            std::env::var("LLM_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into());

        let temperature = std::env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);

        let max_tokens = std::env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4096);

        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let max_attempts = std::env::var("LLM_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);

        Ok(Self {
            api_key,
            api_base_url,
            temperature,
            max_tokens,
            timeout_secs,
            max_attempts,
        })
    }

    /// Create a config builder for testing.
    pub fn builder(api_key: impl Into<String>) -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self {
                api_key: api_key.into(),
                api_base_url: DEFAULT_API_BASE_URL.into(),
                temperature: 0.0,
                max_tokens: 4096,
                timeout_secs: 120,
                max_attempts: 2,
            },
        }
    }
}

/// Builder for constructing `ExtractorConfig` in tests.
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.config.api_base_url = api_base_url.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts.max(1);
        self
    }

    pub fn build(self) -> ExtractorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_model_tag() {
        assert!(validate_model_tag("gpt-4o").is_ok());
        let err = validate_model_tag("gpt-2").unwrap_err();
        assert!(err.to_string().contains("gpt-2"));
        assert!(err.to_string().contains("gpt-4o-mini"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ExtractorConfig::builder("sk-secret").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("api.openai.com"));
    }

    #[test]
    fn test_builder_clamps_attempts() {
        let config = ExtractorConfig::builder("k").max_attempts(0).build();
        assert_eq!(config.max_attempts, 1);
    }
}
