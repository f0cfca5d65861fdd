//! Foundation-model providers.
//!
//! Single source of truth for supported providers and their defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAI,
    Gemini,
}

impl Provider {
    /// All available providers
    pub const ALL: &'static [Provider] = &[Provider::Anthropic, Provider::OpenAI, Provider::Gemini];

    /// Provider name as used in config files, the CLI and the rig client builder
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Default model for document review
    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-5-20250929",
            Self::OpenAI => "gpt-5.1",
            Self::Gemini => "gemini-2.5-pro",
        }
    }

    /// Environment variable name for the API key
    pub const fn api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Whether the provider's API accepts a `top_k` sampling parameter
    pub const fn supports_top_k(&self) -> bool {
        matches!(self, Self::Anthropic | Self::Gemini)
    }

    /// Get all provider names as strings
    pub fn all_names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::name).collect()
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let normalized = match lower.as_str() {
            "claude" | "bedrock" => "anthropic",
            "google" => "gemini",
            other => other,
        };

        Self::ALL
            .iter()
            .find(|p| p.name() == normalized)
            .copied()
            .ok_or_else(|| ProviderError::Unknown(s.to_string()))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Provider configuration error
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}. Supported: anthropic, openai, gemini")]
    Unknown(String),
    #[error("API key required for provider {0}: set {1}")]
    MissingApiKey(String, &'static str),
}

/// Per-provider configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier sent with every request
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    /// Base URL override handed to the provider client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Additional provider-specific params, merged into each request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_params: HashMap<String, String>,
}

impl ProviderConfig {
    /// Create config with defaults for a provider
    pub fn with_defaults(provider: Provider) -> Self {
        Self {
            model: provider.default_model().to_string(),
            ..Self::default()
        }
    }

    /// Get effective model (configured or default)
    pub fn effective_model(&self, provider: Provider) -> &str {
        if self.model.is_empty() {
            provider.default_model()
        } else {
            &self.model
        }
    }
}

/// Check that the provider's API key is present in the environment
pub fn check_api_key(provider: Provider) -> Result<(), ProviderError> {
    match std::env::var(provider.api_key_env()) {
        Ok(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(ProviderError::MissingApiKey(
            provider.name().to_string(),
            provider.api_key_env(),
        )),
    }
}
