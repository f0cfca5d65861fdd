use crate::extraction::{ExtractionSchema, FieldSpec};
use crate::llm::{RetryPolicy, SamplingParameters};
use crate::log_debug;
use crate::pipeline::{DEFAULT_AUTHORITY, DEFAULT_CODE, ReviewSettings};
use crate::providers::{Provider, ProviderConfig};
use crate::qa::{ComplianceQuestion, default_questions};

use anyhow::{Context, Result, anyhow};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the platform config dir
const CONFIG_DIR_NAME: &str = "aoh-review";

/// Configuration structure for the review tool
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Provider used when none is given on the command line
    pub default_provider: String,
    /// Token budget for documents embedded in prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_document_tokens: Option<usize>,
    /// Replaces the built-in compliance questions when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<String>>,
    /// Provider-specific configurations
    pub providers: HashMap<String, ProviderConfig>,
    pub sampling: SamplingParameters,
    pub retry: RetryPolicy,
    pub checklist: ChecklistConfig,
    /// Replaces the built-in extraction fields when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSpec>>,
}

/// Which requirements the instruction document is read for
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ChecklistConfig {
    pub authority: String,
    pub code: String,
}

impl Default for ChecklistConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            code: DEFAULT_CODE.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        for provider in Provider::ALL {
            providers.insert(
                provider.name().to_string(),
                ProviderConfig::with_defaults(*provider),
            );
        }

        Self {
            default_provider: Provider::default().name().to_string(),
            max_document_tokens: None,
            questions: None,
            providers,
            sampling: SamplingParameters::default(),
            retry: RetryPolicy::default(),
            checklist: ChecklistConfig::default(),
            fields: None,
        }
    }
}

/// Changes requested from the command line; `None` leaves a value alone
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Base URL for the default provider; an empty value restores the default
    pub endpoint: Option<String>,
    pub params: Option<HashMap<String, String>>,
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_document_tokens: Option<usize>,
    pub authority: Option<String>,
    pub code: Option<String>,
}

impl Config {
    /// Load the configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                anyhow!(
                    "Invalid configuration file format: {}. Please check {} for syntax errors.",
                    e,
                    path.display()
                )
            })?;
            config.migrate_provider_aliases()
        } else {
            Self::default()
        };

        log_debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Save the configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        log_debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let mut path =
            config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
        path.push(CONFIG_DIR_NAME);
        path.push("config.toml");
        Ok(path)
    }

    /// Rename provider sections saved under an alias (`claude`, `bedrock`, `google`)
    fn migrate_provider_aliases(mut self) -> Self {
        let aliased: Vec<String> = self
            .providers
            .keys()
            .filter(|name| {
                name.parse::<Provider>()
                    .is_ok_and(|provider| provider.name() != name.as_str())
            })
            .cloned()
            .collect();

        for alias in aliased {
            if let (Some(section), Ok(provider)) =
                (self.providers.remove(&alias), alias.parse::<Provider>())
            {
                log_debug!("Migrating '{}' provider to '{}'", alias, provider);
                self.providers
                    .entry(provider.name().to_string())
                    .or_insert(section);
            }
        }

        if let Ok(provider) = self.default_provider.parse::<Provider>() {
            self.default_provider = provider.name().to_string();
        }
        self
    }

    /// Check every value a run depends on
    pub fn validate(&self) -> Result<()> {
        self.provider()?;
        self.sampling
            .validate()
            .map_err(|e| anyhow!("Invalid sampling parameters: {}", e))?;
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.retry.timeout_ms == 0 {
            return Err(anyhow!("retry.timeout_ms must be greater than 0"));
        }
        self.schema().context("Invalid extraction fields")?;
        if self.questions.as_ref().is_some_and(Vec::is_empty) {
            return Err(anyhow!("questions override must not be empty"));
        }
        Ok(())
    }

    /// The configured default provider
    pub fn provider(&self) -> Result<Provider> {
        self.default_provider.parse().map_err(|_| {
            anyhow!(
                "Invalid provider: {}. Available: {}",
                self.default_provider,
                Provider::all_names().join(", ")
            )
        })
    }

    /// Configuration for `provider`, or its defaults when unset
    pub fn provider_config(&self, provider: Provider) -> ProviderConfig {
        self.providers
            .get(provider.name())
            .cloned()
            .unwrap_or_else(|| ProviderConfig::with_defaults(provider))
    }

    /// Model id for `provider` after applying defaults
    pub fn model_id(&self, provider: Provider) -> String {
        self.provider_config(provider)
            .effective_model(provider)
            .to_string()
    }

    /// Extraction schema, from the `fields` override or the built-in fields
    pub fn schema(&self) -> Result<ExtractionSchema> {
        match &self.fields {
            Some(fields) => Ok(ExtractionSchema::new(fields.clone())?),
            None => Ok(ExtractionSchema::affidavit_of_heirship()),
        }
    }

    /// Compliance questions, from the override or the built-in set
    pub fn questions(&self) -> Vec<ComplianceQuestion> {
        self.questions.as_ref().map_or_else(default_questions, |qs| {
            qs.iter().map(ComplianceQuestion::new).collect()
        })
    }

    /// Settings for the standard chain against `provider`
    pub fn review_settings(&self, provider: Provider) -> Result<ReviewSettings> {
        Ok(ReviewSettings {
            model_id: self.model_id(provider),
            sampling: self.sampling,
            authority: self.checklist.authority.clone(),
            code: self.checklist.code.clone(),
            schema: self.schema()?,
            questions: self.questions(),
            max_document_tokens: self.max_document_tokens,
        })
    }

    /// Apply `update`, returning whether anything changed
    pub fn update(&mut self, update: ConfigUpdate) -> Result<bool> {
        let before = self.clone();

        if let Some(provider) = update.provider {
            let provider: Provider = provider.parse().map_err(|_| {
                anyhow!(
                    "Invalid provider: {}. Available: {}",
                    provider,
                    Provider::all_names().join(", ")
                )
            })?;
            self.default_provider = provider.name().to_string();
            self.providers
                .entry(provider.name().to_string())
                .or_insert_with(|| ProviderConfig::with_defaults(provider));
        }

        let provider_config = self
            .providers
            .get_mut(&self.default_provider)
            .context("Could not get default provider")?;
        if let Some(model) = update.model {
            provider_config.model = model;
        }
        if let Some(endpoint) = update.endpoint {
            let endpoint = endpoint.trim();
            provider_config.endpoint = (!endpoint.is_empty()).then(|| endpoint.to_string());
        }
        if let Some(params) = update.params {
            provider_config.additional_params.extend(params);
        }

        if let Some(max_attempts) = update.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(secs) = update.timeout_secs {
            self.retry.timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(tokens) = update.max_document_tokens {
            self.max_document_tokens = Some(tokens);
        }
        if let Some(authority) = update.authority {
            self.checklist.authority = authority;
        }
        if let Some(code) = update.code {
            self.checklist.code = code;
        }

        self.validate()?;
        let changed = *self != before;
        if changed {
            log_debug!("Configuration updated: {:?}", self);
        }
        Ok(changed)
    }
}
