//! Pipeline configuration
//!
//! All recognized options with their defaults. Loadable from YAML or built
//! in code via `Default` + setter methods. Transport flags, ports, and
//! env-var names belong to the collaborator layers, not here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Auto-link mode for exported markdown bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoLinkMode {
    /// Link only the first occurrence of each entity label.
    #[default]
    First,
    /// Link every occurrence.
    All,
}

/// One provider slot in the LLM fallback chain, cheap-fast first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSlot {
    /// Provider name (e.g., "groq", "anthropic", "openai", "google").
    pub provider: String,
    /// Model identifier passed through to the client.
    pub model: String,
    /// Max concurrent in-flight calls for this provider.
    #[serde(default = "default_provider_concurrency")]
    pub concurrency: usize,
    /// Cost per 1K input tokens in USD, for accounting.
    #[serde(default)]
    pub usd_per_1k_in: f64,
    /// Cost per 1K output tokens in USD, for accounting.
    #[serde(default)]
    pub usd_per_1k_out: f64,
}

fn default_provider_concurrency() -> usize {
    4
}

/// Configuration for the ingestion pipeline.
///
/// Every field has a working default; `PipelineConfig::default()` is a
/// runnable configuration (with mock collaborators).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cross-document parallelism.
    pub worker_concurrency: usize,
    /// Ordered provider fallback chain.
    pub llm_provider_chain: Vec<ProviderSlot>,
    /// Per-LLM-call timeout in seconds.
    pub llm_timeout_s: u64,
    /// Per-document end-to-end budget in seconds.
    pub doc_budget_s: u64,
    /// Run the enrichment critic pass.
    pub enable_critic: bool,
    /// Enforce the quality gate.
    pub enable_gating: bool,
    /// Signalness threshold below which documents are gated.
    pub sigma_min: f64,
    /// Similarity threshold for near-duplicate detection.
    pub duplicate_fuzzy_threshold: f64,
    /// Target chunk size in tokens.
    pub chunk_target_tokens: usize,
    /// Hard chunk ceiling in tokens.
    pub chunk_max_tokens: usize,
    /// Recency decay constant in days.
    pub recency_tau_days: f64,
    /// Content window handed to the enrichment LLM, in chars.
    pub max_content_chars: usize,
    /// Upper bound on document text retained at extraction, in chars.
    pub max_document_chars: usize,
    /// Controlled-vocabulary source file.
    pub vocabulary_path: Option<PathBuf>,
    /// Wiki-link density in exported bodies.
    pub export_auto_link: AutoLinkMode,
    /// Advanced when the enrichment schema changes.
    pub enrichment_version: String,
    /// Bounded capacity of the ingest queue.
    pub ingest_queue_capacity: usize,
    /// Concurrent image-heavy extractions (OCR, visual LLM).
    pub max_image_extractions: usize,
    /// Per-document LLM spend ceiling in USD. `None` disables the check.
    pub cost_budget_usd: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            llm_provider_chain: Vec::new(),
            llm_timeout_s: 30,
            doc_budget_s: 300,
            enable_critic: false,
            enable_gating: true,
            sigma_min: 0.2,
            duplicate_fuzzy_threshold: 0.92,
            chunk_target_tokens: 500,
            chunk_max_tokens: 800,
            recency_tau_days: 180.0,
            max_content_chars: 8000,
            max_document_chars: 400_000,
            vocabulary_path: None,
            export_auto_link: AutoLinkMode::First,
            enrichment_version: "v2".to_string(),
            ingest_queue_capacity: 64,
            max_image_extractions: 2,
            cost_budget_usd: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check value ranges that silently break the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid("worker_concurrency must be > 0".into()));
        }
        if self.chunk_max_tokens < self.chunk_target_tokens {
            return Err(ConfigError::Invalid(
                "chunk_max_tokens must be >= chunk_target_tokens".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sigma_min) {
            return Err(ConfigError::Invalid("sigma_min must be in [0,1]".into()));
        }
        if !(0.0..=1.0).contains(&self.duplicate_fuzzy_threshold) {
            return Err(ConfigError::Invalid(
                "duplicate_fuzzy_threshold must be in [0,1]".into(),
            ));
        }
        Ok(())
    }

    pub fn with_worker_concurrency(mut self, n: usize) -> Self {
        self.worker_concurrency = n;
        self
    }

    pub fn with_provider_chain(mut self, chain: Vec<ProviderSlot>) -> Self {
        self.llm_provider_chain = chain;
        self
    }

    pub fn with_gating(mut self, enabled: bool) -> Self {
        self.enable_gating = enabled;
        self
    }

    pub fn with_critic(mut self, enabled: bool) -> Self {
        self.enable_critic = enabled;
        self
    }

    pub fn with_sigma_min(mut self, sigma: f64) -> Self {
        self.sigma_min = sigma;
        self
    }

    pub fn with_vocabulary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vocabulary_path = Some(path.into());
        self
    }

    pub fn with_auto_link(mut self, mode: AutoLinkMode) -> Self {
        self.export_auto_link = mode;
        self
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.llm_timeout_s, 30);
        assert_eq!(config.doc_budget_s, 300);
        assert!(!config.enable_critic);
        assert!(config.enable_gating);
        assert_eq!(config.sigma_min, 0.2);
        assert_eq!(config.duplicate_fuzzy_threshold, 0.92);
        assert_eq!(config.chunk_target_tokens, 500);
        assert_eq!(config.chunk_max_tokens, 800);
        assert_eq!(config.recency_tau_days, 180.0);
        assert_eq!(config.max_content_chars, 8000);
        assert_eq!(config.export_auto_link, AutoLinkMode::First);
    }

    #[test]
    fn validate_rejects_inverted_chunk_bounds() {
        let config = PipelineConfig {
            chunk_target_tokens: 800,
            chunk_max_tokens: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_round_trip_preserves_chain() {
        let config = PipelineConfig::default().with_provider_chain(vec![ProviderSlot {
            provider: "groq".into(),
            model: "llama-3.1-8b-instant".into(),
            concurrency: 8,
            usd_per_1k_in: 0.00005,
            usd_per_1k_out: 0.00008,
        }]);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.llm_provider_chain.len(), 1);
        assert_eq!(back.llm_provider_chain[0].provider, "groq");
    }
}
