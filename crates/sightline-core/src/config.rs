use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SightlineError;

/// Top-level configuration loaded from `.sightline.toml`.
///
/// Every section is optional; missing sections fall back to defaults.
/// API keys may also come from the environment, see [`EmbeddingConfig::resolve_api_key`].
///
/// # Examples
///
/// ```
/// use sightline_core::SightlineConfig;
///
/// let config = SightlineConfig::default();
/// assert_eq!(config.search.default_limit, 10);
/// assert!(!config.reachability.public_api_is_live);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SightlineConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub reachability: ReachabilityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SightlineConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Io`] if the file cannot be read, or
    /// [`SightlineError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sightline_core::SightlineConfig;
    /// use std::path::Path;
    ///
    /// let config = SightlineConfig::from_file(Path::new(".sightline.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, SightlineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use sightline_core::SightlineConfig;
    ///
    /// let toml = r#"
    /// [embedding]
    /// batch_size = 16
    /// "#;
    /// let config = SightlineConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.embedding.batch_size, 16);
    /// assert_eq!(config.embedding.concurrency, 4);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, SightlineError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Config`] naming the offending key.
    ///
    /// # Examples
    ///
    /// ```
    /// use sightline_core::SightlineConfig;
    ///
    /// let mut config = SightlineConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.embedding.concurrency = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), SightlineError> {
        if self.embedding.dimensions == 0 {
            return Err(SightlineError::Config(
                "embedding.dimensions must be greater than 0".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(SightlineError::Config(
                "embedding.batch_size must be greater than 0".into(),
            ));
        }
        if self.embedding.concurrency == 0 {
            return Err(SightlineError::Config(
                "embedding.concurrency must be greater than 0".into(),
            ));
        }
        if self.embedding.max_tokens == 0 {
            return Err(SightlineError::Config(
                "embedding.max_tokens must be greater than 0".into(),
            ));
        }
        if self.search.default_limit == 0 {
            return Err(SightlineError::Config(
                "search.default_limit must be greater than 0".into(),
            ));
        }
        if self.search.candidate_multiplier == 0 {
            return Err(SightlineError::Config(
                "search.candidate_multiplier must be greater than 0".into(),
            ));
        }
        let weights = [self.search.vector_weight, self.search.keyword_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().all(|w| *w == 0.0) {
            return Err(SightlineError::Config(
                "search.vector_weight and search.keyword_weight must be non-negative and not both 0".into(),
            ));
        }
        match self.reranker.provider.as_str() {
            "none" | "http" => {}
            other => {
                return Err(SightlineError::Config(format!(
                    "unknown reranker provider: {other} (expected \"none\" or \"http\")"
                )))
            }
        }
        for pattern in self.index.include.iter().chain(&self.index.exclude) {
            glob::Pattern::new(pattern).map_err(|e| {
                SightlineError::Config(format!("invalid glob pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// Embedding provider settings.
///
/// # Examples
///
/// ```
/// use sightline_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "voyage");
/// assert_eq!(config.dimensions, 1024);
/// assert_eq!(config.max_retries, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name (`"voyage"`, `"openai"`, or any OpenAI-compatible server).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub api_key: Option<String>,
    /// Override for the provider endpoint.
    pub base_url: Option<String>,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Per-text token budget; longer chunks are truncated.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum in-flight provider calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "voyage".into()
}

fn default_embedding_model() -> String {
    "voyage-code-3".into()
}

fn default_dimensions() -> usize {
    1024
}

fn default_max_tokens() -> usize {
    8000
}

fn default_batch_size() -> usize {
    64
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            dimensions: default_dimensions(),
            max_tokens: default_max_tokens(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// API key from config, falling back to `SIGHTLINE_EMBEDDING_API_KEY`
    /// and then the provider's conventional variable (`VOYAGE_API_KEY`,
    /// `OPENAI_API_KEY`).
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("SIGHTLINE_EMBEDDING_API_KEY").ok())
            .or_else(|| {
                let var = format!("{}_API_KEY", self.provider.to_uppercase());
                std::env::var(var).ok()
            })
            .filter(|k| !k.is_empty())
    }
}

/// Reranker settings. Disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `"none"` (pass-through) or `"http"`.
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Documents sent per rerank call; the rest keep retrieval order.
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

fn default_reranker_provider() -> String {
    "none".into()
}

fn default_reranker_model() -> String {
    "rerank-2".into()
}

fn default_max_documents() -> usize {
    100
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_reranker_provider(),
            model: default_reranker_model(),
            api_key: None,
            base_url: None,
            max_documents: default_max_documents(),
        }
    }
}

impl RerankerConfig {
    /// API key from config, falling back to `SIGHTLINE_RERANKER_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("SIGHTLINE_RERANKER_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// Similarity metric of a vector index.
///
/// # Examples
///
/// ```
/// use sightline_core::Metric;
///
/// assert_eq!("inner_product".parse::<Metric>().unwrap(), Metric::InnerProduct);
/// assert_eq!(Metric::default(), Metric::Cosine);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    InnerProduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::InnerProduct => write!(f, "inner_product"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "inner_product" | "dot" => Ok(Metric::InnerProduct),
            other => Err(format!("unknown metric: {other}")),
        }
    }
}

/// How candidates are retrieved before reranking.
///
/// # Examples
///
/// ```
/// use sightline_core::SearchMode;
///
/// assert_eq!(SearchMode::default(), SearchMode::Hybrid);
/// assert_eq!("bm25".parse::<SearchMode>().unwrap(), SearchMode::Keyword);
/// assert!("fuzzy".parse::<SearchMode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector similarity only.
    Vector,
    /// Full-text keyword (BM25) only; the query is not embedded.
    Keyword,
    /// Weighted sum of vector similarity and keyword score.
    #[default]
    Hybrid,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Vector => write!(f, "vector"),
            SearchMode::Keyword => write!(f, "keyword"),
            SearchMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vector" => Ok(SearchMode::Vector),
            "keyword" | "bm25" => Ok(SearchMode::Keyword),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

/// Query-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Candidates fetched per requested result before reranking.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub mode: SearchMode,
    /// Weight of vector similarity in hybrid mode.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    /// Weight of the keyword score in hybrid mode.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
}

fn default_limit() -> usize {
    10
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            candidate_multiplier: default_candidate_multiplier(),
            metric: Metric::default(),
            mode: SearchMode::default(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
        }
    }
}

/// Which files get indexed and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Only index files matching one of these globs (empty = everything).
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    /// Extraction worker threads; 0 uses the number of available cores.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/node_modules/**".into(),
        "**/vendor/**".into(),
        "**/target/**".into(),
    ]
}

fn default_max_file_size() -> u64 {
    1_048_576
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_exclude(),
            workers: 0,
            max_file_size: default_max_file_size(),
        }
    }
}

impl IndexConfig {
    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Entry-point policy for dead-code analysis.
///
/// # Examples
///
/// ```
/// use sightline_core::SightlineConfig;
///
/// let toml = r#"
/// [reachability]
/// public_api_is_live = true
/// entry_points = ["bootstrap"]
///
/// [reachability.languages.python]
/// entry_patterns = ["cli_*"]
/// "#;
/// let config = SightlineConfig::from_toml(toml).unwrap();
/// assert!(config.reachability.public_api_is_live);
/// assert_eq!(config.reachability.languages["python"].entry_patterns, vec!["cli_*"]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReachabilityConfig {
    /// Treat every exported/public symbol as an entry point.
    #[serde(default)]
    pub public_api_is_live: bool,
    /// Explicit symbol names (or symbol paths) that are always live.
    #[serde(default)]
    pub entry_points: Vec<String>,
    /// Per-language additions to the built-in conventions.
    #[serde(default)]
    pub languages: BTreeMap<String, LanguagePolicy>,
}

/// Extra name patterns for one language. `*` matches any run of characters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguagePolicy {
    #[serde(default)]
    pub entry_patterns: Vec<String>,
    #[serde(default)]
    pub test_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = SightlineConfig::default();
        assert_eq!(config.embedding.provider, "voyage");
        assert_eq!(config.embedding.model, "voyage-code-3");
        assert_eq!(config.embedding.dimensions, 1024);
        assert_eq!(config.embedding.max_tokens, 8000);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.concurrency, 4);
        assert_eq!(config.embedding.retry_backoff_ms, 500);
        assert!(!config.reranker.enabled);
        assert_eq!(config.reranker.provider, "none");
        assert_eq!(config.search.candidate_multiplier, 3);
        assert_eq!(config.search.metric, Metric::Cosine);
        assert_eq!(config.search.mode, SearchMode::Hybrid);
        assert_eq!(config.search.vector_weight, 0.7);
        assert_eq!(config.search.keyword_weight, 0.3);
        assert_eq!(config.index.max_file_size, 1_048_576);
        assert_eq!(config.logging.level, "info");
        assert!(config.reachability.entry_points.is_empty());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SightlineConfig::from_toml("").unwrap();
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.embedding.batch_size, 64);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
dimensions = 1536
concurrency = 2

[reranker]
enabled = true
provider = "http"
base_url = "http://localhost:8080"
max_documents = 50

[search]
default_limit = 5
metric = "inner_product"
mode = "keyword"

[index]
include = ["src/**"]
workers = 3

[reachability]
public_api_is_live = true

[reachability.languages.go]
entry_patterns = ["Handle*"]
test_patterns = ["Check*"]

[logging]
level = "debug"
"#;
        let config = SightlineConfig::from_toml(toml).unwrap();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.concurrency, 2);
        assert!(config.reranker.enabled);
        assert_eq!(config.reranker.provider, "http");
        assert_eq!(config.reranker.max_documents, 50);
        assert_eq!(config.search.default_limit, 5);
        assert_eq!(config.search.metric, Metric::InnerProduct);
        assert_eq!(config.search.mode, SearchMode::Keyword);
        assert_eq!(config.index.include, vec!["src/**"]);
        assert_eq!(config.index.worker_count(), 3);
        assert!(config.reachability.public_api_is_live);
        assert_eq!(config.reachability.languages["go"].test_patterns, vec!["Check*"]);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(SightlineConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn unknown_metric_is_rejected_at_parse_time() {
        let result = SightlineConfig::from_toml("[search]\nmetric = \"euclid\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = SightlineConfig::default();
        config.embedding.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn validate_rejects_unusable_search_weights() {
        let mut config = SightlineConfig::default();
        config.search.vector_weight = 0.0;
        config.search.keyword_weight = 0.0;
        assert!(config.validate().is_err());

        config.search.vector_weight = -1.0;
        config.search.keyword_weight = 1.0;
        assert!(config.validate().is_err());

        config.search.vector_weight = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_reranker() {
        let mut config = SightlineConfig::default();
        config.reranker.provider = "magic".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_glob() {
        let mut config = SightlineConfig::default();
        config.index.exclude.push("src/[".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("src/["));
    }

    #[test]
    fn worker_count_defaults_to_cores() {
        let config = IndexConfig::default();
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn config_api_key_wins_over_env() {
        let config = EmbeddingConfig {
            api_key: Some("from-file".into()),
            ..EmbeddingConfig::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-file"));
    }
}
