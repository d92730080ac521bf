//! Configuration loading for curio
//!
//! Bootstrap configuration is a single TOML file. Resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `CURIO_CONFIG` environment variable
//! 3. Platform config dir (`~/.config/curio/config.toml` on Linux)
//! 4. Built-in defaults
//!
//! Provider API keys additionally resolve from `CURIO_*_API_KEY` environment
//! variables, which win over the TOML file.

use crate::models::ContentType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CURIO_CONFIG";

/// Environment variable naming the Redis cache backend
pub const REDIS_URL_ENV_VAR: &str = "CURIO_REDIS_URL";

/// Provider names accepted in `[resolver]` tier lists
pub const KNOWN_PROVIDERS: &[&str] = &["anilist", "jikan", "kitsu", "find_my_anime", "omdb", "tmdb"];

/// Complete bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurioConfig {
    /// SQLite database holding preferences and popularity counters
    pub database_path: PathBuf,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub ranking: RankingConfig,
    pub keys: ApiKeys,
}

impl Default for CurioConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            resolver: ResolverConfig::default(),
            ranking: RankingConfig::default(),
            keys: ApiKeys::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Warm cache and eviction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key prefix for metadata records
    pub prefix: String,
    /// Key prefix for alias edges
    pub alias_prefix: String,
    /// Expiry for metadata records (none = kept until evicted)
    pub ttl_secs: Option<u64>,
    /// Expiry for alias edges
    pub alias_ttl_secs: u64,
    /// Eviction starts when memory usage reaches this percentage
    pub threshold_percent: f64,
    /// Percentage of keys removed per eviction pass
    pub cleanup_percent: f64,
    /// Memory budget the usage percentage is computed against
    pub max_memory_bytes: u64,
    /// Shared Redis backend (`redis://host:port/db`); in-process when unset
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "cache".to_string(),
            alias_prefix: "alias".to_string(),
            ttl_secs: None,
            alias_ttl_secs: 30 * 24 * 60 * 60,
            threshold_percent: 80.0,
            cleanup_percent: 20.0,
            max_memory_bytes: 30_000_000,
            redis_url: None,
        }
    }
}

impl CacheConfig {
    /// `CURIO_REDIS_URL` wins over the TOML value
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(REDIS_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                self.redis_url = Some(url.trim().to_string());
            }
        }
    }
}

/// Metadata provider selection and content policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Per-provider call timeout
    pub provider_timeout_ms: u64,
    /// Records carrying any of these genres are rejected
    pub forbidden_genres: Vec<String>,
    /// Titles that are never returned
    pub excluded_titles: Vec<String>,
    /// Tiers for anime; providers inside a tier race, tiers run in order
    pub anime: Vec<Vec<String>>,
    pub movie: Vec<Vec<String>>,
    pub series: Vec<Vec<String>>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 8000,
            forbidden_genres: vec!["Hentai".to_string()],
            excluded_titles: Vec::new(),
            anime: tiers(&[&["anilist", "jikan"], &["kitsu"]]),
            movie: tiers(&[&["omdb", "tmdb"]]),
            series: tiers(&[&["omdb", "tmdb"]]),
        }
    }
}

fn tiers(groups: &[&[&str]]) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|tier| tier.iter().map(|p| p.to_string()).collect())
        .collect()
}

impl ResolverConfig {
    /// Provider tiers configured for a content type
    pub fn tiers_for(&self, content_type: ContentType) -> &[Vec<String>] {
        match content_type {
            ContentType::Anime => &self.anime,
            ContentType::Movie => &self.movie,
            ContentType::Series => &self.series,
        }
    }
}

/// Ranking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight of raw similarity inside the rating blend
    pub alpha: f64,
    /// Default number of results returned
    pub top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.75,
            top_k: 20,
        }
    }
}

/// External service credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub omdb: Option<String>,
    pub tmdb: Option<String>,
    pub cohere: Option<String>,
    pub pinecone: Option<String>,
    /// Index host for the Pinecone data plane
    pub pinecone_host: Option<String>,
}

impl CurioConfig {
    /// Load configuration following the documented priority order
    ///
    /// A missing config file is not an error: defaults are used and a
    /// warning is logged. An unreadable or malformed file is an error.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let config = Self::from_file(&path)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => {
                warn!("No config file location available, using defaults");
                Self::default()
            }
        };

        config.keys.apply_env();
        config.cache.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Check value ranges and provider names
    pub fn validate(&self) -> Result<()> {
        let percent = 0.0..=100.0;
        if !percent.contains(&self.cache.threshold_percent) {
            return Err(Error::Config(format!(
                "cache.threshold_percent must be within 0-100, got {}",
                self.cache.threshold_percent
            )));
        }
        if !percent.contains(&self.cache.cleanup_percent) {
            return Err(Error::Config(format!(
                "cache.cleanup_percent must be within 0-100, got {}",
                self.cache.cleanup_percent
            )));
        }
        if self.cache.max_memory_bytes == 0 {
            return Err(Error::Config("cache.max_memory_bytes must be positive".to_string()));
        }
        if let Some(url) = &self.cache.redis_url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(Error::Config(format!(
                    "cache.redis_url must start with redis:// or rediss://, got {}",
                    url
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.ranking.alpha) {
            return Err(Error::Config(format!(
                "ranking.alpha must be within 0-1, got {}",
                self.ranking.alpha
            )));
        }
        if self.ranking.top_k == 0 {
            return Err(Error::Config("ranking.top_k must be at least 1".to_string()));
        }

        for content_type in ContentType::all() {
            let tiers = self.resolver.tiers_for(content_type);
            if tiers.is_empty() {
                return Err(Error::Config(format!("No providers configured for {}", content_type)));
            }
            for tier in tiers {
                if tier.is_empty() {
                    return Err(Error::Config(format!("Empty provider tier for {}", content_type)));
                }
                if let Some(unknown) = tier.iter().find(|p| !KNOWN_PROVIDERS.contains(&p.as_str())) {
                    return Err(Error::Config(format!(
                        "Unknown provider '{}' for {}",
                        unknown, content_type
                    )));
                }
            }
        }

        Ok(())
    }
}

impl ApiKeys {
    /// Overlay keys from `CURIO_*_API_KEY` environment variables
    pub fn apply_env(&mut self) {
        apply_env_key(&mut self.omdb, "CURIO_OMDB_API_KEY", "OMDb");
        apply_env_key(&mut self.tmdb, "CURIO_TMDB_API_KEY", "TMDb");
        apply_env_key(&mut self.cohere, "CURIO_COHERE_API_KEY", "Cohere");
        apply_env_key(&mut self.pinecone, "CURIO_PINECONE_API_KEY", "Pinecone");
        if let Ok(host) = std::env::var("CURIO_PINECONE_HOST") {
            if is_valid_key(&host) {
                self.pinecone_host = Some(host);
            }
        }
    }
}

fn apply_env_key(slot: &mut Option<String>, env_var: &str, label: &str) {
    let Ok(value) = std::env::var(env_var) else {
        return;
    };
    if !is_valid_key(&value) {
        return;
    }
    if slot.as_deref().is_some_and(is_valid_key) {
        warn!(
            "{} API key found in both environment and TOML. Using environment ({}).",
            label, env_var
        );
    }
    *slot = Some(value);
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("curio").join("config.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("curio"))
        .unwrap_or_else(|| PathBuf::from("./curio_data"))
        .join("curio.db")
}
