//! curio-rec library interface
//!
//! Title resolution, warm caching and preference-based ranking for content
//! recommendations. The binary in `main.rs` is a thin CLI over [`Pipeline`].

pub mod background;
pub mod cache;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod providers;
pub mod ranking;
pub mod resolver;
pub mod service;
pub mod types;

pub use crate::error::{RecommendError, RecommendResult};

use crate::background::{BackgroundHandle, BackgroundWorker};
use crate::cache::{AliasCache, CacheSettings, CacheStore, MemoryStore, RedisStore};
use crate::db::{PreferenceStore, SqlitePreferenceStore};
use crate::embeddings::{CohereEmbedder, EmbeddingIndex, MemoryVectorStore, PineconeStore, VectorStore};
use crate::generator::TitleGenerator;
use crate::orchestrator::ResolutionOrchestrator;
use crate::providers::{http_client, ProviderRegistry};
use crate::ranking::RankingEngine;
use crate::resolver::MultiSourceResolver;
use crate::service::{EvictionPolicy, Recommender};
use curio_common::config::{is_valid_key, CacheConfig, CurioConfig};
use curio_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Timeout for embedding and generation calls
const SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-lifetime handles built from configuration
#[derive(Clone)]
pub struct Pipeline {
    pub cache: AliasCache,
    pub orchestrator: ResolutionOrchestrator,
    pub background: BackgroundHandle,
    pub preferences: Arc<dyn PreferenceStore>,
    pub embeddings: Option<EmbeddingIndex>,
    pub ranking: RankingEngine,
    pub eviction: EvictionPolicy,
}

impl Pipeline {
    /// Build every component and start the background worker
    ///
    /// Embeddings are enabled when a Cohere key is configured; vectors go to
    /// Pinecone when its key and host are set, otherwise they stay in memory.
    pub fn from_config(config: &CurioConfig, store: Arc<dyn CacheStore>, db: SqlitePool) -> Result<Self> {
        let cache = AliasCache::new(store, CacheSettings::from(&config.cache));

        let registry = ProviderRegistry::from_config(config)?;
        let resolver = Arc::new(MultiSourceResolver::from_config(config, &registry));
        let orchestrator = ResolutionOrchestrator::new(cache.clone(), resolver);

        let preferences: Arc<dyn PreferenceStore> = Arc::new(SqlitePreferenceStore::new(db));
        let embeddings = embedding_index(config)?;

        let background = BackgroundWorker::spawn(
            cache.clone(),
            embeddings.clone(),
            Some(Arc::clone(&preferences)),
        );

        info!(embeddings = embeddings.is_some(), "Pipeline ready");

        Ok(Self {
            cache,
            orchestrator,
            background,
            preferences,
            embeddings,
            ranking: RankingEngine::new(config.ranking.alpha),
            eviction: EvictionPolicy::from(&config.cache),
        })
    }

    /// Recommender sharing this pipeline's handles
    pub fn recommender(&self, generator: Arc<dyn TitleGenerator>) -> Recommender {
        let recommender = Recommender::new(
            generator,
            self.orchestrator.clone(),
            Arc::clone(&self.preferences),
            self.background.clone(),
        )
        .with_ranking(self.ranking.clone())
        .with_eviction(self.eviction.clone());

        match &self.embeddings {
            Some(index) => recommender.with_embeddings(index.clone()),
            None => recommender,
        }
    }
}

/// Cache backend for `config`: Redis when a URL is set, in-process otherwise
pub fn cache_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.redis_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            let store = RedisStore::open(url).map_err(|e| Error::Config(e.to_string()))?;
            info!("Cache backend: redis");
            Ok(Arc::new(store))
        }
        None => {
            info!("Cache backend: in-process");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn embedding_index(config: &CurioConfig) -> Result<Option<EmbeddingIndex>> {
    let Some(cohere_key) = config.keys.cohere.clone().filter(|k| is_valid_key(k)) else {
        return Ok(None);
    };

    let client = http_client(SERVICE_TIMEOUT)?;
    let store: Arc<dyn VectorStore> = match (&config.keys.pinecone, &config.keys.pinecone_host) {
        (Some(key), Some(host)) if is_valid_key(key) && !host.trim().is_empty() => {
            Arc::new(PineconeStore::new(client.clone(), host, key.clone()))
        }
        _ => Arc::new(MemoryVectorStore::new()),
    };

    Ok(Some(EmbeddingIndex::new(
        Arc::new(CohereEmbedder::new(client, cohere_key)),
        store,
    )))
}

/// HTTP client for the title generator
pub fn generator_client() -> Result<reqwest::Client> {
    http_client(SERVICE_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_store_selection() {
        let mut config = CacheConfig::default();
        assert!(cache_store(&config).is_ok());

        config.redis_url = Some("redis://127.0.0.1:6379/0".to_string());
        assert!(cache_store(&config).is_ok());

        config.redis_url = Some("not a url".to_string());
        assert!(matches!(cache_store(&config), Err(Error::Config(_))));
    }
}
