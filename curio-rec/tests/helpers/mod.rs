//! Shared test helpers
//!
//! Scripted metadata providers, an offline embedder and fixture builders.
//! Nothing here touches the network.

#![allow(dead_code)]

use async_trait::async_trait;
use curio_common::{ContentType, MetadataRecord, PreferenceRecord};
use curio_rec::cache::{AliasCache, CacheSettings, MemoryStore};
use curio_rec::embeddings::Embedder;
use curio_rec::providers::ProviderTiers;
use curio_rec::resolver::{ContentPolicy, MultiSourceResolver};
use curio_rec::types::{MetadataProvider, ProviderError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-provider deadline used by test resolvers
pub const TEST_PROVIDER_TIMEOUT: Duration = Duration::from_millis(200);

/// What a mock provider answers
#[derive(Debug, Clone)]
pub enum Reply {
    Found(MetadataRecord),
    NotFound,
    Fail,
    Panic,
    /// Never answers within any test timeout
    Hang,
}

/// Scripted provider
///
/// Answers after `delay`; `Reply::Found` records can be keyed by query so
/// one provider can serve a whole batch.
pub struct MockProvider {
    name: &'static str,
    delay: Duration,
    default_reply: Reply,
    by_query: HashMap<String, MetadataRecord>,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
}

impl MockProvider {
    pub fn new(name: &'static str, delay_ms: u64, reply: Reply) -> Self {
        Self {
            name,
            delay: Duration::from_millis(delay_ms),
            default_reply: reply,
            by_query: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn found(name: &'static str, delay_ms: u64, record: MetadataRecord) -> Self {
        Self::new(name, delay_ms, Reply::Found(record))
    }

    pub fn not_found(name: &'static str, delay_ms: u64) -> Self {
        Self::new(name, delay_ms, Reply::NotFound)
    }

    pub fn failing(name: &'static str, delay_ms: u64) -> Self {
        Self::new(name, delay_ms, Reply::Fail)
    }

    /// Answer `query` (case-insensitive) with `record`
    pub fn answer(mut self, query: &str, record: MetadataRecord) -> Self {
        self.by_query.insert(query.to_lowercase(), record);
        self
    }

    /// Shared call counter
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Set once a search ran to completion (not cancelled)
    pub fn completed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.completed)
    }
}

#[async_trait]
impl MetadataProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(record) = self.by_query.get(&title.to_lowercase()) {
            tokio::time::sleep(self.delay).await;
            self.completed.store(true, Ordering::SeqCst);
            return Ok(Some(record.clone()));
        }

        match &self.default_reply {
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
            reply => {
                tokio::time::sleep(self.delay).await;
                self.completed.store(true, Ordering::SeqCst);
                match reply {
                    Reply::Found(record) => Ok(Some(record.clone())),
                    Reply::NotFound => Ok(None),
                    Reply::Fail => Err(ProviderError::Api {
                        status: 500,
                        message: format!("{} unavailable", self.name),
                    }),
                    Reply::Panic => panic!("{} crashed", self.name),
                    Reply::Hang => Ok(None),
                }
            }
        }
    }
}

/// Embeds text as keyword counts over a tiny fixed vocabulary
///
/// Texts sharing keywords get a high cosine similarity; texts with none of
/// the keywords embed to the zero vector (unknown similarity).
pub struct KeywordEmbedder;

pub const VOCABULARY: &[&str] = &["space", "robot", "love", "school", "crime", "magic"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| text.matches(word).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Keyword embedder that records every text it is asked to embed
#[derive(Default)]
pub struct CountingEmbedder {
    texts: std::sync::Mutex<Vec<String>>,
}

impl CountingEmbedder {
    pub fn embedded(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.texts.lock().unwrap().extend(texts.iter().cloned());
        KeywordEmbedder.embed(texts).await
    }
}

/// Embedder that is always down
pub struct OfflineEmbedder;

#[async_trait]
impl Embedder for OfflineEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Network("embedding service offline".to_string()))
    }
}

pub fn record(title: &str, genres: &[&str]) -> MetadataRecord {
    MetadataRecord::new(title).with_genres(genres.iter().copied())
}

pub fn described(title: &str, genres: &[&str], description: &str) -> MetadataRecord {
    record(title, genres).with_description(Some(description.to_string()))
}

pub fn pref(user_id: &str, title: &str, rating: f32, genres: &[&str], seen: bool) -> PreferenceRecord {
    PreferenceRecord {
        user_id: user_id.to_string(),
        title: title.to_string(),
        content_type: ContentType::Anime,
        rating: Some(rating),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        comment: None,
        seen,
    }
}

pub fn memory_cache() -> (Arc<MemoryStore>, AliasCache) {
    let store = Arc::new(MemoryStore::new());
    let cache = AliasCache::new(store.clone(), CacheSettings::default());
    (store, cache)
}

/// Resolver serving only `content_type`
pub fn resolver(content_type: ContentType, tiers: ProviderTiers) -> Arc<MultiSourceResolver> {
    resolver_with_policy(content_type, tiers, ContentPolicy::new(["Hentai"], Vec::<String>::new()))
}

pub fn resolver_with_policy(
    content_type: ContentType,
    tiers: ProviderTiers,
    policy: ContentPolicy,
) -> Arc<MultiSourceResolver> {
    let mut map = HashMap::new();
    map.insert(content_type, tiers);
    Arc::new(MultiSourceResolver::new(map, policy, TEST_PROVIDER_TIMEOUT))
}

pub fn provider(mock: MockProvider) -> Arc<dyn MetadataProvider> {
    Arc::new(mock)
}
