//! Recommendation Service
//!
//! Wires the pipeline together from explicitly constructed handles:
//!
//! ```text
//! query → TitleGenerator → ResolutionOrchestrator → RankingEngine → results
//!                                   ↓                                 ↓
//!                         BackgroundWorker (cache, aliases,   (popularity)
//!                                           embeddings)
//! ```
//!
//! Only the generator and the preference store can fail a request; every
//! other degradation (provider errors, cache misses, missing embeddings)
//! narrows or flattens the result instead.

use crate::background::{BackgroundHandle, BackgroundJob};
use crate::db::PreferenceStore;
use crate::embeddings::EmbeddingIndex;
use crate::error::{RecommendError, RecommendResult};
use crate::generator::TitleGenerator;
use crate::orchestrator::{ResolutionOrchestrator, ResolutionOutcome};
use crate::ranking::RankingEngine;
use curio_common::config::CacheConfig;
use curio_common::slug::normalize_title;
use curio_common::{ContentType, MetadataRecord, PreferenceRecord, RankedResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameters of the idle-eviction job
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPolicy {
    pub prefix: String,
    pub threshold_percent: f64,
    pub cleanup_percent: f64,
    pub max_capacity: u64,
}

impl From<&CacheConfig> for EvictionPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            threshold_percent: config.threshold_percent,
            cleanup_percent: config.cleanup_percent,
            max_capacity: config.max_memory_bytes,
        }
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

/// End-to-end recommender
pub struct Recommender {
    generator: Arc<dyn TitleGenerator>,
    orchestrator: ResolutionOrchestrator,
    preferences: Arc<dyn PreferenceStore>,
    background: BackgroundHandle,
    embeddings: Option<EmbeddingIndex>,
    ranking: RankingEngine,
    eviction: EvictionPolicy,
}

impl Recommender {
    pub fn new(
        generator: Arc<dyn TitleGenerator>,
        orchestrator: ResolutionOrchestrator,
        preferences: Arc<dyn PreferenceStore>,
        background: BackgroundHandle,
    ) -> Self {
        Self {
            generator,
            orchestrator,
            preferences,
            background,
            embeddings: None,
            ranking: RankingEngine::default(),
            eviction: EvictionPolicy::default(),
        }
    }

    pub fn with_embeddings(mut self, embeddings: EmbeddingIndex) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn with_ranking(mut self, ranking: RankingEngine) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn background(&self) -> &BackgroundHandle {
        &self.background
    }

    /// Recommend up to `k` titles for a free-text query
    ///
    /// # Errors
    /// - `RecommendError::Generation` when no candidates could be generated
    /// - `RecommendError::Preferences` when the preference store fails
    pub async fn recommend(
        &self,
        user_id: &str,
        query: &str,
        content_type: ContentType,
        k: usize,
    ) -> RecommendResult<Vec<RankedResult>> {
        let candidates = self
            .generator
            .generate(query, content_type)
            .await
            .map_err(RecommendError::Generation)?;

        debug!(user_id, content_type = %content_type, candidates = candidates.len(), "Generated candidates");

        let outcome = self.orchestrator.resolve_titles(&candidates, content_type).await;
        self.orchestrator
            .schedule_cache_writes(&outcome, content_type, &self.background);
        if outcome.is_empty() {
            info!(user_id, query, "No candidate could be resolved");
            return Ok(Vec::new());
        }

        let prefs = self
            .preferences
            .preferences(user_id, Some(content_type))
            .await
            .map_err(RecommendError::Preferences)?;

        let seen: HashSet<String> = prefs
            .iter()
            .filter(|p| p.seen)
            .map(|p| normalize_title(&p.title))
            .collect();
        let unseen: Vec<MetadataRecord> = outcome
            .results
            .iter()
            .filter(|r| !seen.contains(&normalize_title(&r.title)))
            .cloned()
            .collect();

        let (candidate_vectors, pref_vectors) = self.vectors(content_type, &prefs, &unseen).await;
        self.warm_remaining(&outcome, &unseen, &candidate_vectors, content_type);

        let ranked = self
            .ranking
            .rank(&prefs, &unseen, &candidate_vectors, &pref_vectors, k);

        if !ranked.is_empty() {
            self.background.submit(BackgroundJob::RecordPopularity {
                titles: ranked.iter().map(|r| r.record.title.clone()).collect(),
                content_type,
            });
        }

        info!(user_id, content_type = %content_type, returned = ranked.len(), "Recommendations ready");
        Ok(ranked)
    }

    /// Embeddings for ranking; failures degrade to unknown scores
    async fn vectors(
        &self,
        content_type: ContentType,
        prefs: &[PreferenceRecord],
        candidates: &[MetadataRecord],
    ) -> (Vec<Option<Vec<f32>>>, Vec<Option<Vec<f32>>>) {
        let unknown_candidates = vec![None; candidates.len()];
        let unknown_prefs = vec![None; prefs.len()];

        let Some(index) = &self.embeddings else {
            return (unknown_candidates, unknown_prefs);
        };
        if prefs.is_empty() || candidates.is_empty() {
            return (unknown_candidates, unknown_prefs);
        }

        let pref_vectors = match index.preference_vectors(prefs).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(error = %e, "Preference embeddings unavailable, ranking on genres");
                return (unknown_candidates, unknown_prefs);
            }
        };

        let candidate_vectors = match index.candidate_vectors(content_type, candidates).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(error = %e, "Candidate embeddings unavailable, ranking on genres");
                unknown_candidates
            }
        };

        (candidate_vectors, pref_vectors)
    }

    /// Queue warm-up for fresh records the ranking pass did not embed
    fn warm_remaining(
        &self,
        outcome: &ResolutionOutcome,
        ranked: &[MetadataRecord],
        vectors: &[Option<Vec<f32>>],
        content_type: ContentType,
    ) {
        if self.embeddings.is_none() {
            return;
        }
        let embedded: HashSet<String> = ranked
            .iter()
            .zip(vectors)
            .filter(|(_, v)| v.is_some())
            .map(|(r, _)| normalize_title(&r.title))
            .collect();
        let remaining: Vec<MetadataRecord> = outcome
            .freshly_resolved
            .iter()
            .filter(|r| !embedded.contains(&normalize_title(&r.title)))
            .cloned()
            .collect();

        if !remaining.is_empty() {
            self.background.submit(BackgroundJob::WarmEmbeddings {
                records: remaining,
                content_type,
            });
        }
    }

    /// Resolve titles without ranking
    ///
    /// Cache writes and embedding warm-up of fresh records are queued.
    pub async fn resolve(&self, titles: &[String], content_type: ContentType) -> ResolutionOutcome {
        let outcome = self.orchestrator.resolve_titles(titles, content_type).await;
        self.orchestrator
            .schedule_background(&outcome, content_type, &self.background);
        outcome
    }

    /// Persist a preference and store its embedding
    ///
    /// Genres missing from the preference are taken from `record`, whose
    /// description is the embedding fallback when the preference has no
    /// comment.
    ///
    /// # Errors
    /// - `RecommendError::Preferences` when the store rejects the write
    /// - `RecommendError::Embedding` when the embedding could not be stored
    pub async fn add_preference(
        &self,
        mut pref: PreferenceRecord,
        record: Option<&MetadataRecord>,
    ) -> RecommendResult<()> {
        if pref.genres.is_empty() {
            if let Some(record) = record {
                pref.genres = record.genres.clone();
            }
        }

        self.preferences
            .upsert_preference(&pref)
            .await
            .map_err(RecommendError::Preferences)?;

        if let Some(index) = &self.embeddings {
            let description = record.and_then(|r| r.description.as_deref());
            index
                .store_preference(&pref, description)
                .await
                .map_err(RecommendError::Embedding)?;
        }

        Ok(())
    }

    /// Queue one idle-eviction pass
    pub fn maybe_evict(&self) {
        self.background.submit(BackgroundJob::EvictIdle {
            prefix: self.eviction.prefix.clone(),
            threshold_percent: self.eviction.threshold_percent,
            cleanup_percent: self.eviction.cleanup_percent,
            max_capacity: self.eviction.max_capacity,
        });
    }

    /// Drain background work and stop the worker
    pub async fn shutdown(&self) {
        self.background.shutdown().await;
    }
}
