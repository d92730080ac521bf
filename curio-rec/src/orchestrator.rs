//! Resolution Orchestrator
//!
//! Resolves a batch of candidate titles: cache first (with alias fallback),
//! then one concurrent resolver task per uncached title. Cache writes are
//! not performed here; the caller hands the outcome to the background
//! worker so the response never waits on them.

use crate::background::{BackgroundHandle, BackgroundJob};
use crate::cache::AliasCache;
use crate::resolver::MultiSourceResolver;
use curio_common::{CandidateTitle, ContentType, MetadataRecord};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of resolving one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionOutcome {
    /// Cached and fresh records, at most one per lowercase title
    pub results: Vec<MetadataRecord>,
    /// `(query, canonical)` spellings that should be linked
    pub alias_pairs: Vec<(String, String)>,
    /// Records that came from providers in this call
    pub freshly_resolved: Vec<MetadataRecord>,
}

impl ResolutionOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Cache + resolver composition
#[derive(Clone)]
pub struct ResolutionOrchestrator {
    cache: AliasCache,
    resolver: Arc<MultiSourceResolver>,
}

impl ResolutionOrchestrator {
    pub fn new(cache: AliasCache, resolver: Arc<MultiSourceResolver>) -> Self {
        Self { cache, resolver }
    }

    pub fn cache(&self) -> &AliasCache {
        &self.cache
    }

    /// Resolve a batch of titles
    ///
    /// Input titles are deduplicated case-insensitively (first spelling
    /// kept). Titles nobody can resolve are simply absent from the results.
    pub async fn resolve_titles(&self, titles: &[String], content_type: ContentType) -> ResolutionOutcome {
        let mut seen_queries = HashSet::new();
        let queries: Vec<String> = titles
            .iter()
            .map(|t| CandidateTitle::new(t.trim(), content_type))
            .filter(|c| !c.title.is_empty() && seen_queries.insert(c.identity()))
            .map(|c| c.title)
            .collect();

        if queries.is_empty() {
            return ResolutionOutcome::default();
        }

        let mut cached = self.cache.get_with_fallback(&queries, content_type).await;
        let uncached: Vec<&String> = queries.iter().filter(|q| !cached.contains_key(*q)).collect();

        debug!(
            content_type = %content_type,
            requested = queries.len(),
            cached = cached.len(),
            uncached = uncached.len(),
            "Cache lookup finished"
        );

        let resolutions = join_all(
            uncached
                .iter()
                .map(|title| self.resolver.resolve(title, content_type)),
        )
        .await;

        let mut outcome = ResolutionOutcome::default();
        let mut seen_titles = HashSet::new();

        // Cached entries first, in input order
        for query in &queries {
            if let Some(record) = cached.remove(query) {
                if seen_titles.insert(record.cache_identity(content_type)) {
                    outcome.results.push(record);
                }
            }
        }

        for resolution in resolutions.into_iter().flatten() {
            if let Some(pair) = resolution.alias {
                outcome.alias_pairs.push(pair);
            }
            let record = resolution.record;
            if seen_titles.insert(record.cache_identity(content_type)) {
                outcome.freshly_resolved.push(record.clone());
                outcome.results.push(record);
            }
        }

        info!(
            content_type = %content_type,
            requested = queries.len(),
            resolved = outcome.results.len(),
            fresh = outcome.freshly_resolved.len(),
            aliases = outcome.alias_pairs.len(),
            "Resolved titles"
        );

        outcome
    }

    /// Queue cache population and alias linking
    pub fn schedule_cache_writes(
        &self,
        outcome: &ResolutionOutcome,
        content_type: ContentType,
        background: &BackgroundHandle,
    ) {
        if !outcome.freshly_resolved.is_empty() {
            background.submit(BackgroundJob::PopulateCache {
                records: outcome.freshly_resolved.clone(),
                content_type,
            });
        }
        if !outcome.alias_pairs.is_empty() {
            background.submit(BackgroundJob::LinkAliases {
                pairs: outcome.alias_pairs.clone(),
                content_type,
            });
        }
    }

    /// Queue cache writes plus embedding warm-up of fresh records
    pub fn schedule_background(
        &self,
        outcome: &ResolutionOutcome,
        content_type: ContentType,
        background: &BackgroundHandle,
    ) {
        self.schedule_cache_writes(outcome, content_type, background);
        if !outcome.freshly_resolved.is_empty() {
            background.submit(BackgroundJob::WarmEmbeddings {
                records: outcome.freshly_resolved.clone(),
                content_type,
            });
        }
    }
}
