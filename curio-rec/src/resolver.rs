//! Multi-Source Resolver
//!
//! Turns one loosely-spelled title into a verified `MetadataRecord` by
//! querying the configured providers for its content type.
//!
//! # Race policy
//! - **Within a tier:** every provider is spawned at once; the first
//!   policy-compliant match wins and the remaining tasks are aborted.
//! - **Across tiers:** tiers run strictly in order; a later tier only runs
//!   when every provider of the earlier tier came back empty. Tier order
//!   encodes field richness (genre-bearing sources first).
//!
//! Provider errors, timeouts and panics all count as "no match" and never
//! fail the title.

use crate::providers::{ProviderRegistry, ProviderTiers};
use crate::types::{MetadataProvider, ProviderError};
use curio_common::config::{CurioConfig, ResolverConfig};
use curio_common::slug::{normalize_title, titles_diverge};
use curio_common::{ContentType, MetadataRecord};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Content filter applied to every provider result
#[derive(Debug, Clone, Default)]
pub struct ContentPolicy {
    forbidden_genres: HashSet<String>,
    excluded_titles: HashSet<String>,
}

impl ContentPolicy {
    pub fn new<G, T>(forbidden_genres: G, excluded_titles: T) -> Self
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        Self {
            forbidden_genres: forbidden_genres
                .into_iter()
                .map(|g| normalize_title(g.as_ref()))
                .collect(),
            excluded_titles: excluded_titles
                .into_iter()
                .map(|t| normalize_title(t.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(&config.forbidden_genres, &config.excluded_titles)
    }

    /// Whether a title is on the manual exclusion list
    pub fn is_excluded(&self, title: &str) -> bool {
        self.excluded_titles.contains(&normalize_title(title))
    }

    /// Whether a resolved record may be returned
    pub fn permits(&self, record: &MetadataRecord) -> bool {
        if self.is_excluded(&record.title) {
            return false;
        }
        !record
            .genres
            .iter()
            .any(|g| self.forbidden_genres.contains(&normalize_title(g)))
    }
}

/// A successful resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: MetadataRecord,
    /// `(query, canonical)` when the canonical spelling diverges from the query
    pub alias: Option<(String, String)>,
}

/// Races metadata providers per content type
pub struct MultiSourceResolver {
    tiers: HashMap<ContentType, ProviderTiers>,
    policy: Arc<ContentPolicy>,
    provider_timeout: Duration,
}

impl MultiSourceResolver {
    pub fn new(
        tiers: HashMap<ContentType, ProviderTiers>,
        policy: ContentPolicy,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            tiers,
            policy: Arc::new(policy),
            provider_timeout,
        }
    }

    /// Build tiers for every content type from configuration
    ///
    /// Content types with no usable provider are left unconfigured and
    /// resolve to nothing.
    pub fn from_config(config: &CurioConfig, registry: &ProviderRegistry) -> Self {
        let mut tiers = HashMap::new();
        for content_type in ContentType::all() {
            match registry.tiers(config.resolver.tiers_for(content_type), content_type) {
                Ok(built) => {
                    tiers.insert(content_type, built);
                }
                Err(e) => warn!(content_type = %content_type, error = %e, "Content type has no providers"),
            }
        }

        Self::new(
            tiers,
            ContentPolicy::from_config(&config.resolver),
            Duration::from_millis(config.resolver.provider_timeout_ms),
        )
    }

    pub fn policy(&self) -> &ContentPolicy {
        &self.policy
    }

    /// Resolve one title
    ///
    /// # Returns
    /// `None` when every provider failed, found nothing, or was rejected by
    /// the content policy
    pub async fn resolve(&self, title: &str, content_type: ContentType) -> Option<Resolution> {
        if self.policy.is_excluded(title) {
            debug!(title = %title, "Query title is excluded by policy");
            return None;
        }

        let Some(tiers) = self.tiers.get(&content_type) else {
            warn!(content_type = %content_type, "No providers configured");
            return None;
        };

        for (index, tier) in tiers.iter().enumerate() {
            if let Some(record) = self.race(tier, title).await {
                let alias = titles_diverge(title, &record.title)
                    .then(|| (title.to_string(), record.title.clone()));
                if let Some((query, canonical)) = &alias {
                    debug!(query = %query, canonical = %canonical, "Resolved title diverges, alias queued");
                }
                return Some(Resolution { record, alias });
            }
            debug!(title = %title, tier = index, "Tier exhausted, falling back");
        }

        info!(title = %title, content_type = %content_type, "No provider could resolve title");
        None
    }

    /// Run one tier as an unordered race
    async fn race(&self, tier: &[Arc<dyn MetadataProvider>], title: &str) -> Option<MetadataRecord> {
        let mut abort_handles = Vec::with_capacity(tier.len());
        let mut pending = FuturesUnordered::new();

        for provider in tier {
            let provider = Arc::clone(provider);
            let query = title.to_string();
            let deadline = self.provider_timeout;
            let handle = tokio::spawn(async move {
                let name = provider.name();
                let result = match timeout(deadline, provider.search(&query)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "{} gave no answer within {:?}",
                        name, deadline
                    ))),
                };
                (name, result)
            });
            abort_handles.push(handle.abort_handle());
            pending.push(handle);
        }

        let mut winner = None;
        while let Some(joined) = pending.next().await {
            match joined {
                Ok((provider, Ok(Some(record)))) => {
                    if self.policy.permits(&record) {
                        debug!(provider, title = %title, canonical = %record.title, "Provider won race");
                        winner = Some(record);
                        break;
                    }
                    info!(provider, title = %title, canonical = %record.title, "Result rejected by content policy");
                }
                Ok((provider, Ok(None))) => {
                    debug!(provider, title = %title, "Provider found no match");
                }
                Ok((provider, Err(e))) => {
                    warn!(provider, title = %title, error = %e, "Provider failed");
                }
                Err(e) => {
                    warn!(title = %title, error = %e, "Provider task did not complete");
                }
            }
        }

        // Losers may already be finished; aborting them is harmless
        for handle in abort_handles {
            handle.abort();
        }

        winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixed {
        name: &'static str,
        delay: Duration,
        record: Option<MetadataRecord>,
        completed: Arc<AtomicBool>,
    }

    impl Fixed {
        fn new(name: &'static str, delay_ms: u64, record: Option<MetadataRecord>) -> Self {
            Self {
                name,
                delay: Duration::from_millis(delay_ms),
                record,
                completed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.completed.store(true, Ordering::SeqCst);
            Ok(self.record.clone())
        }
    }

    fn resolver(tiers: ProviderTiers, policy: ContentPolicy) -> MultiSourceResolver {
        let mut map = HashMap::new();
        map.insert(ContentType::Anime, tiers);
        MultiSourceResolver::new(map, policy, Duration::from_millis(500))
    }

    fn record(title: &str, genres: &[&str]) -> MetadataRecord {
        MetadataRecord::new(title).with_genres(genres.iter().copied())
    }

    #[test]
    fn test_policy_is_case_insensitive() {
        let policy = ContentPolicy::new(["Hentai"], ["Bad Title"]);
        assert!(!policy.permits(&record("x", &["hentai"])));
        assert!(!policy.permits(&record("BAD TITLE", &["Action"])));
        assert!(policy.permits(&record("Fine", &["Action"])));
        assert!(policy.is_excluded(" bad title "));
    }

    #[tokio::test]
    async fn test_fastest_match_wins_and_loser_is_cancelled() {
        let slow = Fixed::new("slow", 300, Some(record("Slow", &["Drama"])));
        let slow_done = slow.completed.clone();
        let fast = Fixed::new("fast", 10, Some(record("Fast", &["Drama"])));

        let resolver = resolver(
            vec![vec![Arc::new(slow), Arc::new(fast)]],
            ContentPolicy::default(),
        );
        let resolution = resolver.resolve("Fast", ContentType::Anime).await.unwrap();
        assert_eq!(resolution.record.title, "Fast");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!slow_done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unconfigured_content_type_resolves_nothing() {
        let resolver = resolver(vec![], ContentPolicy::default());
        assert!(resolver.resolve("Heat", ContentType::Movie).await.is_none());
    }

    #[tokio::test]
    async fn test_excluded_query_skips_providers() {
        let provider = Fixed::new("p", 0, Some(record("Other", &["Drama"])));
        let done = provider.completed.clone();
        let resolver = resolver(
            vec![vec![Arc::new(provider)]],
            ContentPolicy::new(Vec::<String>::new(), ["Blocked"]),
        );
        assert!(resolver.resolve("blocked", ContentType::Anime).await.is_none());
        assert!(!done.load(Ordering::SeqCst));
    }
}
