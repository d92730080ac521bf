//! Alias-Aware Cache
//!
//! Warm cache of resolved metadata keyed by the lowercase
//! `(content_type, title)` identity, plus an alias index mapping one title
//! spelling to another. The cache is never a source of truth: every backend
//! failure is logged and treated as a miss (reads) or dropped (writes).
//!
//! # Key layout
//! - Records: `{prefix}:{content_type}_{normalized title}` → JSON record
//! - Aliases: `{alias_prefix}:{content_type}_{normalized title}` → other spelling

pub mod redis;
pub mod store;

pub use self::redis::RedisStore;
pub use store::{CacheStore, MemoryStore};

use crate::types::CacheError;
use curio_common::config::CacheConfig;
use curio_common::slug::normalize_title;
use curio_common::{ContentType, MetadataRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key prefixes and expiries for the alias cache
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub prefix: String,
    pub alias_prefix: String,
    /// Default expiry for records (`None` = until evicted)
    pub ttl: Option<Duration>,
    pub alias_ttl: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            alias_prefix: config.alias_prefix.clone(),
            ttl: config.ttl_secs.map(Duration::from_secs),
            alias_ttl: Some(Duration::from_secs(config.alias_ttl_secs)),
        }
    }
}

/// Outcome of one eviction pass
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionReport {
    /// Memory usage relative to capacity, in percent
    pub usage_percent: f64,
    /// Keys found under the prefix (0 when below threshold)
    pub total_keys: usize,
    pub deleted: usize,
}

/// Warm metadata cache with single-hop alias fallback
#[derive(Clone)]
pub struct AliasCache {
    store: Arc<dyn CacheStore>,
    settings: CacheSettings,
}

impl AliasCache {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Backend key for a record
    pub fn record_key(&self, content_type: ContentType, title: &str) -> String {
        format!("{}:{}_{}", self.settings.prefix, content_type, normalize_title(title))
    }

    /// Backend key for an alias edge
    pub fn alias_key(&self, content_type: ContentType, title: &str) -> String {
        format!(
            "{}:{}_{}",
            self.settings.alias_prefix,
            content_type,
            normalize_title(title)
        )
    }

    /// Batched lookup; absent entries are omitted from the map
    ///
    /// The returned map is keyed by the caller's `(content_type, title)`
    /// exactly as passed in.
    pub async fn get_many(
        &self,
        keys: &[(ContentType, String)],
    ) -> HashMap<(ContentType, String), MetadataRecord> {
        if keys.is_empty() {
            return HashMap::new();
        }

        let backend_keys: Vec<String> = keys
            .iter()
            .map(|(ct, title)| self.record_key(*ct, title))
            .collect();

        let values = match self.store.get_many(&backend_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(keys = keys.len(), error = %e, "Cache read failed, treating batch as miss");
                return HashMap::new();
            }
        };

        keys.iter()
            .zip(backend_keys.iter().zip(values))
            .filter_map(|(key, (backend_key, value))| {
                let record = decode_record(backend_key, value?)?;
                Some((key.clone(), record))
            })
            .collect()
    }

    /// Lookup with single-hop alias fallback
    ///
    /// Titles missing from the direct lookup are mapped through the alias
    /// index once; the canonical spellings are then looked up and merged in
    /// under the originally requested title. Alias chains are not followed.
    pub async fn get_with_fallback(
        &self,
        titles: &[String],
        content_type: ContentType,
    ) -> HashMap<String, MetadataRecord> {
        let direct_keys: Vec<(ContentType, String)> =
            titles.iter().map(|t| (content_type, t.clone())).collect();

        let mut found: HashMap<String, MetadataRecord> = self
            .get_many(&direct_keys)
            .await
            .into_iter()
            .map(|((_, title), record)| (title, record))
            .collect();

        let missing: Vec<&String> = titles.iter().filter(|t| !found.contains_key(*t)).collect();
        if missing.is_empty() {
            return found;
        }

        let alias_keys: Vec<String> = missing
            .iter()
            .map(|t| self.alias_key(content_type, t))
            .collect();

        let canonicals = match self.store.get_many(&alias_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "Alias lookup failed, skipping fallback");
                return found;
            }
        };

        // (requested title, canonical title) for every alias hit
        let redirects: Vec<(&String, String)> = missing
            .into_iter()
            .zip(canonicals)
            .filter_map(|(requested, canonical)| canonical.map(|c| (requested, c)))
            .collect();

        if redirects.is_empty() {
            return found;
        }

        let canonical_keys: Vec<(ContentType, String)> = redirects
            .iter()
            .map(|(_, canonical)| (content_type, canonical.clone()))
            .collect();
        let resolved = self.get_many(&canonical_keys).await;

        for (requested, canonical) in redirects {
            if let Some(record) = resolved.get(&(content_type, canonical.clone())) {
                debug!(requested = %requested, canonical = %canonical, "Alias cache hit");
                found.insert(requested.clone(), record.clone());
            }
        }

        found
    }

    /// Insert records that are not cached yet
    ///
    /// Records without genre information are skipped as low-confidence, and
    /// an existing entry is never overwritten (first writer wins, enforced
    /// per key by the backend's set-if-absent).
    ///
    /// # Returns
    /// Number of records written
    pub async fn put_many(
        &self,
        records: &[MetadataRecord],
        content_type: ContentType,
        ttl: Option<Duration>,
    ) -> usize {
        let mut seen = HashSet::new();
        let candidates: Vec<(String, &MetadataRecord)> = records
            .iter()
            .filter(|r| r.has_genres())
            .map(|r| (self.record_key(content_type, &r.title), r))
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect();

        if candidates.is_empty() {
            return 0;
        }

        let mut entries = Vec::with_capacity(candidates.len());
        for (key, record) in candidates {
            match serde_json::to_string(record) {
                Ok(json) => entries.push((key, json)),
                Err(e) => warn!(key = %key, error = %CacheError::from(e), "Skipping unencodable record"),
            }
        }

        if entries.is_empty() {
            return 0;
        }

        let attempted = entries.len();
        match self
            .store
            .set_many_if_absent(entries, ttl.or(self.settings.ttl))
            .await
        {
            Ok(created) => {
                let written = created.into_iter().filter(|c| *c).count();
                debug!(content_type = %content_type, attempted, written, "Cached resolved records");
                written
            }
            Err(e) => {
                warn!(error = %e, "Cache write failed, dropping {} records", attempted);
                0
            }
        }
    }

    /// Record alias edges in both directions
    ///
    /// Pairs whose spellings normalize to the same title are skipped so an
    /// alias never points to itself. Failures are logged, not returned.
    pub async fn link_alias(&self, pairs: &[(String, String)], content_type: ContentType) -> usize {
        let entries: Vec<(String, String)> = pairs
            .iter()
            .filter(|(a, b)| normalize_title(a) != normalize_title(b))
            .flat_map(|(a, b)| {
                [
                    (self.alias_key(content_type, a), b.clone()),
                    (self.alias_key(content_type, b), a.clone()),
                ]
            })
            .collect();

        if entries.is_empty() {
            return 0;
        }

        let linked = entries.len() / 2;
        match self.store.set_many(entries, self.settings.alias_ttl).await {
            Ok(()) => {
                debug!(content_type = %content_type, linked, "Linked title aliases");
                linked
            }
            Err(e) => {
                warn!(error = %e, "Alias write failed");
                0
            }
        }
    }

    /// Delete the longest-idle keys under `prefix` when memory is tight
    ///
    /// When `used_memory / max_capacity` (as a percentage) reaches
    /// `threshold_percent`, all keys under `prefix` are ranked by idle time
    /// and the top `cleanup_percent` of them (rounded down) are deleted.
    pub async fn evict_idle(
        &self,
        prefix: &str,
        threshold_percent: f64,
        cleanup_percent: f64,
        max_capacity: u64,
    ) -> Result<EvictionReport, CacheError> {
        let used = self.store.used_memory().await?;
        let usage_percent = if max_capacity == 0 {
            100.0
        } else {
            used as f64 / max_capacity as f64 * 100.0
        };

        debug!(usage_percent = %format!("{:.2}", usage_percent), "Cache memory usage");

        if usage_percent < threshold_percent {
            return Ok(EvictionReport {
                usage_percent,
                total_keys: 0,
                deleted: 0,
            });
        }

        let keys = self.store.scan_prefix(&format!("{}:", prefix)).await?;
        let total_keys = keys.len();
        if total_keys == 0 {
            info!(prefix, "Eviction triggered but no keys found");
            return Ok(EvictionReport {
                usage_percent,
                total_keys,
                deleted: 0,
            });
        }

        let idle = self.store.idle_times(&keys).await?;
        let mut ranked: Vec<(String, Duration)> = keys
            .into_iter()
            .zip(idle)
            .map(|(key, idle)| (key, idle.unwrap_or(Duration::ZERO)))
            .collect();
        // Longest idle first; stable so ties keep scan order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let to_delete = (total_keys as f64 * cleanup_percent / 100.0).floor() as usize;
        let victims: Vec<String> = ranked.into_iter().take(to_delete).map(|(k, _)| k).collect();
        let deleted = if victims.is_empty() {
            0
        } else {
            self.store.delete_many(&victims).await?
        };

        info!(
            prefix,
            deleted,
            total_keys,
            usage_percent = %format!("{:.2}", usage_percent),
            "Cleanup triggered: deleted least-accessed keys"
        );

        Ok(EvictionReport {
            usage_percent,
            total_keys,
            deleted,
        })
    }

    /// Delete every key under `prefix`
    pub async fn clear(&self, prefix: &str) -> Result<usize, CacheError> {
        let keys = self.store.scan_prefix(&format!("{}:", prefix)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.delete_many(&keys).await
    }
}

fn decode_record(key: &str, value: String) -> Option<MetadataRecord> {
    match serde_json::from_str(&value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(key, error = %CacheError::from(e), "Undecodable cache entry, treating as miss");
            None
        }
    }
}
