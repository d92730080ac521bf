//! Embeddings
//!
//! Text embeddings for semantic ranking. An [`Embedder`] turns text into
//! vectors and a [`VectorStore`] keeps them keyed by
//! `"{content_type}_{slug(title)}"`. [`EmbeddingIndex`] combines the two for
//! the recommendation flow.
//!
//! # Embedding text
//! - Candidates: description, or the title when the provider had none
//! - Preferences: the user's comment when present and non-blank, otherwise
//!   the title's description

use crate::types::ProviderError;
use async_trait::async_trait;
use curio_common::slug::vector_id;
use curio_common::{ContentType, MetadataRecord, PreferenceRecord};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const COHERE_EMBED_URL: &str = "https://api.cohere.ai/v1/embed";
const COHERE_EMBED_MODEL: &str = "embed-english-v2.0";

/// Text → vector provider
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text; output is aligned with input
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Vector similarity store
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, vectors: Vec<(String, Vec<f32>)>) -> Result<(), ProviderError>;

    /// Fetch stored vectors; unknown ids are omitted
    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>, ProviderError>;
}

// ============================================================================
// Cohere
// ============================================================================

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Cohere embed endpoint client
pub struct CohereEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CohereEmbedder {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            endpoint: COHERE_EMBED_URL.to_string(),
            api_key,
            model: COHERE_EMBED_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = texts.len(), model = %self.model, "Requesting embeddings");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "texts": texts,
                "model": self.model,
                "truncate": "END",
            }))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Cohere", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("Cohere embed returned {}", status),
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("Cohere", e))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(ProviderError::Parse(format!(
                "Cohere returned {} embeddings for {} texts",
                parsed.embeddings.len(),
                texts.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

// ============================================================================
// Vector stores
// ============================================================================

/// In-process vector store
#[derive(Default)]
pub struct MemoryVectorStore {
    vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, vectors: Vec<(String, Vec<f32>)>) -> Result<(), ProviderError> {
        self.vectors.write().await.extend(vectors);
        Ok(())
    }

    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>, ProviderError> {
        let vectors = self.vectors.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| vectors.get(id).map(|v| (id.clone(), v.clone())))
            .collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PineconeVector {
    id: String,
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, PineconeVector>,
}

/// Pinecone index REST client
pub struct PineconeStore {
    client: Client,
    host: String,
    api_key: String,
}

impl PineconeStore {
    /// `host` is the index host, with or without scheme
    pub fn new(client: Client, host: &str, api_key: String) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Self { client, host, api_key }
    }

    fn check(status: reqwest::StatusCode, operation: &str) -> Result<(), ProviderError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("Pinecone {} returned {}", operation, status),
            })
        }
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, vectors: Vec<(String, Vec<f32>)>) -> Result<(), ProviderError> {
        if vectors.is_empty() {
            return Ok(());
        }

        let vectors: Vec<PineconeVector> = vectors
            .into_iter()
            .map(|(id, values)| PineconeVector { id, values })
            .collect();

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.host))
            .header("Api-Key", &self.api_key)
            .json(&json!({ "vectors": vectors }))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Pinecone", e))?;

        Self::check(response.status(), "upsert")
    }

    async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>, ProviderError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        let response = self
            .client
            .get(format!("{}/vectors/fetch", self.host))
            .header("Api-Key", &self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Pinecone", e))?;

        Self::check(response.status(), "fetch")?;

        let parsed: FetchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("Pinecone", e))?;

        Ok(parsed
            .vectors
            .into_iter()
            .map(|(id, v)| (id, v.values))
            .collect())
    }
}

// ============================================================================
// Index
// ============================================================================

/// Text used to embed a preference
///
/// The comment wins when it has content; otherwise the description of the
/// preferred title. `None` when neither is available.
pub fn preference_text(pref: &PreferenceRecord, description: Option<&str>) -> Option<String> {
    pref.comment
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .or(description.filter(|d| !d.trim().is_empty()))
        .map(str::to_string)
}

/// Text used to embed a candidate record
pub fn candidate_text(record: &MetadataRecord) -> String {
    record
        .description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| record.title.clone())
}

/// Embedder + vector store pair
#[derive(Clone)]
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed and store resolved records that have no stored vector yet
    ///
    /// # Returns
    /// Number of vectors written
    pub async fn store_records(
        &self,
        content_type: ContentType,
        records: &[MetadataRecord],
    ) -> Result<usize, ProviderError> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = records
            .iter()
            .map(|r| vector_id(content_type, &r.title))
            .collect();
        let stored = self.store.fetch(&ids).await?;

        let (ids, pending): (Vec<String>, Vec<&MetadataRecord>) = ids
            .into_iter()
            .zip(records)
            .filter(|(id, _)| !stored.contains_key(id))
            .unzip();
        if pending.is_empty() {
            debug!(content_type = %content_type, "Record embeddings already stored");
            return Ok(0);
        }

        let texts: Vec<String> = pending.into_iter().map(candidate_text).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let vectors: Vec<(String, Vec<f32>)> = ids.into_iter().zip(embeddings).collect();
        let written = vectors.len();
        self.store.upsert(vectors).await?;
        debug!(content_type = %content_type, written, "Stored record embeddings");
        Ok(written)
    }

    /// Embed and store one preference
    ///
    /// # Returns
    /// `false` when there was no text to embed
    pub async fn store_preference(
        &self,
        pref: &PreferenceRecord,
        description: Option<&str>,
    ) -> Result<bool, ProviderError> {
        let Some(text) = preference_text(pref, description) else {
            debug!(title = %pref.title, "Preference has no text to embed");
            return Ok(false);
        };

        let mut embeddings = self.embedder.embed(&[text]).await?;
        let Some(vector) = embeddings.pop() else {
            return Err(ProviderError::Parse("Embedder returned no vector".to_string()));
        };

        self.store
            .upsert(vec![(vector_id(pref.content_type, &pref.title), vector)])
            .await?;
        Ok(true)
    }

    /// Stored vectors for preferences, aligned with input
    pub async fn preference_vectors(
        &self,
        prefs: &[PreferenceRecord],
    ) -> Result<Vec<Option<Vec<f32>>>, ProviderError> {
        let ids: Vec<String> = prefs
            .iter()
            .map(|p| vector_id(p.content_type, &p.title))
            .collect();
        let mut found = self.store.fetch(&ids).await?;

        let missing = ids.iter().filter(|id| !found.contains_key(*id)).count();
        if missing > 0 {
            warn!(missing, total = ids.len(), "Some preferences have no stored embedding");
        }

        Ok(ids.iter().map(|id| found.remove(id)).collect())
    }

    /// Vectors for candidates, aligned with input
    ///
    /// Stored vectors are reused; the rest are embedded on the fly and
    /// stored so later requests and warm-up jobs do not embed them again.
    /// A failed store write is logged and the fresh vectors still returned.
    pub async fn candidate_vectors(
        &self,
        content_type: ContentType,
        records: &[MetadataRecord],
    ) -> Result<Vec<Option<Vec<f32>>>, ProviderError> {
        let ids: Vec<String> = records
            .iter()
            .map(|r| vector_id(content_type, &r.title))
            .collect();
        let mut found = self.store.fetch(&ids).await?;

        let missing: Vec<usize> = (0..records.len())
            .filter(|&i| !found.contains_key(&ids[i]))
            .collect();

        let mut fresh: HashMap<usize, Vec<f32>> = HashMap::new();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| candidate_text(&records[i])).collect();
            let embeddings = self.embedder.embed(&texts).await?;

            let upserts: Vec<(String, Vec<f32>)> = missing
                .iter()
                .zip(&embeddings)
                .map(|(&i, v)| (ids[i].clone(), v.clone()))
                .collect();
            if let Err(e) = self.store.upsert(upserts).await {
                warn!(content_type = %content_type, error = %e, "Could not store candidate embeddings");
            }

            fresh.extend(missing.into_iter().zip(embeddings));
        }

        Ok(ids
            .iter()
            .enumerate()
            .map(|(i, id)| found.remove(id).or_else(|| fresh.remove(&i)))
            .collect())
    }
}
