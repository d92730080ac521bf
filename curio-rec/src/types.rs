//! Core Types and Trait Definitions for curio-rec
//!
//! Defines the capability interface shared by all metadata providers and
//! the error types of the two layers whose failures are always recovered
//! locally:
//! - **ProviderError:** one provider failed; contributes nothing to a race
//! - **CacheError:** one cache round trip failed; treated as miss or drop

use async_trait::async_trait;
use curio_common::MetadataRecord;
use thiserror::Error;

/// Metadata provider capability
///
/// Every source (AniList, Jikan, OMDb, ...) implements this trait so the
/// resolver can race or chain them uniformly.
///
/// # Example
/// ```rust,ignore
/// use curio_rec::types::MetadataProvider;
///
/// let provider = AniListProvider::new(client);
/// if let Some(record) = provider.search("Cowboy Bebop").await? {
///     println!("{} ({:?})", record.title, record.year);
/// }
/// ```
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Provider name for logging and configuration
    fn name(&self) -> &'static str;

    /// Look up the best match for a title
    ///
    /// # Returns
    /// `Ok(None)` when the provider answered but found nothing
    ///
    /// # Errors
    /// Returns `ProviderError` on transport, API or decoding failure
    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError>;
}

/// Failure of a single external provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Provider returned a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider cannot run (e.g. missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Classify a reqwest failure
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(format!("{} request: {}", provider, err))
        } else if err.is_decode() {
            ProviderError::Parse(format!("Failed to parse {} response: {}", provider, err))
        } else {
            ProviderError::Network(format!("{} request failed: {}", provider, err))
        }
    }
}

/// Failure of a cache backend operation
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend unavailable or command failed
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Stored value could not be encoded or decoded
    #[error("Cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
