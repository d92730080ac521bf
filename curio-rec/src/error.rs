//! Error types for curio-rec entry points
//!
//! Only failures of the service's own collaborators surface here. Partial
//! failures (one provider, one cache key, missing embeddings) are recovered
//! where they happen, and an empty result set is a successful outcome.

use crate::types::ProviderError;
use thiserror::Error;

/// Hard failure of a recommendation request
#[derive(Debug, Error)]
pub enum RecommendError {
    /// Title generator could not produce candidates
    #[error("Title generation failed: {0}")]
    Generation(#[source] ProviderError),

    /// Embedding provider or vector store failed on a required write
    #[error("Embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    /// Preference store unavailable
    #[error("Preference store error: {0}")]
    Preferences(#[source] curio_common::Error),

    /// Invalid input or configuration
    #[error(transparent)]
    Common(#[from] curio_common::Error),
}

/// Result type for service entry points
pub type RecommendResult<T> = Result<T, RecommendError>;
