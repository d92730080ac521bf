//! # Curio Common Library
//!
//! Shared code for the curio recommendation services including:
//! - Domain model (content types, metadata and preference records)
//! - Configuration loading
//! - Title normalization and slug helpers
//! - Common error type

pub mod config;
pub mod error;
pub mod models;
pub mod slug;

pub use error::{Error, Result};
pub use models::{CandidateTitle, ContentType, MetadataRecord, PreferenceRecord, RankedResult};
