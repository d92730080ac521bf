//! Domain model shared by the resolution, cache and ranking layers

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Genre placeholders some providers emit when they have no real genre data
const PLACEHOLDER_GENRES: &[&str] = &["unknown", "n/a"];

/// Kind of content a title refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Anime,
    Movie,
    Series,
}

impl ContentType {
    /// Every supported content type
    pub fn all() -> [ContentType; 3] {
        [ContentType::Anime, ContentType::Movie, ContentType::Series]
    }

    /// Lowercase tag used in cache keys and vector ids
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Anime => "anime",
            ContentType::Movie => "movie",
            ContentType::Series => "series",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anime" => Ok(ContentType::Anime),
            "movie" => Ok(ContentType::Movie),
            "series" | "tv" => Ok(ContentType::Series),
            other => Err(Error::InvalidInput(format!("Unknown content type: {}", other))),
        }
    }
}

/// A raw title produced by the title generator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateTitle {
    pub title: String,
    pub content_type: ContentType,
}

impl CandidateTitle {
    pub fn new(title: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            title: title.into(),
            content_type,
        }
    }

    /// Lowercase `(content_type, title)`, comparable with
    /// [`MetadataRecord::cache_identity`]
    pub fn identity(&self) -> (ContentType, String) {
        (self.content_type, crate::slug::normalize_title(&self.title))
    }
}

/// Verified metadata for one title, produced by exactly one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Canonical title as reported by the provider
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Provider order is kept; comparisons treat this as a set
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl MetadataRecord {
    /// Create a record with only a title set
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            genres: Vec::new(),
            year: None,
            image_url: None,
            source_url: None,
        }
    }

    /// Replace genres, dropping blanks and placeholder values
    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = clean_genres(genres);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    /// Whether the provider reported any genre information
    pub fn has_genres(&self) -> bool {
        !self.genres.is_empty()
    }

    /// Genres as a lowercase set
    pub fn genre_set(&self) -> HashSet<String> {
        self.genres.iter().map(|g| g.to_lowercase()).collect()
    }

    /// Canonical identity: lowercase `(content_type, title)`
    pub fn cache_identity(&self, content_type: ContentType) -> (ContentType, String) {
        (content_type, crate::slug::normalize_title(&self.title))
    }
}

/// Strip empty and placeholder genre names
pub fn clean_genres<I, S>(genres: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    genres
        .into_iter()
        .map(|g| g.into().trim().to_string())
        .filter(|g| !g.is_empty() && !PLACEHOLDER_GENRES.contains(&g.to_lowercase().as_str()))
        .collect()
}

/// A user's stored opinion about a title (read-only input to ranking)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: String,
    pub title: String,
    pub content_type: ContentType,
    /// 1-5; `None` is treated as the neutral rating
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub seen: bool,
}

impl PreferenceRecord {
    /// Rating substituted when the user left the title unrated
    pub const NEUTRAL_RATING: f32 = 3.0;

    /// Rating clamped to the 1-5 domain
    pub fn effective_rating(&self) -> f32 {
        self.rating.unwrap_or(Self::NEUTRAL_RATING).clamp(1.0, 5.0)
    }

    pub fn genre_set(&self) -> HashSet<String> {
        self.genres
            .iter()
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
            .collect()
    }
}

/// A metadata record with its ranking score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub record: MetadataRecord,
    /// Display score in 0-100
    pub score: f64,
    /// 1-based position in the ranked list
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parsing() {
        assert_eq!("Anime".parse::<ContentType>().unwrap(), ContentType::Anime);
        assert_eq!(" movie ".parse::<ContentType>().unwrap(), ContentType::Movie);
        assert_eq!("tv".parse::<ContentType>().unwrap(), ContentType::Series);
        assert!("book".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_content_type_serde_is_lowercase() {
        let json = serde_json::to_string(&ContentType::Series).unwrap();
        assert_eq!(json, "\"series\"");
        assert_eq!(ContentType::Anime.to_string(), "anime");
    }

    #[test]
    fn test_placeholder_genres_are_stripped() {
        let record = MetadataRecord::new("Heat").with_genres(["Unknown", "", "Crime "]);
        assert_eq!(record.genres, vec!["Crime".to_string()]);

        let empty = MetadataRecord::new("Heat").with_genres(["Unknown"]);
        assert!(!empty.has_genres());
    }

    #[test]
    fn test_cache_identity_is_lowercase() {
        let record = MetadataRecord::new("  Cowboy Bebop ");
        assert_eq!(
            record.cache_identity(ContentType::Anime),
            (ContentType::Anime, "cowboy bebop".to_string())
        );
    }

    #[test]
    fn test_candidate_identity_matches_record_identity() {
        let candidate = CandidateTitle::new("COWBOY Bebop", ContentType::Anime);
        let record = MetadataRecord::new("Cowboy Bebop");
        assert_eq!(candidate.identity(), record.cache_identity(ContentType::Anime));
        assert_ne!(
            CandidateTitle::new("Cowboy Bebop", ContentType::Movie).identity(),
            candidate.identity()
        );
    }

    #[test]
    fn test_effective_rating() {
        let mut pref = PreferenceRecord {
            user_id: "u1".into(),
            title: "Heat".into(),
            content_type: ContentType::Movie,
            rating: None,
            genres: vec![],
            comment: None,
            seen: false,
        };
        assert_eq!(pref.effective_rating(), 3.0);
        pref.rating = Some(9.0);
        assert_eq!(pref.effective_rating(), 5.0);
    }
}
