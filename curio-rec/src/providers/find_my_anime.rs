//! find-my-anime Provider
//!
//! Aggregate search over several anime databases. Not part of the default
//! tiers; enable it by naming `find_my_anime` in `[resolver] anime`.

use super::{check_status, non_blank};
use crate::types::{MetadataProvider, ProviderError};
use async_trait::async_trait;
use curio_common::MetadataRecord;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const FIND_MY_ANIME_URL: &str = "https://find-my-anime.dtimur.de/api";

#[derive(Debug, Deserialize)]
struct Anime {
    title: Option<String>,
    synopsis: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    year: Option<i32>,
    images: Option<Images>,
    url: Option<String>,
}

/// Genres arrive either as plain strings or as `{ "name": ... }` objects
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Genre {
    Plain(String),
    Named { name: String },
}

impl Genre {
    fn into_name(self) -> String {
        match self {
            Genre::Plain(name) | Genre::Named { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Images {
    jpg: Option<ImageUrls>,
}

#[derive(Debug, Deserialize)]
struct ImageUrls {
    image_url: Option<String>,
}

/// find-my-anime client
pub struct FindMyAnimeProvider {
    client: Client,
    endpoint: String,
}

impl FindMyAnimeProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: FIND_MY_ANIME_URL.to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for FindMyAnimeProvider {
    fn name(&self) -> &'static str {
        "find_my_anime"
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        debug!(title = %title, "Querying find-my-anime");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("query", title),
                ("provider", "Kitsu"),
                ("includeAdult", "true"),
                ("collectionConsent", "true"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("find-my-anime", e))?;

        if !check_status("find-my-anime", response.status())? {
            return Ok(None);
        }

        let parsed: Vec<Anime> = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("find-my-anime", e))?;

        Ok(into_record(parsed))
    }
}

fn into_record(results: Vec<Anime>) -> Option<MetadataRecord> {
    let anime = results.into_iter().next()?;
    let title = non_blank(anime.title)?;

    let mut record = MetadataRecord::new(title)
        .with_description(anime.synopsis)
        .with_genres(anime.genres.into_iter().map(Genre::into_name));
    record.year = anime.year;
    record.image_url = anime
        .images
        .and_then(|i| i.jpg)
        .and_then(|jpg| non_blank(jpg.image_url));
    record.source_url = non_blank(anime.url);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_both_genre_shapes() {
        let raw = r#"[{
            "title": "Mushishi",
            "genres": ["Mystery", {"name": "Slice of Life"}],
            "year": 2005
        }]"#;
        let record = into_record(serde_json::from_str(raw).unwrap()).unwrap();
        assert_eq!(record.genres, vec!["Mystery", "Slice of Life"]);
        assert_eq!(record.year, Some(2005));
    }

    #[test]
    fn test_empty_list_is_no_match() {
        assert!(into_record(Vec::new()).is_none());
    }
}
