//! TMDb Provider
//!
//! Search against The Movie Database. The search endpoint returns genre ids
//! only, so records from here carry no genres and are never cached.
//!
//! # API Reference
//! - Endpoint: https://api.themoviedb.org/3/search/{movie|tv}?api_key={key}&query={title}

use super::{check_status, non_blank, parse_year};
use crate::types::{MetadataProvider, ProviderError};
use async_trait::async_trait;
use curio_common::{ContentType, MetadataRecord};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const TMDB_API_URL: &str = "https://api.themoviedb.org/3";
const TMDB_POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Movies use `title`/`release_date`, TV uses `name`/`first_air_date`
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    poster_path: Option<String>,
}

/// TMDb client
pub struct TmdbProvider {
    client: Client,
    base_url: String,
    api_key: String,
    content_type: ContentType,
}

impl TmdbProvider {
    pub fn new(client: Client, api_key: String, content_type: ContentType) -> Self {
        Self {
            client,
            base_url: TMDB_API_URL.to_string(),
            api_key,
            content_type,
        }
    }
}

fn media_type(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Movie => "movie",
        _ => "tv",
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        let media = media_type(self.content_type);
        debug!(title = %title, media, "Querying TMDb");

        let response = self
            .client
            .get(format!("{}/search/{}", self.base_url, media))
            .query(&[("api_key", self.api_key.as_str()), ("query", title)])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("TMDb", e))?;

        if !check_status("TMDb", response.status())? {
            return Ok(None);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("TMDb", e))?;

        Ok(into_record(parsed, media))
    }
}

fn into_record(response: SearchResponse, media: &str) -> Option<MetadataRecord> {
    let result = response.results.into_iter().next()?;
    let (title, date) = if media == "movie" {
        (result.title, result.release_date)
    } else {
        (result.name, result.first_air_date)
    };
    let title = non_blank(title)?;

    let mut record = MetadataRecord::new(title).with_description(non_blank(result.overview));
    record.year = date.as_deref().and_then(parse_year);
    record.image_url = non_blank(result.poster_path).map(|p| format!("{}{}", TMDB_POSTER_BASE, p));
    record.source_url = Some(format!("https://www.themoviedb.org/{}/{}", media, result.id));
    Some(record)
}
