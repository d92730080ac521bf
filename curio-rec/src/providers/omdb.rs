//! OMDb Provider
//!
//! Exact-title lookup against the Open Movie Database. OMDb answers with
//! HTTP 200 even for misses; `Response` carries the real outcome.
//!
//! # API Reference
//! - Endpoint: http://www.omdbapi.com/?t={title}&type={movie|series}&apikey={key}

use super::{check_status, non_blank, parse_year};
use crate::types::{MetadataProvider, ProviderError};
use async_trait::async_trait;
use curio_common::{ContentType, MetadataRecord};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const OMDB_API_URL: &str = "http://www.omdbapi.com/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TitleResponse {
    response: String,
    title: Option<String>,
    plot: Option<String>,
    genre: Option<String>,
    year: Option<String>,
    poster: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
}

/// OMDb client
pub struct OmdbProvider {
    client: Client,
    base_url: String,
    api_key: String,
    content_type: ContentType,
}

impl OmdbProvider {
    pub fn new(client: Client, api_key: String, content_type: ContentType) -> Self {
        Self {
            client,
            base_url: OMDB_API_URL.to_string(),
            api_key,
            content_type,
        }
    }
}

#[async_trait]
impl MetadataProvider for OmdbProvider {
    fn name(&self) -> &'static str {
        "omdb"
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        debug!(title = %title, content_type = %self.content_type, "Querying OMDb");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("t", title),
                ("type", self.content_type.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("OMDb", e))?;

        if !check_status("OMDb", response.status())? {
            return Ok(None);
        }

        let parsed: TitleResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("OMDb", e))?;

        Ok(into_record(parsed))
    }
}

fn into_record(response: TitleResponse) -> Option<MetadataRecord> {
    if response.response != "True" {
        return None;
    }
    let title = non_blank(response.title)?;

    let genres = response
        .genre
        .map(|g| g.split(", ").map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut record = MetadataRecord::new(title)
        .with_description(non_blank(response.plot))
        .with_genres(genres);
    record.year = response.year.as_deref().and_then(parse_year);
    record.image_url = non_blank(response.poster);
    record.source_url = non_blank(response.imdb_id).map(|id| format!("https://www.imdb.com/title/{}", id));
    Some(record)
}
