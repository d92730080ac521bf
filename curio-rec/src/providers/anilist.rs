//! AniList Provider
//!
//! Queries the AniList GraphQL API for the best anime match of a title.
//! AniList reports romaji titles and full genre lists, which makes it the
//! preferred first-tier anime source.
//!
//! # API Reference
//! - Endpoint: https://graphql.anilist.co (POST, GraphQL)
//! - Rate Limit: 90 requests/minute
//! - A title with no match yields HTTP 404 with `data.Media = null`

use super::{check_status, non_blank};
use crate::types::{MetadataProvider, ProviderError};
use async_trait::async_trait;
use curio_common::MetadataRecord;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const ANILIST_API_URL: &str = "https://graphql.anilist.co";

const MEDIA_QUERY: &str = r#"
query ($search: String) {
    Media (search: $search, type: ANIME) {
        title { romaji }
        description
        genres
        startDate { year }
        coverImage { large }
        siteUrl
    }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<MediaData>,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<Media>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Media {
    title: MediaTitle,
    description: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    start_date: Option<FuzzyDate>,
    cover_image: Option<CoverImage>,
    site_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaTitle {
    romaji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FuzzyDate {
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct CoverImage {
    large: Option<String>,
}

/// AniList GraphQL client
pub struct AniListProvider {
    client: Client,
    endpoint: String,
}

impl AniListProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: ANILIST_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for AniListProvider {
    fn name(&self) -> &'static str {
        "anilist"
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        debug!(title = %title, "Querying AniList");

        let body = json!({
            "query": MEDIA_QUERY,
            "variables": { "search": title },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("AniList", e))?;

        if !check_status("AniList", response.status())? {
            return Ok(None);
        }

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("AniList", e))?;

        Ok(into_record(parsed))
    }
}

fn into_record(response: GraphQlResponse) -> Option<MetadataRecord> {
    let media = response.data?.media?;
    let title = non_blank(media.title.romaji)?;

    let mut record = MetadataRecord::new(title)
        .with_description(media.description)
        .with_genres(media.genres);
    record.year = media.start_date.and_then(|d| d.year);
    record.image_url = media.cover_image.and_then(|c| non_blank(c.large));
    record.source_url = non_blank(media.site_url);
    Some(record)
}
