//! Jikan Provider
//!
//! Unofficial MyAnimeList REST API. Returns genres, so it races AniList in
//! the first anime tier.
//!
//! # API Reference
//! - Endpoint: https://api.jikan.moe/v4/anime?q={title}&limit=1
//! - Rate Limit: 3 requests/second, enforced client-side

use super::{check_status, non_blank};
use crate::types::{MetadataProvider, ProviderError};
use async_trait::async_trait;
use curio_common::MetadataRecord;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use tracing::debug;

const JIKAN_API_URL: &str = "https://api.jikan.moe/v4";

/// Jikan allows 3 requests per second
const REQUESTS_PER_SECOND: u32 = 3;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Anime>,
}

#[derive(Debug, Deserialize)]
struct Anime {
    title: Option<String>,
    synopsis: Option<String>,
    #[serde(default)]
    genres: Vec<NamedEntry>,
    year: Option<i32>,
    images: Option<Images>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Images {
    jpg: Option<ImageUrls>,
}

#[derive(Debug, Deserialize)]
struct ImageUrls {
    image_url: Option<String>,
}

/// Jikan REST client
pub struct JikanProvider {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl JikanProvider {
    pub fn new(client: Client) -> Self {
        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            base_url: JIKAN_API_URL.to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }
}

#[async_trait]
impl MetadataProvider for JikanProvider {
    fn name(&self) -> &'static str {
        "jikan"
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        self.rate_limiter.until_ready().await;

        debug!(title = %title, "Querying Jikan");

        let response = self
            .client
            .get(format!("{}/anime", self.base_url))
            .query(&[("q", title), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Jikan", e))?;

        if !check_status("Jikan", response.status())? {
            return Ok(None);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("Jikan", e))?;

        Ok(into_record(parsed))
    }
}

fn into_record(response: SearchResponse) -> Option<MetadataRecord> {
    let anime = response.data.into_iter().next()?;
    let title = non_blank(anime.title)?;

    let mut record = MetadataRecord::new(title)
        .with_description(anime.synopsis)
        .with_genres(anime.genres.into_iter().map(|g| g.name));
    record.year = anime.year;
    record.image_url = anime
        .images
        .and_then(|i| i.jpg)
        .and_then(|jpg| non_blank(jpg.image_url));
    record.source_url = non_blank(anime.url);
    Some(record)
}
