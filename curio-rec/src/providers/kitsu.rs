//! Kitsu Provider
//!
//! Kitsu's search response carries no genre data, so records from here are
//! never cached and Kitsu only runs as a fallback tier.
//!
//! # API Reference
//! - Endpoint: https://kitsu.io/api/edge/anime?filter[text]={title}

use super::{check_status, non_blank, parse_year};
use crate::types::{MetadataProvider, ProviderError};
use async_trait::async_trait;
use curio_common::MetadataRecord;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const KITSU_API_URL: &str = "https://kitsu.io/api/edge";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attributes {
    canonical_title: Option<String>,
    synopsis: Option<String>,
    start_date: Option<String>,
    poster_image: Option<PosterImage>,
}

#[derive(Debug, Deserialize)]
struct PosterImage {
    original: Option<String>,
}

/// Kitsu REST client
pub struct KitsuProvider {
    client: Client,
    base_url: String,
}

impl KitsuProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: KITSU_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for KitsuProvider {
    fn name(&self) -> &'static str {
        "kitsu"
    }

    async fn search(&self, title: &str) -> Result<Option<MetadataRecord>, ProviderError> {
        debug!(title = %title, "Querying Kitsu");

        let response = self
            .client
            .get(format!("{}/anime", self.base_url))
            .query(&[("filter[text]", title)])
            .header(reqwest::header::ACCEPT, "application/vnd.api+json")
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Kitsu", e))?;

        if !check_status("Kitsu", response.status())? {
            return Ok(None);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("Kitsu", e))?;

        Ok(into_record(parsed))
    }
}

fn into_record(response: SearchResponse) -> Option<MetadataRecord> {
    let resource = response.data.into_iter().next()?;
    let attributes = resource.attributes;
    let title = non_blank(attributes.canonical_title)?;

    let mut record = MetadataRecord::new(title).with_description(attributes.synopsis);
    record.year = attributes.start_date.as_deref().and_then(parse_year);
    record.image_url = attributes.poster_image.and_then(|p| non_blank(p.original));
    record.source_url = Some(format!("https://kitsu.io/anime/{}", resource.id));
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_has_no_genres() {
        let raw = r#"{
            "data": [{
                "id": "1",
                "attributes": {
                    "canonicalTitle": "Cowboy Bebop",
                    "synopsis": "Space western.",
                    "startDate": "1998-04-03",
                    "posterImage": {"original": "https://media.kitsu.io/1.jpg"}
                }
            }]
        }"#;
        let record = into_record(serde_json::from_str(raw).unwrap()).unwrap();

        assert_eq!(record.title, "Cowboy Bebop");
        assert_eq!(record.year, Some(1998));
        assert!(!record.has_genres());
        assert_eq!(record.source_url.as_deref(), Some("https://kitsu.io/anime/1"));
    }
}
