//! Title Generator
//!
//! Produces noisy candidate titles for a free-text query. The output may
//! contain duplicates, numbering and misspellings; the resolver cleans it up.

use crate::types::ProviderError;
use async_trait::async_trait;
use curio_common::ContentType;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

const COHERE_CHAT_URL: &str = "https://api.cohere.ai/v1/chat";
const COHERE_CHAT_MODEL: &str = "command";

/// Candidate title source
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, query: &str, content_type: ContentType) -> Result<Vec<String>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: String,
}

/// LLM-backed generator using Cohere chat
pub struct CohereTitleGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CohereTitleGenerator {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            endpoint: COHERE_CHAT_URL.to_string(),
            api_key,
            model: COHERE_CHAT_MODEL.to_string(),
        }
    }
}

/// System preamble for a content type
pub fn preamble(content_type: ContentType) -> String {
    format!(
        "You are a {ct} recommender system that gives comma separated {ct} titles to the user",
        ct = content_type
    )
}

#[async_trait]
impl TitleGenerator for CohereTitleGenerator {
    async fn generate(&self, query: &str, content_type: ContentType) -> Result<Vec<String>, ProviderError> {
        debug!(query = %query, content_type = %content_type, "Generating candidate titles");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "preamble": preamble(content_type),
                "message": query,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Cohere", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("Cohere chat returned {}", status),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest("Cohere", e))?;

        let titles = parse_title_list(&parsed.text);
        debug!(count = titles.len(), "Parsed candidate titles");
        Ok(titles)
    }
}

/// Split a free-form LLM answer into titles
///
/// Accepts comma- or newline-separated lists, strips list numbering
/// ("1.", "2)"), bullets and surrounding quotes, and drops empty entries and
/// case-insensitive duplicates (first spelling kept).
pub fn parse_title_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split([',', '\n'])
        .map(clean_entry)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn clean_entry(entry: &str) -> &str {
    let entry = entry.trim().trim_start_matches(['-', '*', '•']).trim_start();

    let digits = entry.chars().take_while(char::is_ascii_digit).count();
    let entry = if digits > 0 && entry[digits..].starts_with(['.', ')']) {
        entry[digits + 1..].trim_start()
    } else {
        entry
    };

    entry
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .trim_end_matches('.')
        .trim()
}

/// Fixed title list, for the CLI and tests
pub struct StaticTitleGenerator {
    titles: Vec<String>,
}

impl StaticTitleGenerator {
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            titles: titles.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TitleGenerator for StaticTitleGenerator {
    async fn generate(&self, _query: &str, _content_type: ContentType) -> Result<Vec<String>, ProviderError> {
        Ok(self.titles.clone())
    }
}
