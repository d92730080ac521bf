//! Metadata Providers
//!
//! One `MetadataProvider` implementation per external source. Providers are
//! selected by name from configuration and grouped into tiers for the
//! resolver: providers inside a tier race each other, tiers are tried in
//! order.
//!
//! # Providers
//! 1. **anilist** - AniList GraphQL (anime, with genres)
//! 2. **jikan** - Jikan / MyAnimeList REST (anime, with genres, 3 req/s)
//! 3. **kitsu** - Kitsu REST (anime, no genres)
//! 4. **find_my_anime** - find-my-anime aggregate search (anime)
//! 5. **omdb** - OMDb (movies and series, API key)
//! 6. **tmdb** - TMDb search (movies and series, API key, no genres)

pub mod anilist;
pub mod find_my_anime;
pub mod jikan;
pub mod kitsu;
pub mod omdb;
pub mod tmdb;

pub use anilist::AniListProvider;
pub use find_my_anime::FindMyAnimeProvider;
pub use jikan::JikanProvider;
pub use kitsu::KitsuProvider;
pub use omdb::OmdbProvider;
pub use tmdb::TmdbProvider;

use crate::types::{MetadataProvider, ProviderError};
use curio_common::config::CurioConfig;
use curio_common::{ContentType, Error, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// User-Agent sent to every provider
pub const USER_AGENT: &str = concat!("curio-rec/", env!("CARGO_PKG_VERSION"));

/// Connection establishment timeout shared by all providers
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider tiers for one content type
pub type ProviderTiers = Vec<Vec<Arc<dyn MetadataProvider>>>;

/// Build the shared HTTP client
///
/// `timeout` bounds each whole request; the resolver applies its own
/// deadline on top.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Builds configured providers by name
pub struct ProviderRegistry {
    client: Client,
    omdb_key: Option<String>,
    tmdb_key: Option<String>,
}

impl ProviderRegistry {
    pub fn new(client: Client, omdb_key: Option<String>, tmdb_key: Option<String>) -> Self {
        Self {
            client,
            omdb_key,
            tmdb_key,
        }
    }

    pub fn from_config(config: &CurioConfig) -> Result<Self> {
        let client = http_client(Duration::from_millis(config.resolver.provider_timeout_ms))?;
        Ok(Self::new(client, config.keys.omdb.clone(), config.keys.tmdb.clone()))
    }

    /// Instantiate one provider for a content type
    ///
    /// # Errors
    /// `Error::Config` for unknown names, for providers that do not serve
    /// the content type, and for providers missing their API key
    pub fn build(&self, name: &str, content_type: ContentType) -> Result<Arc<dyn MetadataProvider>> {
        let client = self.client.clone();
        let provider: Arc<dyn MetadataProvider> = match (name, content_type) {
            ("anilist", ContentType::Anime) => Arc::new(AniListProvider::new(client)),
            ("jikan", ContentType::Anime) => Arc::new(JikanProvider::new(client)),
            ("kitsu", ContentType::Anime) => Arc::new(KitsuProvider::new(client)),
            ("find_my_anime", ContentType::Anime) => Arc::new(FindMyAnimeProvider::new(client)),
            ("omdb", ContentType::Movie | ContentType::Series) => {
                let key = required_key(&self.omdb_key, "omdb")?;
                Arc::new(OmdbProvider::new(client, key, content_type))
            }
            ("tmdb", ContentType::Movie | ContentType::Series) => {
                let key = required_key(&self.tmdb_key, "tmdb")?;
                Arc::new(TmdbProvider::new(client, key, content_type))
            }
            (name, content_type) => {
                return Err(Error::Config(format!(
                    "Provider '{}' cannot serve {}",
                    name, content_type
                )))
            }
        };
        Ok(provider)
    }

    /// Build every configured tier for a content type
    ///
    /// Providers that cannot be built are skipped with a warning; tiers left
    /// empty are dropped. Fails only when no provider at all is usable.
    pub fn tiers(&self, names: &[Vec<String>], content_type: ContentType) -> Result<ProviderTiers> {
        let tiers: ProviderTiers = names
            .iter()
            .map(|tier| {
                tier.iter()
                    .filter_map(|name| match self.build(name, content_type) {
                        Ok(provider) => Some(provider),
                        Err(e) => {
                            warn!(provider = %name, content_type = %content_type, error = %e, "Skipping provider");
                            None
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|tier| !tier.is_empty())
            .collect();

        if tiers.is_empty() {
            return Err(Error::Config(format!("No usable providers for {}", content_type)));
        }

        debug!(
            content_type = %content_type,
            tiers = ?tiers.iter().map(|t| t.iter().map(|p| p.name()).collect::<Vec<_>>()).collect::<Vec<_>>(),
            "Provider tiers built"
        );

        Ok(tiers)
    }
}

fn required_key(key: &Option<String>, provider: &str) -> Result<String> {
    key.clone()
        .filter(|k| curio_common::config::is_valid_key(k))
        .ok_or_else(|| Error::Config(format!("{} API key not configured", provider)))
}

/// Map a non-success status to an error; 404 means "no match"
pub(crate) fn check_status(
    provider: &str,
    status: reqwest::StatusCode,
) -> std::result::Result<bool, ProviderError> {
    if status == reqwest::StatusCode::NOT_FOUND {
        debug!(provider, "Provider returned 404, treating as no match");
        return Ok(false);
    }
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: format!("{} returned {}", provider, status),
        });
    }
    Ok(true)
}

/// Leading four-digit year of a date-like string ("1998-04-03", "2010–2015")
pub(crate) fn parse_year(value: &str) -> Option<i32> {
    let prefix: String = value.trim().chars().take(4).collect();
    if prefix.len() == 4 && prefix.chars().all(|c| c.is_ascii_digit()) {
        prefix.parse().ok()
    } else {
        None
    }
}

/// Drop blank strings and the "N/A" placeholder
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && v.trim() != "N/A")
}
