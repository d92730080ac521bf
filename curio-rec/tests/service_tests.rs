//! End-to-end recommendation flow with scripted providers, an offline
//! embedder and an in-memory SQLite preference store.

mod helpers;

use async_trait::async_trait;
use curio_common::{ContentType, MetadataRecord};
use curio_rec::background::BackgroundWorker;
use curio_rec::db::{init_memory_pool, PreferenceStore, SqlitePreferenceStore};
use curio_rec::embeddings::{Embedder, EmbeddingIndex, MemoryVectorStore};
use curio_rec::generator::{StaticTitleGenerator, TitleGenerator};
use curio_rec::orchestrator::ResolutionOrchestrator;
use curio_rec::service::{EvictionPolicy, Recommender};
use curio_rec::types::ProviderError;
use curio_rec::RecommendError;
use helpers::*;
use std::sync::Arc;

struct Harness {
    recommender: Recommender,
    preferences: Arc<dyn PreferenceStore>,
    embeddings: Option<EmbeddingIndex>,
}

/// Anime catalogue served by a single mock provider
fn catalogue() -> MockProvider {
    MockProvider::not_found("anilist", 0)
        .answer("Space Brothers", record("Space Brothers", &["Sci-Fi", "Drama"]))
        .answer("Cowboy Bebop", record("Cowboy Bebop", &["Sci-Fi", "Action"]))
        .answer("Planetes", record("Planetes", &["Sci-Fi", "Drama"]))
        .answer("Toradora", record("Toradora!", &["Romance"]))
}

async fn harness(
    generator: Arc<dyn TitleGenerator>,
    catalogue: MockProvider,
    embedder: Option<Arc<dyn Embedder>>,
) -> Harness {
    let (_, cache) = memory_cache();
    let orchestrator = ResolutionOrchestrator::new(
        cache.clone(),
        resolver(ContentType::Anime, vec![vec![provider(catalogue)]]),
    );

    let pool = init_memory_pool().await.unwrap();
    let preferences: Arc<dyn PreferenceStore> = Arc::new(SqlitePreferenceStore::new(pool));
    let embeddings =
        embedder.map(|embedder| EmbeddingIndex::new(embedder, Arc::new(MemoryVectorStore::new())));

    let background = BackgroundWorker::spawn(cache, embeddings.clone(), Some(Arc::clone(&preferences)));
    let recommender = Recommender::new(generator, orchestrator, Arc::clone(&preferences), background);
    let recommender = match &embeddings {
        Some(index) => recommender.with_embeddings(index.clone()),
        None => recommender,
    };

    Harness {
        recommender,
        preferences,
        embeddings,
    }
}

fn generator(titles: &[&str]) -> Arc<dyn TitleGenerator> {
    Arc::new(StaticTitleGenerator::new(titles.iter().copied()))
}

struct BrokenGenerator;

#[async_trait]
impl TitleGenerator for BrokenGenerator {
    async fn generate(&self, _query: &str, _content_type: ContentType) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

#[tokio::test]
async fn test_recommends_unseen_titles_by_preference() {
    let h = harness(
        generator(&["Space Brothers", "Toradora", "Planetes", "Cowboy Bebop"]),
        catalogue(),
        None,
    )
    .await;
    h.preferences
        .upsert_preference(&pref("u1", "Planetes", 5.0, &["Sci-Fi", "Drama"], true))
        .await
        .unwrap();

    let ranked = h
        .recommender
        .recommend("u1", "space anime", ContentType::Anime, 2)
        .await
        .unwrap();

    let titles: Vec<&str> = ranked.iter().map(|r| r.record.title.as_str()).collect();
    assert_eq!(titles, vec!["Space Brothers", "Cowboy Bebop"]);
    assert_eq!(ranked[0].rank, 1);

    h.recommender.shutdown().await;
}

#[tokio::test]
async fn test_recommended_titles_are_counted_once_drained() {
    let h = harness(generator(&["Space Brothers", "Toradora"]), catalogue(), None).await;

    let ranked = h
        .recommender
        .recommend("u1", "anything", ContentType::Anime, 5)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|r| r.score == 50.0));

    h.recommender.shutdown().await;

    let popular = h.preferences.top_popular(10).await.unwrap();
    assert_eq!(popular.len(), 2);
    assert!(popular.iter().all(|p| p.recommendation_count == 1));
    assert!(popular.iter().any(|p| p.title == "Toradora!"));
}

#[tokio::test]
async fn test_generation_failure_is_an_error() {
    let h = harness(Arc::new(BrokenGenerator), catalogue(), None).await;

    let result = h
        .recommender
        .recommend("u1", "anything", ContentType::Anime, 5)
        .await;
    assert!(matches!(result, Err(RecommendError::Generation(_))));

    h.recommender.shutdown().await;
}

#[tokio::test]
async fn test_nothing_resolvable_is_an_empty_result() {
    let h = harness(generator(&["Made Up", "Also Made Up"]), catalogue(), None).await;

    let ranked = h
        .recommender
        .recommend("u1", "anything", ContentType::Anime, 5)
        .await
        .unwrap();
    assert!(ranked.is_empty());

    h.recommender.shutdown().await;
    assert!(h.preferences.top_popular(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_embeddings_decide_between_equal_genre_matches() {
    let catalogue = MockProvider::not_found("anilist", 0)
        .answer(
            "Kaguya-sama",
            described("Kaguya-sama", &["Drama"], "a love battle at school"),
        )
        .answer(
            "Planetes",
            described("Planetes", &["Drama"], "debris collectors in space"),
        );
    let h = harness(
        generator(&["Kaguya-sama", "Planetes"]),
        catalogue,
        Some(Arc::new(KeywordEmbedder)),
    )
    .await;

    let mut liked = pref("u1", "Space Brothers", 5.0, &["Drama"], true);
    liked.comment = Some("space, space and more space".to_string());
    h.recommender.add_preference(liked, None).await.unwrap();

    let ranked = h
        .recommender
        .recommend("u1", "drama", ContentType::Anime, 2)
        .await
        .unwrap();
    assert_eq!(ranked[0].record.title, "Planetes");
    assert!(ranked[0].score > ranked[1].score);

    h.recommender.shutdown().await;
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_genre_ranking() {
    let h = harness(
        generator(&["Toradora", "Space Brothers"]),
        catalogue(),
        Some(Arc::new(OfflineEmbedder)),
    )
    .await;
    h.preferences
        .upsert_preference(&pref("u1", "Planetes", 5.0, &["Sci-Fi"], true))
        .await
        .unwrap();

    let ranked = h
        .recommender
        .recommend("u1", "space", ContentType::Anime, 5)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].record.title, "Space Brothers");

    h.recommender.shutdown().await;
}

#[tokio::test]
async fn test_fresh_candidates_are_embedded_once() {
    let embedder = Arc::new(CountingEmbedder::default());
    let h = harness(
        generator(&["Space Brothers", "Cowboy Bebop"]),
        catalogue(),
        Some(embedder.clone() as Arc<dyn Embedder>),
    )
    .await;
    h.preferences
        .upsert_preference(&pref("u1", "Planetes", 5.0, &["Sci-Fi"], true))
        .await
        .unwrap();

    let ranked = h
        .recommender
        .recommend("u1", "space", ContentType::Anime, 5)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 2);

    // Second call hits the cache and the stored vectors
    h.recommender
        .recommend("u1", "space", ContentType::Anime, 5)
        .await
        .unwrap();
    h.recommender.shutdown().await;

    assert_eq!(embedder.embedded().len(), 2);
}

#[tokio::test]
async fn test_unranked_fresh_candidates_are_warmed_in_background() {
    let embedder = Arc::new(CountingEmbedder::default());
    let h = harness(
        generator(&["Space Brothers", "Cowboy Bebop"]),
        catalogue(),
        Some(embedder.clone() as Arc<dyn Embedder>),
    )
    .await;

    // No preferences, so ranking needs no vectors
    h.recommender
        .recommend("u1", "space", ContentType::Anime, 5)
        .await
        .unwrap();
    h.recommender.shutdown().await;

    let mut embedded = embedder.embedded();
    embedded.sort();
    assert_eq!(embedded, vec!["Cowboy Bebop".to_string(), "Space Brothers".to_string()]);
}

#[tokio::test]
async fn test_add_preference_persists_and_embeds() {
    let h = harness(generator(&[]), catalogue(), Some(Arc::new(KeywordEmbedder))).await;

    let resolved = MetadataRecord::new("Planetes")
        .with_genres(["Sci-Fi", "Drama"])
        .with_description(Some("debris collectors in space".to_string()));
    let liked = pref("u1", "Planetes", 4.0, &[], true);

    h.recommender
        .add_preference(liked.clone(), Some(&resolved))
        .await
        .unwrap();

    let stored = h.preferences.preferences("u1", Some(ContentType::Anime)).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].genres, vec!["Sci-Fi".to_string(), "Drama".to_string()]);

    let vectors = h
        .embeddings
        .as_ref()
        .unwrap()
        .preference_vectors(&stored)
        .await
        .unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].as_ref().unwrap()[0], 1.0);

    h.recommender.shutdown().await;
}

#[tokio::test]
async fn test_add_preference_reports_embedding_failure_after_saving() {
    let h = harness(generator(&[]), catalogue(), Some(Arc::new(OfflineEmbedder))).await;

    let mut liked = pref("u1", "Planetes", 5.0, &["Sci-Fi"], false);
    liked.comment = Some("great".to_string());

    let result = h.recommender.add_preference(liked, None).await;
    assert!(matches!(result, Err(RecommendError::Embedding(_))));
    assert_eq!(h.preferences.preferences("u1", None).await.unwrap().len(), 1);

    h.recommender.shutdown().await;
}

#[tokio::test]
async fn test_maybe_evict_runs_on_the_background_lane() {
    let (store, cache) = memory_cache();
    let records: Vec<_> = (0..4).map(|i| record(&format!("t{}", i), &["Drama"])).collect();
    cache.put_many(&records, ContentType::Anime, None).await;

    let orchestrator = ResolutionOrchestrator::new(
        cache.clone(),
        resolver(ContentType::Anime, vec![vec![provider(catalogue())]]),
    );
    let preferences: Arc<dyn PreferenceStore> =
        Arc::new(SqlitePreferenceStore::new(init_memory_pool().await.unwrap()));
    let background = BackgroundWorker::spawn(cache, None, Some(Arc::clone(&preferences)));

    let recommender = Recommender::new(generator(&[]), orchestrator, preferences, background)
        .with_eviction(EvictionPolicy {
            prefix: "cache".to_string(),
            threshold_percent: 0.0,
            cleanup_percent: 50.0,
            max_capacity: 1_000,
        });

    recommender.maybe_evict();
    recommender.shutdown().await;

    assert_eq!(store.len().await, 2);
    assert_eq!(recommender.background().stats().completed(), 1);
}
