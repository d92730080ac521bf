//! Multi-source resolver behaviour: races, tier fallback, timeouts, policy
//! filtering and alias detection.

mod helpers;

use curio_common::ContentType;
use curio_rec::resolver::ContentPolicy;
use helpers::*;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_first_match_wins_and_losers_are_cancelled() {
    let slow = MockProvider::found("slow", 150, record("Slow Answer", &["Drama"]));
    let slow_completed = slow.completed();
    let fast = MockProvider::found("fast", 5, record("Fast Answer", &["Drama"]));

    let resolver = resolver(ContentType::Anime, vec![vec![provider(slow), provider(fast)]]);
    let resolution = resolver.resolve("Fast Answer", ContentType::Anime).await.unwrap();

    assert_eq!(resolution.record.title, "Fast Answer");

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!slow_completed.load(Ordering::SeqCst), "loser should have been aborted");
}

#[tokio::test]
async fn test_errors_and_empty_answers_do_not_stop_the_race() {
    let failing = MockProvider::failing("failing", 0);
    let empty = MockProvider::not_found("empty", 0);
    let good = MockProvider::found("good", 30, record("Monster", &["Mystery"]));

    let resolver = resolver(
        ContentType::Anime,
        vec![vec![provider(failing), provider(empty), provider(good)]],
    );
    let resolution = resolver.resolve("Monster", ContentType::Anime).await.unwrap();
    assert_eq!(resolution.record.title, "Monster");
}

#[tokio::test]
async fn test_panicking_provider_is_a_non_match() {
    let crashing = MockProvider::new("crashing", 0, Reply::Panic);
    let good = MockProvider::found("good", 20, record("Mushishi", &["Mystery"]));

    let resolver = resolver(ContentType::Anime, vec![vec![provider(crashing), provider(good)]]);
    assert!(resolver.resolve("Mushishi", ContentType::Anime).await.is_some());
}

#[tokio::test]
async fn test_hanging_provider_times_out() {
    let hanging = MockProvider::new("hanging", 0, Reply::Hang);

    let resolver = resolver(ContentType::Movie, vec![vec![provider(hanging)]]);
    let started = Instant::now();
    let resolution = resolver.resolve("Heat", ContentType::Movie).await;

    assert!(resolution.is_none());
    assert!(started.elapsed() < TEST_PROVIDER_TIMEOUT * 5);
}

#[tokio::test]
async fn test_later_tier_runs_only_when_earlier_tier_is_empty() {
    // Tier 1 succeeds: tier 2 is never asked
    let first = MockProvider::found("anilist", 0, record("Cowboy Bebop", &["Action"]));
    let fallback = MockProvider::found("kitsu", 0, record("Cowboy Bebop", &[]));
    let fallback_calls = fallback.calls();

    let resolver = resolver(
        ContentType::Anime,
        vec![vec![provider(first)], vec![provider(fallback)]],
    );
    let resolution = resolver.resolve("Cowboy Bebop", ContentType::Anime).await.unwrap();
    assert!(resolution.record.has_genres());
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);

    // Tier 1 exhausted: tier 2 answers
    let first = MockProvider::failing("anilist", 0);
    let second = MockProvider::not_found("jikan", 0);
    let fallback = MockProvider::found("kitsu", 0, record("Cowboy Bebop", &[]));

    let resolver = helpers::resolver(
        ContentType::Anime,
        vec![vec![provider(first), provider(second)], vec![provider(fallback)]],
    );
    let resolution = resolver.resolve("Cowboy Bebop", ContentType::Anime).await.unwrap();
    assert!(!resolution.record.has_genres());
}

#[tokio::test]
async fn test_policy_rejection_lets_a_compliant_provider_win() {
    let forbidden = MockProvider::found("fast", 0, record("Something", &["Hentai", "Romance"]));
    let compliant = MockProvider::found("slow", 40, record("Something Else", &["Romance"]));

    let resolver = resolver(ContentType::Anime, vec![vec![provider(forbidden), provider(compliant)]]);
    let resolution = resolver.resolve("Something", ContentType::Anime).await.unwrap();
    assert_eq!(resolution.record.title, "Something Else");
}

#[tokio::test]
async fn test_rejected_everywhere_is_absent() {
    let forbidden = MockProvider::found("only", 0, record("Something", &["hentai"]));
    let resolver = resolver(ContentType::Anime, vec![vec![provider(forbidden)]]);
    assert!(resolver.resolve("Something", ContentType::Anime).await.is_none());

    let excluded = MockProvider::found("only", 0, record("Banned Show", &["Drama"]));
    let resolver = resolver_with_policy(
        ContentType::Anime,
        vec![vec![provider(excluded)]],
        ContentPolicy::new(Vec::<String>::new(), ["banned show"]),
    );
    assert!(resolver.resolve("Other Query", ContentType::Anime).await.is_none());
}

#[tokio::test]
async fn test_every_provider_failing_resolves_nothing() {
    let resolver = resolver(
        ContentType::Movie,
        vec![
            vec![provider(MockProvider::failing("omdb", 0)), provider(MockProvider::not_found("tmdb", 0))],
        ],
    );
    assert!(resolver.resolve("Nonexistent", ContentType::Movie).await.is_none());
}

#[tokio::test]
async fn test_divergent_canonical_title_yields_alias_pair() {
    let localized = MockProvider::found("anilist", 0, record("Shingeki no Kyojin", &["Action"]));
    let resolver = resolver(ContentType::Anime, vec![vec![provider(localized)]]);

    let resolution = resolver.resolve("Attack on Titan", ContentType::Anime).await.unwrap();
    assert_eq!(
        resolution.alias,
        Some(("Attack on Titan".to_string(), "Shingeki no Kyojin".to_string()))
    );

    let close = MockProvider::found("anilist", 0, record("Cowboy Bebop: The Movie", &["Action"]));
    let resolver = helpers::resolver(ContentType::Anime, vec![vec![provider(close)]]);
    let resolution = resolver.resolve("cowboy bebop", ContentType::Anime).await.unwrap();
    assert_eq!(resolution.alias, None);
}
