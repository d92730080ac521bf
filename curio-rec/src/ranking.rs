//! Ranking Engine
//!
//! Scores resolved candidates against a user's preference history by fusing
//! two similarity signals, each weighted by the preference's rating:
//!
//! 1. **Genre overlap** - `|pref ∩ cand| / |pref|`
//! 2. **Embedding similarity** - cosine similarity rescaled to [0, 1]
//!
//! Score matrices are indexed `[preference][candidate]`. A cell whose inputs
//! are missing (no genres, no vector) is unknown and takes the mean of the
//! known cells, so incomplete candidates land at the population average.
//! When no cell of a signal is known the signal carries no information: it
//! has no matrix and its fused value is [`NEUTRAL_SIGNAL`] for everyone.
//!
//! # Rating blend
//! ```text
//! w       = (rating - 1) / 4
//! blended = w·(α·s + (1 - α)) + (1 - w)·(α·(1 - s))
//! ```
//! High ratings pull toward the raw similarity; low ratings invert it, so a
//! candidate resembling a disliked title is pushed down.

use curio_common::slug::normalize_title;
use curio_common::{MetadataRecord, PreferenceRecord, RankedResult};
use std::collections::HashSet;
use tracing::debug;

/// Default weight of raw similarity in the rating blend
pub const DEFAULT_ALPHA: f64 = 0.75;

/// Display score given to every candidate when there is no preference signal
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Fused value of a signal with no known cell, midway in [0, 1]
pub const NEUTRAL_SIGNAL: f64 = 0.5;

/// Scores indexed `[preference][candidate]`
pub type Matrix = Vec<Vec<f64>>;

/// Replace unknown cells with the mean of the known ones
///
/// `None` when no cell is known.
fn backfill(cells: Vec<Vec<Option<f64>>>) -> Option<Matrix> {
    let known: Vec<f64> = cells.iter().flatten().flatten().copied().collect();
    if known.is_empty() {
        return None;
    }
    let mean = known.iter().sum::<f64>() / known.len() as f64;

    Some(
        cells
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.unwrap_or(mean)).collect())
            .collect(),
    )
}

/// Genre overlap normalized by the preference's genre count
pub fn genre_scores(prefs: &[PreferenceRecord], candidates: &[MetadataRecord]) -> Option<Matrix> {
    let candidate_genres: Vec<HashSet<String>> =
        candidates.iter().map(MetadataRecord::genre_set).collect();

    let cells = prefs
        .iter()
        .map(|pref| {
            let pref_genres = pref.genre_set();
            candidate_genres
                .iter()
                .map(|cand_genres| {
                    if pref_genres.is_empty() || cand_genres.is_empty() {
                        None
                    } else {
                        let shared = pref_genres.intersection(cand_genres).count();
                        Some(shared as f64 / pref_genres.len() as f64)
                    }
                })
                .collect()
        })
        .collect();

    backfill(cells)
}

/// Cosine similarity; `None` for empty, mismatched or zero-norm vectors
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Cosine similarity rescaled from [-1, 1] to [0, 1]
pub fn embedding_scores(
    pref_vectors: &[Option<Vec<f32>>],
    candidate_vectors: &[Option<Vec<f32>>],
) -> Option<Matrix> {
    let cells = pref_vectors
        .iter()
        .map(|pref| {
            candidate_vectors
                .iter()
                .map(|cand| match (pref, cand) {
                    (Some(p), Some(c)) => cosine(p, c).map(|s| (s + 1.0) / 2.0),
                    _ => None,
                })
                .collect()
        })
        .collect();

    backfill(cells)
}

/// Blend a raw similarity with a 1-5 rating
pub fn blend(score: f64, rating: f64, alpha: f64) -> f64 {
    let weight = (rating.clamp(1.0, 5.0) - 1.0) / 4.0;
    weight * (alpha * score + (1.0 - alpha)) + (1.0 - weight) * (alpha * (1.0 - score))
}

/// Rating-blend every cell and average over preferences per candidate
pub fn fuse(matrix: &Matrix, ratings: &[f64], alpha: f64) -> Vec<f64> {
    let Some(width) = matrix.first().map(Vec::len) else {
        return Vec::new();
    };

    let mut sums = vec![0.0; width];
    for (row, rating) in matrix.iter().zip(ratings) {
        for (sum, score) in sums.iter_mut().zip(row) {
            *sum += blend(*score, *rating, alpha);
        }
    }

    let rows = matrix.len().min(ratings.len()).max(1) as f64;
    sums.into_iter().map(|s| s / rows).collect()
}

/// Fused genre + embedding ranking
#[derive(Debug, Clone)]
pub struct RankingEngine {
    alpha: f64,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl RankingEngine {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Rank candidates against a preference history
    ///
    /// # Arguments
    /// * `prefs` - the user's preferences (seen titles included)
    /// * `candidates` - resolved records, in input order
    /// * `candidate_vectors` - embeddings aligned with `candidates`
    /// * `pref_vectors` - embeddings aligned with `prefs`
    /// * `k` - maximum number of results
    ///
    /// # Returns
    /// At most `k` results, best first, never containing a seen title
    pub fn rank(
        &self,
        prefs: &[PreferenceRecord],
        candidates: &[MetadataRecord],
        candidate_vectors: &[Option<Vec<f32>>],
        pref_vectors: &[Option<Vec<f32>>],
        k: usize,
    ) -> Vec<RankedResult> {
        let seen: HashSet<String> = prefs
            .iter()
            .filter(|p| p.seen)
            .map(|p| normalize_title(&p.title))
            .collect();

        let unseen: Vec<usize> = (0..candidates.len())
            .filter(|&i| !seen.contains(&normalize_title(&candidates[i].title)))
            .collect();

        if unseen.len() < candidates.len() {
            debug!(excluded = candidates.len() - unseen.len(), "Excluded seen candidates");
        }

        if prefs.is_empty() {
            return unseen
                .into_iter()
                .take(k)
                .enumerate()
                .map(|(position, i)| RankedResult {
                    record: candidates[i].clone(),
                    score: NEUTRAL_SCORE,
                    rank: position + 1,
                })
                .collect();
        }

        let pool: Vec<MetadataRecord> = unseen.iter().map(|&i| candidates[i].clone()).collect();
        let pool_vectors: Vec<Option<Vec<f32>>> = unseen
            .iter()
            .map(|&i| candidate_vectors.get(i).cloned().flatten())
            .collect();
        let pref_vectors: Vec<Option<Vec<f32>>> = (0..prefs.len())
            .map(|i| pref_vectors.get(i).cloned().flatten())
            .collect();

        let ratings: Vec<f64> = prefs.iter().map(|p| p.effective_rating() as f64).collect();

        let fused = |matrix: Option<Matrix>| match matrix {
            Some(matrix) => fuse(&matrix, &ratings, self.alpha),
            None => vec![NEUTRAL_SIGNAL; pool.len()],
        };
        let genre = fused(genre_scores(prefs, &pool));
        let embedding = fused(embedding_scores(&pref_vectors, &pool_vectors));

        let mut scored: Vec<(usize, f64)> = genre
            .iter()
            .zip(&embedding)
            .map(|(g, e)| (g + e) / 2.0)
            .enumerate()
            .collect();
        // Stable: equal scores keep input order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(position, (i, score))| RankedResult {
                record: pool[i].clone(),
                score: (score * 100.0).clamp(0.0, 100.0),
                rank: position + 1,
            })
            .collect()
    }
}
