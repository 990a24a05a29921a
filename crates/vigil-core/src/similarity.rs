//! Pluggable string-similarity scoring.
//!
//! The matcher only ever asks for a ratio in `[0, 1]` between two strings.
//! Swapping the algorithm (token overlap, embeddings, …) means implementing
//! [`SimilarityScorer`]; merge logic is untouched.

/// A symmetric similarity ratio in `[0, 1]`, where `1.0` means identical.
pub trait SimilarityScorer: Send + Sync {
  fn ratio(&self, a: &str, b: &str) -> f64;
}

/// Edit-distance ratio: `1 - levenshtein(a, b) / max(len(a), len(b))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl SimilarityScorer for Levenshtein {
  fn ratio(&self, a: &str, b: &str) -> f64 { strsim::normalized_levenshtein(a, b) }
}

/// Sørensen–Dice coefficient over character bigrams. More tolerant of
/// inserted words than [`Levenshtein`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SorensenDice;

impl SimilarityScorer for SorensenDice {
  fn ratio(&self, a: &str, b: &str) -> f64 { strsim::sorensen_dice(a, b) }
}

impl<F> SimilarityScorer for F
where
  F: Fn(&str, &str) -> f64 + Send + Sync,
{
  fn ratio(&self, a: &str, b: &str) -> f64 { self(a, b) }
}
