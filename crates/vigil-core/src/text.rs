//! Text normalization and dedup-key derivation.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Lowercase, replace every non-alphanumeric character with a space, and
/// collapse runs of whitespace. Idempotent.
pub fn normalize(s: &str) -> String {
  let mapped: String = s
    .chars()
    .flat_map(char::to_lowercase)
    .map(|c| if c.is_alphanumeric() { c } else { ' ' })
    .collect();
  mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `n` characters of `s` (not bytes).
pub fn prefix_chars(s: &str, n: usize) -> &str {
  match s.char_indices().nth(n) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Derive the dedup key for a (title, date) pair: hex SHA-256 over the
/// normalized title and the calendar-day bucket.
pub fn dedup_key(title: &str, event_date: NaiveDate) -> String {
  let mut hasher = Sha256::new();
  hasher.update(normalize(title).as_bytes());
  hasher.update(b"|");
  hasher.update(event_date.format("%Y-%m-%d").to_string().as_bytes());
  hex::encode(hasher.finalize())
}
