//! Ingest normalizer for Vigil.
//!
//! Converts loosely-typed collector payloads (JSON objects) into the strict
//! [`CandidateEvent`] shape the engine consumes. Pure synchronous; no I/O.
//!
//! # Quick start
//!
//! ```no_run
//! use vigil_ingest::{SourceDescriptor, normalize_str};
//!
//! let source = SourceDescriptor::named("news");
//! let payload = r#"{"headline": "Qantas data breach", "date": "2025-06-30",
//!                   "link": "https://example.com/qantas"}"#;
//! let candidate = normalize_str(payload, &source).unwrap();
//! println!("{} on {}", candidate.title, candidate.event_date);
//! ```

mod classify;
pub mod error;
mod normalize;

pub use error::{Error, Result};
use serde::{Deserialize, Serialize};
use vigil_core::event::CandidateEvent;

// ─── Public types ────────────────────────────────────────────────────────────

/// Describes the collector a payload came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDescriptor {
  /// Collector category, e.g. `"news"`, `"search"`, `"advisory"`.
  pub source_type: String,
  /// Used as the candidate's confidence when the payload states none.
  pub credibility: f64,
  pub relevance:   f64,
}

impl SourceDescriptor {
  pub fn named(source_type: impl Into<String>) -> Self {
    Self { source_type: source_type.into(), ..Self::default() }
  }
}

impl Default for SourceDescriptor {
  fn default() -> Self {
    Self {
      source_type: "unknown".into(),
      credibility: 0.5,
      relevance:   0.5,
    }
  }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Normalize one payload.
pub fn normalize(value: &serde_json::Value, source: &SourceDescriptor) -> Result<CandidateEvent> {
  normalize::normalize(value, source)
}

/// Parse and normalize one JSON document.
pub fn normalize_str(input: &str, source: &SourceDescriptor) -> Result<CandidateEvent> {
  let value: serde_json::Value = serde_json::from_str(input)?;
  normalize::normalize(&value, source)
}

/// Normalize a JSON-lines document.
///
/// Each non-blank line is normalized independently and paired with its
/// 1-based line number; a bad line yields `Err(…)` without aborting the rest.
pub fn normalize_lines(
  input: &str,
  source: &SourceDescriptor,
) -> Vec<(usize, Result<CandidateEvent>)> {
  input
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(i, line)| (i + 1, normalize_str(line, source)))
    .collect()
}
