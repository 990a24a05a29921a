//! Entity canonicalization against the administered alias table.
//!
//! [`EntityCanonicalizer`] is built from a snapshot of the mapping table and
//! never writes back to it. Resolution follows alias chains (`a → b → c`) and
//! always yields the same display spelling for a given normalized name, which
//! makes it idempotent: `resolve(resolve(x)) == resolve(x)`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
  entity::EntityMapping,
  event::CandidateEvent,
  text::normalize,
};

/// Upper bound on alias hops; longer chains are treated as misconfiguration.
const MAX_CHAIN: usize = 16;

// ─── Canonicalizer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EntityCanonicalizer {
  /// normalized alias → canonical name as administered.
  aliases:    HashMap<String, String>,
  /// normalized canonical name → display spelling (first one wins).
  canonicals: HashMap<String, String>,
}

impl EntityCanonicalizer {
  pub fn new(mappings: impl IntoIterator<Item = EntityMapping>) -> Self {
    let mut aliases = HashMap::new();
    let mut canonicals = HashMap::new();
    for m in mappings {
      let canonical = m.canonical_entity.trim().to_owned();
      if canonical.is_empty() {
        continue;
      }
      canonicals
        .entry(normalize(&canonical))
        .or_insert_with(|| canonical.clone());
      aliases
        .entry(normalize(&m.source_entity))
        .or_insert(canonical);
    }
    Self { aliases, canonicals }
  }

  /// Resolve a raw entity name to its canonical name.
  ///
  /// Unmapped names resolve to their normalized form.
  pub fn resolve(&self, raw: &str) -> String {
    let mut key = normalize(raw);
    let mut seen = HashSet::new();

    while seen.len() < MAX_CHAIN {
      let Some(target) = self.aliases.get(&key) else { break };
      if !seen.insert(key.clone()) {
        break;
      }
      key = normalize(target);
    }

    self.canonicals.get(&key).cloned().unwrap_or(key)
  }

  /// Whether `raw` is covered by the mapping table, either as an alias or as
  /// a canonical name.
  pub fn is_mapped(&self, raw: &str) -> bool {
    let key = normalize(raw);
    self.aliases.contains_key(&key) || self.canonicals.contains_key(&key)
  }

  /// Resolve every entity on `candidate`, collapsing duplicates that share a
  /// canonical name. Source order is kept; a collapsed entry keeps the highest
  /// extraction confidence seen.
  pub fn resolve_candidate(&self, candidate: CandidateEvent) -> ResolvedCandidate {
    let mut entities: Vec<ResolvedEntity> = Vec::new();

    for e in &candidate.entities {
      if normalize(&e.name).is_empty() {
        continue;
      }
      let canonical_name = self.resolve(&e.name);
      match entities.iter_mut().find(|r| r.canonical_name == canonical_name) {
        Some(existing) => {
          existing.confidence = existing.confidence.max(e.confidence);
          if existing.entity_type.is_none() {
            existing.entity_type = e.entity_type.clone();
          }
          if existing.industry.is_none() {
            existing.industry = e.industry.clone();
          }
        }
        None => entities.push(ResolvedEntity {
          canonical_name,
          raw_name: e.name.clone(),
          confidence: e.confidence.clamp(0.0, 1.0),
          entity_type: e.entity_type.clone(),
          industry: e.industry.clone(),
        }),
      }
    }

    ResolvedCandidate { candidate, entities }
  }
}

// ─── Resolved candidate ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
  pub canonical_name: String,
  /// The spelling the source used.
  pub raw_name:       String,
  pub confidence:     f64,
  pub entity_type:    Option<String>,
  pub industry:       Option<String>,
}

/// A candidate whose entity names have been canonicalized. This is the shape
/// the matcher and merge planner consume.
#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
  pub candidate: CandidateEvent,
  pub entities:  Vec<ResolvedEntity>,
}

impl ResolvedCandidate {
  pub fn primary_entity(&self) -> Option<&ResolvedEntity> { self.entities.first() }
}
