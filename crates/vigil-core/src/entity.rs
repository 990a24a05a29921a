//! Entities, the administered alias mapping table, and event links.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// An organisation involved in incidents, under its canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:      Uuid,
  /// Unique across the store.
  pub canonical_name: String,
  pub entity_type:    Option<String>,
  pub industry:       Option<String>,
}

/// Why an alias resolves to a canonical name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationshipType {
  Alias,
  Subsidiary,
  Parent,
  Acquisition,
  Rebrand,
}

/// One row of the externally administered mapping table: `source_entity`
/// resolves to `canonical_entity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
  pub source_entity:     String,
  pub canonical_entity:  String,
  pub relationship_type: RelationshipType,
}

/// An entity as linked to a particular canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
  pub entity:     Entity,
  /// At most one link per event is primary.
  pub is_primary: bool,
  /// Extraction confidence of the source that introduced the link.
  pub confidence: f64,
}
