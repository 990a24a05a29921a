//! [`SqliteStore`]: the SQLite implementation of [`EventStore`].

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use uuid::Uuid;
use vigil_core::{
  entity::EntityMapping,
  event::{EventSource, EventView},
  history::AttributeHistoryEntry,
  merge::{EntityLinkPlan, EventCreation, EventUpdate},
  store::{EventQuery, EventStore},
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, RawEvent, RawHistoryEntry, RawLinkedEntity, RawMapping, RawSource,
    RawView, SOURCE_COLUMNS, encode_date, encode_dt, encode_enum, encode_records,
    encode_uuid,
  },
  schema::SCHEMA,
};

/// Default page size for [`EventStore::query_events`].
const DEFAULT_LIMIT: usize = 100;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vigil event store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Run a raw statement, bypassing the gateway.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<usize> {
    Ok(self.conn.call(move |conn| Ok(conn.execute(sql, [])?)).await?)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Load events matching `where_clause` (over alias `e`) with their links and
  /// sources.
  async fn load_views(
    &self,
    where_clause: String,
    params: Vec<SqlValue>,
  ) -> Result<Vec<EventView>> {
    let raws: Vec<RawView> = self
      .conn
      .call(move |conn| Ok(select_views(conn, &where_clause, &params)?))
      .await?;
    raws.into_iter().map(RawView::into_view).collect()
  }

  async fn load_view(&self, event_id: Uuid) -> Result<Option<EventView>> {
    let mut views = self
      .load_views(
        "WHERE e.event_id = ?".into(),
        vec![SqlValue::Text(encode_uuid(event_id))],
      )
      .await?;
    Ok(views.pop())
  }
}

// ─── Synchronous helpers (run on the connection thread) ──────────────────────

fn select_views(
  conn: &rusqlite::Connection,
  where_clause: &str,
  params: &[SqlValue],
) -> rusqlite::Result<Vec<RawView>> {
  let sql = format!(
    "SELECT {EVENT_COLUMNS} FROM canonical_events e {where_clause}
     ORDER BY e.event_date, e.event_id"
  );
  let mut stmt = conn.prepare(&sql)?;
  let events = stmt
    .query_map(rusqlite::params_from_iter(params.iter()), RawEvent::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  events
    .into_iter()
    .map(|event| {
      let entities = select_links(conn, &event.event_id)?;
      let sources = select_sources(conn, &event.event_id)?;
      Ok(RawView { event, entities, sources })
    })
    .collect()
}

fn select_links(conn: &rusqlite::Connection, event_id: &str) -> rusqlite::Result<Vec<RawLinkedEntity>> {
  let mut stmt = conn.prepare_cached(
    "SELECT n.entity_id, n.canonical_name, n.entity_type, n.industry,
            l.is_primary, l.confidence
     FROM event_entities l
     JOIN entities n ON n.entity_id = l.entity_id
     WHERE l.event_id = ?1
     ORDER BY l.is_primary DESC, n.canonical_name",
  )?;
  stmt
    .query_map(rusqlite::params![event_id], |row| {
      Ok(RawLinkedEntity {
        entity_id:      row.get(0)?,
        canonical_name: row.get(1)?,
        entity_type:    row.get(2)?,
        industry:       row.get(3)?,
        is_primary:     row.get(4)?,
        confidence:     row.get(5)?,
      })
    })?
    .collect()
}

fn select_sources(conn: &rusqlite::Connection, event_id: &str) -> rusqlite::Result<Vec<RawSource>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {SOURCE_COLUMNS} FROM event_sources
     WHERE event_id = ?1
     ORDER BY retrieved_date, rowid"
  ))?;
  stmt
    .query_map(rusqlite::params![event_id], RawSource::from_row)?
    .collect()
}

/// Owned, pre-encoded form of an [`EventSource`] for moving onto the
/// connection thread.
struct SourceRow([SqlValue; 10]);

impl SourceRow {
  fn new(s: &EventSource) -> Self {
    Self([
      SqlValue::Text(encode_uuid(s.source_id)),
      SqlValue::Text(encode_uuid(s.event_id)),
      SqlValue::Text(s.source_type.clone()),
      SqlValue::Text(s.url.clone()),
      s.published_date
        .map(|d| SqlValue::Text(encode_dt(d)))
        .unwrap_or(SqlValue::Null),
      SqlValue::Text(encode_dt(s.retrieved_date)),
      SqlValue::Text(s.raw_title.clone()),
      SqlValue::Text(s.raw_content.clone()),
      SqlValue::Real(s.credibility_score),
      SqlValue::Real(s.relevance_score),
    ])
  }

  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      &format!("INSERT INTO event_sources ({SOURCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
      rusqlite::params_from_iter(self.0.iter()),
    )?;
    Ok(())
  }
}

struct HistoryRow([SqlValue; 7]);

impl HistoryRow {
  fn new(e: &AttributeHistoryEntry) -> Self {
    let opt = |v: &Option<String>| v.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null);
    Self([
      SqlValue::Text(encode_uuid(e.entry_id)),
      SqlValue::Text(encode_uuid(e.event_id)),
      e.event_source_id
        .map(|id| SqlValue::Text(encode_uuid(id)))
        .unwrap_or(SqlValue::Null),
      SqlValue::Text(encode_enum(e.attribute_name)),
      opt(&e.old_value),
      opt(&e.new_value),
      SqlValue::Text(encode_dt(e.changed_at)),
    ])
  }

  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO attribute_history (
         entry_id, event_id, event_source_id, attribute_name,
         old_value, new_value, changed_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params_from_iter(self.0.iter()),
    )?;
    Ok(())
  }
}

/// Upsert the entity and link it to `event_id`. Existing links are kept.
fn link_entity(
  conn: &rusqlite::Connection,
  event_id: &str,
  link: &EntityLinkPlan,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO entities (entity_id, canonical_name, entity_type, industry)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (canonical_name) DO UPDATE SET
       entity_type = COALESCE(entities.entity_type, excluded.entity_type),
       industry    = COALESCE(entities.industry, excluded.industry)",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      link.canonical_name,
      link.entity_type,
      link.industry,
    ],
  )?;
  conn.execute(
    "INSERT OR IGNORE INTO event_entities (event_id, entity_id, is_primary, confidence)
     SELECT ?1, entity_id, ?2, ?3 FROM entities WHERE canonical_name = ?4",
    rusqlite::params![event_id, link.is_primary, link.confidence, link.canonical_name],
  )?;
  Ok(())
}

fn set_primary(conn: &rusqlite::Connection, event_id: &str, name: &str) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE event_entities SET is_primary = 0 WHERE event_id = ?1 AND is_primary = 1",
    rusqlite::params![event_id],
  )?;
  conn.execute(
    "UPDATE event_entities SET is_primary = 1
     WHERE event_id = ?1
       AND entity_id = (SELECT entity_id FROM entities WHERE canonical_name = ?2)",
    rusqlite::params![event_id, name],
  )?;
  Ok(())
}

/// Outcome of the guarded update transaction.
enum Applied {
  Done(Box<RawView>),
  Missing,
  Stale,
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

impl EventStore for SqliteStore {
  type Error = Error;

  // ── Entity mappings ───────────────────────────────────────────────────────

  async fn entity_mappings(&self) -> Result<Vec<EntityMapping>> {
    let raws: Vec<RawMapping> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT source_entity, canonical_entity, relationship_type
           FROM entity_mappings ORDER BY source_entity",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawMapping {
              source_entity:     row.get(0)?,
              canonical_entity:  row.get(1)?,
              relationship_type: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMapping::into_mapping).collect()
  }

  async fn put_entity_mapping(&self, mapping: EntityMapping) -> Result<()> {
    let relationship = encode_enum(mapping.relationship_type);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO entity_mappings (source_entity, canonical_entity, relationship_type)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (source_entity) DO UPDATE SET
             canonical_entity  = excluded.canonical_entity,
             relationship_type = excluded.relationship_type",
          rusqlite::params![mapping.source_entity, mapping.canonical_entity, relationship],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn find_source_by_url(&self, url: &str) -> Result<Option<EventSource>> {
    let url = url.to_owned();
    let raw: Option<RawSource> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SOURCE_COLUMNS} FROM event_sources WHERE url = ?1"),
            rusqlite::params![url],
            RawSource::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSource::into_source).transpose()
  }

  async fn find_active_by_dedup_key(&self, dedup_key: &str) -> Result<Option<EventView>> {
    let mut views = self
      .load_views(
        "WHERE e.dedup_key = ? AND e.status = 'active'".into(),
        vec![SqlValue::Text(dedup_key.to_owned())],
      )
      .await?;
    Ok(views.pop())
  }

  async fn active_events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EventView>> {
    self
      .load_views(
        "WHERE e.status = 'active' AND e.event_date BETWEEN ? AND ?".into(),
        vec![SqlValue::Text(encode_date(from)), SqlValue::Text(encode_date(to))],
      )
      .await
  }

  async fn get_event(&self, event_id: Uuid) -> Result<Option<EventView>> {
    self.load_view(event_id).await
  }

  async fn query_events(&self, query: &EventQuery) -> Result<Vec<EventView>> {
    let mut conds: Vec<&'static str> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(from) = query.from {
      conds.push("e.event_date >= ?");
      params.push(SqlValue::Text(encode_date(from)));
    }
    if let Some(to) = query.to {
      conds.push("e.event_date <= ?");
      params.push(SqlValue::Text(encode_date(to)));
    }
    if let Some(status) = query.status {
      conds.push("e.status = ?");
      params.push(SqlValue::Text(encode_enum(status)));
    }
    if let Some(severity) = query.severity {
      conds.push("e.severity = ?");
      params.push(SqlValue::Text(encode_enum(severity)));
    }
    if let Some(event_type) = query.event_type {
      conds.push("e.event_type = ?");
      params.push(SqlValue::Text(encode_enum(event_type)));
    }
    if let Some(entity) = &query.entity {
      conds.push(
        "EXISTS (SELECT 1 FROM event_entities l
                 JOIN entities n ON n.entity_id = l.entity_id
                 WHERE l.event_id = e.event_id
                   AND lower(n.canonical_name) = lower(?))",
      );
      params.push(SqlValue::Text(entity.clone()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);

    // Page over event ids first so links and sources are loaded per page.
    let paged = format!(
      "WHERE e.event_id IN (
         SELECT e.event_id FROM canonical_events e {where_clause}
         ORDER BY e.event_date, e.event_id
         LIMIT {limit} OFFSET {offset})"
    );
    self.load_views(paged, params).await
  }

  async fn history(&self, event_id: Uuid) -> Result<Vec<AttributeHistoryEntry>> {
    let id_str = encode_uuid(event_id);
    let raws: Vec<RawHistoryEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry_id, event_id, event_source_id, attribute_name,
                  old_value, new_value, changed_at
           FROM attribute_history
           WHERE event_id = ?1
           ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawHistoryEntry {
              entry_id:        row.get(0)?,
              event_id:        row.get(1)?,
              event_source_id: row.get(2)?,
              attribute_name:  row.get(3)?,
              old_value:       row.get(4)?,
              new_value:       row.get(5)?,
              changed_at:      row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistoryEntry::into_entry).collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create_event(&self, creation: EventCreation) -> Result<EventView> {
    let event = creation.event;
    let event_id = encode_uuid(event.event_id);
    let records = event.records_affected.map(encode_records).transpose()?;
    let event_row = [
      SqlValue::Text(event_id.clone()),
      SqlValue::Text(event.dedup_key),
      SqlValue::Text(event.title),
      SqlValue::Text(event.description),
      SqlValue::Text(encode_date(event.event_date)),
      event.event_type.map(|t| SqlValue::Text(encode_enum(t))).unwrap_or(SqlValue::Null),
      event.severity.map(|s| SqlValue::Text(encode_enum(s))).unwrap_or(SqlValue::Null),
      records.map_or(SqlValue::Null, SqlValue::Integer),
      SqlValue::Text(encode_enum(event.status)),
      SqlValue::Real(event.confidence),
      SqlValue::Text(encode_dt(event.created_at)),
      SqlValue::Text(encode_dt(event.updated_at)),
    ];
    let source = SourceRow::new(&creation.source);
    let links = creation.links;
    let history: Vec<HistoryRow> = creation.history.iter().map(HistoryRow::new).collect();

    let mut raw: Vec<RawView> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO canonical_events (
             event_id, dedup_key, title, description, event_date, event_type,
             severity, records_affected, status, confidence, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params_from_iter(event_row.iter()),
        )?;
        source.insert(&tx)?;
        for link in &links {
          link_entity(&tx, &event_id, link)?;
        }
        for entry in &history {
          entry.insert(&tx)?;
        }
        let view = select_views(&tx, "WHERE e.event_id = ?", &[SqlValue::Text(event_id)])?;
        tx.commit()?;
        Ok(view)
      })
      .await?;

    raw
      .pop()
      .ok_or(Error::EventNotFound(event.event_id))?
      .into_view()
  }

  async fn apply_update(&self, update: EventUpdate) -> Result<EventView> {
    let event = update.event;
    let event_uuid = event.event_id;
    let event_id = encode_uuid(event_uuid);
    let expected = encode_dt(update.expected_updated_at);
    let records = event.records_affected.map(encode_records).transpose()?;
    let event_row = [
      SqlValue::Text(event.dedup_key),
      SqlValue::Text(event.title),
      SqlValue::Text(event.description),
      SqlValue::Text(encode_date(event.event_date)),
      event.event_type.map(|t| SqlValue::Text(encode_enum(t))).unwrap_or(SqlValue::Null),
      event.severity.map(|s| SqlValue::Text(encode_enum(s))).unwrap_or(SqlValue::Null),
      records.map_or(SqlValue::Null, SqlValue::Integer),
      SqlValue::Text(encode_enum(event.status)),
      SqlValue::Real(event.confidence),
      SqlValue::Text(encode_dt(event.updated_at)),
      SqlValue::Text(event_id.clone()),
    ];
    let source = update.source.as_ref().map(SourceRow::new);
    let new_links = update.new_links;
    let primary = update.primary_entity;
    let history: Vec<HistoryRow> = update.history.iter().map(HistoryRow::new).collect();

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<String> = tx
          .query_row(
            "SELECT updated_at FROM canonical_events WHERE event_id = ?1",
            rusqlite::params![event_id],
            |row| row.get(0),
          )
          .optional()?;
        match current {
          None => return Ok(Applied::Missing),
          Some(at) if at != expected => return Ok(Applied::Stale),
          Some(_) => {}
        }

        tx.execute(
          "UPDATE canonical_events SET
             dedup_key = ?1, title = ?2, description = ?3, event_date = ?4,
             event_type = ?5, severity = ?6, records_affected = ?7, status = ?8,
             confidence = ?9, updated_at = ?10
           WHERE event_id = ?11",
          rusqlite::params_from_iter(event_row.iter()),
        )?;
        if let Some(source) = &source {
          source.insert(&tx)?;
        }
        for link in &new_links {
          link_entity(&tx, &event_id, link)?;
        }
        if let Some(name) = &primary {
          set_primary(&tx, &event_id, name)?;
        }
        for entry in &history {
          entry.insert(&tx)?;
        }
        let mut view = select_views(&tx, "WHERE e.event_id = ?", &[SqlValue::Text(event_id)])?;
        tx.commit()?;
        Ok(view.pop().map(Box::new).map_or(Applied::Missing, Applied::Done))
      })
      .await?;

    match applied {
      Applied::Done(raw) => raw.into_view(),
      Applied::Missing => Err(Error::EventNotFound(event_uuid)),
      Applied::Stale => Err(Error::Stale(event_uuid)),
    }
  }
}
