//! Payload → [`CandidateEvent`] mapping.
//!
//! Pipeline:
//!   serde_json::Value
//!     └─ field lookup over alias lists → raw strings / values
//!          └─ date parsing and scalar classification
//!               └─ CandidateEvent with explicit `Unknown`s

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use vigil_core::{
  event::{CandidateEntity, CandidateEvent, Reported, SourceRecord},
  text::prefix_chars,
};

use crate::{
  SourceDescriptor, classify,
  error::{Error, Result},
};

/// Length of the body snippet kept on the source record.
const SNIPPET_CHARS: usize = 500;

const TITLE: &[&str] = &["title", "headline", "name", "raw_title"];
const DESCRIPTION: &[&str] = &["description", "summary", "content", "snippet", "body"];
const EVENT_DATE: &[&str] = &["event_date", "breach_date", "incident_date", "date"];
const PUBLISHED: &[&str] = &["published_date", "published", "pubDate"];
const URL: &[&str] = &["url", "link", "source_url"];
const ENTITY: &[&str] = &["entity", "organization", "company", "victim"];
const EVENT_TYPE: &[&str] = &["event_type", "type", "category"];
const SEVERITY: &[&str] = &["severity", "cvss"];
const RECORDS: &[&str] = &["records_affected", "records", "affected"];
const STATUS: &[&str] = &["status", "state"];

// ─── Field lookup ────────────────────────────────────────────────────────────

/// The first present, non-null field among `names`.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
  names
    .iter()
    .filter_map(|n| obj.get(*n))
    .find(|v| !v.is_null())
}

/// The first field among `names` holding a non-blank string, trimmed.
fn text<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
  names
    .iter()
    .filter_map(|n| obj.get(*n).and_then(Value::as_str))
    .map(str::trim)
    .find(|s| !s.is_empty())
}

fn number(obj: &Map<String, Value>, name: &str) -> Option<f64> {
  obj
    .get(name)
    .and_then(Value::as_f64)
    .filter(|f| f.is_finite())
    .map(|f| f.clamp(0.0, 1.0))
}

// ─── Dates ───────────────────────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse an instant. Plain dates are taken as midnight UTC.
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Some(dt) = DATETIME_FORMATS
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
  {
    return Some(dt.and_utc());
  }
  DATE_FORMATS
    .iter()
    .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| dt.and_utc())
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
  parse_datetime(s).map(|dt| dt.date_naive())
}

// ─── Entities ────────────────────────────────────────────────────────────────

fn entity(value: &Value, default_confidence: f64) -> Option<CandidateEntity> {
  match value {
    Value::String(name) if !name.trim().is_empty() => {
      Some(CandidateEntity::named(name.trim(), default_confidence))
    }
    Value::Object(obj) => {
      let name = text(obj, &["name", "entity", "canonical_name"])?;
      Some(CandidateEntity {
        name:        name.to_owned(),
        confidence:  number(obj, "confidence").unwrap_or(default_confidence),
        entity_type: text(obj, &["type", "entity_type"]).map(str::to_owned),
        industry:    text(obj, &["industry", "sector"]).map(str::to_owned),
      })
    }
    _ => None,
  }
}

fn entities(obj: &Map<String, Value>, default_confidence: f64) -> Vec<CandidateEntity> {
  if let Some(Value::Array(items)) = obj.get("entities") {
    return items
      .iter()
      .filter_map(|v| entity(v, default_confidence))
      .collect();
  }
  field(obj, ENTITY)
    .and_then(|v| entity(v, default_confidence))
    .into_iter()
    .collect()
}

// ─── Normalize ───────────────────────────────────────────────────────────────

pub(crate) fn normalize(value: &Value, source: &SourceDescriptor) -> Result<CandidateEvent> {
  let obj = value.as_object().ok_or(Error::NotAnObject)?;

  let title = text(obj, TITLE).ok_or(Error::MissingTitle)?;
  let url = text(obj, URL).ok_or(Error::MissingUrl)?;

  let published_date = text(obj, PUBLISHED).and_then(parse_datetime);
  let event_date = text(obj, EVENT_DATE)
    .and_then(parse_date)
    .or_else(|| published_date.map(|dt| dt.date_naive()))
    .ok_or(Error::UnresolvableDate)?;

  let retrieved_date = text(obj, &["retrieved_date", "retrieved"])
    .and_then(parse_datetime)
    .unwrap_or_else(Utc::now);

  let description = text(obj, DESCRIPTION);
  let confidence = number(obj, "confidence").unwrap_or(source.credibility.clamp(0.0, 1.0));

  let record = SourceRecord {
    source_type: text(obj, &["source_type"]).unwrap_or(source.source_type.as_str()).to_owned(),
    url: url.to_owned(),
    published_date,
    retrieved_date,
    raw_title: title.to_owned(),
    raw_content: description
      .map(|d| prefix_chars(d, SNIPPET_CHARS).to_owned())
      .unwrap_or_default(),
    credibility_score: source.credibility,
    relevance_score: number(obj, "relevance").unwrap_or(source.relevance),
  };

  let mut candidate = CandidateEvent::new(title, event_date, confidence, record);
  candidate.description = description.map(str::to_owned).into();
  candidate.entities = entities(obj, confidence);
  candidate.event_type = text(obj, EVENT_TYPE).and_then(classify::event_type).into();
  candidate.severity = field(obj, SEVERITY).and_then(classify::severity).into();
  candidate.records_affected = field(obj, RECORDS).and_then(classify::records).into();
  candidate.status = text(obj, STATUS).and_then(classify::status).into();

  Ok(candidate)
}
