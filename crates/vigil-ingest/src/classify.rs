//! Scalar classification: free-text labels and counts to typed values.
//!
//! Every parser returns `None` for anything it does not recognise; the caller
//! turns that into `Reported::Unknown`.

use std::str::FromStr;

use serde_json::Value;
use vigil_core::{
  event::{EventStatus, EventType, Severity},
  text::normalize,
};

/// `"Data Breach"`, `"data-breach"` and `"DATA_BREACH"` all become
/// `"data_breach"`.
fn key(s: &str) -> String { normalize(s).replace(' ', "_") }

pub(crate) fn event_type(s: &str) -> Option<EventType> {
  let key = key(s);
  if let Ok(t) = EventType::from_str(&key) {
    return Some(t);
  }
  let t = match key.as_str() {
    "breach" | "data_leak" | "leak" | "data_exposure" | "exposure" => EventType::DataBreach,
    "ransom" | "ransomware_attack" | "extortion" => EventType::Ransomware,
    "virus" | "trojan" | "worm" | "spyware" | "infostealer" => EventType::Malware,
    "phish" | "spear_phishing" | "bec" | "business_email_compromise" => EventType::Phishing,
    "ddos" | "dos" | "denial_of_service_attack" => EventType::DenialOfService,
    "vuln" | "cve" | "zero_day" | "0day" | "exploit" => EventType::Vulnerability,
    "supply_chain_attack" | "third_party" | "third_party_breach" => EventType::SupplyChain,
    "insider" => EventType::InsiderThreat,
    _ => return None,
  };
  Some(t)
}

/// Labels, or a CVSS-style numeric score.
pub(crate) fn severity(value: &Value) -> Option<Severity> {
  match value {
    Value::Number(n) => n.as_f64().and_then(severity_from_score),
    Value::String(s) => {
      if let Ok(score) = s.trim().parse::<f64>() {
        return severity_from_score(score);
      }
      let key = key(s);
      if let Ok(sev) = Severity::from_str(&key) {
        return Some(sev);
      }
      let sev = match key.as_str() {
        "info" | "informational" | "minor" => Severity::Low,
        "moderate" | "med" => Severity::Medium,
        "severe" | "major" | "important" => Severity::High,
        "crit" | "critical_severity" => Severity::Critical,
        _ => return None,
      };
      Some(sev)
    }
    _ => None,
  }
}

fn severity_from_score(score: f64) -> Option<Severity> {
  if !(0.0..=10.0).contains(&score) {
    return None;
  }
  Some(match score {
    s if s >= 9.0 => Severity::Critical,
    s if s >= 7.0 => Severity::High,
    s if s >= 4.0 => Severity::Medium,
    _ => Severity::Low,
  })
}

pub(crate) fn status(s: &str) -> Option<EventStatus> {
  let key = key(s);
  if let Ok(st) = EventStatus::from_str(&key) {
    return Some(st);
  }
  let st = match key.as_str() {
    "ongoing" | "open" | "investigating" | "new" => EventStatus::Active,
    "mitigated" | "isolated" => EventStatus::Contained,
    "closed" | "fixed" | "remediated" | "patched" => EventStatus::Resolved,
    _ => return None,
  };
  Some(st)
}

/// Largest count a store can hold; anything above it is treated as unknown.
const MAX_RECORDS: u64 = i64::MAX as u64;

/// Integers, or strings such as `"1,200,000"`, `"5.4 million"`, `"50k"` and
/// `"over 2 billion"`. Counts above [`MAX_RECORDS`] yield `None`.
pub(crate) fn records(value: &Value) -> Option<u64> {
  match value {
    Value::Number(n) => match n.as_u64() {
      Some(n) => (n <= MAX_RECORDS).then_some(n),
      None => n.as_f64().and_then(records_from_float),
    },
    Value::String(s) => records_from_text(s),
    _ => None,
  }
}

fn records_from_float(f: f64) -> Option<u64> {
  let f = f.round();
  // `i64::MAX as f64` rounds up to 2^63, so the bound is exclusive.
  (f.is_finite() && f >= 0.0 && f < MAX_RECORDS as f64).then(|| f as u64)
}

fn records_from_text(text: &str) -> Option<u64> {
  let cleaned = text.to_lowercase().replace(',', "");
  let mut tokens = cleaned.split_whitespace().peekable();

  while let Some(token) = tokens.next() {
    let split = token
      .find(|c: char| !(c.is_ascii_digit() || c == '.'))
      .unwrap_or(token.len());
    let (number, suffix) = token.split_at(split);
    let Ok(n) = number.parse::<f64>() else { continue };

    let suffix = match suffix.trim_end_matches('+') {
      "" => tokens.peek().copied().unwrap_or(""),
      s => s,
    };
    let scale = match suffix {
      "k" | "thousand" => 1e3,
      "m" | "mn" | "mil" | "million" | "millions" => 1e6,
      "b" | "bn" | "billion" | "billions" => 1e9,
      _ => 1.0,
    };
    return records_from_float(n * scale);
  }
  None
}
