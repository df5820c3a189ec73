//! Ledger export formats: JSON, CSV, CEF and Splunk HEC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tlc_state::AuditEntry;

use super::query::AuditQuery;
use crate::domain::{PipelineError, Result};

const CEF_VENDOR: &str = "TLC";
const CEF_PRODUCT: &str = "Release Pipeline";
const SPLUNK_SOURCE: &str = "tlc";
const SPLUNK_SOURCETYPE: &str = "tlc:audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Cef,
    Splunk,
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "cef" => Ok(Self::Cef),
            "splunk" => Ok(Self::Splunk),
            other => Err(PipelineError::Format(format!(
                "unknown export format '{other}' (expected json, csv, cef or splunk)"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Cef => "cef",
            Self::Splunk => "splunk",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub filter: AuditQuery,
    /// Splunk `host` field.
    pub host: Option<String>,
    /// Splunk `index` field.
    pub index: Option<String>,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            filter: AuditQuery::default(),
            host: None,
            index: None,
        }
    }
}

/// Render already-filtered entries in the requested format.
pub fn render(
    entries: &[AuditEntry],
    options: &ExportOptions,
    exported_at: DateTime<Utc>,
) -> Result<String> {
    match options.format {
        ExportFormat::Json => to_json(entries, exported_at),
        ExportFormat::Csv => Ok(to_csv(entries)),
        ExportFormat::Cef => Ok(to_cef(entries)),
        ExportFormat::Splunk => to_splunk(entries, options.host.as_deref(), options.index.as_deref()),
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

pub fn to_json(entries: &[AuditEntry], exported_at: DateTime<Utc>) -> Result<String> {
    let doc = json!({
        "exportedAt": rfc3339(&exported_at),
        "count": entries.len(),
        "entries": entries,
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}

// ---------------------------------------------------------------------------
// CSV (RFC 4180)
// ---------------------------------------------------------------------------

pub const CSV_HEADER: &str = "id,event,branch,user,timestamp";

pub fn to_csv(entries: &[AuditEntry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push_str("\r\n");
    for entry in entries {
        let row = [
            csv_field(&entry.id),
            csv_field(&entry.event),
            csv_field(&entry.tag),
            csv_field(&entry.user),
            csv_field(&rfc3339(&entry.timestamp)),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// CEF
// ---------------------------------------------------------------------------

/// CEF severity for an audit event name.
pub fn cef_severity(event: &str) -> u8 {
    match event {
        "gates-failed" | "integrity-violation" | "security-violation" => 8,
        "rejected" | "access-denied" | "rollback" => 5,
        _ => 3,
    }
}

pub fn to_cef(entries: &[AuditEntry]) -> String {
    entries
        .iter()
        .map(cef_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn cef_line(entry: &AuditEntry) -> String {
    let name = format!("Release {}", entry.event.replace('-', " "));
    let extension = [
        ("rt", entry.timestamp.timestamp_millis().to_string()),
        ("suser", entry.user.clone()),
        ("act", entry.event.clone()),
        ("cs1Label", "tag".to_string()),
        ("cs1", entry.tag.clone()),
        ("externalId", entry.id.clone()),
        ("cs2Label", "checksum".to_string()),
        ("cs2", entry.checksum.clone()),
    ]
    .iter()
    .map(|(key, value)| format!("{key}={}", cef_extension_escape(value)))
    .collect::<Vec<_>>()
    .join(" ");

    format!(
        "CEF:0|{}|{}|{}|{}|{}|{}|{}",
        cef_header_escape(CEF_VENDOR),
        cef_header_escape(CEF_PRODUCT),
        cef_header_escape(env!("CARGO_PKG_VERSION")),
        cef_header_escape(&entry.event),
        cef_header_escape(&name),
        cef_severity(&entry.event),
        extension
    )
}

fn cef_header_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('|', "\\|")
}

fn cef_extension_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('=', "\\=")
        .replace('|', "\\|")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// Splunk HEC
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HecEvent<'a> {
    time: f64,
    source: &'static str,
    sourcetype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    event: &'a AuditEntry,
}

/// Newline-delimited HEC events, one per entry.
pub fn to_splunk(entries: &[AuditEntry], host: Option<&str>, index: Option<&str>) -> Result<String> {
    let mut lines = Vec::with_capacity(entries.len());
    for entry in entries {
        let event = HecEvent {
            time: entry.timestamp.timestamp_millis() as f64 / 1000.0,
            source: SPLUNK_SOURCE,
            sourcetype: SPLUNK_SOURCETYPE,
            host,
            index,
            event: entry,
        };
        lines.push(serde_json::to_string(&event)?);
    }
    Ok(lines.join("\n"))
}
