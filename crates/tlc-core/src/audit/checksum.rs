//! Checksum chain over audit entries.
//!
//! `checksum = sha256(canonical_json(id, event, tag, user, timestamp,
//! metadata, previousChecksum))`. serde_json's default map is ordered, so
//! object keys serialize sorted at every depth.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tlc_state::AuditEntry;

/// Timestamp text that feeds the checksum.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Canonical JSON of an entry's checksummed fields, linked to `previous`.
pub fn canonical_payload(entry: &AuditEntry, previous: Option<&str>) -> String {
    json!({
        "id": entry.id,
        "event": entry.event,
        "tag": entry.tag,
        "user": entry.user,
        "timestamp": canonical_timestamp(&entry.timestamp),
        "metadata": entry.metadata,
        "previousChecksum": previous,
    })
    .to_string()
}

/// Checksum of `entry`'s fields linked to `previous`.
pub fn compute_checksum(entry: &AuditEntry, previous: Option<&str>) -> String {
    let digest = Sha256::digest(canonical_payload(entry, previous).as_bytes());
    hex::encode(digest)
}

/// Checksum of `entry` as stored, using its own `previous_checksum`.
pub fn seal(entry: &mut AuditEntry) {
    entry.checksum = compute_checksum(entry, entry.previous_checksum.as_deref());
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperedEntry {
    pub index: usize,
    pub reason: String,
    pub entry: AuditEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub valid: bool,
    pub total_entries: usize,
    pub tampered_entries: Vec<TamperedEntry>,
}

/// Walk the whole chain in order. Entry `i` is tampered when it does not
/// link to entry `i-1`'s stored checksum, or when its stored checksum does
/// not match the one recomputed from its fields.
pub fn verify_chain(entries: &[AuditEntry]) -> IntegrityReport {
    let mut tampered_entries = Vec::new();
    let mut previous: Option<&str> = None;

    for (index, entry) in entries.iter().enumerate() {
        let reason = if entry.previous_checksum.as_deref() != previous {
            Some("broken link to previous entry")
        } else if compute_checksum(entry, previous) != entry.checksum {
            Some("checksum mismatch")
        } else {
            None
        };

        if let Some(reason) = reason {
            tampered_entries.push(TamperedEntry {
                index,
                reason: reason.to_string(),
                entry: entry.clone(),
            });
        }
        previous = Some(entry.checksum.as_str());
    }

    IntegrityReport {
        valid: tampered_entries.is_empty(),
        total_entries: entries.len(),
        tampered_entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SubsecRound, TimeZone};

    fn entry(id: &str, previous: Option<&str>) -> AuditEntry {
        let mut e = AuditEntry {
            id: id.to_string(),
            event: "created".to_string(),
            tag: "v1.0.0-rc.1".to_string(),
            user: "ci".to_string(),
            timestamp: Utc::now().trunc_subsecs(3),
            metadata: json!({ "commit": "abc123" }),
            previous_checksum: previous.map(str::to_string),
            checksum: String::new(),
        };
        seal(&mut e);
        e
    }

    fn chain(n: usize) -> Vec<AuditEntry> {
        let mut out: Vec<AuditEntry> = Vec::new();
        for i in 0..n {
            let previous = out.last().map(|e| e.checksum.clone());
            out.push(entry(&format!("e{i}"), previous.as_deref()));
        }
        out
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let e = entry("e0", None);
        assert_eq!(e.checksum.len(), 64);
        assert!(e.checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn metadata_key_order_does_not_matter() {
        let mut a = entry("e0", None);
        let mut b = a.clone();
        a.metadata = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        b.metadata = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        assert_eq!(compute_checksum(&a, None), compute_checksum(&b, None));
    }

    #[test]
    fn canonical_timestamp_is_utc_with_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(canonical_timestamp(&ts), "2024-03-01T12:00:00.250Z");
    }

    #[test]
    fn previous_checksum_changes_checksum() {
        let e = entry("e0", None);
        assert_ne!(compute_checksum(&e, None), compute_checksum(&e, Some("ab")));
    }

    #[test]
    fn untouched_chain_is_valid() {
        let report = verify_chain(&chain(5));
        assert!(report.valid);
        assert_eq!(report.total_entries, 5);
    }

    #[test]
    fn empty_chain_is_valid() {
        let report = verify_chain(&[]);
        assert!(report.valid);
        assert_eq!(report.total_entries, 0);
    }

    #[test]
    fn mutated_field_reports_that_index_only() {
        let mut entries = chain(5);
        entries[2].user = "mallory".to_string();
        let report = verify_chain(&entries);
        assert!(!report.valid);
        let indices: Vec<usize> = report.tampered_entries.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![2]);
    }

    #[test]
    fn rewritten_link_is_detected() {
        let mut entries = chain(3);
        entries[1].previous_checksum = Some("0".repeat(64));
        let report = verify_chain(&entries);
        assert_eq!(report.tampered_entries.len(), 1);
        assert_eq!(report.tampered_entries[0].index, 1);
        assert_eq!(report.tampered_entries[0].reason, "broken link to previous entry");
    }

    #[test]
    fn deleted_entry_breaks_successor() {
        let mut entries = chain(4);
        entries.remove(1);
        let report = verify_chain(&entries);
        assert_eq!(report.tampered_entries[0].index, 1);
    }
}
