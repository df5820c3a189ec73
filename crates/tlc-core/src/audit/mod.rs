//! Audit ledger: hash-chained event log, integrity checks and exports.

pub mod checksum;
pub mod export;
pub mod ledger;
pub mod query;

pub use checksum::{compute_checksum, verify_chain, IntegrityReport, TamperedEntry};
pub use export::{cef_severity, ExportFormat, ExportOptions};
pub use ledger::{AuditEvent, AuditLedger, TagSummary, MAX_CHAIN_CONFLICT_RETRIES};
pub use query::AuditQuery;
