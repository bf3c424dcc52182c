//! Dedup key derivation.

use crate::FaultRecord;

/// Compute the dedup key of a record: `kind|message|sourceFile|line`.
///
/// Absent location parts contribute an empty segment, so two records that
/// differ only in column or stack share a fingerprint.
pub fn fingerprint(record: &FaultRecord) -> String {
    let line = record.line.map(|l| l.to_string()).unwrap_or_default();
    [
        record.kind.as_str(),
        record.message.as_str(),
        record.source_file.as_deref().unwrap_or(""),
        line.as_str(),
    ]
    .join("|")
}
