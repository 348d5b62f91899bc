//! Resume planning against the index snapshot
//!
//! A run should not rescan identifiers whose release dates are already known.
//! The planner finds the latest stored release date strictly before the
//! cutoff and returns the numbers of every identifier holding that date (the
//! boundary set). Those records are re-fetched — a record's effective date
//! can change between runs — and the highest of them anchors where fresh
//! scanning begins.

use crate::index::IndexSnapshot;
use crate::types::{Database, RecordId};
use chrono::NaiveDate;

/// Compute the boundary set for this run
///
/// Returns the record numbers (sorted ascending) of all index entries whose
/// stored date equals the maximum release date strictly before the cutoff.
/// Entries whose numeric tail does not parse under the database prefix are
/// skipped. An empty snapshot, or one where every date is on or after the
/// cutoff, yields an empty set — scanning then starts at record 1.
pub fn resume_points(
    snapshot: &IndexSnapshot,
    cutoff: NaiveDate,
    database: Database,
) -> Vec<u32> {
    let boundary_date = snapshot
        .release_dates()
        .map(|(_, date)| date)
        .filter(|date| date.date() < cutoff)
        .max();

    let Some(boundary_date) = boundary_date else {
        return Vec::new();
    };

    let mut numbers: Vec<u32> = snapshot
        .release_dates()
        .filter(|(_, date)| *date == boundary_date)
        .filter_map(|(id, _)| RecordId::from_raw(id).number(database))
        .collect();
    numbers.sort_unstable();
    numbers
}
