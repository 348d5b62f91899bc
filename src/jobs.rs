//! Fetch job generation
//!
//! Expands the boundary set plus the requested record count into concrete
//! fetch jobs. Boundary entries are deliberately re-validated, not skipped;
//! fresh scanning appends every number from the highest boundary entry up to
//! the requested count.

use crate::error::Result;
use crate::types::{Database, FetchJob, RecordId};
use url::Url;

/// Build the fetch jobs for one run
///
/// The job list is the union of the boundary set and the appended range
/// `highest+1..=record_count` (where `highest` is 0 for an empty boundary
/// set). When the boundary set already reaches past `record_count`, only the
/// boundary entries are emitted.
pub fn build_jobs(
    database: Database,
    boundary: &[u32],
    record_count: u32,
    endpoint: &Url,
) -> Result<Vec<FetchJob>> {
    let highest = boundary.iter().copied().max().unwrap_or(0);

    let mut numbers = boundary.to_vec();
    numbers.extend(highest.saturating_add(1)..=record_count);

    numbers
        .into_iter()
        .map(|number| {
            let id = RecordId::new(database, number);
            let url = record_url(endpoint, database, &id)?;
            Ok(FetchJob { number, id, url })
        })
        .collect()
}

/// dbfetch URL for one record
///
/// `{endpoint}/Tools/dbfetch/dbfetch?db={name};id={id};style=raw`
pub fn record_url(endpoint: &Url, database: Database, id: &RecordId) -> Result<Url> {
    let mut url = endpoint.join("/Tools/dbfetch/dbfetch")?;
    url.set_query(Some(&format!(
        "db={};id={id};style=raw",
        database.dbfetch_name()
    )));
    Ok(url)
}
