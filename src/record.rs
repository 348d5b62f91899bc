//! Response body classification and persistence
//!
//! A fetched body is one of three things: a flat-file record (line-typed,
//! `ID`/`DT` fields), a sequence-header record (FASTA-style, leading `>`),
//! or the literal not-found sentinel. One parser produces a discriminated
//! [`ParsedRecord`]; the [`Persister`] consumes it uniformly, deciding
//! whether to write an artifact and/or update the index store.

use crate::error::{RecordError, Result};
use crate::index::{IndexSnapshot, IndexStore};
use crate::types::{Outcome, RecordId, ReleaseDate};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Literal body line returned by dbfetch when no record exists under an identifier
pub const NOT_FOUND_SENTINEL: &str = "ERROR 12 No entries found.";

/// Artifact extension for flat-file records
pub const FLAT_FILE_EXTENSION: &str = "embl";

/// Artifact extension for sequence-header records
pub const SEQUENCE_EXTENSION: &str = "fasta";

/// Classification of one fetched response body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedRecord {
    /// Line-typed flat-file record with extracted identifier and release date
    FlatFile {
        /// Identifier from the ID line
        id: RecordId,
        /// Release date from the DT line
        released: ReleaseDate,
    },
    /// FASTA-style record with extracted identifier
    SequenceHeader {
        /// Identifier from the header line
        id: RecordId,
    },
    /// The not-found sentinel
    NotFound,
}

/// Classify a response body
///
/// Scans the body as a line sequence:
/// - an `ERROR` line equal to the sentinel yields [`ParsedRecord::NotFound`];
///   any other `ERROR` line is malformed
/// - a line starting `>` makes this a sequence-header record; the identifier
///   is the text between the first colon and the first space of that line
/// - otherwise the body is a flat-file record; the identifier comes from the
///   ID line (first `;`-delimited token) and the release date from the DT
///   line (first whitespace-delimited token, day/month/year). When a field
///   repeats, the last occurrence wins — flat files list the creation date
///   before the last-updated date.
pub fn classify(body: &str) -> Result<ParsedRecord> {
    let mut id_line: Option<&str> = None;
    let mut date_line: Option<&str> = None;

    for line in body.lines() {
        if line.starts_with("ERROR") {
            if line.trim_end() == NOT_FOUND_SENTINEL {
                return Ok(ParsedRecord::NotFound);
            }
            return Err(RecordError::UnexpectedError {
                line: line.to_string(),
            }
            .into());
        }
        if line.starts_with('>') {
            return parse_header(line);
        }
        if line.starts_with("ID") {
            id_line = Some(line);
        }
        if line.starts_with("DT") {
            date_line = Some(line);
        }
    }

    parse_flat_file(id_line, date_line)
}

/// Extract the identifier from a `>` header line
fn parse_header(line: &str) -> Result<ParsedRecord> {
    let first_token = line.split(' ').next().unwrap_or(line);
    let id = first_token
        .split(':')
        .nth(1)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RecordError::MalformedHeader {
            line: line.to_string(),
        })?;
    Ok(ParsedRecord::SequenceHeader {
        id: RecordId::from_raw(id),
    })
}

/// Extract identifier and release date from the collected ID and DT lines
fn parse_flat_file(id_line: Option<&str>, date_line: Option<&str>) -> Result<ParsedRecord> {
    let id_line = id_line.ok_or(RecordError::MissingIdLine)?;
    let id_body = id_line.strip_prefix("ID").unwrap_or(id_line).trim();
    let id = id_body
        .split(';')
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RecordError::EmptyId {
            line: id_line.to_string(),
        })?;

    let date_line = date_line.ok_or(RecordError::MissingDateLine)?;
    let date_body = date_line.strip_prefix("DT").unwrap_or(date_line).trim();
    let date_token = date_body
        .split_whitespace()
        .next()
        .ok_or(RecordError::MissingDateLine)?;
    let released: ReleaseDate = date_token.parse()?;

    Ok(ParsedRecord::FlatFile {
        id: RecordId::from_raw(id),
        released,
    })
}

/// Applies the cutoff and indexing rules to classified records
///
/// Owned per worker pool run; holds the cutoff date, the output directory,
/// the set of identifiers already indexed at run start, and a handle to the
/// index store.
#[derive(Clone, Debug)]
pub struct Persister {
    cutoff: NaiveDate,
    output_dir: PathBuf,
    known: HashSet<String>,
    index: IndexStore,
}

impl Persister {
    /// Build a persister from the run's planning snapshot
    pub fn new(
        cutoff: NaiveDate,
        output_dir: &Path,
        snapshot: &IndexSnapshot,
        index: IndexStore,
    ) -> Self {
        Self {
            cutoff,
            output_dir: output_dir.to_path_buf(),
            known: snapshot.identifiers().map(str::to_string).collect(),
            index,
        }
    }

    /// Classify a body and apply the persistence rules
    ///
    /// - not-found: no file, no index mutation
    /// - sequence-header: body written verbatim to `<id>.fasta`; the index is
    ///   not touched (resumption covers only the flat-file path)
    /// - flat-file: a new identifier is upserted into the index with its
    ///   release date; the body is written verbatim to `<id>.embl` only when
    ///   the release date is strictly after the cutoff
    pub async fn process(&self, body: &str) -> Result<Outcome> {
        match classify(body)? {
            ParsedRecord::NotFound => Ok(Outcome::NotFound),
            ParsedRecord::SequenceHeader { id } => {
                let path = self.artifact_path(&id, SEQUENCE_EXTENSION);
                tokio::fs::write(&path, body).await?;
                Ok(Outcome::SequenceHeader { id, path })
            }
            ParsedRecord::FlatFile { id, released } => {
                let mut indexed = false;
                if !self.known.contains(id.as_str()) {
                    self.index.upsert(&id, released).await?;
                    indexed = true;
                }

                let path = if released.date() > self.cutoff {
                    let path = self.artifact_path(&id, FLAT_FILE_EXTENSION);
                    tokio::fs::write(&path, body).await?;
                    Some(path)
                } else {
                    None
                };

                Ok(Outcome::FlatFile {
                    id,
                    released,
                    path,
                    indexed,
                })
            }
        }
    }

    fn artifact_path(&self, id: &RecordId, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{id}.{extension}"))
    }
}
