//! Core types for ipd-dl

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::error::{Error, RecordError};

/// Wire format of release dates as they appear in flat-file records
/// and in the persisted index (day/month/year).
pub const RELEASE_DATE_FORMAT: &str = "%d/%m/%Y";

/// Supported IPD database codes
///
/// Each code maps to a dbfetch database name and a record identifier prefix.
/// The code string (e.g. `MHC`) also names the per-database index file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Database {
    /// IPD-MHC nucleotide records
    Mhc,
    /// IPD-NHKIR nucleotide records
    Kir,
    /// IMGT/HLA nucleotide records
    Hla,
    /// IPD-MHC protein records
    MhcPro,
    /// IPD-NHKIR protein records
    KirPro,
}

impl Database {
    /// Canonical uppercase code, used to name the index file
    pub fn code(&self) -> &'static str {
        match self {
            Database::Mhc => "MHC",
            Database::Kir => "KIR",
            Database::Hla => "HLA",
            Database::MhcPro => "MHCPRO",
            Database::KirPro => "KIRPRO",
        }
    }

    /// Database name in the dbfetch query string
    pub fn dbfetch_name(&self) -> &'static str {
        match self {
            Database::Mhc => "ipdmhc",
            Database::Kir => "ipdnhkir",
            Database::Hla => "imgthla",
            Database::MhcPro => "ipdmhcpro",
            Database::KirPro => "ipdnhkirpro",
        }
    }

    /// Record identifier prefix (`NHP` for IPD databases, `HLA` for IMGT/HLA)
    pub fn prefix(&self) -> &'static str {
        match self {
            Database::Hla => "HLA",
            _ => "NHP",
        }
    }
}

impl std::fmt::Display for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Database {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MHC" => Ok(Database::Mhc),
            "KIR" => Ok(Database::Kir),
            "HLA" => Ok(Database::Hla),
            "MHCPRO" => Ok(Database::MhcPro),
            "KIRPRO" => Ok(Database::KirPro),
            other => Err(Error::Config {
                message: format!("unsupported database code: {other}"),
                key: Some("database".to_string()),
            }),
        }
    }
}

/// Canonical record identifier: database prefix plus zero-padded number
///
/// Numbers are padded to five digits (`NHP` + 7 → `NHP00007`). Numbers above
/// 99999 widen naturally rather than being truncated, so `NHP` + 123456 →
/// `NHP123456`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the identifier for a record number in the given database
    pub fn new(database: Database, number: u32) -> Self {
        Self(format!("{}{:05}", database.prefix(), number))
    }

    /// Wrap an identifier string extracted from a fetched record body
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric tail of the identifier, if it parses after the database prefix
    pub fn number(&self, database: Database) -> Option<u32> {
        self.0.strip_prefix(database.prefix())?.parse().ok()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Release date extracted from a flat-file record's DT line
///
/// Parses from and renders to the day/month/year wire form. Ordering follows
/// the calendar date, so cutoff comparisons are plain `<`/`>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseDate(NaiveDate);

impl ReleaseDate {
    /// Wrap a calendar date
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The inner calendar date
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl std::fmt::Display for ReleaseDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(RELEASE_DATE_FORMAT))
    }
}

impl std::str::FromStr for ReleaseDate {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, RELEASE_DATE_FORMAT)
            .map(Self)
            .map_err(|_| RecordError::InvalidDate {
                value: s.to_string(),
            })
    }
}

/// One unit of fetch work: the record identifier and the URL to fetch it from
///
/// Jobs are produced by the job generator and consumed exactly once by a
/// worker; they do not outlive the run.
#[derive(Clone, Debug)]
pub struct FetchJob {
    /// Record number this job probes
    pub number: u32,
    /// Canonical identifier derived from the database prefix and number
    pub id: RecordId,
    /// Fully formed dbfetch URL
    pub url: Url,
}

/// Terminal result of one successfully fetched and classified job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The server returned the not-found sentinel; nothing was written
    NotFound,
    /// A sequence-header record was persisted verbatim
    SequenceHeader {
        /// Identifier extracted from the header line
        id: RecordId,
        /// Path of the written artifact
        path: PathBuf,
    },
    /// A flat-file record was classified; it may have been written and/or indexed
    FlatFile {
        /// Identifier extracted from the record's ID line
        id: RecordId,
        /// Release date extracted from the record's DT line
        released: ReleaseDate,
        /// Path of the written artifact, when the release date passed the cutoff
        path: Option<PathBuf>,
        /// Whether a new index entry was recorded for this identifier
        indexed: bool,
    },
}

/// Events emitted by the harvester
///
/// Subscribe via [`crate::Harvester::subscribe`]. Delivery is best-effort:
/// events sent while no subscriber is listening are dropped.
#[derive(Clone, Debug)]
pub enum Event {
    /// A record artifact was written to the output directory
    RecordWritten {
        /// Identifier of the written record
        id: RecordId,
        /// Path of the written artifact
        path: PathBuf,
    },
    /// A newly discovered identifier was added to the index store
    RecordIndexed {
        /// Identifier added to the index
        id: RecordId,
        /// Release date recorded for the identifier
        released: ReleaseDate,
    },
    /// The server reported no record under the probed identifier
    RecordNotFound {
        /// Identifier that was probed
        id: RecordId,
    },
    /// A job failed after exhausting its retries or on a malformed body
    JobFailed {
        /// Identifier of the failed job
        id: RecordId,
        /// Rendered failure cause
        error: String,
    },
    /// The run drained its queue and all workers finished
    Completed {
        /// Aggregated counters for the run
        summary: HarvestSummary,
    },
}

/// Aggregated counters for one harvester run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestSummary {
    /// Jobs generated for this run
    pub jobs: u64,
    /// Record artifacts written to the output directory
    pub written: u64,
    /// New identifiers recorded in the index store
    pub indexed: u64,
    /// Jobs answered with the not-found sentinel
    pub not_found: u64,
    /// Jobs that failed (retry exhaustion or malformed body)
    pub failed: u64,
}

impl HarvestSummary {
    /// Fold one job outcome into the counters
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::NotFound => self.not_found += 1,
            Outcome::SequenceHeader { .. } => self.written += 1,
            Outcome::FlatFile { path, indexed, .. } => {
                if path.is_some() {
                    self.written += 1;
                }
                if *indexed {
                    self.indexed += 1;
                }
            }
        }
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: &HarvestSummary) {
        self.jobs += other.jobs;
        self.written += other.written;
        self.indexed += other.indexed;
        self.not_found += other.not_found;
        self.failed += other.failed;
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_zero_padded_to_five_digits() {
        assert_eq!(RecordId::new(Database::Mhc, 7).as_str(), "NHP00007");
        assert_eq!(RecordId::new(Database::Hla, 7).as_str(), "HLA00007");
        assert_eq!(RecordId::new(Database::Kir, 99999).as_str(), "NHP99999");
    }

    #[test]
    fn record_id_widens_beyond_five_digits() {
        // Overflow policy: widen, never truncate
        assert_eq!(RecordId::new(Database::Mhc, 123456).as_str(), "NHP123456");
    }

    #[test]
    fn record_id_number_round_trips() {
        let id = RecordId::new(Database::Mhc, 42);
        assert_eq!(id.number(Database::Mhc), Some(42));

        // Wrong prefix does not parse
        assert_eq!(id.number(Database::Hla), None);
        assert_eq!(RecordId::from_raw("NHPXXXXX").number(Database::Mhc), None);
    }

    #[test]
    fn database_parses_from_code_strings() {
        assert_eq!("MHC".parse::<Database>().unwrap(), Database::Mhc);
        assert_eq!("KIR".parse::<Database>().unwrap(), Database::Kir);
        assert_eq!("HLA".parse::<Database>().unwrap(), Database::Hla);
        assert_eq!("MHCPRO".parse::<Database>().unwrap(), Database::MhcPro);
        assert_eq!("KIRPRO".parse::<Database>().unwrap(), Database::KirPro);
    }

    #[test]
    fn unknown_database_code_is_a_config_error() {
        let err = "BRCA".parse::<Database>().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "database"));
    }

    #[test]
    fn database_prefixes_and_dbfetch_names() {
        assert_eq!(Database::Mhc.prefix(), "NHP");
        assert_eq!(Database::KirPro.prefix(), "NHP");
        assert_eq!(Database::Hla.prefix(), "HLA");
        assert_eq!(Database::Mhc.dbfetch_name(), "ipdmhc");
        assert_eq!(Database::Kir.dbfetch_name(), "ipdnhkir");
        assert_eq!(Database::Hla.dbfetch_name(), "imgthla");
    }

    #[test]
    fn release_date_parses_and_renders_wire_form() {
        let date: ReleaseDate = "01/02/2020".parse().unwrap();
        assert_eq!(date.date(), NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
        assert_eq!(date.to_string(), "01/02/2020");
    }

    #[test]
    fn release_date_rejects_year_first_form() {
        assert!("2020-02-01".parse::<ReleaseDate>().is_err());
        assert!("32/01/2020".parse::<ReleaseDate>().is_err());
    }

    #[test]
    fn release_date_orders_by_calendar_date() {
        let earlier: ReleaseDate = "31/12/2019".parse().unwrap();
        let later: ReleaseDate = "01/01/2020".parse().unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn summary_records_outcomes() {
        let mut summary = HarvestSummary::default();
        summary.record(&Outcome::NotFound);
        summary.record(&Outcome::SequenceHeader {
            id: RecordId::from_raw("NHP00001"),
            path: PathBuf::from("NHP00001.fasta"),
        });
        summary.record(&Outcome::FlatFile {
            id: RecordId::from_raw("NHP00002"),
            released: "01/02/2020".parse().unwrap(),
            path: Some(PathBuf::from("NHP00002.embl")),
            indexed: true,
        });
        summary.record(&Outcome::FlatFile {
            id: RecordId::from_raw("NHP00003"),
            released: "01/01/2019".parse().unwrap(),
            path: None,
            indexed: false,
        });

        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.indexed, 1);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn summary_merge_adds_counters() {
        let mut a = HarvestSummary {
            jobs: 2,
            written: 1,
            indexed: 1,
            not_found: 0,
            failed: 0,
        };
        let b = HarvestSummary {
            jobs: 3,
            written: 0,
            indexed: 0,
            not_found: 2,
            failed: 1,
        };
        a.merge(&b);
        assert_eq!(
            a,
            HarvestSummary {
                jobs: 5,
                written: 1,
                indexed: 1,
                not_found: 2,
                failed: 1,
            }
        );
    }
}
