//! Durable identifier→release-date index with cross-process locking
//!
//! One index file exists per database code (`<CODE>_date_lookup.json`), a
//! flat JSON object mapping record identifiers to day/month/year date
//! strings. The file is the resumption state shared by concurrent workers
//! and by successive runs, so every mutation is a full read-modify-write
//! under an advisory file lock, and an existing entry is never dropped.

use crate::config::RetryConfig;
use crate::error::{Error, IndexError, Result};
use crate::retry;
use crate::types::{Database, RecordId, ReleaseDate};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Suffix of the per-database index file name
const INDEX_FILE_SUFFIX: &str = "_date_lookup.json";

/// Point-in-time view of the persisted index
///
/// Loaded once before the worker pool starts. It is not refreshed while
/// workers write, which is acceptable because planning happens exactly once.
#[derive(Clone, Debug, Default)]
pub struct IndexSnapshot {
    entries: BTreeMap<String, String>,
}

impl IndexSnapshot {
    /// Number of entries in the snapshot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an identifier was already indexed when the snapshot was taken
    pub fn contains(&self, id: &RecordId) -> bool {
        self.entries.contains_key(id.as_str())
    }

    /// Iterate every identifier in the snapshot
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate entries whose stored date parses as day/month/year
    ///
    /// Entries with unparsable dates are skipped with a warning, matching the
    /// tolerant read path: a bad entry must not sink the whole run.
    pub fn release_dates(&self) -> impl Iterator<Item = (&str, ReleaseDate)> {
        self.entries.iter().filter_map(|(id, value)| {
            match value.parse::<ReleaseDate>() {
                Ok(date) => Some((id.as_str(), date)),
                Err(_) => {
                    tracing::warn!(id = %id, value = %value, "Skipping index entry with unparsable date");
                    None
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Lock-guarded, file-backed index store
///
/// Cloneable; clones share the same backing file and retry tuning.
#[derive(Clone, Debug)]
pub struct IndexStore {
    path: PathBuf,
    retry: RetryConfig,
}

impl IndexStore {
    /// Store for the given database, backed by `<dir>/<CODE>_date_lookup.json`
    pub fn for_database(dir: &Path, database: Database, retry: RetryConfig) -> Self {
        Self {
            path: dir.join(format!("{}{INDEX_FILE_SUFFIX}", database.code())),
            retry,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a point-in-time snapshot of the persisted mapping
    ///
    /// An absent or unreadable file is treated as an empty index, never as a
    /// fatal error: a first run has no index yet, and a damaged one merely
    /// costs a rescan from record 1.
    pub fn load_snapshot(&self) -> IndexSnapshot {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No index file yet, starting empty");
                return IndexSnapshot::default();
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to read index file, treating as empty");
                return IndexSnapshot::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(entries) => IndexSnapshot { entries },
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to parse index file, treating as empty");
                IndexSnapshot::default()
            }
        }
    }

    /// Insert or update one identifier→date entry
    ///
    /// Acquires the advisory write lock with bounded retry, then performs the
    /// full read-merge-rewrite inside the critical section. A lock held by
    /// another process past the retry ceiling fails this upsert only; the
    /// caller logs it and the run continues. A corrupt existing file fails
    /// the upsert rather than overwriting entries that cannot be re-read.
    pub async fn upsert(&self, id: &RecordId, released: ReleaseDate) -> Result<()> {
        retry::with_retry(&self.retry, || {
            let path = self.path.clone();
            let id = id.as_str().to_string();
            let date = released.to_string();
            async move {
                tokio::task::spawn_blocking(move || try_upsert(&path, &id, &date))
                    .await
                    .map_err(|e| Error::Other(format!("index upsert task failed: {e}")))?
            }
        })
        .await
    }
}

/// One locked read-merge-rewrite attempt
///
/// Runs on the blocking pool: `fd-lock` and the file I/O are synchronous.
fn try_upsert(path: &Path, id: &str, date: &str) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let mut lock = fd_lock::RwLock::new(file);
    let mut guard = lock.try_write().map_err(|e| {
        if e.kind() == std::io::ErrorKind::WouldBlock {
            Error::Index(IndexError::LockBusy {
                path: path.to_path_buf(),
            })
        } else {
            Error::Io(e)
        }
    })?;

    let mut contents = String::new();
    guard.read_to_string(&mut contents)?;

    let mut entries: BTreeMap<String, String> = if contents.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(&contents).map_err(|e| {
            Error::Index(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })?
    };

    entries.insert(id.to_string(), date.to_string());

    let serialized = serde_json::to_string_pretty(&entries)?;
    guard.seek(SeekFrom::Start(0))?;
    guard.set_len(0)?;
    guard.write_all(serialized.as_bytes())?;

    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn store_in(dir: &TempDir) -> IndexStore {
        IndexStore::for_database(dir.path(), Database::Mhc, fast_retry())
    }

    #[test]
    fn store_path_uses_database_code() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.path().ends_with("MHC_date_lookup.json"));

        let hla = IndexStore::for_database(dir.path(), Database::Hla, fast_retry());
        assert!(hla.path().ends_with("HLA_date_lookup.json"));
    }

    #[test]
    fn snapshot_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let snapshot = store_in(&dir).load_snapshot();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn snapshot_of_unparsable_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json at all").unwrap();
        assert!(store.load_snapshot().is_empty());
    }

    #[tokio::test]
    async fn upsert_creates_file_and_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let id = RecordId::from_raw("NHP00007");
        let date: ReleaseDate = "18/07/2019".parse().unwrap();

        store.upsert(&id, date).await.unwrap();

        let snapshot = store.load_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&id));
        let (_, stored) = snapshot.release_dates().next().unwrap();
        assert_eq!(stored, date);
    }

    #[tokio::test]
    async fn upsert_merges_and_never_drops_entries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let first = RecordId::from_raw("NHP00001");
        let second = RecordId::from_raw("NHP00002");
        store.upsert(&first, "01/01/2019".parse().unwrap()).await.unwrap();
        store.upsert(&second, "01/02/2020".parse().unwrap()).await.unwrap();
        // Updating an existing key replaces its date, nothing else
        store.upsert(&first, "05/05/2021".parse().unwrap()).await.unwrap();

        let snapshot = store.load_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&first));
        assert!(snapshot.contains(&second));
        let dates: std::collections::HashMap<_, _> = snapshot
            .release_dates()
            .map(|(id, d)| (id.to_string(), d.to_string()))
            .collect();
        assert_eq!(dates["NHP00001"], "05/05/2021");
        assert_eq!(dates["NHP00002"], "01/02/2020");
    }

    #[tokio::test]
    async fn upsert_refuses_to_clobber_a_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ definitely not json").unwrap();

        let id = RecordId::from_raw("NHP00001");
        let result = store.upsert(&id, "01/01/2020".parse().unwrap()).await;
        assert!(matches!(
            result,
            Err(Error::Index(IndexError::Corrupt { .. }))
        ));

        // Original bytes untouched
        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents, "{ definitely not json");
    }

    #[tokio::test]
    async fn concurrent_upserts_all_land() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::for_database(
            dir.path(),
            Database::Mhc,
            RetryConfig {
                // Contention between tasks is expected here, so allow plenty
                // of quick retries
                max_attempts: 50,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 1.0,
                jitter: false,
            },
        );

        let mut handles = Vec::new();
        for n in 1..=20u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = RecordId::new(Database::Mhc, n);
                store.upsert(&id, "01/02/2020".parse().unwrap()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = store.load_snapshot();
        assert_eq!(snapshot.len(), 20, "no update may be lost");
        for n in 1..=20u32 {
            assert!(snapshot.contains(&RecordId::new(Database::Mhc, n)));
        }
    }

    #[tokio::test]
    async fn serialized_form_is_stable_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .upsert(&RecordId::from_raw("NHP00010"), "01/02/2020".parse().unwrap())
            .await
            .unwrap();
        store
            .upsert(&RecordId::from_raw("NHP00005"), "01/01/2019".parse().unwrap())
            .await
            .unwrap();

        let contents = std::fs::read_to_string(store.path()).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["NHP00005"], "01/01/2019");
        assert_eq!(parsed["NHP00010"], "01/02/2020");

        // Keys serialize in sorted order, so rewriting the same mapping
        // produces identical bytes
        assert!(contents.find("NHP00005").unwrap() < contents.find("NHP00010").unwrap());
    }

    #[test]
    fn snapshot_skips_entries_with_bad_dates() {
        let snapshot = IndexSnapshot::from_entries([
            ("NHP00001", "01/02/2020"),
            ("NHP00002", "never"),
        ]);
        let parsed: Vec<_> = snapshot.release_dates().collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "NHP00001");
    }
}
