//! Harvester orchestration
//!
//! Wires the pipeline together: load the index snapshot, plan the resume
//! range, generate jobs, then drain them through a fixed pool of concurrent
//! fetch workers. The pool is the only place that touches the network; each
//! worker hands fetched bodies synchronously to the classifier/persister.
//!
//! Shutdown/join semantics: `run` returns once the producer has fed every
//! job and all workers have finished their in-flight work. Cancelling the
//! token stops the producer and idle workers immediately; a worker mid-job
//! finishes that job first. Per-job failures never abort siblings.

use crate::config::HarvestConfig;
use crate::error::{Error, Result};
use crate::index::IndexStore;
use crate::record::Persister;
use crate::retry;
use crate::types::{Event, FetchJob, HarvestSummary, Outcome};
use crate::{jobs, planner};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Incremental allele harvester
///
/// Create with [`Harvester::new`], optionally [`subscribe`](Self::subscribe)
/// to progress events, then [`run`](Self::run) the pipeline to completion.
pub struct Harvester {
    config: Arc<HarvestConfig>,
    client: reqwest::Client,
    index: IndexStore,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Harvester {
    /// Create a new harvester
    ///
    /// Validates the configuration and builds the HTTP client with the
    /// configured per-request timeout. Configuration problems are fatal
    /// here, before any job is generated.
    pub fn new(config: HarvestConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let index = IndexStore::for_database(
            &config.index_dir,
            config.database,
            config.lock_retry.clone(),
        );

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            client,
            index,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to progress events
    ///
    /// Events sent while no subscriber is listening are dropped; a slow
    /// subscriber may observe lagged gaps.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the run when cancelled
    ///
    /// Cancelling stops job feeding and idle workers; in-flight jobs finish.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline to completion
    ///
    /// Plans the scan range from the index snapshot, generates jobs and
    /// drains them through the worker pool. Returns the aggregated counters
    /// once every worker has joined.
    pub async fn run(&self) -> Result<HarvestSummary> {
        let snapshot = self.index.load_snapshot();
        let boundary =
            planner::resume_points(&snapshot, self.config.cutoff, self.config.database);
        let endpoint = self.config.endpoint_base()?;
        let jobs = jobs::build_jobs(
            self.config.database,
            &boundary,
            self.config.record_count,
            &endpoint,
        )?;

        tracing::info!(
            database = %self.config.database,
            jobs = jobs.len(),
            boundary = boundary.len(),
            indexed = snapshot.len(),
            "Starting harvest"
        );

        let persister = Persister::new(
            self.config.cutoff,
            &self.config.output_dir,
            &snapshot,
            self.index.clone(),
        );

        let total_jobs = jobs.len() as u64;
        let (tx, rx) = mpsc::channel::<FetchJob>(self.config.workers);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        // No point spinning up more workers than there are jobs
        let worker_count = self.config.workers.min(jobs.len()).max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let rx = Arc::clone(&rx);
            let client = self.client.clone();
            let config = Arc::clone(&self.config);
            let persister = persister.clone();
            let event_tx = self.event_tx.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                let mut local = HarvestSummary::default();
                loop {
                    let job = tokio::select! {
                        _ = cancel.cancelled() => None,
                        job = async { rx.lock().await.recv().await } => job,
                    };
                    let Some(job) = job else { break };

                    match process_job(&client, &config, &persister, &job).await {
                        Ok(outcome) => {
                            local.record(&outcome);
                            emit_outcome(&event_tx, &outcome);
                        }
                        Err(e) => {
                            local.failed += 1;
                            tracing::warn!(
                                error = %e,
                                id = %job.id,
                                url = %job.url,
                                "Job failed"
                            );
                            let _ = event_tx.send(Event::JobFailed {
                                id: job.id.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
                local
            }));
        }

        // Feed the queue; cancellation stops feeding but not in-flight work
        for job in jobs {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                sent = tx.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(tx);

        let mut summary = HarvestSummary {
            jobs: total_jobs,
            ..Default::default()
        };
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(local) => summary.merge(&local),
                Err(e) => return Err(Error::Other(format!("worker task failed: {e}"))),
            }
        }

        tracing::info!(
            jobs = summary.jobs,
            written = summary.written,
            indexed = summary.indexed,
            not_found = summary.not_found,
            failed = summary.failed,
            "Harvest completed"
        );
        let _ = self.event_tx.send(Event::Completed { summary });

        Ok(summary)
    }
}

/// Fetch one job with retry and hand the body to the persister
async fn process_job(
    client: &reqwest::Client,
    config: &HarvestConfig,
    persister: &Persister,
    job: &FetchJob,
) -> Result<Outcome> {
    let body = retry::with_retry(&config.retry, || async {
        let response = client.get(job.url.clone()).send().await?;
        let response = response.error_for_status()?;
        Ok::<_, Error>(response.text().await?)
    })
    .await?;

    persister.process(&body).await
}

/// Translate a job outcome into broadcast events (best-effort sends)
fn emit_outcome(event_tx: &broadcast::Sender<Event>, outcome: &Outcome) {
    match outcome {
        Outcome::NotFound => {}
        Outcome::SequenceHeader { id, path } => {
            let _ = event_tx.send(Event::RecordWritten {
                id: id.clone(),
                path: path.clone(),
            });
        }
        Outcome::FlatFile {
            id,
            released,
            path,
            indexed,
        } => {
            if *indexed {
                let _ = event_tx.send(Event::RecordIndexed {
                    id: id.clone(),
                    released: *released,
                });
            }
            if let Some(path) = path {
                let _ = event_tx.send(Event::RecordWritten {
                    id: id.clone(),
                    path: path.clone(),
                });
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Database;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, record_count: u32) -> HarvestConfig {
        let mut config = HarvestConfig::new(
            Database::Mhc,
            record_count,
            NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
        );
        config.index_dir = dir.path().to_path_buf();
        config.output_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn new_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, 10);
        config.workers = 0;
        assert!(matches!(
            Harvester::new(config),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn zero_jobs_completes_without_network() {
        let dir = TempDir::new().unwrap();
        // Empty index and record_count 0: nothing to fetch
        let harvester = Harvester::new(config_in(&dir, 0)).unwrap();

        let summary = harvester.run().await.unwrap();
        assert_eq!(summary, HarvestSummary::default());
    }

    #[tokio::test]
    async fn completed_event_is_broadcast() {
        let dir = TempDir::new().unwrap();
        let harvester = Harvester::new(config_in(&dir, 0)).unwrap();
        let mut events = harvester.subscribe();

        harvester.run().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, Event::Completed { summary } if summary.jobs == 0));
    }

    #[tokio::test]
    async fn cancelled_run_feeds_no_jobs() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, 50);
        // Point at a closed port so an accidentally fed job would fail fast
        config.endpoint = Some("http://127.0.0.1:9".to_string());
        config.retry.max_attempts = 0;

        let harvester = Harvester::new(config).unwrap();
        harvester.cancellation_token().cancel();

        let summary = harvester.run().await.unwrap();
        assert_eq!(summary.jobs, 50, "jobs are counted as generated");
        assert_eq!(summary.written, 0);
        assert_eq!(summary.indexed, 0);
    }
}
