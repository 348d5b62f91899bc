//! # ipd-dl
//!
//! Backend library for incrementally harvesting allele records from the IPD
//! flat-file databases (IPD-MHC, IPD-NHKIR, IMGT/HLA and their protein
//! variants) served by EBI dbfetch.
//!
//! ## Design Philosophy
//!
//! ipd-dl is designed to be:
//! - **Incremental** - A durable identifier→release-date index lets runs
//!   resume where the previous one left off instead of rescanning
//! - **Concurrent** - A bounded pool of fetch workers drains the scan range
//! - **Crash-safe** - The index is rewritten atomically under a
//!   cross-process advisory lock, so parallel invocations never lose entries
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use ipd_dl::{Database, Harvester, HarvestConfig};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cutoff = NaiveDate::from_ymd_opt(2020, 3, 1).ok_or("bad date")?;
//!     let config = HarvestConfig::new(Database::Mhc, 15000, cutoff);
//!
//!     let harvester = Harvester::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = harvester.run().await?;
//!     println!("written: {}, indexed: {}", summary.written, summary.indexed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Core harvester implementation (planning, worker pool)
pub mod harvester;
/// Durable identifier→release-date index
pub mod index;
/// Fetch job generation
pub mod jobs;
/// Resume planning
pub mod planner;
/// Response classification and persistence
pub mod record;
/// Retry logic shared by fetch and lock acquisition
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{HarvestConfig, RetryConfig};
pub use error::{Error, IndexError, RecordError, Result};
pub use harvester::Harvester;
pub use index::{IndexSnapshot, IndexStore};
pub use record::{ParsedRecord, Persister};
pub use types::{
    Database, Event, FetchJob, HarvestSummary, Outcome, RecordId, ReleaseDate,
};

/// Helper function to run the harvester with graceful signal handling.
///
/// Runs the pipeline to completion, but cancels it if a termination signal
/// arrives first; in-flight jobs finish and the partial summary is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use ipd_dl::{Database, Harvester, HarvestConfig, run_with_shutdown};
/// use chrono::NaiveDate;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cutoff = NaiveDate::from_ymd_opt(2020, 3, 1).ok_or("bad date")?;
///     let config = HarvestConfig::new(Database::Kir, 5000, cutoff);
///     let harvester = Harvester::new(config)?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(harvester).await?;
///     println!("written: {}", summary.written);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(harvester: Harvester) -> Result<HarvestSummary> {
    let cancel = harvester.cancellation_token();
    let mut run = tokio::spawn(async move { harvester.run().await });

    tokio::select! {
        result = &mut run => {
            result.map_err(|e| Error::Other(format!("harvester task failed: {e}")))?
        }
        _ = wait_for_signal() => {
            cancel.cancel();
            run.await
                .map_err(|e| Error::Other(format!("harvester task failed: {e}")))?
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
