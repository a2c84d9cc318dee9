use s3mig_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

const INTERRUPT_MESSAGE: &str = "ctrl-c received. in-flight transfers will finish and be counted; \
     queued identifiers are not migrated and not written to the failure ledger. \
     rerun with the same listing, or with --retry-failed for a retry run.";

/// Stop the migration on the first Ctrl+C.
///
/// Workers stop picking up identifiers. A transfer already started runs to
/// completion and lands in the counters (and in the ledger if it fails).
/// Identifiers still queued or never read from the listing are dropped, so
/// the ledger of a cancelled run is not a complete list of what remains.
/// A retry input being consumed is kept for the next retry run.
///
/// The task ends without action if the run is cancelled some other way,
/// for example by a failure ledger error.
pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("migration cancelled before ctrl-c.")
            }
            _ = signal::ctrl_c() => {
                warn!("{INTERRUPT_MESSAGE}");
                cancellation_token.cancel();
            }
        }
    })
}
