// Live progress line and final summary for a migration run.
//
// Reads MigrationStatistics from the stats channel until the pipeline closes it.

use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3mig_rs::MigrationStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals observed on the stats channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub total_migrate_count: u64,
    pub total_migrate_bytes: u64,
    pub total_error_count: u64,
}

impl IndicatorSummary {
    fn record(&mut self, stats: MigrationStatistics) -> u64 {
        match stats {
            MigrationStatistics::MigrateComplete { .. } => {
                self.total_migrate_count += 1;
                return 1;
            }
            MigrationStatistics::MigrateBytes(size) => self.total_migrate_bytes += size,
            MigrationStatistics::MigrateError { .. } => self.total_error_count += 1,
        }
        0
    }

    fn processed(&self) -> u64 {
        self.total_migrate_count + self.total_error_count
    }
}

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;

/// Spawn the progress reporter.
///
/// The task runs until `stats_receiver` is closed, then logs the summary and
/// optionally prints it. Await the handle after the pipeline has finished.
pub fn show_indicator(
    stats_receiver: Receiver<MigrationStatistics>,
    show_progress: bool,
    show_result: bool,
    dry_run: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }
    let verb = if dry_run { "resolved" } else { "migrated" };

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_migrated_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut summary = IndicatorSummary::default();

        loop {
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    period_count += summary.record(stats);
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let mut objects_per_sec =
                        (summary.total_migrate_count as f64 / elapsed_secs_f64) as u64;
                    if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        objects_per_sec = summary.total_migrate_count;
                    }

                    info!(
                        message = "migration summary",
                        dry_run,
                        processed = summary.processed(),
                        migrated_objects = summary.total_migrate_count,
                        migrated_bytes = summary.total_migrate_bytes,
                        migrated_objects_per_sec = objects_per_sec,
                        failed = summary.total_error_count,
                        duration_sec = elapsed_secs_f64,
                    );

                    if show_result {
                        if let Ok(style) = ProgressStyle::with_template("{msg}") {
                            progress_text.set_style(style);
                        }
                        progress_text.finish_with_message(format!(
                            "{verb} {:>3} objects | {:>3} objects/sec,  failed {} objects,  {verb} {:>3},  duration {}",
                            summary.total_migrate_count,
                            HumanCount(objects_per_sec),
                            summary.total_error_count,
                            HumanBytes(summary.total_migrate_bytes),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        let _ = io::stdout().flush();
                    }

                    return summary;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            ma_migrated_count.add_sample(period_count);

            if show_progress {
                progress_text.set_message(format!(
                    "{verb} {:>3} objects | {:>3} objects/sec,  failed {} objects,  {verb} {:>3}",
                    summary.total_migrate_count,
                    HumanCount(ma_migrated_count.get_average()),
                    summary.total_error_count,
                    HumanBytes(summary.total_migrate_bytes),
                ));
            }
        }
    })
}
