use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, info, trace, warn};

use s3mig_rs::config::Config;
use s3mig_rs::{
    CLIArgs, MigrationPipeline, MigrationStats, S3migError, create_pipeline_cancellation_token,
    complete_retry_input, exit_code_from_error, is_cancelled_error, prepare_retry_input,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

const EXIT_CODE_SUCCESS: i32 = 0;

/// s3mig - resumable object migration between S3-compatible stores.
///
/// This binary is a thin wrapper over the s3mig-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3mig",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let exit_code = run(config).await?;
    if exit_code != EXIT_CODE_SUCCESS {
        std::process::exit(exit_code);
    }

    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

async fn resolve_listing_path(config: &Config) -> Result<PathBuf> {
    if config.retry_failed {
        return prepare_retry_input(&config.working_dir).await;
    }
    Ok(config.listing_path())
}

async fn run(config: Config) -> Result<i32> {
    let listing = match resolve_listing_path(&config).await {
        Ok(listing) => listing,
        Err(e) => {
            error!("{:#}", e);
            return Ok(exit_code_from_error(&e));
        }
    };
    debug!(listing = %listing.display(), "identifier listing selected.");

    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!("migration pipeline start.");

    let mut pipeline = match MigrationPipeline::new(config.clone(), cancellation_token.clone()).await
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{:#}", e);
            return Ok(exit_code_from_error(&e));
        }
    };

    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
        config.dry_run,
    );

    let result = pipeline.run_listing(&listing).await;
    // run_listing may fail before the workers start, leaving the channel open.
    pipeline.close_stats_sender();
    indicator_join_handle.await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    let exit_code = match result {
        Ok(stats) => {
            let cancelled = cancellation_token.is_cancelled();
            if config.retry_failed && !config.dry_run && !cancelled {
                if let Err(e) = complete_retry_input(&config.working_dir).await {
                    error!("{:#}", e);
                    return Ok(exit_code_from_error(&e));
                }
            }
            exit_code_from_stats(&stats, cancelled)
        }
        Err(e) if is_cancelled_error(&e) => {
            debug!("migration cancelled by user.");
            EXIT_CODE_SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            for other in pipeline.get_errors_and_consume().unwrap_or_default() {
                error!("{:#}", other);
            }
            let stats = pipeline.get_migration_stats();
            error!(
                migrated = stats.stats_migrated_objects,
                failed = stats.stats_failed_objects,
                duration_sec = duration_sec,
                "s3mig failed."
            );
            return Ok(exit_code_from_error(&e));
        }
    };

    debug!(duration_sec = duration_sec, "s3mig has been completed.");
    Ok(exit_code)
}

fn exit_code_from_stats(stats: &MigrationStats, cancelled: bool) -> i32 {
    if cancelled {
        info!(
            processed = stats.processed(),
            "migration cancelled. unprocessed identifiers are not in the failure ledger."
        );
    }

    if stats.stats_failed_objects > 0 {
        let partial = S3migError::PartialFailure {
            migrated: stats.stats_migrated_objects,
            failed: stats.stats_failed_objects,
        };
        warn!("{partial}. rerun with --retry-failed.");
        return partial.exit_code();
    }

    EXIT_CODE_SUCCESS
}
