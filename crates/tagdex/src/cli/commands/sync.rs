//! Implementation of `tagdex sync` and `tagdex resync`.

use std::process::ExitCode;

use chrono::Utc;
use tagdex_engine::{PassReport, ResyncReport};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{
    args::{ResyncCommand, SyncCommand},
    context::CommandContext,
    output::{counts_table, print_json},
};

/// Runs one sync pass, or keeps syncing until interrupted.
pub async fn run(ctx: &CommandContext, cmd: &SyncCommand) -> ExitCode {
    let services = match ctx.services() {
        Ok(services) => services,
        Err(code) => return code,
    };

    if cmd.once {
        return match services.sync.run_pass().await {
            Ok(report) if cmd.json => print_json(&report),
            Ok(report) => {
                println!("{}", counts_table(&pass_rows(&report)));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: sync pass failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for interrupts");
            return;
        }
        info!("interrupt received, stopping at the next page");
        trigger.cancel();
    });

    services.sync.run(shutdown).await;
    ExitCode::SUCCESS
}

/// Rebuilds the catalog from a daily export.
pub async fn resync(ctx: &CommandContext, cmd: &ResyncCommand) -> ExitCode {
    let date = cmd.date.unwrap_or_else(|| Utc::now().date_naive());
    let services = match ctx.services() {
        Ok(services) => services,
        Err(code) => return code,
    };

    match services.sync.resync(date).await {
        Ok(report) if cmd.json => print_json(&report),
        Ok(report) => {
            println!("{}", counts_table(&resync_rows(&report)));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: resync from the {date} export failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Table rows of a pass report.
fn pass_rows(report: &PassReport) -> Vec<(&'static str, usize)> {
    vec![
        ("new records", report.new_records),
        ("updated records", report.updated_records),
        ("reconciled parents", report.reconciled_parents),
        ("tags refreshed", report.tags_refreshed),
        ("records migrated", report.migrated_records),
        ("aliases", report.aliases),
        ("implications", report.implications),
        ("failed records", report.failed_records),
    ]
}

/// Table rows of a resync report.
fn resync_rows(report: &ResyncReport) -> Vec<(&'static str, usize)> {
    vec![
        ("tags", report.tags),
        ("records migrated", report.migrated_records),
        ("records read", report.records),
        ("records written", report.written),
        ("failed records", report.failed_records),
        ("aliases", report.aliases),
    ]
}
