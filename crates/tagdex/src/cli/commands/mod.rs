//! Command implementations and dispatch.

pub mod check;
pub mod config;
pub mod init;
pub mod search;
pub mod sync;
pub mod tags;

use std::process::ExitCode;

use super::{
    args::{Cli, Commands},
    context::CommandContext,
};

/// Loads the context and dispatches to the selected subcommand.
pub async fn run(cli: Cli) -> ExitCode {
    let loaded = match &cli.command {
        Commands::Init(_) => CommandContext::load_cwd_only(),
        _ => CommandContext::load(cli.config.as_deref()),
    };
    let ctx = match loaded {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    match cli.command {
        Commands::Search(cmd) => search::run(&ctx, &cmd).await,
        Commands::Sync(cmd) => sync::run(&ctx, &cmd).await,
        Commands::Resync(cmd) => sync::resync(&ctx, &cmd).await,
        Commands::Tags(cmd) => tags::run(&ctx, &cmd).await,
        Commands::Init(cmd) => init::run(&ctx, &cmd),
        Commands::Config => config::run(&ctx),
        Commands::Check => check::run(&ctx),
    }
}
