//! Command-line interface for tagdex.

use std::process::ExitCode;

use tagdex::cli::{args::parse_cli, commands, logging};
use tokio::runtime::Builder;

fn main() -> ExitCode {
    let cli = parse_cli();
    logging::init(cli.verbose);

    let runtime = match Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(commands::run(cli))
}
