use blobxfer_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Log to the state dir when possible; otherwise to stderr.
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("log file unavailable, logging to stderr: {err:#}");
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("blobxfer error: {:#}", err);
        std::process::exit(1);
    }
}
