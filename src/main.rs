use std::process::ExitCode;

use clap::Parser;
use tracing::{info, span, Level};

use ossctl::cli;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    let args = cli::Cli::parse();
    ExitCode::from(cli::run(args).await)
}
