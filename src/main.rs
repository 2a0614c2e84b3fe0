use clap::Parser;
use otel_hello_workflow::app::{self, Cli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    app::exit_status(app::run(Cli::parse()).await)
}
