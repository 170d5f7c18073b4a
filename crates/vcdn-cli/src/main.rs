//! vcdn - versioned static CDN publisher CLI

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use vcdn_cli::output::{TerminalReporter, summary_table, totals_line};
use vcdn_cli::{Cli, EXIT_FATAL};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    match vcdn_cli::sync::sync(&cli, TerminalReporter).await {
        Ok(report) => {
            println!("{}", summary_table(&report));
            println!("{}", totals_line(&report));
            exit_code(report.exit_code())
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code(EXIT_FATAL)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
