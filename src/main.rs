use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use simplelog::{ConfigBuilder, WriteLogger};

use perch::core::config::{self, CliOverrides};

#[derive(Parser)]
#[command(name = "perch", about = "Terminal team-chat client")]
struct Args {
    /// Path of the local state database
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Base URL of the remote service
    #[arg(long)]
    base_url: Option<String>,

    /// Log level (error/warn/info/debug/trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Retry history fetches that failed instead of treating them as done
    #[arg(long)]
    retry_history: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let config = match config::resolve(CliOverrides {
        db_path: args.db_path,
        base_url: args.base_url,
        log_level: args.log_level,
        retry_failed_history: args.retry_history,
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("perch: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Log to a file; the terminal grid belongs to the display.
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    if let Ok(log_file) = File::create("perch.log") {
        let _ = WriteLogger::init(config.log_level, log_config, log_file);
    }

    log::info!("perch starting up against {}", config.base_url);

    match perch::tui::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: {e}");
            eprintln!("perch: {e}");
            ExitCode::FAILURE
        }
    }
}
