use clap::{Parser, Subcommand};
use http::Method;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod logging;
mod statsd;

#[derive(Parser)]
#[command(version, about = "Combined listing of upcoming programming contests")]
struct Cli {
    /// YAML config file. Environment variables override its values.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the standalone server
    Serve,
    /// Answer a single request like a function deployment and print the
    /// response body to stdout
    Invoke {
        #[arg(long, default_value = "/api")]
        path: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry_guard = logging::init(config.logging.as_ref());

    if let Some(metrics_config) = &config.metrics
        && let Err(e) = statsd::init(metrics_config)
    {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        CliCommand::Serve => match rt.block_on(aggregator::run(config.aggregator)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "Aggregator stopped");
                ExitCode::FAILURE
            }
        },
        CliCommand::Invoke { path } => {
            match rt.block_on(aggregator::invoke(config.aggregator, &Method::GET, &path)) {
                Ok(response) => {
                    let mut stdout = std::io::stdout().lock();
                    let written = stdout
                        .write_all(response.body())
                        .and_then(|()| writeln!(stdout));
                    if written.is_err() || !response.status().is_success() {
                        ExitCode::FAILURE
                    } else {
                        ExitCode::SUCCESS
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Invocation failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
