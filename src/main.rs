use anyhow::Context;
use clap::Parser;
use stream_recorder::cli::CliArgs;
use stream_recorder::commands;
use stream_recorder::utils::error::ErrorResponse;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    tracing::info!("Starting stream-recorder v{}", env!("CARGO_PKG_VERSION"));

    match commands::record(&args).await {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if !report.outcome.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) if args.json => {
            let response = ErrorResponse::from(e);
            println!("{}", serde_json::to_string_pretty(&response)?);
            std::process::exit(1);
        }
        Err(e) => Err(e).with_context(|| format!("Recording {} failed", args.name)),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("stream_recorder=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "stream_recorder=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
