/// CLI module - command-line interface for au
mod cli;

/// Editor module - free-form content editing via $AU_EDITOR / $EDITOR
mod editor;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "au=warn,au_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
