//! Entry point for cpuwatch. Parses args, resolves settings and runs a session.

use std::env;

use cpuwatch::app;
use cpuwatch::cli::parse_args;
use cpuwatch::settings::load_settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) if msg.starts_with("Usage:") => {
            println!("{msg}");
            return Ok(());
        }
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    // stdout carries the chart; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(prefix) = parsed.filter.as_deref() {
        return app::list_matching(prefix);
    }
    if parsed.names {
        return app::list_names();
    }

    let mut settings = load_settings();
    settings.apply_env();
    let opts = settings.resolve(&parsed);
    if opts.processes.is_empty() {
        tracing::warn!("no processes given (-p NAME... or default_processes in settings)");
    }
    app::run(opts).await
}
