//! parceltrack: terminal client for real-time shipment tracking.

use clap::Parser;

mod cli;
mod cmd_query;
mod cmd_watch;
mod render;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("PARCELTRACK_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = args.sync_config();
    let use_color = render::resolve_color(&args.color);

    match &args.command {
        cli::Command::Watch(opts) => {
            cmd_watch::cmd_watch(config, &opts.tracking_numbers, use_color).await?;
        }
        cli::Command::Show(opts) => {
            cmd_query::cmd_show(config, &opts.tracking_number, use_color).await?;
        }
        cli::Command::History(opts) => {
            cmd_query::cmd_history(config, &opts.tracking_number).await?;
        }
        cli::Command::Validate(opts) => {
            let exit_code = cmd_query::cmd_validate(config, &opts.tracking_number).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
