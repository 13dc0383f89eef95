use anyhow::Result;
use clap::Parser;

use tl_relay::cli::commands::{providers, serve};
use tl_relay::cli::{Args, Command};
use tl_relay::config::ResolveOptions;
use tl_relay::logging;
use tl_relay::protocol::print_languages;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Languages) => {
            print_languages();
        }
        Some(Command::Providers { provider }) => {
            let manager = serve::config_manager(args.config)?;
            providers::print_providers(&manager, provider.as_deref())?;
        }
        None => {
            logging::init(&args.log_level, &args.log_format)?;

            let options = serve::ServeOptions {
                config: args.config,
                resolve: ResolveOptions {
                    bind: args.bind,
                    provider: args.provider,
                    model: args.model,
                    max_frame_bytes: args.max_frame_bytes,
                    read_timeout_secs: args.read_timeout_secs,
                },
            };
            serve::run_serve(options).await?;
        }
    }

    Ok(())
}
