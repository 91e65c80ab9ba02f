mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use processvault::api;
use processvault::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve(args) => {
            let address = args.address.unwrap_or(config.server.bind_addr);
            api::run(address, config).await?;
        }
        Commands::Worker => {
            api::run_worker_only(config).await?;
        }
    }

    Ok(())
}
