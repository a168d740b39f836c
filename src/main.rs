use clap::{Parser, Subcommand};
use rgph5_dashboard::{config, data, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Load the boundary data and print a per-region summary
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::load_data(&app_config)?;
            server::start_server(app_config, dataset).await?;
        }
        Commands::Check { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::load_data(&app_config)?;

            println!("{} enumeration areas loaded", dataset.len());
            for (region, count) in data::region_summary(&dataset) {
                println!("  {:<24} {}", region.as_deref().unwrap_or("(sans région)"), count);
            }
        }
    }

    Ok(())
}
