use pipelines::{Config, Outcome, Registry};

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, metadata::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Runs catalog ingestion pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a pipeline by its registered name.
    Run { name: String },
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let registry = match Registry::builtin() {
        Ok(registry) => registry,
        Err(err) => {
            error!("Invalid pipeline registry: {}", err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Run { name } => {
            if !registry.contains(&name) {
                println!("{}", registry.not_found(&name));
                return;
            }

            let config = match Config::from_dir(Config::dir_from_env()) {
                Ok(config) => config,
                Err(err) => {
                    error!("Could not load config: {}", err);
                    std::process::exit(1);
                }
            };

            println!("Running pipeline: {}", name);
            match registry.run(&name, &config).await {
                Ok(outcome) => println!("{}", outcome),
                Err(err) => {
                    error!("Pipeline {} failed: {}", name, err);
                    std::process::exit(1);
                }
            }
        }
    }
}
