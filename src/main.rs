use anyhow::Result;
use clap::Parser;

mod cli;

use promsage::{
    backend::Backend,
    config::{load_config, validate_config},
    init_tracing, server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    init_tracing();

    match args.get_command() {
        cli::Commands::Start => {
            let config = load_config(&args.config)?;
            server::start_server(config).await?;
        }
        cli::Commands::Check => {
            let config = load_config(&args.config)?;
            println!("Configuration OK");

            let backend = Backend::new(&config.backend, &config.circuit_breaker);
            match backend.test_connection().await {
                Ok(()) => println!("Backend reachable at {}", config.backend.url),
                Err(e) => {
                    eprintln!("Backend check failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => {
                let mut config = load_config(&args.config)?;
                if !config.backend.password.is_empty() {
                    config.backend.password = "********".to_string();
                }
                if !config.backend.bearer_token.is_empty() {
                    config.backend.bearer_token = "********".to_string();
                }
                println!("{}", toml::to_string_pretty(&config)?);
            }
            cli::ConfigCommands::Validate => {
                let config = load_config(&args.config)?;
                validate_config(&config)?;
                println!("Configuration is valid");
            }
        },
        cli::Commands::Version => {
            println!("promsage v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
