use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "promsage", version, about = "Natural-language metrics assistant core")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the server (default)
    Start,

    /// Validate the configuration and probe the metrics backend
    Check,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration (with secrets masked)
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        assert!(matches!(cli.get_command(), Commands::Start));
    }

    #[test]
    fn test_cli_parsing_check() {
        let args = vec!["promsage", "check"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.get_command(), Commands::Check));
    }

    #[test]
    fn test_cli_parsing_custom_config_path() {
        let args = vec!["promsage", "--config", "/etc/promsage.toml", "start"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/promsage.toml"));
    }

    #[test]
    fn test_cli_parsing_config_show() {
        let args = vec!["promsage", "config", "show"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Config { action } => {
                assert!(matches!(action, ConfigCommands::Show));
            }
            _ => panic!("Expected Config command"),
        }
    }
}
