//! Command-line interface for the `strand` binary.

use clap::{Parser, Subcommand};

use strand_domain::config::Config;

/// Environment variable naming the config file path.
const CONFIG_ENV: &str = "STRAND_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./strand.toml";

#[derive(Parser)]
#[command(name = "strand", about = "Agent graph execution platform", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version and exit.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the config file and report issues.
    Validate,
    /// Print the effective configuration.
    Show,
}

/// Load the config from `$STRAND_CONFIG` or `./strand.toml`; a missing
/// file yields defaults.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(std::path::Path::new(&path))?;
    Ok((config, path))
}

pub mod config {
    use strand_domain::config::{Config, ConfigSeverity};

    /// Returns whether the config is free of errors.
    pub fn validate(config: &Config, path: &str) -> bool {
        let issues = config.validate();
        if issues.is_empty() {
            println!("{path}: OK");
            return true;
        }
        for issue in &issues {
            println!("{issue}");
        }
        !issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error)
    }

    pub fn show(config: &Config) {
        match toml::to_string_pretty(config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("failed to render config: {e}"),
        }
    }
}
