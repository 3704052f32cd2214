//! Configuration view and validation commands: `baton config`.

use anyhow::Result;

use super::super::ConfigCommands;
use baton::baton_config::{BatonToml, CONFIG_FILE};
use baton::config::Config;
use baton::errors::EXIT_OK;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<u8> {
    let config_path = config.baton_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Baton Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                let toml = BatonToml::load(&config_path)?;
                print!("{}", toml::to_string_pretty(&toml)?);
                println!();
            } else {
                println!("No baton.toml found at {}", config_path.display());
                println!("Run 'baton config init' to create one.");
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            println!("  mode = \"{}\"", config.mode);
            println!("  timeout_ms = {}", config.timeout_ms);
            println!("  max_attempts = {}", config.max_attempts);
            match &config.executor_cmd {
                Some(cmd) => println!("  command = \"{}\"", cmd),
                None => println!("  command = (none)"),
            }
            match config.max_delegations {
                Some(limit) => println!("  max_delegations = {}", limit),
                None => println!("  max_delegations = (unlimited)"),
            }
            println!("  fixtures_dir = \"{}\"", config.fixtures_dir.display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No baton.toml found. Using defaults (valid).");
                return Ok(EXIT_OK);
            }

            // Reaching here means the file parsed; Config::new loads it first.
            let warnings = config.toml().validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("baton.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(EXIT_OK);
            }

            std::fs::create_dir_all(&config.baton_dir)?;
            BatonToml::default().save(&config_path)?;

            println!("Created baton.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [delegation] mode, timeout_ms, max_attempts, command");
            println!("  - [budget] max_delegations");
            println!("  - [gates.overrides.\"check-pattern*\"] severity, blocking");
            println!();
        }
    }

    Ok(EXIT_OK)
}
