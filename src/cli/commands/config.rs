//! Configuration CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Load this file over the defaults instead of the project hierarchy
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Validate the configuration
    Validate {
        /// Load this file over the defaults instead of the project hierarchy
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Load from `file` if given, otherwise from the project hierarchy.
pub fn load(file: Option<&PathBuf>) -> Result<Config> {
    match file {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn source_label(file: Option<&PathBuf>) -> String {
    file.map_or_else(
        || ".conductor/ + CONDUCTOR_* environment".to_string(),
        |p| p.display().to_string(),
    )
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub source: String,
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        let yaml = serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("# failed to render configuration: {e}\n"));
        format!("# source: {}\n{yaml}", self.source)
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub source: String,
    pub valid: bool,
    pub error: Option<String>,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        match &self.error {
            None => format!("Configuration is valid ({})", self.source),
            Some(error) => format!("Configuration is invalid ({}): {error}", self.source),
        }
    }
}

pub async fn execute(args: ConfigArgs, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show { file } => {
            let config = load(file.as_ref()).context("Failed to load configuration")?;
            output(
                &ConfigShowOutput {
                    source: source_label(file.as_ref()),
                    config,
                },
                json_mode,
            );
        }
        ConfigCommands::Validate { file } => {
            let result = load(file.as_ref());
            let report = ConfigValidateOutput {
                source: source_label(file.as_ref()),
                valid: result.is_ok(),
                error: result.as_ref().err().map(|e| format!("{e:#}")),
            };
            output(&report, json_mode);
            if let Err(e) = result {
                return Err(e.context("Configuration validation failed"));
            }
        }
    }

    Ok(())
}
