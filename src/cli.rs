//! Command-line interface
//!
//! Global flags override the config file; subcommands map onto the
//! [`Regulator`] operations and render their results for a terminal.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::Config;
use crate::engine::Regulator;
use crate::error::{RegulatorError, Result};
use crate::operation::Operations;

#[derive(Debug, Parser)]
#[command(name = "regulator")]
#[command(version)]
#[command(about = "Detect drift with observations and remediate it with reactions")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Path to configuration file
    #[arg(short, long, env = "REGULATOR_CONFIG", default_value = "regulator.toml", global = true)]
    pub config: PathBuf,

    /// Catalogue document to load (repeatable, merged in order)
    #[arg(short, long = "file", global = true)]
    pub files: Vec<PathBuf>,

    /// Read the catalogue document from stdin
    #[arg(long, global = true)]
    pub stdin: bool,

    /// Run commands on this host over ssh
    #[arg(long, env = "REGULATOR_HOST", global = true)]
    pub host: Option<String>,

    /// Remote user
    #[arg(long, env = "REGULATOR_USER", global = true)]
    pub user: Option<String>,

    /// Remote ssh port
    #[arg(long, env = "REGULATOR_PORT", global = true)]
    pub port: Option<u16>,

    /// Seconds a command may run before it is killed
    #[arg(long, env = "REGULATOR_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Resolve actions without running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REGULATOR_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,
}

impl GlobalArgs {
    /// Apply flag overrides on top of the file configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.remote.host = Some(host.clone());
        }
        if let Some(user) = &self.user {
            config.remote.user = user.clone();
        }
        if let Some(port) = self.port {
            config.remote.port = port;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.exec.timeout_secs = timeout_secs;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }

    /// Config files first, then `--file`s; stdin replaces `--file`s
    pub fn source_files(&self, config: &Config) -> Vec<PathBuf> {
        if self.stdin {
            return Vec::new();
        }
        config
            .catalogue
            .files
            .iter()
            .chain(self.files.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Load and merge every document, reporting conflicts
    Validate,

    /// List the merged catalogue
    List,

    /// Run an observation and print its result
    Observe {
        /// Observation name
        name: String,
    },

    /// Run a reaction: observe, then act if the condition holds
    React {
        /// Reaction name
        name: String,
    },

    /// Observe and run the implement that corrects an unexpected result
    Correct {
        /// Observation name
        name: String,
    },

    /// Run an implement's reaction directly
    Act {
        /// Implement name
        implement: String,

        /// Observation supplying the `instance` argument
        #[arg(short, long)]
        observation: Option<String>,
    },
}

/// Execute a CLI command against a loaded regulator
pub async fn execute_command(regulator: &mut Regulator, command: Commands) -> Result<String> {
    match command {
        Commands::Validate => Ok(format_summary(regulator)),

        Commands::List => Ok(format_catalogue(regulator.operations())),

        Commands::Observe { name } => {
            let result = regulator.observe(&name).await?;
            to_json(&result)
        }

        Commands::React { name } => {
            let outcome = regulator.react(&name).await?;
            to_json(&outcome)
        }

        Commands::Correct { name } => {
            let outcome = regulator.correct(&name).await?;
            to_json(&outcome)
        }

        Commands::Act {
            implement,
            observation,
        } => {
            let report = regulator.act(&implement, observation.as_deref()).await?;
            to_json(&report)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| RegulatorError::Parse(format!("Failed to render output: {}", e)))
}

fn format_summary(regulator: &Regulator) -> String {
    let ops = regulator.operations();
    format!(
        "Catalogue is valid: {} observations, {} reactions, {} actions, {} implements ({} built-in)",
        ops.observations.len(),
        ops.reactions.len(),
        ops.actions.len(),
        ops.implements.len(),
        regulator.defaults().len()
    )
}

fn format_catalogue(ops: &Operations) -> String {
    let mut output = String::new();

    output.push_str("Observations:\n");
    for (name, obsv) in &ops.observations {
        output.push_str(&format!(
            "  {:<24} {}/{} instance={} expect={}\n",
            name, obsv.entity, obsv.query, obsv.instance, obsv.expect
        ));
    }

    output.push_str("Reactions:\n");
    for (name, rctn) in &ops.reactions {
        output.push_str(&format!(
            "  {:<24} {} -> {}\n",
            name, rctn.observation, rctn.action
        ));
    }

    output.push_str("Actions:\n");
    for (name, actn) in &ops.actions {
        output.push_str(&format!("  {:<24} {}\n", name, actn.command_line()));
    }

    output.push_str("Implements:\n");
    for (name, implement) in &ops.implements {
        let observes = implement
            .observes
            .as_ref()
            .map(|o| format!("observes {}/{}", o.entity, o.query))
            .unwrap_or_default();
        let corrects = implement
            .corrects()
            .map(|c| format!("corrects {}/{} {:?} -> {}", c.entity, c.query, c.starts_from, c.results_in))
            .unwrap_or_default();
        let line = format!("  {:<24} {} {}", name, observes, corrects);
        output.push_str(line.trim_end());
        output.push('\n');
    }

    output.trim_end().to_string()
}
