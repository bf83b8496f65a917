//! CLI command definitions and dispatch.

pub mod list;
pub mod plan;
pub mod synth;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use splitstack_common::config::{AppConfig, parse_context_pair};
use splitstack_common::constants::DEFAULT_CONFIG_FILE;

/// splitstack: Network, registry, and compute stacks as CloudFormation.
#[derive(Parser, Debug)]
#[command(name = "splitstack", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the JSON configuration file.
    #[arg(long, global = true, env = "SPLITSTACK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Context value as `key=value`, e.g. `-c env=prod`. Repeatable;
    /// overrides the configuration file. Accepted before the subcommand
    /// only.
    #[arg(
        short = 'c',
        long = "context",
        value_name = "KEY=VALUE",
        value_parser = parse_context_pair
    )]
    pub context: Vec<(String, String)>,
}

impl Cli {
    /// Loads the configuration file and applies command-line context.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed.
    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load(&self.config)
            .context(format!("loading configuration from {}", self.config.display()))?;
        for (key, value) in &self.context {
            config = config.with_context(key.as_str(), value.as_str());
        }
        Ok(config)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize the stacks into a cloud assembly.
    Synth(synth::SynthArgs),
    /// Show what a deployment would create, in order.
    Plan(plan::PlanArgs),
    /// List stacks in deployment order.
    List(list::ListArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    tracing::debug!(context = ?config.context, "loaded configuration");
    match cli.command {
        Command::Synth(args) => synth::execute(args, config),
        Command::Plan(args) => plan::execute(&args, config),
        Command::List(args) => list::execute(&args, config),
    }
}

#[cfg(test)]
mod tests {
    use splitstack_cfn::assembly::TemplateFormat;

    use super::*;

    #[test]
    fn context_flags_are_repeatable() {
        let cli = Cli::try_parse_from([
            "splitstack",
            "-c",
            "env=prod",
            "--context",
            "team=web",
            "plan",
        ])
        .expect("parse");
        assert_eq!(
            cli.context,
            vec![
                ("env".to_string(), "prod".to_string()),
                ("team".to_string(), "web".to_string())
            ]
        );
    }

    #[test]
    fn context_after_subcommand_is_rejected_not_dropped() {
        let result = Cli::try_parse_from([
            "splitstack",
            "-c",
            "env=prod",
            "plan",
            "-c",
            "team=web",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_context_is_rejected() {
        assert!(Cli::try_parse_from(["splitstack", "-c", "envprod", "list"]).is_err());
        assert!(Cli::try_parse_from(["splitstack", "-c", "=prod", "list"]).is_err());
    }

    #[test]
    fn synth_flags_parse() {
        let cli = Cli::try_parse_from([
            "splitstack",
            "synth",
            "--output",
            "out",
            "--format",
            "yaml",
            "--stdout",
        ])
        .expect("parse");
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.format, TemplateFormat::Yaml);
        assert!(args.stdout);
    }

    #[test]
    fn command_line_context_overrides_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("splitstack.json");
        std::fs::write(&path, r#"{"context": {"env": "dev"}}"#).expect("write");

        let cli = Cli::try_parse_from([
            "splitstack",
            "--config",
            path.to_str().expect("utf8"),
            "-c",
            "env=prod",
            "list",
        ])
        .expect("parse");
        let config = cli.load_config().expect("config");
        assert!(config.is_production());
    }
}
