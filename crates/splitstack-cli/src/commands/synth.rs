//! `splitstack synth`: synthesize the stacks into a cloud assembly.

use std::path::PathBuf;

use clap::Args;
use splitstack_cfn::assembly::TemplateFormat;
use splitstack_common::config::AppConfig;

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Directory the assembly is written to. Defaults to the configured
    /// output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Template format: `json` or `yaml`.
    #[arg(long, default_value = "json")]
    pub format: TemplateFormat,

    /// Print the templates instead of writing the assembly.
    #[arg(long)]
    pub stdout: bool,
}

/// Executes the `synth` command.
///
/// Composes the three stacks, validates them, and writes every template,
/// asset manifest and `manifest.json` to the output directory.
///
/// # Errors
///
/// Returns an error if composition, validation, or writing fails.
#[allow(clippy::print_stdout)]
pub fn execute(args: SynthArgs, config: AppConfig) -> anyhow::Result<()> {
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());
    let assembly = splitstack_stacks::compose(config)?.synth()?;

    if args.stdout {
        println!(
            "{}",
            crate::output::stdout_document(assembly.stacks(), args.format)?
        );
        return Ok(());
    }

    let written = assembly.write_to(&output, args.format)?;
    println!(
        "Synthesized {} to {}",
        crate::output::plural(assembly.stacks().len(), "stack"),
        output.display()
    );
    for path in &written {
        println!("  {}", path.display());
    }
    Ok(())
}
