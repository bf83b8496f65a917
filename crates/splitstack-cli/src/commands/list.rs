//! `splitstack list`: list stacks in deployment order.

use clap::Args;
use splitstack_common::config::AppConfig;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Also show the stacks each stack depends on.
    #[arg(short, long)]
    pub long: bool,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if composition or ordering fails.
#[allow(clippy::print_stdout)]
pub fn execute(args: &ListArgs, config: AppConfig) -> anyhow::Result<()> {
    let app = splitstack_stacks::compose(config)?;
    for name in app.deployment_order()? {
        match app.stack(&name) {
            Some(stack) if args.long && !stack.dependencies.is_empty() => {
                let deps: Vec<&str> = stack.dependencies.iter().map(String::as_str).collect();
                println!("{name}\t(after {})", deps.join(", "));
            }
            _ => println!("{name}"),
        }
    }
    Ok(())
}
