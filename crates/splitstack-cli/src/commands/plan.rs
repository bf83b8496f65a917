//! `splitstack plan`: show what a deployment would create, in order.

use clap::Args;
use splitstack_cfn::resources::ssm::{self, ParameterStore};
use splitstack_common::config::AppConfig;
use splitstack_common::constants::{ENV_CONTEXT_KEY, NETWORK_STACK};

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Only print the per-stack summary, not every resource.
    #[arg(short, long)]
    pub summary: bool,
}

/// Executes the `plan` command.
///
/// Composes and validates the stacks, then displays them in deployment
/// order with their resources, the NAT strategy in effect, and the
/// parameter-store entries the deployment publishes.
///
/// # Errors
///
/// Returns an error if composition or validation fails.
#[allow(clippy::print_stdout)]
pub fn execute(args: &PlanArgs, config: AppConfig) -> anyhow::Result<()> {
    let env = config.environment.clone();
    let context = config
        .context(ENV_CONTEXT_KEY)
        .unwrap_or("(unset)")
        .to_string();
    let assembly = splitstack_stacks::compose(config)?.synth()?;

    println!("Deployment Plan ({ENV_CONTEXT_KEY}={context}, {})", env.uri());
    println!("{}", output::rule(48));
    println!();

    for (i, stack) in assembly.stacks().iter().enumerate() {
        let template = &stack.template;
        println!(
            "  {}. {} ({})",
            i + 1,
            stack.name,
            output::plural(template.resources.len(), "resource")
        );
        if !stack.dependencies.is_empty() {
            println!("       after: {}", stack.dependencies.join(", "));
        }
        if !args.summary {
            for (id, resource) in &template.resources {
                println!("       + {id:<48} {}", resource.resource_type);
            }
        }
        for (id, out) in &template.outputs {
            if out.export.is_none() {
                println!("       output {id}");
            }
        }
        println!();
    }

    if let Some(network) = assembly.stack(NETWORK_STACK) {
        println!("  NAT: {}", output::nat_summary(&network.template));
    }

    let mut store = ParameterStore::new();
    let _ = store.publish_from(&assembly, &env);
    println!("  Parameter store:");
    for stack in assembly.stacks() {
        for (_, resource) in stack.template.resources_of_type(ssm::PARAMETER_TYPE) {
            let Some(name) = resource.property("Name").and_then(|n| n.resolve(&env)) else {
                continue;
            };
            let value = store.get(&name).map_or_else(
                || {
                    resource.property("Value").map_or_else(String::new, |v| {
                        format!("{} (resolved at deploy time)", v.to_json())
                    })
                },
                ToString::to_string,
            );
            println!("    {name} = {value}");
        }
    }
    Ok(())
}
