//! Formatted output helpers for CLI commands.

use splitstack_cfn::assembly::{SynthesizedStack, TemplateFormat};
use splitstack_cfn::resources::ec2::{INSTANCE_TYPE, NAT_GATEWAY_TYPE};
use splitstack_cfn::template::Template;
use splitstack_common::error::Result;

/// A horizontal rule of `width` box-drawing characters.
#[must_use]
pub fn rule(width: usize) -> String {
    "\u{2550}".repeat(width)
}

/// `1 stack`, `3 stacks`.
#[must_use]
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Renders every template as one parseable document for standard output.
///
/// JSON becomes a single object keyed by stack name. YAML becomes a stream
/// with one document per stack, each headed by a comment naming it.
///
/// # Errors
///
/// Returns an error if a template cannot be serialized.
pub fn stdout_document(stacks: &[SynthesizedStack], format: TemplateFormat) -> Result<String> {
    match format {
        TemplateFormat::Json => {
            let mut document = serde_json::Map::new();
            for stack in stacks {
                let _ = document.insert(stack.name.clone(), stack.template.to_value()?);
            }
            Ok(serde_json::to_string_pretty(&document)?)
        }
        TemplateFormat::Yaml => {
            let mut document = String::new();
            for stack in stacks {
                document.push_str(&format!("---\n# {}\n", stack.name));
                document.push_str(&format.render(&stack.template)?);
            }
            Ok(document)
        }
    }
}

/// Describes how private subnets reach the internet in a network template.
#[must_use]
pub fn nat_summary(template: &Template) -> String {
    let gateways = template.resources_of_type(NAT_GATEWAY_TYPE).count();
    let instances: Vec<&str> = template
        .resources_of_type(INSTANCE_TYPE)
        .filter_map(|(_, r)| r.property("InstanceType").and_then(|t| t.as_str()))
        .collect();
    match (gateways, instances.as_slice()) {
        (0, []) => "none".to_string(),
        (n, []) => format!("managed NAT gateways ({n})"),
        (0, [one]) => format!("single NAT instance ({one})"),
        (n, many) => format!(
            "{} and {}",
            plural(n, "NAT gateway"),
            plural(many.len(), "NAT instance")
        ),
    }
}
