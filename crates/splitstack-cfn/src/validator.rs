//! Static checks over a set of stacks before synthesis.
//!
//! Catches dangling references and export mismatches locally instead of
//! leaving them for the provisioning engine to reject mid-deployment.

use std::collections::{BTreeMap, HashSet};

use splitstack_common::error::{Result, StackError};

use crate::stack::Stack;

/// Validates stacks for semantic correctness.
///
/// # Checks performed
///
/// 1. No duplicate stack names.
/// 2. Every `Ref`, `Fn::GetAtt` and `DependsOn` target is declared in the
///    same template, as a resource or a parameter.
/// 3. Export names are unique across all stacks.
/// 4. Every `Fn::ImportValue` names an export of another stack, and the
///    importing stack depends on it.
/// 5. Every declared stack dependency names a known stack.
///
/// # Errors
///
/// Returns the first failed check.
pub fn validate(stacks: &[Stack]) -> Result<()> {
    tracing::info!(stacks = stacks.len(), "validating stacks");
    check_duplicate_stacks(stacks)?;
    for stack in stacks {
        check_local_references(stack)?;
    }
    let exports = collect_exports(stacks)?;
    check_imports(stacks, &exports)?;
    check_dependencies(stacks)?;
    Ok(())
}

fn check_duplicate_stacks(stacks: &[Stack]) -> Result<()> {
    let mut seen = HashSet::new();
    for stack in stacks {
        if !seen.insert(stack.name.as_str()) {
            return Err(StackError::DuplicateId {
                scope: "stack",
                id: stack.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_local_references(stack: &Stack) -> Result<()> {
    let template = &stack.template;
    let declared = |target: &str| {
        template.resource(target).is_some() || template.parameter(target).is_some()
    };
    let dangling = |from: String, target: String| StackError::UnresolvedReference {
        stack: stack.name.clone(),
        from,
        target,
    };

    for (id, resource) in &template.resources {
        if let Some(target) = resource.references().into_iter().find(|t| !declared(t.as_str())) {
            return Err(dangling(id.to_string(), target));
        }
    }
    for (id, output) in &template.outputs {
        if let Some(target) = output.value.references().into_iter().find(|t| !declared(t.as_str())) {
            return Err(dangling(format!("output {id}"), target));
        }
    }
    Ok(())
}

fn collect_exports(stacks: &[Stack]) -> Result<BTreeMap<&str, &str>> {
    let mut exports = BTreeMap::new();
    for stack in stacks {
        for name in stack.template.export_names() {
            if exports.insert(name, stack.name.as_str()).is_some() {
                return Err(StackError::DuplicateId {
                    scope: "export",
                    id: name.to_string(),
                });
            }
        }
    }
    Ok(exports)
}

fn check_imports(stacks: &[Stack], exports: &BTreeMap<&str, &str>) -> Result<()> {
    for stack in stacks {
        for name in stack.template.imported_names() {
            let unresolved = || StackError::UnresolvedReference {
                stack: stack.name.clone(),
                from: "Fn::ImportValue".into(),
                target: name.clone(),
            };
            let producer = *exports.get(name.as_str()).ok_or_else(unresolved)?;
            if producer == stack.name {
                return Err(unresolved());
            }
            if !stack.dependencies.contains(producer) {
                return Err(StackError::Config {
                    message: format!(
                        "stack {} imports {name} but does not depend on {producer}",
                        stack.name
                    ),
                });
            }
        }
    }
    Ok(())
}

fn check_dependencies(stacks: &[Stack]) -> Result<()> {
    let names: HashSet<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
    for stack in stacks {
        if let Some(missing) = stack
            .dependencies
            .iter()
            .find(|d| !names.contains(d.as_str()))
        {
            return Err(StackError::NotFound {
                kind: "stack",
                id: format!("{missing} (dependency of {})", stack.name),
            });
        }
    }
    Ok(())
}
