//! The app: every stack of one deployment plus the context it was
//! composed with.

use splitstack_common::config::AppConfig;
use splitstack_common::error::{Result, StackError};

use crate::assembly::{CloudAssembly, SynthesizedStack};
use crate::graph::DependencyGraph;
use crate::stack::Stack;
use crate::validator;

/// Maximum stack name length accepted by CloudFormation.
const MAX_STACK_NAME_LEN: usize = 128;

/// A set of stacks deployed together.
#[derive(Debug, Clone)]
pub struct App {
    config: AppConfig,
    stacks: Vec<Stack>,
}

impl App {
    /// Creates an app with no stacks.
    #[must_use]
    pub const fn new(config: AppConfig) -> Self {
        Self {
            config,
            stacks: Vec::new(),
        }
    }

    /// Configuration the app was created with.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Reads a context value.
    #[must_use]
    pub fn context(&self, key: &str) -> Option<&str> {
        self.config.context(key)
    }

    /// Whether the app is composed for production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    /// Adds a stack.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the name is taken, or
    /// `StackError::Config` if it is not a valid stack name.
    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        check_stack_name(&stack.name)?;
        if self.stack(&stack.name).is_some() {
            return Err(StackError::DuplicateId {
                scope: "stack",
                id: stack.name,
            });
        }
        tracing::info!(
            stack = %stack.name,
            resources = stack.template.resources.len(),
            "added stack"
        );
        self.stacks.push(stack);
        Ok(())
    }

    /// Looks up a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Stacks in the order they were added.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Stack names with every dependency before its dependents.
    ///
    /// # Errors
    ///
    /// Returns `StackError::NotFound` for dependencies on unknown stacks and
    /// `StackError::Config` on cycles.
    pub fn deployment_order(&self) -> Result<Vec<String>> {
        let mut graph = DependencyGraph::new();
        for stack in &self.stacks {
            let _ = graph.add_stack(&stack.name);
        }
        for stack in &self.stacks {
            for dependency in &stack.dependencies {
                graph.add_dependency(&stack.name, dependency)?;
            }
        }
        graph.resolve_order()
    }

    /// Validates every stack and renders the assembly in deployment order.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure or ordering error.
    pub fn synth(&self) -> Result<CloudAssembly> {
        validator::validate(&self.stacks)?;
        let order = self.deployment_order()?;
        let stacks = order
            .iter()
            .filter_map(|name| self.stack(name))
            .map(|stack| SynthesizedStack {
                name: stack.name.clone(),
                template: stack.template.clone(),
                dependencies: stack.dependencies.iter().cloned().collect(),
                assets: stack.assets.clone(),
            })
            .collect();
        tracing::info!(order = ?order, "synthesized app");
        Ok(CloudAssembly::new(stacks, self.config.environment.clone()))
    }
}

fn check_stack_name(name: &str) -> Result<()> {
    let valid = name.len() <= MAX_STACK_NAME_LEN
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StackError::Config {
            message: format!(
                "invalid stack name {name:?}: must start with a letter and contain only letters, digits and hyphens"
            ),
        })
    }
}
