//! Shared parameter store: declared parameters, deploy-time lookups, and a
//! local model of the store used to preview what a deployment publishes.
//!
//! The producing stack declares an `AWS::SSM::Parameter`. Consumers never
//! hold a reference to the producer's resource; they declare a template
//! parameter of type `AWS::SSM::Parameter::Value<...>` whose default is the
//! key, so the engine reads the current value when the consumer deploys.

use std::collections::BTreeMap;

use splitstack_common::error::Result;
use splitstack_common::types::{Environment, LogicalId};

use crate::assembly::CloudAssembly;
use crate::template::{Parameter, Resource, Template};
use crate::value::Value;

/// `AWS::SSM::Parameter`
pub const PARAMETER_TYPE: &str = "AWS::SSM::Parameter";

/// Template parameter type resolving a string from the store at deploy time.
pub const STRING_PARAMETER_TYPE: &str = "AWS::SSM::Parameter::Value<String>";

/// Template parameter type resolving an AMI ID from the store at deploy time.
pub const IMAGE_ID_PARAMETER_TYPE: &str = "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>";

/// A string entry published into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StringParameter {
    /// Key (path) of the entry.
    pub name: String,
    /// Value written at deploy time.
    pub value: Value,
    /// Human-readable description.
    pub description: Option<String>,
}

impl StringParameter {
    /// Renders the parameter resource.
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        Resource::new(PARAMETER_TYPE)
            .with_opt("Description", self.description.as_deref())
            .with("Name", self.name.as_str())
            .with("Type", "String")
            .with("Value", self.value.clone())
    }
}

/// Declares a deploy-time lookup of `key`, returning the template parameter
/// to add and its logical ID (reference it with [`Value::reference`]).
///
/// # Errors
///
/// Returns an error if the derived logical ID is invalid.
pub fn parameter_lookup(key: &str, parameter_type: &str) -> Result<(LogicalId, Parameter)> {
    let sanitized: String = key.chars().filter(char::is_ascii_alphanumeric).collect();
    let id = LogicalId::new(format!("SsmParameterValue{sanitized}Parameter"))?;
    let parameter = Parameter {
        parameter_type: parameter_type.to_string(),
        default: Some(key.to_string()),
        description: None,
    };
    Ok((id, parameter))
}

/// Declares a deploy-time string lookup of `key`.
///
/// # Errors
///
/// Returns an error if the derived logical ID is invalid.
pub fn value_for_string_parameter(key: &str) -> Result<(LogicalId, Parameter)> {
    parameter_lookup(key, STRING_PARAMETER_TYPE)
}

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParameter {
    /// Current value.
    pub value: String,
    /// Write count, starting at 1.
    pub version: u64,
}

/// In-memory key-value model of the shared parameter store.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    entries: BTreeMap<String, StoredParameter>,
}

impl ParameterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value, overwriting any previous one. Returns the new version.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> u64 {
        let key = key.into();
        let value = value.into();
        let entry = self
            .entries
            .entry(key.clone())
            .and_modify(|e| {
                e.value.clone_from(&value);
                e.version += 1;
            })
            .or_insert_with(|| StoredParameter {
                value: value.clone(),
                version: 1,
            });
        tracing::debug!(key = %key, version = entry.version, "stored parameter");
        entry.version
    }

    /// Reads the current value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    /// Reads the full entry of a key.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&StoredParameter> {
        self.entries.get(key)
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over keys and current values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, e)| (k.as_str(), e.value.as_str()))
    }

    /// Records every parameter the assembly publishes, in deployment order,
    /// whose key and value can be rendered for `env`. Returns how many were
    /// written.
    pub fn publish_from(&mut self, assembly: &CloudAssembly, env: &Environment) -> usize {
        let mut written = 0;
        for stack in assembly.stacks() {
            for (id, resource) in stack.template.resources_of_type(PARAMETER_TYPE) {
                let name = resource.property("Name").and_then(|v| v.resolve(env));
                let value = resource.property("Value").and_then(|v| v.resolve(env));
                match (name, value) {
                    (Some(name), Some(value)) => {
                        let _ = self.put(name, value);
                        written += 1;
                    }
                    _ => {
                        tracing::debug!(
                            stack = %stack.name,
                            id = %id,
                            "parameter value depends on deploy-time values, not recorded"
                        );
                    }
                }
            }
        }
        written
    }

    /// Resolves a template parameter that reads from the store, returning
    /// the value the engine would substitute.
    #[must_use]
    pub fn lookup(&self, template: &Template, parameter_id: &str) -> Option<&str> {
        let parameter = template.parameter(parameter_id)?;
        if !parameter.parameter_type.starts_with("AWS::SSM::Parameter::Value<") {
            return None;
        }
        self.get(parameter.default.as_deref()?)
    }
}
