//! CloudFormation template model.
//!
//! A [`Template`] is the static resource description of one stack. All maps
//! are ordered so that rendering is deterministic across runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use splitstack_common::constants::TEMPLATE_FORMAT_VERSION;
use splitstack_common::error::{Result, StackError};
use splitstack_common::types::LogicalId;

use crate::value::Value;

/// What the engine does with a resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    /// Delete the physical resource.
    Delete,
    /// Take a final snapshot, then delete.
    Snapshot,
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    /// CloudFormation resource type, e.g. `AWS::EC2::VPC`.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Resource properties.
    #[serde(rename = "Properties", skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    /// Explicit ordering dependencies inside the template.
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
    /// Deletion behavior on teardown.
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    /// Replacement behavior on update; mirrors the deletion policy.
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    /// Creates a resource of the given type with no properties.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets a property only when a value is present.
    #[must_use]
    pub fn with_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Adds an explicit `DependsOn` edge.
    #[must_use]
    pub fn depends_on(mut self, id: &LogicalId) -> Self {
        if !self.depends_on.contains(id) {
            self.depends_on.push(id.clone());
        }
        self
    }

    /// Sets both the deletion and the update-replace policy.
    #[must_use]
    pub const fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Looks up a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns every logical ID this resource depends on, implicitly
    /// (through values) or explicitly (through `DependsOn`).
    #[must_use]
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs: BTreeSet<String> = self
            .properties
            .values()
            .flat_map(Value::references)
            .collect();
        refs.extend(self.depends_on.iter().map(ToString::to_string));
        refs
    }
}

/// A template input parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    /// Parameter type, e.g. `String` or `AWS::SSM::Parameter::Value<String>`.
    #[serde(rename = "Type")]
    pub parameter_type: String,
    /// Default value.
    #[serde(rename = "Default", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Human-readable description.
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A stack output, optionally exported for other stacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    /// Output value.
    #[serde(rename = "Value")]
    pub value: Value,
    /// Human-readable description.
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Export name, when other stacks may import this value.
    #[serde(rename = "Export", skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    /// Creates a plain (non-exported) output.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
            export: None,
        }
    }
}

/// Export declaration of an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    /// Region-unique export name.
    #[serde(rename = "Name")]
    pub name: String,
}

/// A complete CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    /// Template format version.
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    /// Template description.
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input parameters.
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<LogicalId, Parameter>,
    /// Declared resources.
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<LogicalId, Resource>,
    /// Outputs.
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<LogicalId, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl Template {
    /// Declares a resource.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the logical ID is already used
    /// by a resource or parameter.
    pub fn add_resource(&mut self, id: LogicalId, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&id) || self.parameters.contains_key(&id) {
            return Err(StackError::DuplicateId {
                scope: "template",
                id: id.to_string(),
            });
        }
        tracing::debug!(id = %id, resource_type = %resource.resource_type, "declared resource");
        let _ = self.resources.insert(id, resource);
        Ok(())
    }

    /// Declares a parameter. Re-declaring an identical parameter is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the ID clashes with a resource or
    /// a different parameter.
    pub fn add_parameter(&mut self, id: LogicalId, parameter: Parameter) -> Result<()> {
        if let Some(existing) = self.parameters.get(&id) {
            if *existing == parameter {
                return Ok(());
            }
        }
        if self.resources.contains_key(&id) || self.parameters.contains_key(&id) {
            return Err(StackError::DuplicateId {
                scope: "template",
                id: id.to_string(),
            });
        }
        let _ = self.parameters.insert(id, parameter);
        Ok(())
    }

    /// Declares an output.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the output ID is already used.
    pub fn add_output(&mut self, id: LogicalId, output: Output) -> Result<()> {
        if self.outputs.contains_key(&id) {
            return Err(StackError::DuplicateId {
                scope: "output",
                id: id.to_string(),
            });
        }
        let _ = self.outputs.insert(id, output);
        Ok(())
    }

    /// Looks up a resource by logical ID.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Looks up a parameter by logical ID.
    #[must_use]
    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.get(id)
    }

    /// Looks up an output by logical ID.
    #[must_use]
    pub fn output(&self, id: &str) -> Option<&Output> {
        self.outputs.get(id)
    }

    /// Returns every resource of the given type, with its logical ID.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Every export name this template declares.
    #[must_use]
    pub fn export_names(&self) -> Vec<&str> {
        self.outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.as_str()))
            .collect()
    }

    /// Every export name this template imports.
    #[must_use]
    pub fn imported_names(&self) -> BTreeSet<String> {
        let from_resources = self
            .resources
            .values()
            .flat_map(|r| r.properties.values().flat_map(Value::imports));
        let from_outputs = self.outputs.values().flat_map(|o| o.value.imports());
        from_resources.chain(from_outputs).collect()
    }

    /// Renders the template as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Renders the template as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Renders the template as a JSON tree, for inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
