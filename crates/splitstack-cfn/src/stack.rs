//! Stacks: one template plus the bookkeeping needed to deploy it alongside
//! other stacks (cross-stack exports, ordering, image assets).

use std::collections::BTreeSet;

use splitstack_common::error::{Result, StackError};
use splitstack_common::types::LogicalId;

use crate::resources::Declared;
use crate::resources::ecr_assets::DockerImageAsset;
use crate::template::{Export, Output, Parameter, Resource, Template};
use crate::value::Value;

/// Prefix of outputs created by [`Stack::export_value`].
const EXPORT_OUTPUT_PREFIX: &str = "ExportsOutput";

/// Handle to a value exported by one stack for others to import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportedValue {
    /// Name of the producing stack.
    pub stack: String,
    /// Region-unique export name, `<stack>:<output id>`.
    pub export_name: String,
}

/// A named deployment unit.
#[derive(Debug, Clone)]
pub struct Stack {
    /// Stack name, unique within the app.
    pub name: String,
    /// Resources, parameters and outputs.
    pub template: Template,
    /// Stacks that must be deployed before this one.
    pub dependencies: BTreeSet<String>,
    /// Container images that must be published before deploying.
    pub assets: Vec<DockerImageAsset>,
}

impl Stack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: Template::default(),
            dependencies: BTreeSet::new(),
            assets: Vec::new(),
        }
    }

    /// Sets the template description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.template.description = Some(description.into());
        self
    }

    /// Declares one resource.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the logical ID is taken.
    pub fn add(&mut self, id: LogicalId, resource: Resource) -> Result<()> {
        self.template.add_resource(id, resource)
    }

    /// Declares every resource a builder expanded into.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` on the first logical ID clash.
    pub fn add_all(&mut self, declared: Declared) -> Result<()> {
        for (id, resource) in declared {
            self.add(id, resource)?;
        }
        Ok(())
    }

    /// Declares a template parameter.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the ID clashes.
    pub fn add_parameter(&mut self, id: LogicalId, parameter: Parameter) -> Result<()> {
        self.template.add_parameter(id, parameter)
    }

    /// Declares a plain output shown to the operator after deployment.
    ///
    /// # Errors
    ///
    /// Returns `StackError::DuplicateId` if the output ID is taken.
    pub fn add_output(
        &mut self,
        id: LogicalId,
        value: Value,
        description: Option<&str>,
    ) -> Result<()> {
        let output = Output {
            description: description.map(ToString::to_string),
            ..Output::new(value)
        };
        self.template.add_output(id, output)
    }

    /// Exports a `Ref` or `Fn::GetAtt` of a resource in this stack.
    ///
    /// The output ID is derived from the value, so exporting the same value
    /// twice yields the same handle.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Config` for values other than `Ref`/`GetAtt`,
    /// or `StackError::NotFound` if the target is not declared here.
    pub fn export_value(&mut self, value: &Value) -> Result<ExportedValue> {
        let (target, suffix) = match value {
            Value::Ref(id) => (id, format!("Ref{id}")),
            Value::GetAtt(id, attr) => {
                let attr: String = attr.chars().filter(char::is_ascii_alphanumeric).collect();
                (id, format!("FnGetAtt{id}{attr}"))
            }
            other => {
                return Err(StackError::Config {
                    message: format!(
                        "stack {}: only Ref and Fn::GetAtt values can be exported, got {}",
                        self.name,
                        other.to_json()
                    ),
                });
            }
        };
        if self.template.resource(target.as_str()).is_none() {
            return Err(StackError::NotFound {
                kind: "resource",
                id: format!("{}/{target}", self.name),
            });
        }

        let output_id = LogicalId::new(format!("{EXPORT_OUTPUT_PREFIX}{suffix}"))?;
        let export_name = format!("{}:{output_id}", self.name);
        if self.template.output(output_id.as_str()).is_none() {
            let output = Output {
                export: Some(Export {
                    name: export_name.clone(),
                }),
                ..Output::new(value.clone())
            };
            self.template.add_output(output_id, output)?;
            tracing::debug!(stack = %self.name, export = %export_name, "exported value");
        }
        Ok(ExportedValue {
            stack: self.name.clone(),
            export_name,
        })
    }

    /// Imports another stack's export and records the deploy-order
    /// dependency on it.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Config` when importing from this same stack.
    pub fn import_value(&mut self, exported: &ExportedValue) -> Result<Value> {
        if exported.stack == self.name {
            return Err(StackError::Config {
                message: format!(
                    "stack {} cannot import its own export {}",
                    self.name, exported.export_name
                ),
            });
        }
        self.add_dependency(&exported.stack);
        Ok(Value::ImportValue(exported.export_name.clone()))
    }

    /// Records that `stack` must be deployed before this one.
    pub fn add_dependency(&mut self, stack: &str) {
        if self.dependencies.insert(stack.to_string()) {
            tracing::debug!(stack = %self.name, depends_on = %stack, "added stack dependency");
        }
    }

    /// Attaches a container image to publish before deployment.
    pub fn add_asset(&mut self, asset: DockerImageAsset) {
        if !self.assets.contains(&asset) {
            self.assets.push(asset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).expect("valid id")
    }

    fn stack_with_vpc() -> Stack {
        let mut stack = Stack::new("VpcStack");
        stack
            .add(id("VPC"), Resource::new("AWS::EC2::VPC"))
            .expect("add");
        stack
    }

    #[test]
    fn export_names_follow_output_ids() {
        let mut stack = stack_with_vpc();
        let by_ref = stack
            .export_value(&Value::reference(&id("VPC")))
            .expect("export");
        assert_eq!(by_ref.export_name, "VpcStack:ExportsOutputRefVPC");

        let by_att = stack
            .export_value(&Value::get_att(&id("VPC"), "CidrBlock"))
            .expect("export");
        assert_eq!(by_att.export_name, "VpcStack:ExportsOutputFnGetAttVPCCidrBlock");
        assert_eq!(stack.template.export_names().len(), 2);
    }

    #[test]
    fn exporting_twice_is_idempotent() {
        let mut stack = stack_with_vpc();
        let a = stack
            .export_value(&Value::reference(&id("VPC")))
            .expect("first");
        let b = stack
            .export_value(&Value::reference(&id("VPC")))
            .expect("second");
        assert_eq!(a, b);
        assert_eq!(stack.template.outputs.len(), 1);
    }

    #[test]
    fn exporting_unknown_or_literal_values_fails() {
        let mut stack = stack_with_vpc();
        assert!(stack.export_value(&Value::reference(&id("Missing"))).is_err());
        assert!(stack.export_value(&Value::from("literal")).is_err());
    }

    #[test]
    fn import_records_dependency() {
        let mut producer = stack_with_vpc();
        let exported = producer
            .export_value(&Value::reference(&id("VPC")))
            .expect("export");

        let mut consumer = Stack::new("EcsStack");
        let value = consumer.import_value(&exported).expect("import");
        assert_eq!(
            value,
            Value::ImportValue("VpcStack:ExportsOutputRefVPC".into())
        );
        assert!(consumer.dependencies.contains("VpcStack"));
        assert!(producer.import_value(&exported).is_err());
    }

    #[test]
    fn add_all_stops_at_duplicate() {
        let mut stack = stack_with_vpc();
        let err = stack
            .add_all(vec![
                (id("Igw"), Resource::new("AWS::EC2::InternetGateway")),
                (id("VPC"), Resource::new("AWS::EC2::VPC")),
            ])
            .unwrap_err();
        assert!(err.to_string().contains("VPC"), "got: {err}");
    }
}
