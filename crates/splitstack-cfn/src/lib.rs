//! # splitstack-cfn
//!
//! Strongly typed CloudFormation toolkit.
//!
//! Handles:
//! - **Values**: literals and intrinsic functions (`Ref`, `Fn::GetAtt`, ...).
//! - **Templates**: resources, parameters, and outputs rendered to JSON or YAML.
//! - **Resources**: typed builders for the AWS resources the stacks declare.
//! - **Stacks and apps**: cross-stack exports and imports, deployment ordering.
//! - **Validation**: dangling references and export mismatches caught before synthesis.
//! - **Assembly**: the on-disk output a deployer consumes.

pub mod app;
pub mod assembly;
pub mod cidr;
pub mod graph;
pub mod resources;
pub mod stack;
pub mod template;
pub mod validator;
pub mod value;
