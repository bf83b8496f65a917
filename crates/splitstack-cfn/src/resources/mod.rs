//! Typed builders for the resource families the composition units use.
//!
//! Each builder holds only the knobs the stacks set and expands into one or
//! more template resources with fully-formed CloudFormation properties.

pub mod apigateway;
pub mod ec2;
pub mod ecr_assets;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod logs;
pub mod rds;
pub mod secretsmanager;
pub mod ssm;

use splitstack_common::types::LogicalId;

use crate::template::Resource;

/// Resources produced by one builder, in declaration order.
pub type Declared = Vec<(LogicalId, Resource)>;
