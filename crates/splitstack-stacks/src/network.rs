//! Network unit: a three-tier VPC whose NAT strategy depends on the
//! deployment context.

use std::collections::BTreeMap;

use splitstack_cfn::app::App;
use splitstack_cfn::resources::ec2::{NatStrategy, VpcLayout, VpcResources};
use splitstack_cfn::stack::{ExportedValue, Stack};
use splitstack_cfn::value::Value;
use splitstack_common::config::AppConfig;
use splitstack_common::constants::NETWORK_STACK;
use splitstack_common::error::Result;
use splitstack_common::types::{LogicalId, SubnetTier};

/// Logical ID of the VPC inside the network stack.
pub const VPC_ID: &str = "VPC";

/// What dependent units need from the network: the VPC and the subnets of
/// each tier, all as cross-stack exports.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    /// Name of the network stack.
    pub stack: String,
    /// Export of the VPC ID.
    pub vpc_id: ExportedValue,
    /// NAT strategy the network was built with.
    pub nat: NatStrategy,
    subnets: BTreeMap<SubnetTier, Vec<ExportedValue>>,
}

impl NetworkHandle {
    /// Exports of the subnet IDs of one tier, in AZ order.
    #[must_use]
    pub fn subnets(&self, tier: SubnetTier) -> &[ExportedValue] {
        self.subnets.get(&tier).map_or(&[], Vec::as_slice)
    }
}

/// Managed NAT gateways in production, one cheap NAT instance elsewhere.
#[must_use]
pub fn nat_strategy(config: &AppConfig) -> NatStrategy {
    if config.is_production() {
        NatStrategy::gateway_per_az()
    } else {
        NatStrategy::single_instance()
    }
}

/// Declares the network stack and adds it to `app`.
///
/// # Errors
///
/// Returns an error if the network cannot be laid out or the stack name is
/// already taken.
pub fn build(app: &mut App) -> Result<NetworkHandle> {
    let nat = nat_strategy(app.config());
    tracing::info!(
        stack = NETWORK_STACK,
        production = app.is_production(),
        nat = ?nat,
        "building network unit"
    );

    let vpc = LogicalId::new(VPC_ID)?;
    let VpcResources {
        resources,
        parameters,
        subnets: subnet_ids,
        ..
    } = VpcLayout::three_tier(nat.clone()).declare(&vpc)?;

    let mut stack = Stack::new(NETWORK_STACK)
        .with_description("Three-tier network with NAT egress for private subnets");
    for (id, parameter) in parameters {
        stack.add_parameter(id, parameter)?;
    }
    stack.add_all(resources)?;

    let vpc_id = stack.export_value(&Value::reference(&vpc))?;
    let mut subnets = BTreeMap::new();
    for (tier, ids) in &subnet_ids {
        let exports = ids
            .iter()
            .map(|id| stack.export_value(&Value::reference(id)))
            .collect::<Result<Vec<_>>>()?;
        let _ = subnets.insert(*tier, exports);
    }

    app.add_stack(stack)?;
    Ok(NetworkHandle {
        stack: NETWORK_STACK.to_string(),
        vpc_id,
        nat,
        subnets,
    })
}
