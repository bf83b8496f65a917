//! Virtual network, NAT strategies, and security groups.
//!
//! [`VpcLayout::declare`] expands a compact network description into the full
//! set of EC2 resources: the VPC, an internet gateway, one subnet with its
//! route table per tier per availability zone, default routes, and either
//! managed NAT gateways or a single NAT instance.

use std::collections::BTreeMap;

use splitstack_common::constants::{DEFAULT_VPC_CIDR, MAX_AZS, NAT_INSTANCE_TYPE, SUBNET_CIDR_MASK};
use splitstack_common::error::{Result, StackError};
use splitstack_common::types::{LogicalId, SubnetTier};

use super::Declared;
use super::iam::{self, Role};
use super::ssm;
use crate::cidr::CidrBlock;
use crate::template::{Parameter, Resource};
use crate::value::Value;

/// `AWS::EC2::VPC`
pub const VPC_TYPE: &str = "AWS::EC2::VPC";
/// `AWS::EC2::Subnet`
pub const SUBNET_TYPE: &str = "AWS::EC2::Subnet";
/// `AWS::EC2::RouteTable`
pub const ROUTE_TABLE_TYPE: &str = "AWS::EC2::RouteTable";
/// `AWS::EC2::SubnetRouteTableAssociation`
pub const ROUTE_TABLE_ASSOCIATION_TYPE: &str = "AWS::EC2::SubnetRouteTableAssociation";
/// `AWS::EC2::Route`
pub const ROUTE_TYPE: &str = "AWS::EC2::Route";
/// `AWS::EC2::InternetGateway`
pub const INTERNET_GATEWAY_TYPE: &str = "AWS::EC2::InternetGateway";
/// `AWS::EC2::VPCGatewayAttachment`
pub const GATEWAY_ATTACHMENT_TYPE: &str = "AWS::EC2::VPCGatewayAttachment";
/// `AWS::EC2::EIP`
pub const EIP_TYPE: &str = "AWS::EC2::EIP";
/// `AWS::EC2::NatGateway`
pub const NAT_GATEWAY_TYPE: &str = "AWS::EC2::NatGateway";
/// `AWS::EC2::Instance`
pub const INSTANCE_TYPE: &str = "AWS::EC2::Instance";
/// `AWS::EC2::SecurityGroup`
pub const SECURITY_GROUP_TYPE: &str = "AWS::EC2::SecurityGroup";
/// `AWS::EC2::SecurityGroupIngress`
pub const SECURITY_GROUP_INGRESS_TYPE: &str = "AWS::EC2::SecurityGroupIngress";

/// Public SSM path of the Amazon Linux 2023 AMI used for NAT instances.
const NAT_AMI_PARAMETER: &str = "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-6.1-x86_64";

/// Boot script turning an Amazon Linux 2023 host into a NAT router.
const NAT_USER_DATA: &str = "#!/bin/bash\n\
yum install iptables-services -y\n\
systemctl enable iptables\n\
systemctl start iptables\n\
echo \"net.ipv4.ip_forward=1\" > /etc/sysctl.d/custom-ip-forwarding.conf\n\
sudo sysctl -p /etc/sysctl.d/custom-ip-forwarding.conf\n\
sudo /sbin/iptables -t nat -A POSTROUTING -o $(route | awk '/^default/{print $NF}') -j MASQUERADE\n\
sudo /sbin/iptables -F FORWARD\n\
sudo service iptables save";

/// One subnet group of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    /// Routing tier.
    pub tier: SubnetTier,
    /// Group name used in logical IDs and tags.
    pub name: String,
    /// Mask of each subnet in the group.
    pub cidr_mask: u8,
}

impl SubnetConfiguration {
    /// Creates a group named after the tier's default group name.
    #[must_use]
    pub fn new(tier: SubnetTier, cidr_mask: u8) -> Self {
        Self {
            tier,
            name: tier.group_name().to_string(),
            cidr_mask,
        }
    }
}

/// How private subnets with egress reach the internet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatStrategy {
    /// Managed NAT gateways. `count = None` places one in every AZ.
    Gateway {
        /// Number of gateways; capped at the number of AZs.
        count: Option<u8>,
    },
    /// A single self-managed NAT instance in the first public subnet.
    Instance {
        /// EC2 instance type of the NAT host.
        instance_type: String,
    },
}

impl NatStrategy {
    /// Redundant managed gateways, one per availability zone.
    #[must_use]
    pub const fn gateway_per_az() -> Self {
        Self::Gateway { count: None }
    }

    /// One low-cost NAT instance of the default type.
    #[must_use]
    pub fn single_instance() -> Self {
        Self::Instance {
            instance_type: NAT_INSTANCE_TYPE.to_string(),
        }
    }
}

/// Declarative description of the virtual network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcLayout {
    /// Address range of the network.
    pub cidr: String,
    /// Number of availability zones to spread subnets over.
    pub max_azs: u8,
    /// NAT strategy for the private-with-egress tier.
    pub nat: NatStrategy,
    /// Subnet groups, allocated in order.
    pub subnets: Vec<SubnetConfiguration>,
}

impl VpcLayout {
    /// A three-tier network with /24 subnets in up to three AZs.
    #[must_use]
    pub fn three_tier(nat: NatStrategy) -> Self {
        Self {
            cidr: DEFAULT_VPC_CIDR.to_string(),
            max_azs: MAX_AZS,
            nat,
            subnets: SubnetTier::ALL
                .iter()
                .map(|&tier| SubnetConfiguration::new(tier, SUBNET_CIDR_MASK))
                .collect(),
        }
    }

    fn validate(&self) -> Result<CidrBlock> {
        let block: CidrBlock = self.cidr.parse()?;
        if self.max_azs == 0 {
            return Err(StackError::Config {
                message: "a network needs at least one availability zone".into(),
            });
        }
        let needs_nat = self.has_tier(SubnetTier::PrivateWithEgress);
        if needs_nat && !self.has_tier(SubnetTier::Public) {
            return Err(StackError::Config {
                message: "private subnets with egress require a public subnet group for NAT".into(),
            });
        }
        if let NatStrategy::Gateway { count: Some(0) } = self.nat {
            if needs_nat {
                return Err(StackError::Config {
                    message: "private subnets with egress require at least one NAT gateway".into(),
                });
            }
        }
        Ok(block)
    }

    fn has_tier(&self, tier: SubnetTier) -> bool {
        self.subnets.iter().any(|s| s.tier == tier)
    }

    /// Expands the description into template resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the CIDR is malformed, the subnets do not fit
    /// inside it, or the tier combination cannot be routed.
    pub fn declare(&self, id: &LogicalId) -> Result<VpcResources> {
        let block = self.validate()?;
        let mut carver = block.carver();
        let mut out = VpcResources {
            vpc: id.clone(),
            cidr: block,
            resources: Vec::new(),
            parameters: Vec::new(),
            subnets: BTreeMap::new(),
            route_tables: BTreeMap::new(),
            nat_gateways: Vec::new(),
            nat_instances: Vec::new(),
        };

        out.resources.push((
            id.clone(),
            Resource::new(VPC_TYPE)
                .with("CidrBlock", block.to_string())
                .with("EnableDnsHostnames", true)
                .with("EnableDnsSupport", true)
                .with("InstanceTenancy", "default")
                .with("Tags", name_tags(id.as_str(), &[])),
        ));

        let igw = id.child("IGW")?;
        let attachment = id.child("VPCGW")?;
        out.resources.push((
            igw.clone(),
            Resource::new(INTERNET_GATEWAY_TYPE).with("Tags", name_tags(id.as_str(), &[])),
        ));
        out.resources.push((
            attachment.clone(),
            Resource::new(GATEWAY_ATTACHMENT_TYPE)
                .with("InternetGatewayId", Value::reference(&igw))
                .with("VpcId", Value::reference(id)),
        ));

        for group in &self.subnets {
            for az in 0..self.max_azs {
                let subnet_cidr = carver.next_block(group.cidr_mask)?;
                Self::declare_subnet(&mut out, group, az, subnet_cidr, &attachment)?;
            }
        }

        if self.has_tier(SubnetTier::PrivateWithEgress) {
            self.declare_nat(&mut out, &attachment)?;
        }

        tracing::debug!(
            vpc = %id,
            resources = out.resources.len(),
            "expanded network description"
        );
        Ok(out)
    }

    fn declare_subnet(
        out: &mut VpcResources,
        group: &SubnetConfiguration,
        az: u8,
        cidr: CidrBlock,
        attachment: &LogicalId,
    ) -> Result<()> {
        let vpc = out.vpc.clone();
        let prefix = vpc.child(&format!("{}Subnet{}", group.name, az + 1))?;
        let subnet = prefix.child("Subnet")?;
        let table = prefix.child("RouteTable")?;
        let path = format!("{}/{}Subnet{}", vpc, group.name, az + 1);

        out.resources.push((
            subnet.clone(),
            Resource::new(SUBNET_TYPE)
                .with("AvailabilityZone", Value::Select(u32::from(az), Box::new(Value::GetAzs)))
                .with("CidrBlock", cidr.to_string())
                .with("MapPublicIpOnLaunch", group.tier.maps_public_ip())
                .with(
                    "Tags",
                    name_tags(
                        &path,
                        &[
                            ("aws-cdk:subnet-name", group.name.as_str()),
                            ("aws-cdk:subnet-type", group.tier.type_tag()),
                        ],
                    ),
                )
                .with("VpcId", Value::reference(&vpc)),
        ));
        out.resources.push((
            table.clone(),
            Resource::new(ROUTE_TABLE_TYPE)
                .with("Tags", name_tags(&path, &[]))
                .with("VpcId", Value::reference(&vpc)),
        ));
        out.resources.push((
            prefix.child("RouteTableAssociation")?,
            Resource::new(ROUTE_TABLE_ASSOCIATION_TYPE)
                .with("RouteTableId", Value::reference(&table))
                .with("SubnetId", Value::reference(&subnet)),
        ));

        if group.tier == SubnetTier::Public {
            out.resources.push((
                prefix.child("DefaultRoute")?,
                Resource::new(ROUTE_TYPE)
                    .with("DestinationCidrBlock", "0.0.0.0/0")
                    .with("GatewayId", Value::reference(&vpc.child("IGW")?))
                    .with("RouteTableId", Value::reference(&table))
                    .depends_on(attachment),
            ));
        }

        out.subnets.entry(group.tier).or_default().push(subnet);
        out.route_tables.entry(group.tier).or_default().push(table);
        Ok(())
    }

    fn declare_nat(&self, out: &mut VpcResources, attachment: &LogicalId) -> Result<()> {
        let public = out
            .subnets
            .get(&SubnetTier::Public)
            .cloned()
            .unwrap_or_default();
        let private_tables = out
            .route_tables
            .get(&SubnetTier::PrivateWithEgress)
            .cloned()
            .unwrap_or_default();

        match &self.nat {
            NatStrategy::Gateway { count } => {
                let wanted = count.map_or(public.len(), usize::from);
                let n = wanted.min(public.len()).max(1);
                for subnet in public.iter().take(n) {
                    let base = strip_suffix(subnet, "Subnet")?;
                    let eip = base.child("EIP")?;
                    let nat = base.child("NATGateway")?;
                    out.resources.push((
                        eip.clone(),
                        Resource::new(EIP_TYPE).with("Domain", "vpc"),
                    ));
                    out.resources.push((
                        nat.clone(),
                        Resource::new(NAT_GATEWAY_TYPE)
                            .with("AllocationId", Value::get_att(&eip, "AllocationId"))
                            .with("SubnetId", Value::reference(subnet))
                            .depends_on(attachment),
                    ));
                    out.nat_gateways.push(nat);
                }
                for (i, table) in private_tables.iter().enumerate() {
                    let nat = &out.nat_gateways[i % out.nat_gateways.len()];
                    out.resources.push((
                        strip_suffix(table, "RouteTable")?.child("DefaultRoute")?,
                        Resource::new(ROUTE_TYPE)
                            .with("DestinationCidrBlock", "0.0.0.0/0")
                            .with("NatGatewayId", Value::reference(nat))
                            .with("RouteTableId", Value::reference(table)),
                    ));
                }
            }
            NatStrategy::Instance { instance_type } => {
                let Some(subnet) = public.first() else {
                    return Err(StackError::Config {
                        message: "NAT instance requires a public subnet".into(),
                    });
                };
                let instance = Self::declare_nat_instance(out, subnet, instance_type, attachment)?;
                for table in &private_tables {
                    out.resources.push((
                        strip_suffix(table, "RouteTable")?.child("DefaultRoute")?,
                        Resource::new(ROUTE_TYPE)
                            .with("DestinationCidrBlock", "0.0.0.0/0")
                            .with("InstanceId", Value::reference(&instance))
                            .with("RouteTableId", Value::reference(table)),
                    ));
                }
            }
        }
        Ok(())
    }

    fn declare_nat_instance(
        out: &mut VpcResources,
        subnet: &LogicalId,
        instance_type: &str,
        attachment: &LogicalId,
    ) -> Result<LogicalId> {
        let vpc = out.vpc.clone();
        let sg = vpc.child("NatSecurityGroup")?;
        let role = vpc.child("NatRole")?;
        let profile = vpc.child("NatInstanceProfile")?;
        let instance = strip_suffix(subnet, "Subnet")?.child("NatInstance")?;

        let security_group = SecurityGroup {
            description: format!("Security Group for NAT instances in {vpc}"),
            vpc_id: Value::reference(&vpc),
            cidr_ingress: vec![CidrIngress {
                cidr: Value::get_att(&vpc, "CidrBlock"),
                protocol: "-1".into(),
                port: None,
                description: "Traffic from inside the network".into(),
            }],
        };
        out.resources.push((sg.clone(), security_group.to_resource()));

        let mut nat_role = Role::for_service("ec2.amazonaws.com");
        nat_role
            .managed_policy_arns
            .push(iam::managed_policy_arn("AmazonSSMManagedInstanceCore"));
        out.resources.extend(nat_role.declare(&role)?);
        out.resources.push((profile.clone(), iam::instance_profile(&role)));

        let (ami_id, ami_param) =
            ssm::parameter_lookup(NAT_AMI_PARAMETER, ssm::IMAGE_ID_PARAMETER_TYPE)?;
        out.parameters.push((ami_id.clone(), ami_param));

        out.resources.push((
            instance.clone(),
            Resource::new(INSTANCE_TYPE)
                .with("IamInstanceProfile", Value::reference(&profile))
                .with("ImageId", Value::reference(&ami_id))
                .with("InstanceType", instance_type)
                .with("SecurityGroupIds", vec![Value::get_att(&sg, "GroupId")])
                .with("SourceDestCheck", false)
                .with("SubnetId", Value::reference(subnet))
                .with(
                    "Tags",
                    name_tags(&format!("{vpc}/{}/NatInstance", strip_suffix(subnet, "Subnet")?), &[]),
                )
                .with("UserData", Value::Base64(Box::new(Value::from(NAT_USER_DATA))))
                .depends_on(&role)
                .depends_on(attachment),
        ));
        out.nat_instances.push(instance.clone());
        Ok(instance)
    }
}

/// Everything [`VpcLayout::declare`] produced, plus handles to the pieces
/// dependent stacks need.
#[derive(Debug, Clone)]
pub struct VpcResources {
    /// Logical ID of the VPC.
    pub vpc: LogicalId,
    /// Address range of the VPC.
    pub cidr: CidrBlock,
    /// Resources in declaration order.
    pub resources: Declared,
    /// Template parameters the resources rely on.
    pub parameters: Vec<(LogicalId, Parameter)>,
    /// Subnet IDs per tier, in AZ order.
    pub subnets: BTreeMap<SubnetTier, Vec<LogicalId>>,
    /// Route table IDs per tier, in AZ order.
    pub route_tables: BTreeMap<SubnetTier, Vec<LogicalId>>,
    /// NAT gateway IDs (gateway strategy).
    pub nat_gateways: Vec<LogicalId>,
    /// NAT instance IDs (instance strategy).
    pub nat_instances: Vec<LogicalId>,
}

impl VpcResources {
    /// Subnet IDs of one tier.
    #[must_use]
    pub fn subnets(&self, tier: SubnetTier) -> &[LogicalId] {
        self.subnets.get(&tier).map_or(&[], Vec::as_slice)
    }
}

/// Inbound rule on a security group from an address range.
#[derive(Debug, Clone, PartialEq)]
pub struct CidrIngress {
    /// Source address range.
    pub cidr: Value,
    /// IP protocol (`tcp`, or `-1` for all).
    pub protocol: String,
    /// TCP port, when the protocol is `tcp`.
    pub port: Option<u16>,
    /// Rule description.
    pub description: String,
}

/// A network access-control group with all outbound traffic allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    /// Group description.
    pub description: String,
    /// VPC the group belongs to.
    pub vpc_id: Value,
    /// Inline address-range ingress rules.
    pub cidr_ingress: Vec<CidrIngress>,
}

impl SecurityGroup {
    /// Creates a group with no inbound rules.
    #[must_use]
    pub fn new(description: impl Into<String>, vpc_id: Value) -> Self {
        Self {
            description: description.into(),
            vpc_id,
            cidr_ingress: Vec::new(),
        }
    }

    /// Renders the group resource.
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(SECURITY_GROUP_TYPE)
            .with("GroupDescription", self.description.as_str())
            .with(
                "SecurityGroupEgress",
                vec![Value::object([
                    ("CidrIp", Value::from("0.0.0.0/0")),
                    ("Description", Value::from("Allow all outbound traffic by default")),
                    ("IpProtocol", Value::from("-1")),
                ])],
            )
            .with("VpcId", self.vpc_id.clone());
        if !self.cidr_ingress.is_empty() {
            let rules: Vec<Value> = self
                .cidr_ingress
                .iter()
                .map(|rule| {
                    let mut entries = vec![
                        ("CidrIp", rule.cidr.clone()),
                        ("Description", Value::from(rule.description.as_str())),
                        ("IpProtocol", Value::from(rule.protocol.as_str())),
                    ];
                    if let Some(port) = rule.port {
                        entries.push(("FromPort", Value::from(port)));
                        entries.push(("ToPort", Value::from(port)));
                    }
                    Value::object(entries)
                })
                .collect();
            resource = resource.with("SecurityGroupIngress", rules);
        }
        resource
    }
}

/// A directional TCP rule between two security groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// Group whose members may connect.
    pub source: LogicalId,
    /// Group receiving the traffic.
    pub target: LogicalId,
    /// TCP port opened on the target.
    pub port: u16,
    /// Rule description.
    pub description: String,
}

impl IngressRule {
    /// Logical ID CloudFormation-style: `<target>from<source><port>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn logical_id(&self) -> Result<LogicalId> {
        self.target
            .child(&format!("from{}{}", self.source, self.port))
    }

    /// Renders the standalone ingress resource.
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        Resource::new(SECURITY_GROUP_INGRESS_TYPE)
            .with("Description", self.description.as_str())
            .with("FromPort", self.port)
            .with("GroupId", Value::get_att(&self.target, "GroupId"))
            .with("IpProtocol", "tcp")
            .with("SourceSecurityGroupId", Value::get_att(&self.source, "GroupId"))
            .with("ToPort", self.port)
    }
}

fn name_tags(name: &str, extra: &[(&str, &str)]) -> Value {
    let mut tags: Vec<(&str, &str)> = extra.to_vec();
    tags.push(("Name", name));
    tags.sort_unstable();
    Value::List(
        tags.into_iter()
            .map(|(k, v)| Value::object([("Key", Value::from(k)), ("Value", Value::from(v))]))
            .collect(),
    )
}

fn strip_suffix(id: &LogicalId, suffix: &str) -> Result<LogicalId> {
    let base = id.as_str().strip_suffix(suffix).unwrap_or(id.as_str());
    LogicalId::new(base)
}
