//! Application load balancer, listener, and target group.

use splitstack_common::error::Result;
use splitstack_common::types::LogicalId;

use super::Declared;
use crate::template::Resource;
use crate::value::Value;

/// `AWS::ElasticLoadBalancingV2::LoadBalancer`
pub const LOAD_BALANCER_TYPE: &str = "AWS::ElasticLoadBalancingV2::LoadBalancer";
/// `AWS::ElasticLoadBalancingV2::Listener`
pub const LISTENER_TYPE: &str = "AWS::ElasticLoadBalancingV2::Listener";
/// `AWS::ElasticLoadBalancingV2::TargetGroup`
pub const TARGET_GROUP_TYPE: &str = "AWS::ElasticLoadBalancingV2::TargetGroup";

/// An application load balancer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationLoadBalancer {
    /// Whether the balancer gets a public DNS name.
    pub internet_facing: bool,
    /// Subnets the balancer spans.
    pub subnet_ids: Vec<Value>,
    /// Security groups of the balancer.
    pub security_group_ids: Vec<Value>,
}

impl ApplicationLoadBalancer {
    /// Renders the balancer resource.
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        let scheme = if self.internet_facing {
            "internet-facing"
        } else {
            "internal"
        };
        Resource::new(LOAD_BALANCER_TYPE)
            .with(
                "LoadBalancerAttributes",
                vec![Value::object([
                    ("Key", Value::from("deletion_protection.enabled")),
                    ("Value", Value::from("false")),
                ])],
            )
            .with("Scheme", scheme)
            .with("SecurityGroups", self.security_group_ids.clone())
            .with("Subnets", self.subnet_ids.clone())
            .with("Type", "application")
    }
}

/// Public DNS name of a balancer.
#[must_use]
pub fn dns_name(id: &LogicalId) -> Value {
    Value::get_att(id, "DNSName")
}

/// HTTP health check of a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Request path.
    pub path: String,
    /// Seconds between checks.
    pub interval_seconds: u32,
    /// Seconds before a check counts as failed.
    pub timeout_seconds: u32,
    /// HTTP codes counted as healthy, e.g. `200-299`.
    pub healthy_http_codes: String,
}

impl HealthCheck {
    /// `GET /` every 30s with a 5s timeout, any 2xx is healthy.
    #[must_use]
    pub fn http_root() -> Self {
        Self {
            path: "/".into(),
            interval_seconds: 30,
            timeout_seconds: 5,
            healthy_http_codes: "200-299".into(),
        }
    }
}

/// An HTTP listener forwarding everything to one target group, whose
/// targets are addressed by IP (as awsvpc tasks are).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpListener {
    /// Balancer the listener belongs to.
    pub load_balancer: LogicalId,
    /// Port the listener accepts traffic on.
    pub port: u16,
    /// Port traffic is sent to on targets.
    pub target_port: u16,
    /// VPC of the targets.
    pub vpc_id: Value,
    /// Target health check.
    pub health_check: HealthCheck,
}

impl HttpListener {
    /// Logical ID of the target group declared for `listener`.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived ID is invalid.
    pub fn target_group_id(listener: &LogicalId) -> Result<LogicalId> {
        listener.child("ECSGroup")
    }

    /// Expands into the listener and its target group.
    ///
    /// # Errors
    ///
    /// Returns an error if a derived logical ID is invalid.
    pub fn declare(&self, id: &LogicalId) -> Result<Declared> {
        let group_id = Self::target_group_id(id)?;
        let hc = &self.health_check;
        let group = Resource::new(TARGET_GROUP_TYPE)
            .with("HealthCheckIntervalSeconds", hc.interval_seconds)
            .with("HealthCheckPath", hc.path.as_str())
            .with("HealthCheckTimeoutSeconds", hc.timeout_seconds)
            .with(
                "Matcher",
                Value::object([("HttpCode", Value::from(hc.healthy_http_codes.as_str()))]),
            )
            .with("Port", self.target_port)
            .with("Protocol", "HTTP")
            .with(
                "TargetGroupAttributes",
                vec![Value::object([
                    ("Key", Value::from("stickiness.enabled")),
                    ("Value", Value::from("false")),
                ])],
            )
            .with("TargetType", "ip")
            .with("VpcId", self.vpc_id.clone());

        let listener = Resource::new(LISTENER_TYPE)
            .with(
                "DefaultActions",
                vec![Value::object([
                    ("TargetGroupArn", Value::reference(&group_id)),
                    ("Type", Value::from("forward")),
                ])],
            )
            .with("LoadBalancerArn", Value::reference(&self.load_balancer))
            .with("Port", self.port)
            .with("Protocol", "HTTP");

        Ok(vec![(id.clone(), listener), (group_id, group)])
    }
}
