//! Container orchestration: cluster, Fargate task definition, and service.

use std::collections::BTreeMap;

use splitstack_common::error::{Result, StackError};
use splitstack_common::types::LogicalId;

use crate::template::Resource;
use crate::value::{Pseudo, Value};

/// `AWS::ECS::Cluster`
pub const CLUSTER_TYPE: &str = "AWS::ECS::Cluster";
/// `AWS::ECS::TaskDefinition`
pub const TASK_DEFINITION_TYPE: &str = "AWS::ECS::TaskDefinition";
/// `AWS::ECS::Service`
pub const SERVICE_TYPE: &str = "AWS::ECS::Service";

/// CPU/memory pairs Fargate accepts for the smallest CPU size.
const QUARTER_VCPU_MEMORY: [u32; 3] = [512, 1024, 2048];

/// Renders an empty cluster.
#[must_use]
pub fn cluster() -> Resource {
    Resource::new(CLUSTER_TYPE)
}

/// Destination of container logs.
#[derive(Debug, Clone, PartialEq)]
pub struct AwsLogs {
    /// Log group receiving the streams.
    pub log_group: LogicalId,
    /// Prefix of every log stream name.
    pub stream_prefix: String,
}

/// A container inside a task definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: Value,
    /// Container ports exposed over TCP.
    pub port_mappings: Vec<u16>,
    /// Plain environment variables.
    pub environment: BTreeMap<String, Value>,
    /// Environment variables injected from secrets at launch.
    pub secrets: BTreeMap<String, Value>,
    /// Log configuration.
    pub logging: Option<AwsLogs>,
}

impl ContainerDefinition {
    /// Creates an essential container with no ports, variables, or logging.
    #[must_use]
    pub fn new(name: impl Into<String>, image: Value) -> Self {
        Self {
            name: name.into(),
            image,
            port_mappings: Vec::new(),
            environment: BTreeMap::new(),
            secrets: BTreeMap::new(),
            logging: None,
        }
    }

    /// Exposes a container port.
    pub fn add_port_mapping(&mut self, container_port: u16) {
        if !self.port_mappings.contains(&container_port) {
            self.port_mappings.push(container_port);
        }
    }

    fn to_value(&self) -> Value {
        let name_value = |(k, v): (&String, &Value), key: &str| {
            Value::object([("Name", Value::from(k.as_str())), (key, v.clone())])
        };
        let mut entries = vec![
            ("Essential", Value::Bool(true)),
            ("Image", self.image.clone()),
            ("Name", Value::from(self.name.as_str())),
        ];
        if !self.environment.is_empty() {
            entries.push((
                "Environment",
                Value::List(self.environment.iter().map(|e| name_value(e, "Value")).collect()),
            ));
        }
        if !self.secrets.is_empty() {
            entries.push((
                "Secrets",
                Value::List(self.secrets.iter().map(|e| name_value(e, "ValueFrom")).collect()),
            ));
        }
        if !self.port_mappings.is_empty() {
            entries.push((
                "PortMappings",
                Value::List(
                    self.port_mappings
                        .iter()
                        .map(|&port| {
                            Value::object([
                                ("ContainerPort", Value::from(port)),
                                ("Protocol", Value::from("tcp")),
                            ])
                        })
                        .collect(),
                ),
            ));
        }
        if let Some(logs) = &self.logging {
            entries.push((
                "LogConfiguration",
                Value::object([
                    ("LogDriver", Value::from("awslogs")),
                    (
                        "Options",
                        Value::object([
                            ("awslogs-group", Value::reference(&logs.log_group)),
                            ("awslogs-region", Value::Pseudo(Pseudo::Region)),
                            ("awslogs-stream-prefix", Value::from(logs.stream_prefix.as_str())),
                        ]),
                    ),
                ]),
            ));
        }
        Value::object(entries)
    }
}

/// A Fargate task definition in `awsvpc` network mode.
#[derive(Debug, Clone, PartialEq)]
pub struct FargateTaskDefinition {
    /// CPU units (256 = 0.25 vCPU).
    pub cpu: u32,
    /// Memory in MiB.
    pub memory_mib: u32,
    /// Role the agent uses to pull images and read secrets.
    pub execution_role: LogicalId,
    /// Containers of the task.
    pub containers: Vec<ContainerDefinition>,
}

impl FargateTaskDefinition {
    /// Creates an empty task definition.
    #[must_use]
    pub const fn new(cpu: u32, memory_mib: u32, execution_role: LogicalId) -> Self {
        Self {
            cpu,
            memory_mib,
            execution_role,
            containers: Vec::new(),
        }
    }

    /// Adds a container and returns a handle for further configuration.
    pub fn add_container(&mut self, container: ContainerDefinition) -> &mut ContainerDefinition {
        self.containers.push(container);
        let last = self.containers.len() - 1;
        &mut self.containers[last]
    }

    /// Renders the task definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the task has no container or the CPU/memory pair
    /// is not one Fargate offers at 0.25 vCPU.
    pub fn to_resource(&self) -> Result<Resource> {
        if self.containers.is_empty() {
            return Err(StackError::Config {
                message: "task definition has no containers".into(),
            });
        }
        if self.cpu == 256 && !QUARTER_VCPU_MEMORY.contains(&self.memory_mib) {
            return Err(StackError::Config {
                message: format!(
                    "{} MiB is not a valid memory size for 256 CPU units",
                    self.memory_mib
                ),
            });
        }
        Ok(Resource::new(TASK_DEFINITION_TYPE)
            .with(
                "ContainerDefinitions",
                Value::List(self.containers.iter().map(ContainerDefinition::to_value).collect()),
            )
            .with("Cpu", self.cpu.to_string())
            .with("ExecutionRoleArn", Value::get_att(&self.execution_role, "Arn"))
            .with("Memory", self.memory_mib.to_string())
            .with("NetworkMode", "awsvpc")
            .with("RequiresCompatibilities", vec![Value::from("FARGATE")]))
    }
}

/// Binding of a container port to a load-balancer target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerTarget {
    /// Container receiving traffic.
    pub container_name: String,
    /// Port on that container.
    pub container_port: u16,
    /// Target group the tasks register with.
    pub target_group: LogicalId,
}

/// A Fargate service running a task definition in private subnets.
#[derive(Debug, Clone, PartialEq)]
pub struct FargateService {
    /// Cluster the service runs in.
    pub cluster: LogicalId,
    /// Task definition to run.
    pub task_definition: LogicalId,
    /// Number of tasks kept running.
    pub desired_count: u32,
    /// Subnets tasks are placed in.
    pub subnet_ids: Vec<Value>,
    /// Security groups attached to tasks.
    pub security_group_ids: Vec<Value>,
    /// Roll back to the last working deployment when new tasks never
    /// stabilize.
    pub circuit_breaker_rollback: bool,
    /// Load balancer registrations.
    pub load_balancers: Vec<LoadBalancerTarget>,
    /// Resources that must exist before the service (e.g. the listener
    /// routing to its target group).
    pub depends_on: Vec<LogicalId>,
}

impl FargateService {
    /// Renders the service.
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(SERVICE_TYPE)
            .with("Cluster", Value::reference(&self.cluster))
            .with(
                "DeploymentConfiguration",
                Value::object([
                    (
                        "DeploymentCircuitBreaker",
                        Value::object([
                            ("Enable", Value::Bool(self.circuit_breaker_rollback)),
                            ("Rollback", Value::Bool(self.circuit_breaker_rollback)),
                        ]),
                    ),
                    ("MaximumPercent", Value::Number(200)),
                    ("MinimumHealthyPercent", Value::Number(50)),
                ]),
            )
            .with(
                "DeploymentController",
                Value::object([("Type", Value::from("ECS"))]),
            )
            .with("DesiredCount", self.desired_count)
            .with("EnableECSManagedTags", false)
            .with("LaunchType", "FARGATE")
            .with(
                "NetworkConfiguration",
                Value::object([(
                    "AwsvpcConfiguration",
                    Value::object([
                        ("AssignPublicIp", Value::from("DISABLED")),
                        ("SecurityGroups", Value::List(self.security_group_ids.clone())),
                        ("Subnets", Value::List(self.subnet_ids.clone())),
                    ]),
                )]),
            )
            .with("TaskDefinition", Value::reference(&self.task_definition));

        if !self.load_balancers.is_empty() {
            resource = resource
                .with("HealthCheckGracePeriodSeconds", 60_u32)
                .with(
                    "LoadBalancers",
                    Value::List(
                        self.load_balancers
                            .iter()
                            .map(|lb| {
                                Value::object([
                                    ("ContainerName", Value::from(lb.container_name.as_str())),
                                    ("ContainerPort", Value::from(lb.container_port)),
                                    ("TargetGroupArn", Value::reference(&lb.target_group)),
                                ])
                            })
                            .collect(),
                    ),
                );
        }
        for dep in &self.depends_on {
            resource = resource.depends_on(dep);
        }
        resource
    }
}
