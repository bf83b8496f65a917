//! Compute unit: database, load balancer, container service and the API
//! gateway in front of it.
//!
//! The service image is not taken from the registry handle. It is read from
//! the parameter store when this stack deploys, so the image built by the
//! registry unit can change without re-synthesizing this stack.

use splitstack_cfn::app::App;
use splitstack_cfn::resources::apigateway::ProxyRestApi;
use splitstack_cfn::resources::ec2::{CidrIngress, IngressRule, SecurityGroup};
use splitstack_cfn::resources::ecs::{
    self, AwsLogs, ContainerDefinition, FargateService, FargateTaskDefinition, LoadBalancerTarget,
};
use splitstack_cfn::resources::elbv2::{self, ApplicationLoadBalancer, HealthCheck, HttpListener};
use splitstack_cfn::resources::iam::{PolicyStatement, Role};
use splitstack_cfn::resources::logs::LogGroup;
use splitstack_cfn::resources::rds::{self, DatabaseInstance};
use splitstack_cfn::resources::secretsmanager::{self, GeneratedSecret};
use splitstack_cfn::resources::ssm;
use splitstack_cfn::stack::{ExportedValue, Stack};
use splitstack_cfn::value::Value;
use splitstack_common::constants::{
    COMPUTE_STACK, CONTAINER_NAME, CONTAINER_PORT, DATABASE_PORT, DATABASE_USERNAME,
    IMAGE_URI_PARAMETER, LISTENER_PORT, SECRET_EXCLUDED_CHARACTERS, TASK_CPU_UNITS,
    TASK_MEMORY_MIB,
};
use splitstack_common::error::Result;
use splitstack_common::types::{LogicalId, SubnetTier};

use crate::network::NetworkHandle;
use crate::registry::RegistryHandle;

/// Logical IDs declared by the compute stack.
pub mod ids {
    /// Database security group.
    pub const DATABASE_SECURITY_GROUP: &str = "RdsSG";
    /// Generated database credentials.
    pub const DATABASE_SECRET: &str = "RdsSecret";
    /// Database instance.
    pub const DATABASE: &str = "RdsInstance";
    /// Load balancer.
    pub const LOAD_BALANCER: &str = "Alb";
    /// Load balancer security group.
    pub const LOAD_BALANCER_SECURITY_GROUP: &str = "AlbSecurityGroup";
    /// Load balancer HTTP listener.
    pub const LISTENER: &str = "AlbListener";
    /// Container cluster.
    pub const CLUSTER: &str = "Cluster";
    /// Role the container agent assumes to pull images and read secrets.
    pub const EXECUTION_ROLE: &str = "TaskExecutionRole";
    /// Task definition.
    pub const TASK_DEFINITION: &str = "TaskDef";
    /// Container log group.
    pub const LOG_GROUP: &str = "LogGroup";
    /// Service security group.
    pub const SERVICE_SECURITY_GROUP: &str = "ECSSecurityGroup";
    /// Container service.
    pub const SERVICE: &str = "Service";
    /// REST API.
    pub const API: &str = "ApiGateway";
    /// Output holding the load balancer DNS name.
    pub const LOAD_BALANCER_DNS_OUTPUT: &str = "LoadBalancerDNS";
    /// Output holding the API URL.
    pub const API_URL_OUTPUT: &str = "ApiGatewayURL";
}

/// Stream prefix of container logs.
pub const LOG_STREAM_PREFIX: &str = "ecs-fargate-app";

/// Name of the database created on the instance.
pub const DATABASE_NAME: &str = "MyDatabase";

/// Actions the execution role needs to pull from the registry.
pub const IMAGE_PULL_ACTIONS: [&str; 4] = [
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetAuthorizationToken",
];

/// What the compute unit produced.
#[derive(Debug, Clone)]
pub struct ComputeHandle {
    /// Name of the compute stack.
    pub stack: String,
    /// Logical ID of the load balancer.
    pub load_balancer: LogicalId,
    /// Logical ID of the container service.
    pub service: LogicalId,
    /// Logical ID of the REST API.
    pub api: LogicalId,
}

fn id(s: &str) -> Result<LogicalId> {
    LogicalId::new(s)
}

fn group_id(sg: &LogicalId) -> Value {
    Value::get_att(sg, "GroupId")
}

fn import_all(stack: &mut Stack, exports: &[ExportedValue]) -> Result<Vec<Value>> {
    exports.iter().map(|e| stack.import_value(e)).collect()
}

/// Declares the compute stack and adds it to `app`.
///
/// # Errors
///
/// Returns an error if a resource cannot be declared or the stack name is
/// already taken.
pub fn build(
    app: &mut App,
    network: &NetworkHandle,
    registry: &RegistryHandle,
) -> Result<ComputeHandle> {
    tracing::info!(stack = COMPUTE_STACK, "building compute unit");
    let mut stack = Stack::new(COMPUTE_STACK)
        .with_description("Database, load balancer, container service and API gateway");

    let vpc_id = stack.import_value(&network.vpc_id)?;
    let public_subnets = import_all(&mut stack, network.subnets(SubnetTier::Public))?;
    let private_subnets = import_all(&mut stack, network.subnets(SubnetTier::PrivateWithEgress))?;
    let isolated_subnets = import_all(&mut stack, network.subnets(SubnetTier::PrivateIsolated))?;
    stack.add_dependency(&registry.stack);

    let (image_parameter, lookup) = ssm::value_for_string_parameter(IMAGE_URI_PARAMETER)?;
    stack.add_parameter(image_parameter.clone(), lookup)?;

    // Database, in the isolated tier.
    let rds_sg = id(ids::DATABASE_SECURITY_GROUP)?;
    stack.add(
        rds_sg.clone(),
        SecurityGroup::new(format!("{COMPUTE_STACK}/{rds_sg}"), vpc_id.clone()).to_resource(),
    )?;

    let secret = id(ids::DATABASE_SECRET)?;
    stack.add(
        secret.clone(),
        GeneratedSecret::credentials(DATABASE_USERNAME, SECRET_EXCLUDED_CHARACTERS)
            .to_resource()?,
    )?;

    let database = id(ids::DATABASE)?;
    stack.add_all(
        DatabaseInstance::mysql_micro(
            DATABASE_NAME,
            isolated_subnets,
            vec![group_id(&rds_sg)],
            secret.clone(),
        )
        .declare(&database)?,
    )?;

    // Load balancer, in the public tier, open on the listener port.
    let alb_sg = id(ids::LOAD_BALANCER_SECURITY_GROUP)?;
    let mut alb_group = SecurityGroup::new(
        format!("Automatically created Security Group for ELB {COMPUTE_STACK}/Alb"),
        vpc_id.clone(),
    );
    alb_group.cidr_ingress.push(CidrIngress {
        cidr: Value::from("0.0.0.0/0"),
        protocol: "tcp".into(),
        port: Some(LISTENER_PORT),
        description: format!("Allow from anyone on port {LISTENER_PORT}"),
    });
    stack.add(alb_sg.clone(), alb_group.to_resource())?;

    let alb = id(ids::LOAD_BALANCER)?;
    let load_balancer = ApplicationLoadBalancer {
        internet_facing: true,
        subnet_ids: public_subnets,
        security_group_ids: vec![group_id(&alb_sg)],
    };
    stack.add(alb.clone(), load_balancer.to_resource())?;

    let cluster = id(ids::CLUSTER)?;
    stack.add(cluster.clone(), ecs::cluster())?;

    // Task execution: pull the image, read the credentials, write logs.
    let log_group = id(ids::LOG_GROUP)?;
    stack.add(log_group.clone(), LogGroup::one_week().to_resource())?;

    let execution_role = id(ids::EXECUTION_ROLE)?;
    let mut role = Role::for_service("ecs-tasks.amazonaws.com");
    role.add_to_policy(PolicyStatement::allow(
        IMAGE_PULL_ACTIONS,
        vec![Value::from("*")],
    ));
    role.add_to_policy(PolicyStatement::allow(
        ["secretsmanager:DescribeSecret", "secretsmanager:GetSecretValue"],
        vec![Value::reference(&secret)],
    ));
    role.add_to_policy(PolicyStatement::allow(
        ["logs:CreateLogStream", "logs:PutLogEvents"],
        vec![Value::get_att(&log_group, "Arn")],
    ));
    stack.add_all(role.declare(&execution_role)?)?;
    let execution_policy = Role::default_policy_id(&execution_role)?;

    let mut container = ContainerDefinition::new(CONTAINER_NAME, Value::reference(&image_parameter));
    container.add_port_mapping(CONTAINER_PORT);
    let _ = container
        .environment
        .insert("RDS_ENDPOINT".into(), rds::endpoint_address(&database));
    let _ = container.secrets.insert(
        "RDS_USERNAME".into(),
        secretsmanager::field_reference(&secret, "username"),
    );
    let _ = container.secrets.insert(
        "RDS_PASSWORD".into(),
        secretsmanager::field_reference(&secret, "password"),
    );
    container.logging = Some(AwsLogs {
        log_group: log_group.clone(),
        stream_prefix: LOG_STREAM_PREFIX.into(),
    });

    let task_definition = id(ids::TASK_DEFINITION)?;
    let mut task = FargateTaskDefinition::new(TASK_CPU_UNITS, TASK_MEMORY_MIB, execution_role);
    let _ = task.add_container(container);
    stack.add(task_definition.clone(), task.to_resource()?)?;

    // Service-side group: the only path into the database, and reachable
    // from the load balancer on the container port.
    let ecs_sg = id(ids::SERVICE_SECURITY_GROUP)?;
    stack.add(
        ecs_sg.clone(),
        SecurityGroup::new(format!("{COMPUTE_STACK}/{ecs_sg}"), vpc_id.clone()).to_resource(),
    )?;
    for rule in [
        IngressRule {
            source: ecs_sg.clone(),
            target: rds_sg.clone(),
            port: DATABASE_PORT,
            description: "Allow traffic from ECS".into(),
        },
        IngressRule {
            source: alb_sg.clone(),
            target: ecs_sg.clone(),
            port: CONTAINER_PORT,
            description: "Load balancer to target".into(),
        },
    ] {
        stack.add(rule.logical_id()?, rule.to_resource())?;
    }

    let listener = id(ids::LISTENER)?;
    let http = HttpListener {
        load_balancer: alb.clone(),
        port: LISTENER_PORT,
        target_port: LISTENER_PORT,
        vpc_id,
        health_check: HealthCheck::http_root(),
    };
    stack.add_all(http.declare(&listener)?)?;

    let service = id(ids::SERVICE)?;
    let fargate = FargateService {
        cluster,
        task_definition,
        desired_count: 1,
        subnet_ids: private_subnets,
        security_group_ids: vec![group_id(&ecs_sg)],
        circuit_breaker_rollback: true,
        load_balancers: vec![LoadBalancerTarget {
            container_name: CONTAINER_NAME.into(),
            container_port: CONTAINER_PORT,
            target_group: HttpListener::target_group_id(&listener)?,
        }],
        // Tasks must not start before the role can pull and read secrets.
        depends_on: vec![listener, execution_policy],
    };
    stack.add(service.clone(), fargate.to_resource())?;

    // Public entry point: every method on the root proxied to the balancer.
    let api = id(ids::API)?;
    let rest_api = ProxyRestApi {
        name: "Service API".into(),
        description: "API Gateway on top of ALB".into(),
        integration_uri: Value::concat(vec!["http://".into(), elbv2::dns_name(&alb)]),
        stage_name: "prod".into(),
    };
    stack.add_all(rest_api.declare(&api)?)?;

    stack.add_output(
        id(ids::LOAD_BALANCER_DNS_OUTPUT)?,
        elbv2::dns_name(&alb),
        Some("Public DNS name of the load balancer"),
    )?;
    stack.add_output(
        id(ids::API_URL_OUTPUT)?,
        rest_api.url(&api)?,
        Some("Invoke URL of the API gateway"),
    )?;

    app.add_stack(stack)?;
    Ok(ComputeHandle {
        stack: COMPUTE_STACK.to_string(),
        load_balancer: alb,
        service,
        api,
    })
}
