//! End-to-end tests for the composed deployment.
//!
//! These tests synthesize the full app and inspect the rendered templates:
//! 1. NAT strategy per context
//! 2. Subnet tiers
//! 3. Database access path
//! 4. Container definition and image lookup through the parameter store
//! 5. Service deployment safety
//! 6. The production scenario end to end
//! 7. Writing the assembly to disk

#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde_json::{Value as Json, json};
use splitstack_cfn::assembly::{CloudAssembly, TemplateFormat};
use splitstack_cfn::resources::ssm::ParameterStore;
use splitstack_common::config::AppConfig;
use splitstack_common::types::Environment;

const VPC: &str = "VpcStack";
const ECR: &str = "EcrStack";
const ECS: &str = "EcsStack";

fn app_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Dockerfile"), "FROM node:20\nCMD [\"node\", \"index.js\"]\n")
        .expect("dockerfile");
    std::fs::write(dir.path().join("index.js"), "require('http').createServer().listen(3000)\n")
        .expect("source");
    dir
}

fn config(dir: &tempfile::TempDir, env: Option<&str>) -> AppConfig {
    let mut config = AppConfig {
        asset_dir: dir.path().to_path_buf(),
        ..AppConfig::default()
    };
    if let Some(env) = env {
        config = config.with_context("env", env);
    }
    config
}

fn synth(env: Option<&str>) -> CloudAssembly {
    let dir = app_dir();
    splitstack_stacks::compose(config(&dir, env))
        .expect("compose")
        .synth()
        .expect("synth")
}

fn template(assembly: &CloudAssembly, stack: &str) -> Json {
    assembly
        .template(stack)
        .expect("stack")
        .to_value()
        .expect("render")
}

fn of_type<'a>(template: &'a Json, resource_type: &str) -> Vec<(&'a String, &'a Json)> {
    template["Resources"]
        .as_object()
        .expect("resources")
        .iter()
        .filter(|(_, r)| r["Type"] == resource_type)
        .collect()
}

// ── Ordering ─────────────────────────────────────────────────────────

#[test]
fn stacks_deploy_network_then_registry_then_compute() {
    let assembly = synth(None);
    let names: Vec<&str> = assembly.stacks().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![VPC, ECR, ECS]);
    let ecs = assembly.stack(ECS).expect("ecs");
    assert_eq!(ecs.dependencies, vec![ECR, VPC]);
}

// ── NAT strategy ─────────────────────────────────────────────────────

#[test]
fn default_context_uses_single_nat_instance() {
    let vpc = template(&synth(None), VPC);
    let instances = of_type(&vpc, "AWS::EC2::Instance");
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].1["Properties"]["InstanceType"], "t3.micro");
    assert_eq!(instances[0].1["Properties"]["SourceDestCheck"], false);
    assert!(of_type(&vpc, "AWS::EC2::NatGateway").is_empty());

    let nat_routes: Vec<_> = of_type(&vpc, "AWS::EC2::Route")
        .into_iter()
        .filter(|(_, r)| r["Properties"].get("InstanceId").is_some())
        .collect();
    assert_eq!(nat_routes.len(), 3, "every private route table uses the instance");
}

#[test]
fn non_prod_context_value_uses_nat_instance() {
    let vpc = template(&synth(Some("dev")), VPC);
    assert_eq!(of_type(&vpc, "AWS::EC2::Instance").len(), 1);
    assert!(of_type(&vpc, "AWS::EC2::NatGateway").is_empty());
}

#[test]
fn prod_context_uses_managed_nat_gateways() {
    let vpc = template(&synth(Some("prod")), VPC);
    let gateways = of_type(&vpc, "AWS::EC2::NatGateway");
    assert_eq!(gateways.len(), 3, "one gateway per availability zone");
    assert_eq!(of_type(&vpc, "AWS::EC2::EIP").len(), 3);
    assert!(of_type(&vpc, "AWS::EC2::Instance").is_empty());
    assert!(vpc.get("Parameters").is_none(), "no NAT AMI lookup in prod");
}

// ── Subnet tiers ─────────────────────────────────────────────────────

#[test]
fn network_has_three_tiers_of_slash_24_subnets() {
    let vpc = template(&synth(None), VPC);
    assert_eq!(vpc["Resources"]["VPC"]["Properties"]["CidrBlock"], "10.0.0.0/16");

    let subnets = of_type(&vpc, "AWS::EC2::Subnet");
    assert_eq!(subnets.len(), 9);

    let mut tiers = std::collections::BTreeMap::<String, usize>::new();
    for (_, subnet) in &subnets {
        let cidr = subnet["Properties"]["CidrBlock"].as_str().expect("cidr");
        assert!(cidr.ends_with("/24"), "got {cidr}");
        let tier = subnet["Properties"]["Tags"]
            .as_array()
            .expect("tags")
            .iter()
            .find(|t| t["Key"] == "aws-cdk:subnet-type")
            .expect("tier tag")["Value"]
            .as_str()
            .expect("tier")
            .to_string();
        *tiers.entry(tier).or_default() += 1;
    }
    assert_eq!(tiers.len(), 3);
    assert!(tiers.values().all(|&n| n == 3), "got {tiers:?}");
}

#[test]
fn subnet_ranges_do_not_overlap() {
    let vpc = template(&synth(None), VPC);
    let mut cidrs: Vec<&str> = of_type(&vpc, "AWS::EC2::Subnet")
        .iter()
        .map(|(_, s)| s["Properties"]["CidrBlock"].as_str().expect("cidr"))
        .collect();
    cidrs.sort_unstable();
    cidrs.dedup();
    assert_eq!(cidrs.len(), 9);
}

// ── Database access ──────────────────────────────────────────────────

#[test]
fn database_accepts_only_the_service_group_on_3306() {
    let ecs = template(&synth(None), ECS);
    let rds_group = json!({"Fn::GetAtt": ["RdsSG", "GroupId"]});

    let rules: Vec<_> = of_type(&ecs, "AWS::EC2::SecurityGroupIngress")
        .into_iter()
        .filter(|(_, r)| r["Properties"]["GroupId"] == rds_group)
        .collect();
    assert_eq!(rules.len(), 1);
    let rule = &rules[0].1["Properties"];
    assert_eq!(
        rule["SourceSecurityGroupId"],
        json!({"Fn::GetAtt": ["ECSSecurityGroup", "GroupId"]})
    );
    assert_eq!(rule["IpProtocol"], "tcp");
    assert_eq!(rule["FromPort"], 3306);
    assert_eq!(rule["ToPort"], 3306);
    assert_eq!(rule["Description"], "Allow traffic from ECS");

    let group = &ecs["Resources"]["RdsSG"]["Properties"];
    assert!(group.get("SecurityGroupIngress").is_none(), "no inline rules");
}

#[test]
fn database_credentials_come_from_generated_secret() {
    let ecs = template(&synth(None), ECS);
    let secret = &ecs["Resources"]["RdsSecret"]["Properties"]["GenerateSecretString"];
    assert_eq!(secret["SecretStringTemplate"], r#"{"username":"admin"}"#);
    assert_eq!(secret["GenerateStringKey"], "password");
    assert_eq!(secret["ExcludeCharacters"], "/@\"'\\");

    let db = &ecs["Resources"]["RdsInstance"]["Properties"];
    assert_eq!(db["Engine"], "mysql");
    assert_eq!(db["EngineVersion"], "8.0.32");
    assert_eq!(db["DBInstanceClass"], "db.t3.micro");
    assert_eq!(db["DBName"], "MyDatabase");
    assert!(db["MasterUserPassword"].to_string().contains("RdsSecret"));
}

// ── Container ────────────────────────────────────────────────────────

#[test]
fn container_exposes_only_port_3000() {
    let ecs = template(&synth(None), ECS);
    let containers = ecs["Resources"]["TaskDef"]["Properties"]["ContainerDefinitions"]
        .as_array()
        .expect("containers");
    assert_eq!(containers.len(), 1);
    let web = &containers[0];
    assert_eq!(web["Name"], "web");
    assert_eq!(web["PortMappings"], json!([{"ContainerPort": 3000, "Protocol": "tcp"}]));

    let task = &ecs["Resources"]["TaskDef"]["Properties"];
    assert_eq!(task["Cpu"], "256");
    assert_eq!(task["Memory"], "512");
}

#[test]
fn credentials_are_injected_as_secrets_not_environment() {
    let ecs = template(&synth(None), ECS);
    let web = &ecs["Resources"]["TaskDef"]["Properties"]["ContainerDefinitions"][0];
    let env_names: Vec<&str> = web["Environment"]
        .as_array()
        .expect("env")
        .iter()
        .map(|e| e["Name"].as_str().expect("name"))
        .collect();
    assert_eq!(env_names, vec!["RDS_ENDPOINT"]);

    let secret_names: Vec<&str> = web["Secrets"]
        .as_array()
        .expect("secrets")
        .iter()
        .map(|e| e["Name"].as_str().expect("name"))
        .collect();
    assert_eq!(secret_names, vec!["RDS_PASSWORD", "RDS_USERNAME"]);
    assert_eq!(web["LogConfiguration"]["Options"]["awslogs-stream-prefix"], "ecs-fargate-app");
}

#[test]
fn container_image_is_the_last_published_parameter_value() {
    let assembly = synth(None);
    let ecs = assembly.template(ECS).expect("ecs");

    let image = ecs.to_value().expect("render")["Resources"]["TaskDef"]["Properties"]
        ["ContainerDefinitions"][0]["Image"]
        .clone();
    let parameter_id = image["Ref"].as_str().expect("image is a parameter ref");
    let parameter = ecs.parameter(parameter_id).expect("declared");
    assert_eq!(parameter.parameter_type, "AWS::SSM::Parameter::Value<String>");
    assert_eq!(parameter.default.as_deref(), Some("/ecr/repo-url"));

    let env = Environment {
        account: Some("111122223333".into()),
        region: Some("eu-west-1".into()),
    };
    let mut store = ParameterStore::new();
    assert_eq!(store.publish_from(&assembly, &env), 1);
    let published = store.lookup(ecs, parameter_id).expect("published").to_string();
    assert!(
        published.starts_with("111122223333.dkr.ecr.eu-west-1.amazonaws.com/"),
        "got {published}"
    );

    let _ = store.put("/ecr/repo-url", "111122223333.dkr.ecr.eu-west-1.amazonaws.com/app:v2");
    assert_eq!(
        store.lookup(ecs, parameter_id),
        Some("111122223333.dkr.ecr.eu-west-1.amazonaws.com/app:v2")
    );
}

#[test]
fn execution_role_can_pull_images() {
    let ecs = template(&synth(None), ECS);
    let statements = ecs["Resources"]["TaskExecutionRoleDefaultPolicy"]["Properties"]
        ["PolicyDocument"]["Statement"]
        .as_array()
        .expect("statements");
    let pull = statements
        .iter()
        .find(|s| s["Resource"] == "*")
        .expect("wildcard statement");
    for action in [
        "ecr:GetDownloadUrlForLayer",
        "ecr:BatchGetImage",
        "ecr:BatchCheckLayerAvailability",
        "ecr:GetAuthorizationToken",
    ] {
        assert!(
            pull["Action"].as_array().expect("actions").contains(&json!(action)),
            "missing {action}"
        );
    }
    let trust = &ecs["Resources"]["TaskExecutionRole"]["Properties"]["AssumeRolePolicyDocument"];
    assert_eq!(
        trust["Statement"][0]["Principal"]["Service"],
        "ecs-tasks.amazonaws.com"
    );
}

// ── Service ──────────────────────────────────────────────────────────

#[test]
fn service_rolls_back_failed_deployments() {
    let ecs = template(&synth(None), ECS);
    let service = &ecs["Resources"]["Service"]["Properties"];
    assert_eq!(
        service["DeploymentConfiguration"]["DeploymentCircuitBreaker"],
        json!({"Enable": true, "Rollback": true})
    );
    assert_eq!(service["DesiredCount"], 1);
    assert_eq!(service["LaunchType"], "FARGATE");
}

#[test]
fn service_waits_for_listener_and_execution_policy() {
    let ecs = template(&synth(None), ECS);
    let depends_on = ecs["Resources"]["Service"]["DependsOn"]
        .as_array()
        .expect("depends on");
    assert!(depends_on.contains(&json!("AlbListener")), "got {depends_on:?}");
    assert!(
        depends_on.contains(&json!("TaskExecutionRoleDefaultPolicy")),
        "got {depends_on:?}"
    );
    assert!(ecs["Resources"]["TaskExecutionRoleDefaultPolicy"].is_object());
}

#[test]
fn service_runs_in_private_subnets() {
    let ecs = template(&synth(None), ECS);
    let subnets = ecs["Resources"]["Service"]["Properties"]["NetworkConfiguration"]
        ["AwsvpcConfiguration"]["Subnets"]
        .as_array()
        .expect("subnets");
    assert_eq!(subnets.len(), 3);
    for subnet in subnets {
        let name = subnet["Fn::ImportValue"].as_str().expect("import");
        assert!(name.contains("PrivateSubnet"), "got {name}");
    }
}

// ── Production scenario ──────────────────────────────────────────────

#[test]
fn prod_composition_end_to_end() {
    let assembly = synth(Some("prod"));

    let vpc = template(&assembly, VPC);
    assert!(!of_type(&vpc, "AWS::EC2::NatGateway").is_empty());
    assert!(of_type(&vpc, "AWS::EC2::Instance").is_empty());

    let ecs = template(&assembly, ECS);

    let databases = of_type(&ecs, "AWS::RDS::DBInstance");
    assert_eq!(databases.len(), 1);
    let subnet_group = &ecs["Resources"]["RdsInstanceSubnetGroup"]["Properties"]["SubnetIds"];
    for subnet in subnet_group.as_array().expect("subnets") {
        let name = subnet["Fn::ImportValue"].as_str().expect("import");
        assert!(name.contains("IsolatedSubnet"), "got {name}");
    }

    let listeners = of_type(&ecs, "AWS::ElasticLoadBalancingV2::Listener");
    assert_eq!(listeners.len(), 1);
    assert_eq!(listeners[0].1["Properties"]["Port"], 80);
    let group = &ecs["Resources"]["AlbListenerECSGroup"]["Properties"];
    assert_eq!(group["HealthCheckPath"], "/");
    assert_eq!(group["HealthCheckIntervalSeconds"], 30);
    assert_eq!(group["HealthCheckTimeoutSeconds"], 5);
    assert_eq!(group["Matcher"]["HttpCode"], "200-299");
    let binding = &ecs["Resources"]["Service"]["Properties"]["LoadBalancers"][0];
    assert_eq!(binding["ContainerName"], "web");
    assert_eq!(binding["ContainerPort"], 3000);
    assert_eq!(binding["TargetGroupArn"], json!({"Ref": "AlbListenerECSGroup"}));

    let apis = of_type(&ecs, "AWS::ApiGateway::RestApi");
    assert_eq!(apis.len(), 1);
    let integration = &ecs["Resources"]["ApiGatewayANY"]["Properties"]["Integration"];
    assert_eq!(integration["Type"], "HTTP_PROXY");
    assert_eq!(
        integration["Uri"],
        json!({"Fn::Join": ["", ["http://", {"Fn::GetAtt": ["Alb", "DNSName"]}]]})
    );
    assert_eq!(ecs["Resources"]["ApiGatewayproxy"]["Properties"]["PathPart"], "{proxy+}");
    let sub_paths = &ecs["Resources"]["ApiGatewayproxyANY"]["Properties"];
    assert_eq!(sub_paths["HttpMethod"], "ANY");
    assert_eq!(sub_paths["Integration"]["Type"], "HTTP_PROXY");
    assert_eq!(sub_paths["Integration"]["Uri"]["Fn::Join"][1][1], "/{proxy}");

    assert_eq!(
        ecs["Outputs"]["LoadBalancerDNS"]["Value"],
        json!({"Fn::GetAtt": ["Alb", "DNSName"]})
    );
    assert!(ecs["Outputs"]["ApiGatewayURL"]["Value"]["Fn::Join"].is_array());
}

#[test]
fn every_stack_is_described() {
    let assembly = synth(None);
    for name in [VPC, ECR, ECS] {
        let description = &template(&assembly, name)["Description"];
        assert!(description.is_string(), "{name} has no description");
    }
}

// ── Assembly on disk ─────────────────────────────────────────────────

#[test]
fn synthesized_assembly_is_written_to_disk() {
    let assembly = synth(None);
    let out = tempfile::tempdir().expect("tempdir");
    let written = assembly
        .write_to(out.path(), TemplateFormat::Json)
        .expect("write");
    // three templates, one asset manifest, one manifest
    assert_eq!(written.len(), 5);

    let manifest: Json = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("manifest.json")).expect("read"),
    )
    .expect("json");
    assert_eq!(manifest["artifacts"]["EcsStack"]["dependencies"], json!(["EcrStack", "VpcStack"]));
    assert_eq!(
        manifest["artifacts"]["EcrStack"]["dependencies"],
        json!(["EcrStack.assets"])
    );
    assert!(out.path().join("EcrStack.assets.json").is_file());
}

#[test]
fn missing_image_directory_fails_composition() {
    let config = AppConfig {
        asset_dir: "/no/such/appcode".into(),
        ..AppConfig::default()
    };
    let err = splitstack_stacks::compose(config).unwrap_err();
    assert!(err.to_string().contains("not found"), "got: {err}");
}
