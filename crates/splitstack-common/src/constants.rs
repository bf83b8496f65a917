//! System-wide constants: context keys, well-known parameter paths, ports,
//! and the fixed shape of the deployed service.

/// Context key selecting the deployment environment.
pub const ENV_CONTEXT_KEY: &str = "env";

/// Context value that marks a production deployment.
pub const PRODUCTION_ENV: &str = "prod";

/// Parameter-store key under which the registry unit publishes the image URI.
pub const IMAGE_URI_PARAMETER: &str = "/ecr/repo-url";

/// Port the application container listens on.
pub const CONTAINER_PORT: u16 = 3000;

/// Port the load balancer listens on.
pub const LISTENER_PORT: u16 = 80;

/// Port the MySQL database listens on.
pub const DATABASE_PORT: u16 = 3306;

/// Task CPU units (0.25 vCPU).
pub const TASK_CPU_UNITS: u32 = 256;

/// Task memory in MiB.
pub const TASK_MEMORY_MIB: u32 = 512;

/// Name of the single container in the task definition.
pub const CONTAINER_NAME: &str = "web";

/// Fixed database master username.
pub const DATABASE_USERNAME: &str = "admin";

/// Characters the generated database password must never contain.
pub const SECRET_EXCLUDED_CHARACTERS: &str = "/@\"'\\";

/// Default CIDR block for the virtual network.
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Maximum number of availability zones the network spreads across.
pub const MAX_AZS: u8 = 3;

/// CIDR mask applied to every subnet tier.
pub const SUBNET_CIDR_MASK: u8 = 24;

/// Instance type of the single NAT instance used outside production.
pub const NAT_INSTANCE_TYPE: &str = "t3.micro";

/// Bootstrap qualifier used in asset repository names.
pub const BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

/// CloudFormation template format version.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Cloud assembly schema version written to `manifest.json`.
pub const ASSEMBLY_VERSION: &str = "36.0.0";

/// Default output directory for synthesized templates.
pub const DEFAULT_OUTPUT_DIR: &str = "cdk.out";

/// Default location of the image build directory.
pub const DEFAULT_ASSET_DIR: &str = "appcode";

/// Default configuration file consulted by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "splitstack.json";

/// Stack name of the network composition unit.
pub const NETWORK_STACK: &str = "VpcStack";

/// Stack name of the registry composition unit.
pub const REGISTRY_STACK: &str = "EcrStack";

/// Stack name of the compute composition unit.
pub const COMPUTE_STACK: &str = "EcsStack";
