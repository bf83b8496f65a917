//! # splitstack-stacks
//!
//! The three composition units of the deployment, applied in order:
//!
//! - [`network`]: three-tier VPC, NAT strategy chosen by the `env` context.
//! - [`registry`]: the application image and its parameter-store entry.
//! - [`compute`]: database, load balancer, container service, API gateway.
//!
//! # Example
//!
//! ```rust,no_run
//! use splitstack_common::config::AppConfig;
//!
//! let config = AppConfig::default().with_context("env", "prod");
//! let app = splitstack_stacks::compose(config)?;
//! let assembly = app.synth()?;
//! assert_eq!(assembly.stacks().len(), 3);
//! # Ok::<(), splitstack_common::error::StackError>(())
//! ```

pub mod compute;
pub mod network;
pub mod registry;

use splitstack_cfn::app::App;
use splitstack_common::config::AppConfig;
use splitstack_common::error::Result;

/// Builds the network, registry and compute stacks into one app.
///
/// # Errors
///
/// Returns an error if any unit fails to build, e.g. when the image build
/// directory is missing.
pub fn compose(config: AppConfig) -> Result<App> {
    let asset_dir = config.asset_dir.clone();
    let mut app = App::new(config);
    let network = network::build(&mut app)?;
    let registry = registry::build(&mut app, &asset_dir)?;
    let compute = compute::build(&mut app, &network, &registry)?;
    tracing::info!(
        stacks = app.stacks().len(),
        service = %compute.service,
        "composed app"
    );
    Ok(app)
}
