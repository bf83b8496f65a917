//! Registry unit: the application image and the parameter-store entry
//! that publishes its reference.

use std::path::Path;

use splitstack_cfn::app::App;
use splitstack_cfn::resources::ecr_assets::DockerImageAsset;
use splitstack_cfn::resources::ssm::StringParameter;
use splitstack_cfn::stack::Stack;
use splitstack_common::constants::{IMAGE_URI_PARAMETER, REGISTRY_STACK};
use splitstack_common::error::Result;
use splitstack_common::types::LogicalId;

/// Logical ID of the published image reference.
pub const IMAGE_PARAMETER_ID: &str = "EcrRepoUrlParameter";

/// What the registry unit produced.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    /// Name of the registry stack.
    pub stack: String,
    /// The image to build and publish.
    pub asset: DockerImageAsset,
    /// Parameter-store key holding the image reference.
    pub parameter_name: String,
}

/// Declares the registry stack for the image built from `directory` and
/// adds it to `app`.
///
/// # Errors
///
/// Returns `StackError::NotFound` if `directory` or its `Dockerfile` is
/// missing.
pub fn build(app: &mut App, directory: &Path) -> Result<RegistryHandle> {
    tracing::info!(
        stack = REGISTRY_STACK,
        directory = %directory.display(),
        "building registry unit"
    );
    let asset = DockerImageAsset::from_directory(directory)?;

    let mut stack = Stack::new(REGISTRY_STACK)
        .with_description("Service image and the parameter that publishes its URI");
    let parameter = StringParameter {
        name: IMAGE_URI_PARAMETER.to_string(),
        value: asset.image_uri(),
        description: Some("The URL of the ECR repository".to_string()),
    };
    stack.add(LogicalId::new(IMAGE_PARAMETER_ID)?, parameter.to_resource())?;
    stack.add_asset(asset.clone());

    app.add_stack(stack)?;
    Ok(RegistryHandle {
        stack: REGISTRY_STACK.to_string(),
        asset,
        parameter_name: IMAGE_URI_PARAMETER.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use splitstack_cfn::value::Value;
    use splitstack_common::config::AppConfig;

    use super::*;

    #[test]
    fn publishes_image_uri_under_fixed_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Dockerfile"), "FROM node:20").expect("write");

        let mut app = App::new(AppConfig::default());
        let handle = build(&mut app, dir.path()).expect("registry");
        assert_eq!(handle.parameter_name, "/ecr/repo-url");

        let stack = app.stack(REGISTRY_STACK).expect("stack");
        let resource = stack
            .template
            .resource(IMAGE_PARAMETER_ID)
            .expect("parameter");
        assert_eq!(resource.property("Name"), Some(&Value::from("/ecr/repo-url")));
        assert_eq!(resource.property("Value"), Some(&handle.asset.image_uri()));
        assert_eq!(stack.assets.len(), 1);
    }

    #[test]
    fn missing_build_directory_fails() {
        let mut app = App::new(AppConfig::default());
        assert!(build(&mut app, Path::new("/no/such/appcode")).is_err());
        assert!(app.stacks().is_empty());
    }
}
