//! Cloud assembly: the synthesized templates of an app, ordered for
//! deployment, plus the manifest that tells a deployer how to apply them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::json;
use splitstack_common::constants::ASSEMBLY_VERSION;
use splitstack_common::error::{Result, StackError};
use splitstack_common::types::Environment;

use crate::resources::ecr_assets::{DockerImageAsset, asset_manifest};
use crate::template::Template;

/// File name of the assembly manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Artifact type of a deployable stack.
const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

/// Artifact type of an asset manifest.
const ASSET_ARTIFACT_TYPE: &str = "cdk:asset-manifest";

/// Rendering of template files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemplateFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl TemplateFormat {
    /// File extension for templates in this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Renders a template.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(self, template: &Template) -> Result<String> {
        match self {
            Self::Json => template.to_json(),
            Self::Yaml => template.to_yaml(),
        }
    }
}

impl FromStr for TemplateFormat {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(StackError::Config {
                message: format!("unknown template format: {other} (expected json or yaml)"),
            }),
        }
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One stack after synthesis.
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    /// Stack name.
    pub name: String,
    /// Final template.
    pub template: Template,
    /// Stacks deployed before this one, sorted.
    pub dependencies: Vec<String>,
    /// Images to publish before deploying.
    pub assets: Vec<DockerImageAsset>,
}

impl SynthesizedStack {
    /// Template file name inside the assembly directory.
    #[must_use]
    pub fn template_file(&self, format: TemplateFormat) -> String {
        format!("{}.template.{}", self.name, format.extension())
    }

    /// Asset manifest file name inside the assembly directory.
    #[must_use]
    pub fn assets_file(&self) -> String {
        format!("{}.assets.json", self.name)
    }

    fn assets_artifact(&self) -> String {
        format!("{}.assets", self.name)
    }
}

/// Synthesized stacks in deployment order.
#[derive(Debug, Clone, Default)]
pub struct CloudAssembly {
    stacks: Vec<SynthesizedStack>,
    environment: Environment,
}

impl CloudAssembly {
    /// Creates an assembly from stacks already in deployment order.
    #[must_use]
    pub const fn new(stacks: Vec<SynthesizedStack>, environment: Environment) -> Self {
        Self {
            stacks,
            environment,
        }
    }

    /// Stacks in deployment order.
    #[must_use]
    pub fn stacks(&self) -> &[SynthesizedStack] {
        &self.stacks
    }

    /// Target environment of every stack.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Looks up a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&SynthesizedStack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Looks up a stack's template by name.
    ///
    /// # Errors
    ///
    /// Returns `StackError::NotFound` for unknown stacks.
    pub fn template(&self, name: &str) -> Result<&Template> {
        self.stack(name)
            .map(|s| &s.template)
            .ok_or_else(|| StackError::NotFound {
                kind: "stack",
                id: name.to_string(),
            })
    }

    /// Builds `manifest.json`.
    #[must_use]
    pub fn manifest(&self, format: TemplateFormat) -> serde_json::Value {
        let environment = self.environment.uri();
        let mut artifacts = serde_json::Map::new();
        for stack in &self.stacks {
            let mut dependencies = stack.dependencies.clone();
            if !stack.assets.is_empty() {
                let _ = artifacts.insert(
                    stack.assets_artifact(),
                    json!({
                        "type": ASSET_ARTIFACT_TYPE,
                        "properties": { "file": stack.assets_file() },
                    }),
                );
                dependencies.push(stack.assets_artifact());
            }
            let _ = artifacts.insert(
                stack.name.clone(),
                json!({
                    "type": STACK_ARTIFACT_TYPE,
                    "environment": environment,
                    "properties": { "templateFile": stack.template_file(format) },
                    "dependencies": dependencies,
                    "displayName": stack.name,
                }),
            );
        }
        json!({ "version": ASSEMBLY_VERSION, "artifacts": artifacts })
    }

    /// Writes every template, asset manifest and `manifest.json` into
    /// `dir`, creating it if needed. Returns the written paths.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file cannot be written, or a
    /// serialization error if rendering fails.
    pub fn write_to(&self, dir: &Path, format: TemplateFormat) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| StackError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut written = Vec::new();
        for stack in &self.stacks {
            let path = dir.join(stack.template_file(format));
            write_file(&path, &format.render(&stack.template)?)?;
            written.push(path);

            if !stack.assets.is_empty() {
                let path = dir.join(stack.assets_file());
                let body = serde_json::to_string_pretty(&asset_manifest(&stack.assets))?;
                write_file(&path, &body)?;
                written.push(path);
            }
        }

        let path = dir.join(MANIFEST_FILE);
        write_file(&path, &serde_json::to_string_pretty(&self.manifest(format))?)?;
        written.push(path);

        tracing::info!(dir = %dir.display(), files = written.len(), "wrote cloud assembly");
        Ok(written)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| StackError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
