//! Container image assets built from a local directory.
//!
//! The image is not built here. The asset records where the build context
//! lives and a content fingerprint of it; the fingerprint becomes the image
//! tag, so the published image reference changes exactly when the build
//! context does.

use std::path::{Path, PathBuf};

use serde_json::json;
use sha2::{Digest, Sha256};
use splitstack_common::constants::{ASSEMBLY_VERSION, BOOTSTRAP_QUALIFIER};
use splitstack_common::error::{Result, StackError};
use walkdir::WalkDir;

use crate::value::Value;

/// File that must exist at the root of a build context.
pub const DOCKERFILE: &str = "Dockerfile";

/// A container image to be built from `directory` and pushed to the
/// bootstrap asset repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerImageAsset {
    /// Build context directory.
    pub directory: PathBuf,
    /// SHA-256 fingerprint of the build context, hex encoded.
    pub hash: String,
}

impl DockerImageAsset {
    /// Fingerprints a build context.
    ///
    /// # Errors
    ///
    /// Returns `StackError::NotFound` if the directory or its `Dockerfile`
    /// is missing, or an I/O error if a file cannot be read.
    pub fn from_directory(directory: &Path) -> Result<Self> {
        if !directory.is_dir() {
            return Err(StackError::NotFound {
                kind: "image build directory",
                id: directory.display().to_string(),
            });
        }
        if !directory.join(DOCKERFILE).is_file() {
            return Err(StackError::NotFound {
                kind: "Dockerfile",
                id: directory.join(DOCKERFILE).display().to_string(),
            });
        }
        // Deployers resolve the build context relative to the assembly
        // directory, so the manifest must carry an absolute path.
        let directory = directory.canonicalize().map_err(|e| StackError::Io {
            path: directory.to_path_buf(),
            source: e,
        })?;
        let hash = fingerprint(&directory)?;
        tracing::info!(directory = %directory.display(), hash = %hash, "fingerprinted image asset");
        Ok(Self { directory, hash })
    }

    /// Image tag inside the asset repository.
    #[must_use]
    pub fn image_tag(&self) -> &str {
        &self.hash
    }

    /// Name of the asset repository, with deploy-time placeholders.
    #[must_use]
    pub fn repository_name() -> String {
        format!("cdk-{BOOTSTRAP_QUALIFIER}-container-assets-${{AWS::AccountId}}-${{AWS::Region}}")
    }

    /// Fully qualified image reference, resolved by the engine.
    #[must_use]
    pub fn image_uri(&self) -> Value {
        Value::Sub(format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{}",
            Self::repository_name(),
            self.image_tag()
        ))
    }

    /// Entry of this image in a stack's asset manifest.
    #[must_use]
    pub fn manifest_entry(&self) -> serde_json::Value {
        json!({
            "source": { "directory": self.directory.display().to_string() },
            "destinations": {
                "current_account-current_region": {
                    "repositoryName": Self::repository_name(),
                    "imageTag": self.image_tag(),
                    "assumeRoleArn": format!(
                        "arn:${{AWS::Partition}}:iam::${{AWS::AccountId}}:role/cdk-{BOOTSTRAP_QUALIFIER}-image-publishing-role-${{AWS::AccountId}}-${{AWS::Region}}"
                    ),
                }
            }
        })
    }
}

/// Builds a stack's asset manifest from its images.
#[must_use]
pub fn asset_manifest(assets: &[DockerImageAsset]) -> serde_json::Value {
    let images: serde_json::Map<String, serde_json::Value> = assets
        .iter()
        .map(|a| (a.hash.clone(), a.manifest_entry()))
        .collect();
    json!({
        "version": ASSEMBLY_VERSION,
        "files": {},
        "dockerImages": images,
    })
}

/// SHA-256 over every file's relative path and contents, in sorted order.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be walked or a file read.
pub fn fingerprint(directory: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(directory).to_path_buf();
            StackError::Io {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(directory)
            .unwrap_or_else(|_| entry.path());
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let contents = std::fs::read(entry.path()).map_err(|e| StackError::Io {
            path: entry.path().to_path_buf(),
            source: e,
        })?;
        hasher.update(relative.join("/").as_bytes());
        hasher.update([0]);
        hasher.update(&contents);
        hasher.update([0]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, body) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(path, body).expect("write");
        }
        dir
    }

    #[test]
    fn fingerprint_is_stable_and_content_addressed() {
        let a = context(&[("Dockerfile", "FROM node:20"), ("src/index.js", "1")]);
        let b = context(&[("Dockerfile", "FROM node:20"), ("src/index.js", "1")]);
        let c = context(&[("Dockerfile", "FROM node:20"), ("src/index.js", "2")]);
        let ha = fingerprint(a.path()).expect("a");
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, fingerprint(b.path()).expect("b"));
        assert_ne!(ha, fingerprint(c.path()).expect("c"));
    }

    #[test]
    fn renaming_a_file_changes_the_fingerprint() {
        let a = context(&[("Dockerfile", "FROM x"), ("a.txt", "same")]);
        let b = context(&[("Dockerfile", "FROM x"), ("b.txt", "same")]);
        assert_ne!(
            fingerprint(a.path()).expect("a"),
            fingerprint(b.path()).expect("b")
        );
    }

    #[test]
    fn missing_dockerfile_is_reported() {
        let dir = context(&[("index.js", "1")]);
        let err = DockerImageAsset::from_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Dockerfile"), "got: {err}");
    }

    #[test]
    fn missing_directory_is_reported() {
        let err = DockerImageAsset::from_directory(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[test]
    fn image_uri_ends_with_content_tag() {
        let dir = context(&[("Dockerfile", "FROM x")]);
        let asset = DockerImageAsset::from_directory(dir.path()).expect("asset");
        let Value::Sub(uri) = asset.image_uri() else {
            panic!("expected Fn::Sub");
        };
        assert!(uri.ends_with(&format!(":{}", asset.hash)), "got: {uri}");
        assert!(uri.contains("cdk-hnb659fds-container-assets-"), "got: {uri}");

        assert_eq!(asset.image_tag(), asset.hash);

        let manifest = asset_manifest(std::slice::from_ref(&asset));
        assert_eq!(
            manifest["dockerImages"][&asset.hash]["destinations"]["current_account-current_region"]["imageTag"],
            asset.hash.as_str()
        );
    }

    #[test]
    fn manifest_records_absolute_build_context() {
        let dir = context(&[("Dockerfile", "FROM x")]);
        let indirect = dir.path().join("nested").join("..");
        std::fs::create_dir_all(dir.path().join("nested")).expect("mkdir");
        let asset = DockerImageAsset::from_directory(&indirect).expect("asset");

        let expected = dir.path().canonicalize().expect("canonical");
        assert!(asset.directory.is_absolute());
        assert_eq!(asset.directory, expected);
        assert_eq!(
            asset.manifest_entry()["source"]["directory"],
            expected.display().to_string()
        );
    }
}
