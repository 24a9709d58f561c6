//! YAML target-config schema consumed by the engine's store factory (spec
//! section 6, "Configuration file"). Finding and reading the file itself is
//! the CLI's job; this module only types the document and builds a `Store`
//! from one of its targets.

use crate::error::{MemoryboxError, Result};
use crate::store::local::LocalDiskStore;
use crate::store::object::{ObjectStore, ObjectStoreConfig};
use crate::store::Store;
use serde::Deserialize;
use std::collections::HashMap;

/// The full `--config` document: a mapping from target name to its
/// backend-specific settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetsFile {
    pub targets: HashMap<String, TargetConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    LocalDisk,
    ObjectStore,
}

/// One named backend location. Fields beyond `backend` are loosely typed —
/// all optional, validated only once a concrete backend is selected — since
/// the document is hand-edited YAML with backend-specific keys rather than
/// a strict per-backend schema.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub backend: BackendKind,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub force_path_style: Option<bool>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

impl TargetsFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| MemoryboxError::InvalidInput(format!("invalid target config: {e}")))
    }

    pub fn target(&self, name: &str) -> Result<&TargetConfig> {
        self.targets
            .get(name)
            .ok_or_else(|| MemoryboxError::NotFound(format!("target {name:?}")))
    }
}

/// Build the `Store` a target names.
///
/// `access_key_id`/`secret_access_key` absent falls back to the ambient AWS
/// credential chain (env vars, instance profile, `~/.aws/credentials`);
/// `profile` selects among the latter by setting `AWS_PROFILE` before the
/// chain loads, rather than threading a profile name through the SDK
/// builder directly.
pub async fn store_for_target(target: &TargetConfig) -> Result<Box<dyn Store>> {
    match target.backend {
        BackendKind::LocalDisk => {
            let path = target
                .path
                .as_deref()
                .ok_or_else(|| MemoryboxError::InvalidInput("localDisk target missing \"path\"".to_string()))?;
            Ok(Box::new(LocalDiskStore::new(path).await?))
        }
        BackendKind::ObjectStore => {
            let bucket = target
                .bucket
                .clone()
                .ok_or_else(|| MemoryboxError::InvalidInput("objectStore target missing \"bucket\"".to_string()))?;
            if let Some(profile) = &target.profile {
                std::env::set_var("AWS_PROFILE", profile);
            }
            let config = ObjectStoreConfig {
                bucket,
                endpoint: target.endpoint.clone(),
                region: target.region.clone().unwrap_or_else(|| "us-east-1".to_string()),
                force_path_style: target.force_path_style.unwrap_or(false),
                access_key_id: target.access_key_id.clone(),
                secret_access_key: target.secret_access_key.clone(),
            };
            Ok(Box::new(ObjectStore::new(&config).await?))
        }
    }
}
