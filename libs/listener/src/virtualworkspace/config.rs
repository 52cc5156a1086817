use crate::error::{Error, Result};

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Hot-reloadable declaration of remote virtual workspaces to schematize
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualWorkspacesConfig {
    #[serde(default)]
    pub virtual_workspaces: Vec<VirtualWorkspace>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualWorkspace {
    pub name: String,
    pub url: String,
    /// Path to a kubeconfig granting access; empty or absent means an
    /// unauthenticated, TLS-insecure connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
}

/// Loads the config file; a missing file is an empty configuration, not an
/// error. Malformed YAML is a hard error so the caller can keep the
/// previous configuration.
pub fn load(path: &Path) -> Result<VirtualWorkspacesConfig> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(VirtualWorkspacesConfig::default())
        }
        Err(e) => return Err(Error::IoError(e)),
    };
    serde_yaml::from_slice(&bytes).map_err(Error::YamlError)
}
