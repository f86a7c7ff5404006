use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SigningError};

/// The deployment-specific settings of the signing service, read from a JSON
/// file kept next to the deployment.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfiguration {
    /// Where uploads live and finalized artifacts are written.
    pub storage_directory: PathBuf,
    /// The key signing link tokens are authenticated with, base64-encoded.
    /// Must stay stable across restarts or every outstanding link dies.
    pub link_signing_key: String,
    /// Prefix for the public signing URLs handed to anonymous signers.
    pub public_base_url: String,
}

impl ServiceConfiguration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, SigningError> {
        let configuration_file_contents = std::fs::read_to_string(configuration_file_path)
            .map_err(|error| {
                SigningError::with_error(
                    ErrorKind::Storage,
                    format!(
                        "Unable to read the service configuration {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        let configuration: ServiceConfiguration =
            serde_json::from_str(&configuration_file_contents).map_err(|error| {
                SigningError::with_error(
                    ErrorKind::Validation,
                    format!(
                        "Unable to parse the service configuration {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;

        Ok(configuration)
    }

    /// The raw link-signing key bytes.
    pub fn decoded_signing_key(&self) -> Result<Vec<u8>, SigningError> {
        STANDARD.decode(&self.link_signing_key).map_err(|error| {
            SigningError::with_error(
                ErrorKind::Validation,
                "Unable to decode the link signing key as base64",
                &error,
            )
        })
    }
}
