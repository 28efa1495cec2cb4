//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::copier::{CopierSettings, DEFAULT_BLOCK_SIZE};
use crate::ec2::{DEFAULT_AWS_BIN, Ec2Settings};
use crate::metadata::DEFAULT_METADATA_BASE_URL;
use crate::workflow::{
    CloneOptions, DEFAULT_HELPER_SOURCE_DEVICE, DEFAULT_HELPER_TARGET_DEVICE,
};

/// Clone tool configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "VOLCLONE")]
pub struct CloneConfig {
    /// Path to the provider CLI binary.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// Region passed to every provider call. When unset the provider CLI's
    /// own default region applies.
    pub region: Option<String>,
    /// Scratch device path the source volume is attached at on this instance.
    #[ortho_config(default = DEFAULT_HELPER_SOURCE_DEVICE.to_owned())]
    pub helper_source_device: String,
    /// Scratch device path the new volume is attached at on this instance.
    #[ortho_config(default = DEFAULT_HELPER_TARGET_DEVICE.to_owned())]
    pub helper_target_device: String,
    /// Base URL of the instance metadata service.
    #[ortho_config(default = DEFAULT_METADATA_BASE_URL.to_owned())]
    pub metadata_base_url: String,
    /// Seconds between describe polls while waiting on state transitions.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Upper bound, in seconds, on each state-transition wait.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Path to the `dd` binary used for the block copy.
    #[ortho_config(default = "dd".to_owned())]
    pub dd_bin: String,
    /// Path to the `sync` binary used to flush pending writes.
    #[ortho_config(default = "sync".to_owned())]
    pub sync_bin: String,
    /// Block size forwarded to `dd`.
    #[ortho_config(default = DEFAULT_BLOCK_SIZE.to_owned())]
    pub dd_block_size: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl CloneConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to volclone.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("volclone")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values via environment variables or configuration
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::InvalidValue`] when a timing field is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.aws_bin,
            &FieldMetadata::new("provider CLI binary", "VOLCLONE_AWS_BIN", "aws_bin"),
        )?;
        Self::require_field(
            &self.helper_source_device,
            &FieldMetadata::new(
                "helper source device",
                "VOLCLONE_HELPER_SOURCE_DEVICE",
                "helper_source_device",
            ),
        )?;
        Self::require_field(
            &self.helper_target_device,
            &FieldMetadata::new(
                "helper target device",
                "VOLCLONE_HELPER_TARGET_DEVICE",
                "helper_target_device",
            ),
        )?;
        Self::require_field(
            &self.metadata_base_url,
            &FieldMetadata::new(
                "metadata service URL",
                "VOLCLONE_METADATA_BASE_URL",
                "metadata_base_url",
            ),
        )?;
        Self::require_field(
            &self.dd_bin,
            &FieldMetadata::new("dd binary", "VOLCLONE_DD_BIN", "dd_bin"),
        )?;
        Self::require_field(
            &self.sync_bin,
            &FieldMetadata::new("sync binary", "VOLCLONE_SYNC_BIN", "sync_bin"),
        )?;
        Self::require_field(
            &self.dd_block_size,
            &FieldMetadata::new("dd block size", "VOLCLONE_DD_BLOCK_SIZE", "dd_block_size"),
        )?;
        if self.helper_source_device == self.helper_target_device {
            return Err(ConfigError::InvalidValue(String::from(
                "helper_source_device and helper_target_device must differ",
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "poll_interval_secs must be greater than zero",
            )));
        }
        if self.wait_timeout_secs < self.poll_interval_secs {
            return Err(ConfigError::InvalidValue(String::from(
                "wait_timeout_secs must be at least poll_interval_secs",
            )));
        }
        Ok(())
    }

    /// Builds the EC2 binding settings from the configured values.
    #[must_use]
    pub fn ec2_settings(&self) -> Ec2Settings {
        Ec2Settings {
            aws_bin: self.aws_bin.clone(),
            region: self.region.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
        }
    }

    /// Builds the block copier settings from the configured values.
    #[must_use]
    pub fn copier_settings(&self) -> CopierSettings {
        CopierSettings {
            dd_bin: self.dd_bin.clone(),
            sync_bin: self.sync_bin.clone(),
            block_size: self.dd_block_size.clone(),
            ..CopierSettings::default()
        }
    }

    /// Builds workflow options from the configured values.
    ///
    /// The backup snapshot decision is a per-run choice, so it arrives from
    /// the CLI rather than from configuration.
    #[must_use]
    pub fn clone_options(&self, backup_snapshot: bool) -> CloneOptions {
        CloneOptions {
            helper_source_device: Utf8PathBuf::from(&self.helper_source_device),
            helper_target_device: Utf8PathBuf::from(&self.helper_target_device),
            backup_snapshot,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field carries a value outside its accepted range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
