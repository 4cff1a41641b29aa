// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type for configuration failures

use std::path::PathBuf;

use thiserror::Error;

/// The reasons why we may reject a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid Open vSwitch version '{0}'")]
    InvalidOvsVersion(String),
    #[error("Unable to read state file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed state file: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Invalid value '{value}' for option {option}")]
    InvalidOption { option: &'static str, value: String },
    #[error("Failed to assemble system state: {0}")]
    Incomplete(String),
}
