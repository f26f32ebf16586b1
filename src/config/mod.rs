/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Configuration module
//!
//! Handles loading and parsing of YAML configuration files.
//! The resulting `Config` is built once at startup and passed down explicitly.

use crate::config::types::Config;
use crate::core::error::Result;
use std::fs;
use std::path::Path;

pub mod types;

/// Load and parse configuration from YAML file
///
/// # Errors
/// Returns an error if the file cannot be read, if YAML parsing fails, or if validation fails.
pub fn init(file: &Path) -> Result<Config> {
    let string = fs::read_to_string(file)?;
    from_yaml(&string)
}

/// Parse and validate configuration from a YAML document
pub fn from_yaml(yaml: &str) -> Result<Config> {
    let config: Config = serde_yml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
