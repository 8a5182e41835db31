/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/config.rs
*
* This file defines the runtime configuration of the crate. It uses `serde`
* to deserialize an optional YAML file into strongly-typed structs, so that
* input is validated at the boundary instead of deep inside the business
* logic. Every field has a default; an absent file yields the defaults.
*
* `VAULT_ADDR` and `VAULT_TOKEN` from the environment fill in the Vault
* address and token when the file does not provide them.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{Error, Result};
use crate::record::{
    deserialize_secret, DeployDefaults, DEFAULT_CA_FILENAME, DEFAULT_CA_TRUST_DIR,
};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_UPDATE_COMMAND: &str = "update-ca-trust";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the Vault PKI authority.
#[derive(Deserialize, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct VaultSettings {
    /// The network address of the Vault server (e.g., "https://vault:8200").
    pub addr: Option<String>,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,
    /// Per-request timeout applied by the HTTP client.
    pub timeout_secs: u64,
    /// HTTP proxy used for requests issued on the controlling host.
    pub controller_proxy: Option<String>,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            addr: None,
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            controller_proxy: None,
        }
    }
}

/// Settings for the private CA flow.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrustSettings {
    pub ca_trust_dir: PathBuf,
    pub filename: String,
    pub update_command: String,
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            ca_trust_dir: PathBuf::from(DEFAULT_CA_TRUST_DIR),
            filename: DEFAULT_CA_FILENAME.to_string(),
            update_command: DEFAULT_UPDATE_COMMAND.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub vault: VaultSettings,
    pub deploy: DeployDefaults,
    pub trust: TrustSettings,
}

impl Config {
    /// Loads the configuration file if one is given, then applies the
    /// environment fallbacks.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse '{}': {}", path.display(), e)))
    }

    pub fn from_yaml(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Fills unset Vault settings from `lookup` (the process environment in
    /// production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.vault.addr.is_none() {
            self.vault.addr = lookup("VAULT_ADDR").filter(|v| !v.is_empty());
        }
        if self.vault.token.is_none() {
            self.vault.token = lookup("VAULT_TOKEN")
                .filter(|v| !v.is_empty())
                .map(SecretString::from);
        }
    }
}
