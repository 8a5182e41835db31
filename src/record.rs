/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/record.rs
*
* This file defines the deployment unit of the crate, `CertificateRecord`,
* together with the pieces it is built from:
* 1. `FileMode`: octal permission bits accepted as "0644", "644" or "0o644".
* 2. `DeployDefaults`: the directories, modes and principals used when a
*    caller does not supply them (the well-known RHEL trust-store layout).
* 3. `RecordSpec`: the loosely-optional input shape read from batch files and
*    assembled by the CLI. It is turned into a fully-populated record through
*    an explicit field-by-field mapping, so every default is visible here.
*
* A record is constructed per invocation and is never persisted; change
* detection is re-derived from the filesystem on every deployment.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CERT_SUFFIX: &str = ".crt";
pub const KEY_SUFFIX: &str = ".key";

pub const DEFAULT_CERT_DIR: &str = "/etc/pki/tls/certs/";
pub const DEFAULT_KEY_DIR: &str = "/etc/pki/tls/private/";
pub const DEFAULT_CA_TRUST_DIR: &str = "/etc/pki/ca-trust/source/anchors/";
pub const DEFAULT_CA_FILENAME: &str = "custom-ca.crt";
pub const DEFAULT_OWNER: &str = "root";
pub const DEFAULT_GROUP: &str = "root";

// --- Permission bits ---

/// Unix permission bits for a deployed file.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    pub const CERT: FileMode = FileMode(0o644);
    pub const KEY: FileMode = FileMode(0o600);

    pub fn new(bits: u32) -> Result<Self> {
        if bits > 0o7777 {
            return Err(Error::Validation(format!(
                "File mode {:o} is out of range (maximum 7777)",
                bits
            )));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl FromStr for FileMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        if digits.is_empty() {
            return Err(Error::Validation("File mode must not be empty".to_string()));
        }
        let bits = u32::from_str_radix(digits, 8).map_err(|_| {
            Error::Validation(format!("'{}' is not a valid octal file mode", s))
        })?;
        FileMode::new(bits)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl fmt::Debug for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileMode({:04o})", self.0)
    }
}

impl<'de> Deserialize<'de> for FileMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // YAML happily reads an unquoted `0644` as the integer 644, so numbers
        // are read digit-for-digit as octal.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Deserializes an optional string straight into a `SecretString` so the
/// plaintext never lives in a `Debug`-able field.
pub(crate) fn deserialize_secret<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

// --- Defaults ---

/// Placement defaults applied to every record that leaves a field unset.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DeployDefaults {
    pub cert_dir: PathBuf,
    pub key_dir: PathBuf,
    pub cert_mode: FileMode,
    pub key_mode: FileMode,
    pub cert_owner: String,
    pub cert_group: String,
    pub key_owner: String,
    pub key_group: String,
}

impl Default for DeployDefaults {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            key_dir: PathBuf::from(DEFAULT_KEY_DIR),
            cert_mode: FileMode::CERT,
            key_mode: FileMode::KEY,
            cert_owner: DEFAULT_OWNER.to_string(),
            cert_group: DEFAULT_GROUP.to_string(),
            key_owner: DEFAULT_OWNER.to_string(),
            key_group: DEFAULT_GROUP.to_string(),
        }
    }
}

// --- The deployment unit ---

/// One certificate (and, unless CA-only, its private key) to deploy.
#[derive(Debug)]
pub struct CertificateRecord {
    pub name: String,
    pub cert_content: String,
    pub key_content: Option<SecretString>,
    pub cert_dir: PathBuf,
    pub key_dir: PathBuf,
    pub cert_mode: FileMode,
    pub key_mode: FileMode,
    pub cert_owner: String,
    pub cert_group: String,
    pub key_owner: String,
    pub key_group: String,
    /// Suppresses key deployment and relaxes the `.crt` filename rule.
    pub is_ca: bool,
    /// Create missing destination directories (mode 0755) before writing.
    pub create_dirs: bool,
}

impl CertificateRecord {
    /// A certificate/key pair placed according to `DeployDefaults::default()`.
    pub fn new(
        name: impl Into<String>,
        cert_content: impl Into<String>,
        key_content: impl Into<String>,
    ) -> Self {
        RecordSpec {
            name: Some(name.into()),
            cert_content: Some(cert_content.into()),
            key_content: Some(SecretString::from(key_content.into())),
            ..RecordSpec::default()
        }
        .into_record(&DeployDefaults::default())
    }

    /// A CA certificate destined for the system trust anchors directory.
    pub fn ca(name: impl Into<String>, cert_content: impl Into<String>) -> Self {
        let mut record = RecordSpec {
            name: Some(name.into()),
            cert_content: Some(cert_content.into()),
            is_ca: Some(true),
            ..RecordSpec::default()
        }
        .into_record(&DeployDefaults::default());
        record.cert_dir = PathBuf::from(DEFAULT_CA_TRUST_DIR);
        record
    }

    pub fn with_dirs(mut self, cert_dir: impl Into<PathBuf>, key_dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = cert_dir.into();
        self.key_dir = key_dir.into();
        self
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    /// Checks the record without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.is_empty() {
            return Err(Error::MissingFields(vec!["name"]));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(Error::Validation(format!(
                "The 'name' parameter must be a plain filename without path separators: {}",
                name
            )));
        }
        if !self.is_ca && !name.ends_with(CERT_SUFFIX) {
            return Err(Error::Validation(format!(
                "The 'name' parameter must be a valid {} filename (example{}): {}",
                CERT_SUFFIX, CERT_SUFFIX, name
            )));
        }

        let key_present = self
            .key_content
            .as_ref()
            .is_some_and(|key| !key.expose_secret().is_empty());
        if self.cert_content.is_empty() || (!self.is_ca && !key_present) {
            return Err(Error::Validation(
                "Both 'cert_content' and 'key_content' are required unless 'is_ca' is true."
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(&self.name)
    }

    /// The key destination, or `None` for CA-only records.
    ///
    /// Every literal occurrence of `.crt` in the name is replaced, so
    /// `a.crt.crt` maps to `a.key.key`.
    pub fn key_path(&self) -> Option<PathBuf> {
        if self.is_ca {
            return None;
        }
        Some(self.key_dir.join(key_file_name(&self.name)))
    }
}

pub fn key_file_name(cert_name: &str) -> String {
    cert_name.replace(CERT_SUFFIX, KEY_SUFFIX)
}

// --- Loosely-typed input ---

/// Record input as read from a batch file or assembled from CLI flags.
/// Every field is optional; `into_record` fills the gaps from defaults.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct RecordSpec {
    pub name: Option<String>,
    pub cert_content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub key_content: Option<SecretString>,
    pub cert_dir: Option<PathBuf>,
    pub key_dir: Option<PathBuf>,
    pub cert_mode: Option<FileMode>,
    pub key_mode: Option<FileMode>,
    pub cert_owner: Option<String>,
    pub cert_group: Option<String>,
    pub key_owner: Option<String>,
    pub key_group: Option<String>,
    pub is_ca: Option<bool>,
    pub create_dirs: Option<bool>,
}

impl RecordSpec {
    pub fn into_record(self, defaults: &DeployDefaults) -> CertificateRecord {
        CertificateRecord {
            name: self.name.unwrap_or_default(),
            cert_content: self.cert_content.unwrap_or_default(),
            key_content: self.key_content,
            cert_dir: self.cert_dir.unwrap_or_else(|| defaults.cert_dir.clone()),
            key_dir: self.key_dir.unwrap_or_else(|| defaults.key_dir.clone()),
            cert_mode: self.cert_mode.unwrap_or(defaults.cert_mode),
            key_mode: self.key_mode.unwrap_or(defaults.key_mode),
            cert_owner: self.cert_owner.unwrap_or_else(|| defaults.cert_owner.clone()),
            cert_group: self.cert_group.unwrap_or_else(|| defaults.cert_group.clone()),
            key_owner: self.key_owner.unwrap_or_else(|| defaults.key_owner.clone()),
            key_group: self.key_group.unwrap_or_else(|| defaults.key_group.clone()),
            is_ca: self.is_ca.unwrap_or(false),
            create_dirs: self.create_dirs.unwrap_or(false),
        }
    }
}

/// Reads a list of `RecordSpec`s from a YAML (or JSON) document.
pub fn load_batch(path: &Path) -> Result<Vec<RecordSpec>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read batch file '{}': {}", path.display(), e))
    })?;
    serde_yaml::from_str(&raw).map_err(|e| {
        Error::Config(format!("Failed to parse batch file '{}': {}", path.display(), e))
    })
}
