/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/error.rs
*
* The error taxonomy shared by every component of the crate. Validation
* failures are raised before any I/O; authority, deployment and hook failures
* carry enough context (path, command, Vault message) to be reported verbatim.
* No variant ever embeds private key material.
*
* SPDX-License-Identifier: Apache-2.0 */

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("{0}")]
    Validation(String),

    #[error("Vault PKI issuance failed: {message}")]
    Authority { status: Option<u16>, message: String },

    #[error("Vault returned an empty certificate or private key for '{common_name}'")]
    EmptyIssuance { common_name: String },

    #[error("Failed to deploy '{}': {source}", .path.display())]
    Deployment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Trust store refresh command '{command}' failed: {stderr}")]
    Hook { command: String, stderr: String },

    /// The CA file reached its destination but the refresh hook then failed.
    #[error("CA certificate deployed to '{}' (changed: {changed}) but {source}", .path.display())]
    HookAfterDeploy {
        path: PathBuf,
        changed: bool,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification used in reports and by callers that branch on the
/// failure family rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authority,
    EmptyIssuance,
    Deployment,
    Hook,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingFields(_) | Error::Validation(_) => ErrorKind::Validation,
            Error::Authority { .. } => ErrorKind::Authority,
            Error::EmptyIssuance { .. } => ErrorKind::EmptyIssuance,
            Error::Deployment { .. } => ErrorKind::Deployment,
            Error::Hook { .. } | Error::HookAfterDeploy { .. } => ErrorKind::Hook,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Builds a closure mapping an I/O error onto a `Deployment` error for `path`.
    pub(crate) fn deployment(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Deployment { path, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
