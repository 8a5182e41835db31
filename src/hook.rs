/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/hook.rs
*
* Post-deployment trust-store refresh. The configured command (by default
* `update-ca-trust`) is resolved on the PATH and executed with no arguments.
* Success is a zero exit status; output is captured only so that a failure
* can be reported with the command's stderr.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::config::DEFAULT_UPDATE_COMMAND;
use crate::error::{Error, Result};
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct TrustStoreHook {
    command: String,
}

/// What happened to the hook during one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct HookReport {
    pub command: String,
    pub ran: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
}

impl Default for TrustStoreHook {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_COMMAND)
    }
}

impl TrustStoreHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// A report for a run where the hook was deliberately not executed.
    pub fn skipped(&self) -> HookReport {
        HookReport {
            command: self.command.clone(),
            ran: false,
            stdout: String::new(),
        }
    }

    pub async fn run(&self) -> Result<HookReport> {
        let program = which::which(&self.command).map_err(|e| Error::Hook {
            command: self.command.clone(),
            stderr: format!("command not found on PATH: {}", e),
        })?;

        tracing::info!(command = %program.display(), "Refreshing system trust store");

        let output = Command::new(&program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Hook {
                command: self.command.clone(),
                stderr: format!("failed to spawn: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(Error::Hook {
                command: self.command.clone(),
                stderr,
            });
        }

        Ok(HookReport {
            command: self.command.clone(),
            ran: true,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }
}
