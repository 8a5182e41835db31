/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/issue/vault.rs
*
* This file provides the concrete implementation of the `PkiAuthority` trait
* for HashiCorp Vault's PKI secrets engine.
*
* Architecture:
* The implementation uses the `reqwest` crate for all HTTP communication.
* Two clients are kept, one per execution target: requests issued "on the
* controller" leave through the configured controller proxy (when one is
* set), requests issued "on the target" go out directly from this host.
*
* Wire protocol:
* `POST {vault_addr}/v1/{mount}/issue/{role}` with the `X-Vault-Token`
* header and a JSON body holding `common_name` plus whichever of
* `alt_names`, `ip_sans` and `ttl` were supplied. On success the material is
* nested under `data`. On failure Vault answers with an `errors` array,
* which is passed back verbatim.
*
* SPDX-License-Identifier: Apache-2.0 */

use super::context::ExecutionTarget;
use super::{AuthMode, AuthorityFailure, IssuanceResult, IssuedCertificate, PkiAuthority, VaultIssueParams};
use crate::config::VaultSettings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

// --- Response shapes ---

#[derive(Deserialize)]
struct IssueResponse {
    data: IssueData,
}

#[derive(Deserialize)]
struct IssueData {
    #[serde(default)]
    certificate: String,
    #[serde(default)]
    private_key: String,
    issuing_ca: Option<String>,
    #[serde(default)]
    ca_chain: Vec<String>,
    serial_number: Option<String>,
    expiration: Option<i64>,
    private_key_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

// --- Provider Implementation ---

/// A PKI authority backed by a Vault PKI secrets engine.
pub struct VaultPki {
    controller: reqwest::Client,
    target: reqwest::Client,
    controller_proxied: bool,
}

impl VaultPki {
    /// Creates a new `VaultPki` from the `[vault]` configuration section.
    pub fn new(settings: &VaultSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs);

        // Proxies come from configuration only, never from the environment.
        let mut controller = reqwest::Client::builder().timeout(timeout).no_proxy();
        if let Some(proxy) = settings.controller_proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                Error::Config(format!("Invalid controller proxy '{}': {}", proxy, e))
            })?;
            controller = controller.proxy(proxy);
        }
        let controller = controller.build().map_err(|e| {
            Error::Config(format!("Failed to build HTTP client for Vault: {}", e))
        })?;

        let target = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client for Vault: {}", e)))?;

        Ok(Self {
            controller,
            target,
            controller_proxied: settings.controller_proxy.is_some(),
        })
    }

    /// True when the two execution targets reach Vault over different routes.
    /// Without a controller proxy both connect directly from this host.
    pub fn targets_differ(&self) -> bool {
        self.controller_proxied
    }

    fn client_for(&self, target: ExecutionTarget) -> &reqwest::Client {
        match target {
            ExecutionTarget::Controller => &self.controller,
            ExecutionTarget::Managed => &self.target,
        }
    }
}

fn issue_url(params: &VaultIssueParams<'_>) -> String {
    format!(
        "{}/v1/{}/issue/{}",
        params.url.trim_end_matches('/'),
        params.engine_mount_point.trim_matches('/'),
        params.role_name
    )
}

fn failure(status: Option<u16>, message: String) -> IssuanceResult {
    IssuanceResult::Failed(AuthorityFailure { status, message })
}

#[async_trait]
impl PkiAuthority for VaultPki {
    async fn issue(&self, params: &VaultIssueParams<'_>, target: ExecutionTarget) -> IssuanceResult {
        let url = issue_url(params);
        tracing::debug!(url = %url, target = ?target, "Sending PKI issue request to Vault");
        if target == ExecutionTarget::Managed && !self.targets_differ() {
            tracing::debug!("on_target has no effect: no controller proxy is configured");
        }

        let request = self.client_for(target).post(&url).json(&params.body);
        let request = match params.auth_mode {
            AuthMode::Token => request.header("X-Vault-Token", params.token.expose_secret()),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return failure(None, format!("Failed to send issue request to Vault at '{}': {}", url, e))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body.".to_string());
            let message = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
                _ => format!("Status: {}. Body: {}", status, body),
            };
            return failure(Some(status.as_u16()), message);
        }

        match response.json::<IssueResponse>().await {
            Ok(IssueResponse { data }) => IssuanceResult::Issued(IssuedCertificate {
                certificate: data.certificate,
                private_key: SecretString::from(data.private_key),
                issuing_ca: data.issuing_ca,
                ca_chain: data.ca_chain,
                serial_number: data.serial_number,
                expiration: data.expiration,
                private_key_type: data.private_key_type,
            }),
            Err(e) => failure(
                Some(status.as_u16()),
                format!("Failed to parse issue response from Vault at '{}': {}", url, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueBody;

    #[test]
    fn test_issue_url_normalizes_slashes() {
        let token = SecretString::from("t".to_string());
        let params = VaultIssueParams {
            url: "https://vault.example.com/",
            engine_mount_point: "/pki_int/",
            role_name: "web",
            token: &token,
            auth_mode: AuthMode::Token,
            body: IssueBody {
                common_name: "example.com",
                alt_names: None,
                ip_sans: None,
                ttl: None,
            },
        };
        assert_eq!(issue_url(&params), "https://vault.example.com/v1/pki_int/issue/web");
    }

    #[test]
    fn test_targets_only_differ_with_a_controller_proxy() {
        let direct = VaultPki::new(&VaultSettings::default()).unwrap();
        assert!(!direct.targets_differ());

        let proxied = VaultPki::new(&VaultSettings {
            controller_proxy: Some("http://proxy.internal:3128".to_string()),
            ..VaultSettings::default()
        })
        .unwrap();
        assert!(proxied.targets_differ());
    }

    #[test]
    fn test_invalid_controller_proxy_is_a_config_error() {
        let settings = VaultSettings {
            controller_proxy: Some("::not a url::".to_string()),
            ..VaultSettings::default()
        };
        let err = VaultPki::new(&settings).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
