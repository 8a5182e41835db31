/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/issue/mod.rs
*
* This file contains the certificate issuance client. It accepts an
* `IssuanceRequest`, validates it locally, projects it onto the parameters
* the PKI authority understands, and normalizes the answer into an
* `IssuanceResult`.
*
* Key components:
* 1. `VaultIssueParams`: the explicit allow-list of fields forwarded to the
*    authority. Optional fields are omitted (never sent as empty strings) so
*    the role's defaults apply.
* 2. `PkiAuthority`: the async trait at the authority boundary. `VaultPki`
*    in `vault.rs` is the production implementation; tests substitute their
*    own.
* 3. `IssuanceClient`: owns the authority and the `ExecutionContext`, and
*    scopes every request to the requested execution target.
*
* Local validation failures are raised as errors before any network call.
* Failures reported by the authority come back as `IssuanceResult::Failed`
* carrying the authority's message verbatim.
*
* SPDX-License-Identifier: Apache-2.0 */

pub mod context;
pub mod vault;

use crate::error::{Error, Result};
use async_trait::async_trait;
use context::{ExecutionContext, ExecutionTarget};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

pub use vault::VaultPki;

// --- Request ---

/// A request for a freshly signed certificate and private key.
#[derive(Debug, Default)]
pub struct IssuanceRequest {
    pub common_name: Option<String>,
    pub engine_mount_point: Option<String>,
    pub role_name: Option<String>,
    pub token: Option<SecretString>,
    pub alt_names: Option<String>,
    pub ip_sans: Option<String>,
    pub ttl: Option<String>,
    pub vault_addr: Option<String>,
    pub on_target: bool,
}

impl IssuanceRequest {
    pub fn new(
        common_name: impl Into<String>,
        engine_mount_point: impl Into<String>,
        role_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            common_name: Some(common_name.into()),
            engine_mount_point: Some(engine_mount_point.into()),
            role_name: Some(role_name.into()),
            token: Some(SecretString::from(token.into())),
            ..Self::default()
        }
    }
}

/// Authentication method used against the authority. Only token auth is
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Token,
}

/// JSON body of the PKI `issue` call.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct IssueBody<'a> {
    pub common_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_names: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_sans: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<&'a str>,
}

/// Everything the authority receives for one issuance.
#[derive(Debug)]
pub struct VaultIssueParams<'a> {
    pub url: &'a str,
    pub engine_mount_point: &'a str,
    pub role_name: &'a str,
    pub token: &'a SecretString,
    pub auth_mode: AuthMode,
    pub body: IssueBody<'a>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl<'a> VaultIssueParams<'a> {
    /// Projects `request` field by field. Every missing required field is
    /// reported at once; `default_addr` stands in for an absent `vault_addr`.
    pub fn from_request(request: &'a IssuanceRequest, default_addr: Option<&'a str>) -> Result<Self> {
        let common_name = present(&request.common_name);
        let engine_mount_point = present(&request.engine_mount_point);
        let role_name = present(&request.role_name);
        let token = request
            .token
            .as_ref()
            .filter(|t| !t.expose_secret().trim().is_empty());
        let url = present(&request.vault_addr).or(default_addr.filter(|a| !a.trim().is_empty()));

        match (common_name, engine_mount_point, role_name, token, url) {
            (Some(common_name), Some(engine_mount_point), Some(role_name), Some(token), Some(url)) => {
                Ok(Self {
                    url,
                    engine_mount_point,
                    role_name,
                    token,
                    auth_mode: AuthMode::Token,
                    body: IssueBody {
                        common_name,
                        alt_names: present(&request.alt_names),
                        ip_sans: present(&request.ip_sans),
                        ttl: present(&request.ttl),
                    },
                })
            }
            _ => {
                let missing = [
                    ("common_name", common_name.is_none()),
                    ("engine_mount_point", engine_mount_point.is_none()),
                    ("role_name", role_name.is_none()),
                    ("token", token.is_none()),
                    ("vault_addr", url.is_none()),
                ]
                .into_iter()
                .filter_map(|(field, absent)| absent.then_some(field))
                .collect();
                Err(Error::MissingFields(missing))
            }
        }
    }
}

// --- Result ---

/// Certificate material returned by the authority. The private key is
/// never serialized.
#[derive(Debug, Serialize)]
pub struct IssuedCertificate {
    pub certificate: String,
    #[serde(skip)]
    pub private_key: SecretString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuing_ca: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ca_chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthorityFailure {
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug)]
pub enum IssuanceResult {
    Issued(IssuedCertificate),
    Failed(AuthorityFailure),
}

impl IssuanceResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, IssuanceResult::Failed(_))
    }

    pub fn into_result(self) -> Result<IssuedCertificate> {
        match self {
            IssuanceResult::Issued(cert) => Ok(cert),
            IssuanceResult::Failed(failure) => Err(Error::Authority {
                status: failure.status,
                message: failure.message,
            }),
        }
    }
}

// --- Authority boundary ---

#[async_trait]
pub trait PkiAuthority: Send + Sync {
    /// Performs one issuance round trip from `target`.
    async fn issue(&self, params: &VaultIssueParams<'_>, target: ExecutionTarget) -> IssuanceResult;
}

// --- Client ---

pub struct IssuanceClient<A> {
    authority: A,
    context: ExecutionContext,
    default_addr: Option<String>,
}

impl<A: PkiAuthority> IssuanceClient<A> {
    pub fn new(authority: A) -> Self {
        Self {
            authority,
            context: ExecutionContext::default(),
            default_addr: None,
        }
    }

    /// Address used when a request carries no `vault_addr`.
    pub fn with_default_addr(mut self, addr: Option<String>) -> Self {
        self.default_addr = addr;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Checks `request` the way `issue` would, without contacting the authority.
    pub fn validate(&self, request: &IssuanceRequest) -> Result<()> {
        VaultIssueParams::from_request(request, self.default_addr.as_deref()).map(|_| ())
    }

    pub async fn issue(&mut self, request: &IssuanceRequest) -> Result<IssuanceResult> {
        let params = VaultIssueParams::from_request(request, self.default_addr.as_deref())?;
        let target = ExecutionTarget::from_on_target(request.on_target);

        tracing::info!(
            common_name = params.body.common_name,
            mount = params.engine_mount_point,
            role = params.role_name,
            target = ?target,
            "Requesting certificate from Vault PKI"
        );

        let scope = self.context.delegate(target);
        let result = self.authority.issue(&params, scope.target()).await;
        drop(scope);

        match &result {
            IssuanceResult::Issued(cert) => tracing::info!(
                common_name = params.body.common_name,
                serial = cert.serial_number.as_deref().unwrap_or("unknown"),
                "Certificate issued"
            ),
            IssuanceResult::Failed(failure) => tracing::error!(
                common_name = params.body.common_name,
                status = ?failure.status,
                message = %failure.message,
                "Vault PKI rejected the issuance request"
            ),
        }
        Ok(result)
    }
}
