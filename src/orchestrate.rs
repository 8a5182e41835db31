/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/orchestrate.rs
*
* This file contains the high-level workflows built on top of the issuance
* client, the deployment engine and the trust-store hook:
* 1. `issue_and_deploy`: issue a certificate from Vault and deploy the pair.
*    Deployment is never attempted when issuance fails or returns empty
*    material. In check mode the request is only validated: Vault is never
*    contacted, since every issuance mints a new serial.
* 2. `deploy_private_ca`: deploy a CA certificate into the trust anchors
*    directory and refresh the trust store. The hook runs after every
*    applied deployment, but the reported `changed` flag only reflects the
*    deployment itself.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::config::TrustSettings;
use crate::deploy::{DeployMode, DeploymentEngine, DeploymentResult};
use crate::error::{Error, Result};
use crate::hook::{HookReport, TrustStoreHook};
use crate::issue::{IssuanceClient, IssuanceRequest, PkiAuthority};
use crate::record::{DeployDefaults, FileMode, RecordSpec, CERT_SUFFIX, DEFAULT_GROUP, DEFAULT_OWNER};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct IssueAndDeployReport {
    pub changed: bool,
    pub check_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    /// Absent in check mode, where nothing was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentResult>,
}

/// Issues a certificate and deploys it according to `placement`.
///
/// `placement.name` defaults to `{common_name}.crt`; its content fields are
/// overwritten with the issued material.
pub async fn issue_and_deploy<A: PkiAuthority>(
    issuer: &mut IssuanceClient<A>,
    engine: &DeploymentEngine,
    defaults: &DeployDefaults,
    request: &IssuanceRequest,
    mut placement: RecordSpec,
) -> Result<IssueAndDeployReport> {
    if engine.mode() == DeployMode::Check {
        issuer.validate(request)?;
        tracing::info!(
            common_name = request.common_name.as_deref().unwrap_or_default(),
            "Check mode: certificate would be issued and deployed"
        );
        return Ok(IssueAndDeployReport {
            changed: true,
            check_mode: true,
            serial_number: None,
            expiration: None,
            deployment: None,
        });
    }

    let issued = issuer.issue(request).await?.into_result()?;

    let common_name = request.common_name.clone().unwrap_or_default();
    let is_ca = placement.is_ca.unwrap_or(false);
    if issued.certificate.is_empty() || (!is_ca && issued.private_key.expose_secret().is_empty()) {
        return Err(Error::EmptyIssuance { common_name });
    }

    if placement.name.as_deref().map_or(true, str::is_empty) {
        placement.name = Some(format!("{}{}", common_name, CERT_SUFFIX));
    }
    placement.cert_content = Some(issued.certificate);
    placement.key_content = Some(issued.private_key);

    let record = placement.into_record(defaults);
    let deployment = engine.deploy_one(&record)?;

    Ok(IssueAndDeployReport {
        changed: deployment.changed,
        check_mode: false,
        serial_number: issued.serial_number,
        expiration: issued.expiration,
        deployment: Some(deployment),
    })
}

/// Input of the private CA flow. Unset fields fall back to `TrustSettings`.
#[derive(Debug, Default)]
pub struct PrivateCaRequest {
    pub private_ca: Option<String>,
    pub filename: Option<String>,
    pub ca_trust_dir: Option<PathBuf>,
    pub update_ca_command: Option<String>,
    pub create_dir: bool,
}

#[derive(Debug, Serialize)]
pub struct PrivateCaReport {
    pub changed: bool,
    pub cert_result: DeploymentResult,
    pub hook: HookReport,
}

pub async fn deploy_private_ca(
    engine: &DeploymentEngine,
    trust: &TrustSettings,
    request: PrivateCaRequest,
) -> Result<PrivateCaReport> {
    let private_ca = request
        .private_ca
        .filter(|pem| !pem.trim().is_empty())
        .ok_or_else(|| Error::MissingFields(vec!["private_ca"]))?;

    let record = RecordSpec {
        name: Some(request.filename.unwrap_or_else(|| trust.filename.clone())),
        cert_content: Some(private_ca),
        cert_dir: Some(request.ca_trust_dir.unwrap_or_else(|| trust.ca_trust_dir.clone())),
        cert_mode: Some(FileMode::CERT),
        cert_owner: Some(DEFAULT_OWNER.to_string()),
        cert_group: Some(DEFAULT_GROUP.to_string()),
        is_ca: Some(true),
        create_dirs: Some(request.create_dir),
        ..RecordSpec::default()
    }
    .into_record(&DeployDefaults::default());

    let cert_result = engine.deploy_one(&record)?;

    let hook = TrustStoreHook::new(
        request
            .update_ca_command
            .unwrap_or_else(|| trust.update_command.clone()),
    );
    let hook = match engine.mode() {
        DeployMode::Check => hook.skipped(),
        DeployMode::Apply => hook.run().await.map_err(|e| {
            tracing::error!(
                path = %cert_result.cert_path.display(),
                changed = cert_result.changed,
                "CA certificate is deployed but the trust store refresh failed"
            );
            Error::HookAfterDeploy {
                path: cert_result.cert_path.clone(),
                changed: cert_result.changed,
                source: Box::new(e),
            }
        })?,
    };

    Ok(PrivateCaReport {
        changed: cert_result.changed,
        cert_result,
        hook,
    })
}
