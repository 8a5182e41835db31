/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/main.rs
 *
 * Entry point of the `cert_deployer` binary. Parses args via clap (from
 * cli.rs), loads the configuration, dispatches to the library workflows on a
 * Tokio runtime and prints a single JSON report on stdout. The report always
 * carries `changed`, `failed` and `msg`; private keys never appear in it.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use anyhow::{Context, Result};
use cert_deployer::deploy::BatchStatus;
use cert_deployer::issue::IssuanceResult;
use cert_deployer::orchestrate::{self, PrivateCaRequest};
use cert_deployer::record::{self, DeployDefaults};
use cert_deployer::{
    Config, DeployMode, DeploymentEngine, DriftPolicy, Error, IssuanceClient, IssuanceRequest,
    VaultPki,
};
use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

mod cli;
mod telemetry;

/// Builds the printed report from a serializable detail object.
fn report<T: Serialize>(changed: bool, failed: bool, msg: impl Into<String>, detail: &T) -> Result<Value> {
    let mut map = match serde_json::to_value(detail).context("Failed to serialize report")? {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    map.insert("changed".to_string(), changed.into());
    map.insert("failed".to_string(), failed.into());
    map.insert("msg".to_string(), Value::String(msg.into()));
    Ok(Value::Object(map))
}

fn read_pem(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from '{}'", what, path.display()))
}

fn write_private_key(path: &Path, key: &SecretString) -> Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("Failed to open '{}' for the private key", path.display()))?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions on '{}'", path.display()))?;
    file.write_all(key.expose_secret().as_bytes())
        .with_context(|| format!("Failed to write the private key to '{}'", path.display()))?;
    Ok(())
}

fn issuance_request(args: cli::IssueArgs, config: &mut Config) -> IssuanceRequest {
    IssuanceRequest {
        common_name: args.common_name,
        engine_mount_point: args.engine_mount_point,
        role_name: args.role_name,
        token: args.token.map(SecretString::from).or_else(|| config.vault.token.take()),
        alt_names: args.alt_names,
        ip_sans: args.ip_sans,
        ttl: args.ttl,
        vault_addr: args.vault_addr,
        on_target: args.on_target,
    }
}

fn issuance_client(config: &Config) -> Result<IssuanceClient<VaultPki>> {
    let authority = VaultPki::new(&config.vault).context("Failed to set up the Vault client")?;
    Ok(IssuanceClient::new(authority).with_default_addr(config.vault.addr.clone()))
}

/// The top-level async runner that does the real work.
async fn run_async_logic(cli: cli::Cli) -> Result<Value> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mode = if cli.check { DeployMode::Check } else { DeployMode::Apply };
    let drift = if cli.detect_metadata_drift {
        DriftPolicy::ContentAndMetadata
    } else {
        DriftPolicy::ContentOnly
    };
    let engine = DeploymentEngine::new(mode).with_drift_policy(drift);

    match cli.command {
        cli::Commands::IssueCertificate(args) => {
            let request = issuance_request(args.issue, &mut config);
            let mut client = issuance_client(&config)?;

            // Every issuance mints a new serial, so check mode stops at validation.
            if mode == DeployMode::Check {
                client.validate(&request)?;
                let msg = format!(
                    "Certificate for '{}' would be issued.",
                    request.common_name.as_deref().unwrap_or_default()
                );
                return report(true, false, msg, &serde_json::json!({ "check_mode": true }));
            }

            match client.issue(&request).await? {
                IssuanceResult::Issued(cert) => {
                    let mut msg = "Certificate issued.".to_string();
                    if let Some(path) = args.key_out.as_deref() {
                        write_private_key(path, &cert.private_key)?;
                        msg = format!("Certificate issued; private key written to {}.", path.display());
                    }
                    report(true, false, msg, &cert)
                }
                IssuanceResult::Failed(failure) => report(false, true, failure.message.clone(), &failure),
            }
        }

        cli::Commands::DeployCertificate(args) => {
            let mut spec = args.placement.into_spec(Some(args.name));
            spec.cert_content = Some(read_pem(&args.cert_file, "certificate")?);
            if let Some(key_file) = args.key_file.as_deref() {
                spec.key_content = Some(SecretString::from(read_pem(key_file, "private key")?));
            }
            let record = spec.into_record(&config.deploy);

            let result = engine.deploy_one(&record)?;
            let msg = if result.changed {
                format!("Certificate '{}' deployed.", result.name)
            } else {
                format!("Certificate '{}' already up to date.", result.name)
            };
            report(result.changed, false, msg, &result)
        }

        cli::Commands::DeployCertificates(args) => {
            let specs = record::load_batch(&args.file)?;
            let records: Vec<_> = specs
                .into_iter()
                .map(|spec| spec.into_record(&config.deploy))
                .collect();

            let batch = engine.deploy(&records);
            let msg = match batch.status {
                BatchStatus::Succeeded => format!("{} record(s) deployed.", records.len()),
                BatchStatus::Partial => "Some records failed to deploy.".to_string(),
                BatchStatus::Failed => "Every record failed to deploy.".to_string(),
            };
            report(batch.changed, batch.failed, msg, &batch)
        }

        cli::Commands::DeployPrivateCa(args) => {
            let request = PrivateCaRequest {
                private_ca: Some(read_pem(&args.private_ca_file, "CA certificate")?),
                filename: args.filename,
                ca_trust_dir: args.ca_trust_dir,
                update_ca_command: args.update_ca_command,
                create_dir: args.create_dir,
            };
            let outcome = match orchestrate::deploy_private_ca(&engine, &config.trust, request).await {
                Ok(outcome) => outcome,
                Err(e @ Error::HookAfterDeploy { changed, .. }) => {
                    return Ok(serde_json::json!({
                        "changed": changed,
                        "failed": true,
                        "msg": e.to_string(),
                    }))
                }
                Err(e) => return Err(e.into()),
            };
            let msg = if outcome.hook.ran {
                format!(
                    "Private CA deployed to {} and trust store updated.",
                    outcome.cert_result.cert_path.display()
                )
            } else {
                format!("Private CA checked at {}.", outcome.cert_result.cert_path.display())
            };
            report(outcome.changed, false, msg, &outcome)
        }

        cli::Commands::IssueAndDeploy(args) => {
            let placement = args.placement.into_spec(args.name);
            let request = issuance_request(args.issue, &mut config);
            let mut client = issuance_client(&config)?;
            let defaults: &DeployDefaults = &config.deploy;

            let outcome =
                orchestrate::issue_and_deploy(&mut client, &engine, defaults, &request, placement).await?;
            let common_name = request.common_name.as_deref().unwrap_or_default();
            let msg = if outcome.check_mode {
                format!("Certificate for '{}' would be issued and deployed.", common_name)
            } else {
                format!("Certificate for '{}' issued and deployed.", common_name)
            };
            report(outcome.changed, false, msg, &outcome)
        }
    }
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    telemetry::init(cli.log_format);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let value = match runtime.block_on(run_async_logic(cli)) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            serde_json::json!({ "changed": false, "failed": true, "msg": format!("{:#}", e) })
        }
    };

    println!("{}", value);
    if value.get("failed").and_then(Value::as_bool).unwrap_or(false) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
