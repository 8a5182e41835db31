/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/lib.rs
*
* This file is the main entry point for the `cert_deployer` library. It
* issues certificates from a HashiCorp Vault PKI secrets engine and deploys
* certificate/key pairs to the local filesystem idempotently.
*
* It is organized around two components and the glue between them:
* 1. `issue`: the issuance client. It validates a request, forwards an
*    explicit allow-list of fields to the PKI authority and normalizes the
*    answer into `{certificate, private_key}` or a failure.
* 2. `deploy`: the deployment engine. It compares the desired content with
*    what is on disk, writes only what differs (atomically, with the
*    requested mode and ownership) and reports per-file change status.
* 3. `orchestrate`: issuance -> deployment, and the private CA flow that
*    finishes with a trust-store refresh through `hook`.
*
* Every invocation is processed sequentially and keeps no state between
* calls; change detection is derived from the filesystem each time.
*
* SPDX-License-Identifier: Apache-2.0 */

pub mod config;
pub mod deploy;
pub mod error;
pub mod hook;
pub mod issue;
pub mod orchestrate;
pub mod principal;
pub mod record;

pub use config::Config;
pub use deploy::{BatchReport, BatchStatus, DeployMode, DeploymentEngine, DeploymentResult, DriftPolicy};
pub use error::{Error, ErrorKind, Result};
pub use hook::TrustStoreHook;
pub use issue::{IssuanceClient, IssuanceRequest, IssuanceResult, PkiAuthority, VaultPki};
pub use record::{CertificateRecord, FileMode, RecordSpec};
