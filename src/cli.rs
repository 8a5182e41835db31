/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/cli.rs
 * This file defines the entire command-line interface for `cert_deployer`
 * using the `clap` crate's declarative, struct-based approach. Required
 * issuance fields are modelled as options on purpose: the library validates
 * them and reports every missing one at once.
 * SPDX-License-Identifier: Apache-2.0 */

use cert_deployer::record::{FileMode, RecordSpec};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Issue certificates from Vault PKI and deploy them idempotently.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Report what would change without writing anything.
    #[arg(long, global = true)]
    pub check: bool,

    /// Also treat mode/ownership drift of files with correct content as a change.
    #[arg(long, global = true)]
    pub detect_metadata_drift: bool,

    /// Format of the diagnostic log written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// The enumeration of available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Request a certificate from Vault PKI.
    IssueCertificate(IssueCertificateArgs),

    /// Deploy one certificate and its private key.
    DeployCertificate(DeployCertificateArgs),

    /// Deploy every record listed in a YAML or JSON file.
    DeployCertificates(DeployCertificatesArgs),

    /// Deploy a private CA certificate and refresh the system trust store.
    DeployPrivateCa(DeployPrivateCaArgs),

    /// Request a certificate from Vault PKI and deploy it.
    IssueAndDeploy(IssueAndDeployArgs),
}

/// Fields of a Vault PKI issuance request.
#[derive(Args, Debug)]
pub struct IssueArgs {
    #[arg(long)]
    pub common_name: Option<String>,

    /// Mount point of the PKI secrets engine (e.g. "pki").
    #[arg(long)]
    pub engine_mount_point: Option<String>,

    #[arg(long)]
    pub role_name: Option<String>,

    /// Vault token. Falls back to the configuration file and VAULT_TOKEN.
    #[arg(long)]
    pub token: Option<String>,

    /// Comma-separated subject alternative names.
    #[arg(long)]
    pub alt_names: Option<String>,

    /// Comma-separated IP subject alternative names.
    #[arg(long)]
    pub ip_sans: Option<String>,

    #[arg(long)]
    pub ttl: Option<String>,

    /// Vault address. Falls back to the configuration file and VAULT_ADDR.
    #[arg(long)]
    pub vault_addr: Option<String>,

    /// Issue from the managed host instead of the controlling host.
    #[arg(long)]
    pub on_target: bool,
}

/// Where and how the files land on disk.
#[derive(Args, Debug, Default)]
pub struct PlacementArgs {
    #[arg(long)]
    pub cert_dir: Option<PathBuf>,
    #[arg(long)]
    pub key_dir: Option<PathBuf>,
    #[arg(long)]
    pub cert_mode: Option<FileMode>,
    #[arg(long)]
    pub key_mode: Option<FileMode>,
    #[arg(long)]
    pub cert_owner: Option<String>,
    #[arg(long)]
    pub cert_group: Option<String>,
    #[arg(long)]
    pub key_owner: Option<String>,
    #[arg(long)]
    pub key_group: Option<String>,
    /// Treat the certificate as a CA: no key is deployed.
    #[arg(long)]
    pub is_ca: bool,
    /// Create missing destination directories.
    #[arg(long)]
    pub create_dirs: bool,
}

impl PlacementArgs {
    pub fn into_spec(self, name: Option<String>) -> RecordSpec {
        RecordSpec {
            name,
            cert_dir: self.cert_dir,
            key_dir: self.key_dir,
            cert_mode: self.cert_mode,
            key_mode: self.key_mode,
            cert_owner: self.cert_owner,
            cert_group: self.cert_group,
            key_owner: self.key_owner,
            key_group: self.key_group,
            is_ca: Some(self.is_ca),
            create_dirs: Some(self.create_dirs),
            ..RecordSpec::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct IssueCertificateArgs {
    #[command(flatten)]
    pub issue: IssueArgs,

    /// Write the issued private key to this path (mode 0600). The key is never printed.
    #[arg(long)]
    pub key_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DeployCertificateArgs {
    /// Certificate filename, e.g. "example.com.crt".
    #[arg(long)]
    pub name: String,

    /// File holding the PEM certificate.
    #[arg(long)]
    pub cert_file: PathBuf,

    /// File holding the PEM private key. Omit with --is-ca.
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    #[command(flatten)]
    pub placement: PlacementArgs,
}

#[derive(Args, Debug)]
pub struct DeployCertificatesArgs {
    /// YAML or JSON list of records.
    #[arg(long, short)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct DeployPrivateCaArgs {
    /// File holding the PEM CA certificate.
    #[arg(long)]
    pub private_ca_file: PathBuf,

    /// Filename inside the trust anchors directory.
    #[arg(long)]
    pub filename: Option<String>,

    #[arg(long)]
    pub ca_trust_dir: Option<PathBuf>,

    /// Command run after deployment to refresh the trust store.
    #[arg(long)]
    pub update_ca_command: Option<String>,

    /// Create the trust anchors directory if it does not exist.
    #[arg(long)]
    pub create_dir: bool,
}

#[derive(Args, Debug)]
pub struct IssueAndDeployArgs {
    #[command(flatten)]
    pub issue: IssueArgs,

    /// Certificate filename. Defaults to "<common_name>.crt".
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub placement: PlacementArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_deploy_parsing() {
        let cli = Cli::try_parse_from([
            "cert_deployer",
            "--check",
            "issue-and-deploy",
            "--common-name",
            "example.com",
            "--engine-mount-point",
            "pki",
            "--role-name",
            "web",
            "--key-mode",
            "0640",
            "--on-target",
        ])
        .unwrap();

        assert!(cli.check);
        match cli.command {
            Commands::IssueAndDeploy(args) => {
                assert_eq!(args.issue.common_name.as_deref(), Some("example.com"));
                assert!(args.issue.on_target);
                assert!(args.issue.token.is_none());
                assert_eq!(args.placement.key_mode.unwrap().bits(), 0o640);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_mode_is_rejected_by_the_parser() {
        let result = Cli::try_parse_from([
            "cert_deployer",
            "deploy-certificate",
            "--name",
            "a.crt",
            "--cert-file",
            "a.pem",
            "--cert-mode",
            "rw-r--r--",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_placement_maps_onto_record_spec() {
        let spec = PlacementArgs {
            key_group: Some("nginx".to_string()),
            is_ca: true,
            ..PlacementArgs::default()
        }
        .into_spec(Some("ca.crt".to_string()));

        assert_eq!(spec.name.as_deref(), Some("ca.crt"));
        assert_eq!(spec.key_group.as_deref(), Some("nginx"));
        assert_eq!(spec.is_ca, Some(true));
        assert!(spec.cert_dir.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cert_deployer",
            "deploy-certificates",
            "-f",
            "records.yaml",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
