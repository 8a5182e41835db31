/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/deploy.rs
*
* This file implements the certificate deployment engine. Given one or more
* `CertificateRecord`s it decides, per file, whether the on-disk state has to
* change, writes what must be written, and reports the outcome.
*
* Architecture:
* 1. Validation: every record is validated before any filesystem access.
* 2. Change detection: the existing file is read and compared byte-for-byte
*    with the desired content. Under the default `DriftPolicy::ContentOnly`
*    a file whose content matches but whose owner or mode has drifted is NOT
*    reported as changed; `DriftPolicy::ContentAndMetadata` opts into that.
* 3. Apply: content goes to a temporary file inside the destination
*    directory, which then receives its mode and ownership and is renamed over
*    the destination. A failed write leaves the previous file untouched.
* 4. Reporting: per-file results roll up into a `DeploymentResult`, and batch
*    runs into a `BatchReport` whose status separates full success, partial
*    success and full failure.
*
* Records are processed sequentially. There is no rollback: a record that
* fails between the certificate and the key leaves the certificate in place,
* and the next run only rewrites the file that still differs.
*
* SPDX-License-Identifier: Apache-2.0 */

use crate::error::{Error, ErrorKind, Result};
use crate::principal;
use crate::record::{CertificateRecord, FileMode, DEFAULT_GROUP, DEFAULT_OWNER};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

const TEMP_PREFIX: &str = ".cert_deployer";
const DIR_MODE: u32 = 0o755;

/// Whether the engine mutates the filesystem or only reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    #[default]
    Apply,
    Check,
}

/// What counts as a change for an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftPolicy {
    #[default]
    ContentOnly,
    ContentAndMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Absent,
    ContentDiffers,
    MetadataDrift,
    UpToDate,
}

/// Outcome for a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub changed: bool,
    pub reason: ChangeReason,
    pub mode: String,
}

/// Outcome for one record.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub name: String,
    pub changed: bool,
    pub check_mode: bool,
    pub cert_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    pub cert_result: FileResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_result: Option<FileResult>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordOutcome {
    Deployed(DeploymentResult),
    Failed {
        name: String,
        kind: ErrorKind,
        msg: String,
    },
}

impl RecordOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Succeeded,
    Partial,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub changed: bool,
    pub failed: bool,
    pub status: BatchStatus,
    pub results: Vec<RecordOutcome>,
}

impl BatchReport {
    fn from_outcomes(results: Vec<RecordOutcome>) -> Self {
        let failures = results.iter().filter(|r| r.is_failed()).count();
        let changed = results
            .iter()
            .any(|r| matches!(r, RecordOutcome::Deployed(d) if d.changed));
        let status = match failures {
            0 => BatchStatus::Succeeded,
            n if n == results.len() => BatchStatus::Failed,
            _ => BatchStatus::Partial,
        };
        Self {
            changed,
            failed: failures > 0,
            status,
            results,
        }
    }
}

/// A single file the engine should converge.
struct FileTarget<'a> {
    path: PathBuf,
    content: &'a [u8],
    mode: FileMode,
    owner: &'a str,
    group: &'a str,
    create_dirs: bool,
}

/// Idempotent writer for certificate/key pairs.
#[derive(Debug, Clone, Default)]
pub struct DeploymentEngine {
    mode: DeployMode,
    drift: DriftPolicy,
}

impl DeploymentEngine {
    pub fn new(mode: DeployMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_drift_policy(mut self, drift: DriftPolicy) -> Self {
        self.drift = drift;
        self
    }

    pub fn mode(&self) -> DeployMode {
        self.mode
    }

    /// Deploys every record independently. A failing record is reported and
    /// never prevents its siblings from reaching their own terminal state.
    pub fn deploy(&self, records: &[CertificateRecord]) -> BatchReport {
        let outcomes = records
            .iter()
            .map(|record| match self.deploy_one(record) {
                Ok(result) => RecordOutcome::Deployed(result),
                Err(e) => {
                    tracing::error!(name = %record.name, error = %e, "Certificate deployment failed");
                    RecordOutcome::Failed {
                        name: record.name.clone(),
                        kind: e.kind(),
                        msg: e.to_string(),
                    }
                }
            })
            .collect();

        let report = BatchReport::from_outcomes(outcomes);
        tracing::info!(
            records = records.len(),
            changed = report.changed,
            status = ?report.status,
            "Batch deployment finished"
        );
        report
    }

    /// Deploys a single record; any failure is returned to the caller.
    pub fn deploy_one(&self, record: &CertificateRecord) -> Result<DeploymentResult> {
        record.validate()?;

        let cert_path = record.cert_path();
        let cert_result = self.sync_file(FileTarget {
            path: cert_path.clone(),
            content: record.cert_content.as_bytes(),
            mode: record.cert_mode,
            owner: &record.cert_owner,
            group: &record.cert_group,
            create_dirs: record.create_dirs,
        })?;

        let key_path = record.key_path();
        let key_result = match (&key_path, &record.key_content) {
            (Some(path), Some(key)) => Some(self.sync_file(FileTarget {
                path: path.clone(),
                content: key.expose_secret().as_bytes(),
                mode: record.key_mode,
                owner: &record.key_owner,
                group: &record.key_group,
                create_dirs: record.create_dirs,
            })?),
            _ => None,
        };

        let changed = cert_result.changed || key_result.as_ref().is_some_and(|k| k.changed);
        Ok(DeploymentResult {
            name: record.name.clone(),
            changed,
            check_mode: self.mode == DeployMode::Check,
            cert_path,
            key_path,
            cert_result,
            key_result,
        })
    }

    fn sync_file(&self, target: FileTarget<'_>) -> Result<FileResult> {
        let path = &target.path;
        let ownership = self.ownership(target.owner, target.group);

        let existing = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => None,
            Err(e) => return Err(Error::deployment(path)(e)),
        };

        let reason = match existing {
            None => ChangeReason::Absent,
            Some(bytes) if bytes != target.content => ChangeReason::ContentDiffers,
            Some(_) => {
                if self.drift == DriftPolicy::ContentAndMetadata
                    && metadata_drifted(path, target.mode, ownership)?
                {
                    ChangeReason::MetadataDrift
                } else {
                    ChangeReason::UpToDate
                }
            }
        };
        let changed = reason != ChangeReason::UpToDate;

        if changed && self.mode == DeployMode::Apply {
            match reason {
                ChangeReason::MetadataDrift => apply_metadata(path, target.mode, ownership)?,
                _ => {
                    if target.create_dirs {
                        ensure_parent(path)?;
                    }
                    write_atomic(path, target.content, target.mode, ownership)?;
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            changed,
            reason = ?reason,
            check_mode = self.mode == DeployMode::Check,
            "Certificate file evaluated"
        );

        Ok(FileResult {
            path: target.path,
            changed,
            reason,
            mode: target.mode.to_string(),
        })
    }

    /// Ownership is only touched when a non-default principal was requested.
    fn ownership(&self, owner: &str, group: &str) -> Option<(Option<u32>, Option<u32>)> {
        if owner == DEFAULT_OWNER && group == DEFAULT_GROUP {
            return None;
        }
        match (principal::uid(owner), principal::gid(group)) {
            (None, None) => None,
            ids => Some(ids),
        }
    }
}

fn metadata_drifted(
    path: &Path,
    mode: FileMode,
    ownership: Option<(Option<u32>, Option<u32>)>,
) -> Result<bool> {
    let meta = fs::metadata(path).map_err(Error::deployment(path))?;
    if meta.permissions().mode() & 0o7777 != mode.bits() {
        return Ok(true);
    }
    Ok(match ownership {
        Some((uid, gid)) => {
            uid.is_some_and(|uid| uid != meta.uid()) || gid.is_some_and(|gid| gid != meta.gid())
        }
        None => false,
    })
}

fn apply_metadata(
    path: &Path,
    mode: FileMode,
    ownership: Option<(Option<u32>, Option<u32>)>,
) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode.bits()))
        .map_err(Error::deployment(path))?;
    if let Some((uid, gid)) = ownership {
        std::os::unix::fs::chown(path, uid, gid).map_err(Error::deployment(path))?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
            tracing::info!(dir = %dir.display(), "Creating missing destination directory");
            fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(dir)
                .map_err(Error::deployment(dir))
        }
        _ => Ok(()),
    }
}

/// Write, chmod, chown, then rename into place.
fn write_atomic(
    path: &Path,
    content: &[u8],
    mode: FileMode,
    ownership: Option<(Option<u32>, Option<u32>)>,
) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(Error::deployment(path))?;
    tmp.write_all(content).map_err(Error::deployment(path))?;
    tmp.as_file().sync_all().map_err(Error::deployment(path))?;

    apply_metadata(tmp.path(), mode, ownership).map_err(|e| match e {
        Error::Deployment { source, .. } => Error::deployment(path)(source),
        other => other,
    })?;

    tmp.persist(path).map_err(|e| Error::deployment(path)(e.error))?;
    Ok(())
}
