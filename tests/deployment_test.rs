//! Deployment engine scenarios exercised through the public API.

use cert_deployer::deploy::{BatchStatus, RecordOutcome};
use cert_deployer::record::{load_batch, DeployDefaults};
use cert_deployer::{CertificateRecord, DeployMode, DeploymentEngine, ErrorKind};
use std::fs;
use std::io::Write;

#[test]
fn test_example_scenario_deploys_then_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let certs = dir.path().join("certs");
    let keys = dir.path().join("keys");
    fs::create_dir_all(&certs).unwrap();
    fs::create_dir_all(&keys).unwrap();

    let record = CertificateRecord::new("example.com.crt", "CERT_A", "KEY_A").with_dirs(&certs, &keys);
    let engine = DeploymentEngine::new(DeployMode::Apply);

    let first = engine.deploy_one(&record).unwrap();
    assert!(first.changed);
    assert_eq!(fs::read_to_string(certs.join("example.com.crt")).unwrap(), "CERT_A");
    assert_eq!(fs::read_to_string(keys.join("example.com.key")).unwrap(), "KEY_A");

    let cert_mtime = fs::metadata(certs.join("example.com.crt")).unwrap().modified().unwrap();
    let key_mtime = fs::metadata(keys.join("example.com.key")).unwrap().modified().unwrap();

    let second = engine.deploy_one(&record).unwrap();
    assert!(!second.changed);
    assert_eq!(fs::metadata(certs.join("example.com.crt")).unwrap().modified().unwrap(), cert_mtime);
    assert_eq!(fs::metadata(keys.join("example.com.key")).unwrap().modified().unwrap(), key_mtime);
}

#[test]
fn test_divergent_content_is_replaced_exactly() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("api.crt"), "STALE CERT\n").unwrap();
    fs::write(dir.path().join("api.key"), "KEY\n").unwrap();

    let record = CertificateRecord::new("api.crt", "FRESH CERT", "KEY\n").with_dirs(dir.path(), dir.path());
    let result = DeploymentEngine::new(DeployMode::Apply).deploy_one(&record).unwrap();

    assert!(result.changed);
    assert!(result.cert_result.changed);
    assert!(!result.key_result.unwrap().changed);
    assert_eq!(fs::read(dir.path().join("api.crt")).unwrap(), b"FRESH CERT");
}

#[test]
fn test_ca_only_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let record = CertificateRecord::ca("custom-ca.crt", "CA_PEM").with_dirs(dir.path(), dir.path().join("keys"));

    let result = DeploymentEngine::new(DeployMode::Apply).deploy_one(&record).unwrap();

    assert!(result.changed);
    assert!(result.key_result.is_none());
    assert_eq!(fs::read_to_string(dir.path().join("custom-ca.crt")).unwrap(), "CA_PEM");
    assert!(!dir.path().join("keys").exists());
}

#[test]
fn test_batch_file_with_a_failing_middle_record() {
    let dir = tempfile::tempdir().unwrap();
    let ok_dir = dir.path().join("ok");
    fs::create_dir_all(&ok_dir).unwrap();

    let batch_path = dir.path().join("records.yaml");
    let mut batch = fs::File::create(&batch_path).unwrap();
    write!(
        batch,
        r#"
- name: first.crt
  cert_content: C1
  key_content: K1
  cert_dir: {ok}
  key_dir: {ok}
- name: second.crt
  cert_content: C2
  key_content: K2
  cert_dir: {missing}
  key_dir: {missing}
- name: third.crt
  cert_content: C3
  key_content: K3
  cert_dir: {ok}
  key_dir: {ok}
"#,
        ok = ok_dir.display(),
        missing = dir.path().join("missing").display(),
    )
    .unwrap();

    let defaults = DeployDefaults::default();
    let records: Vec<_> = load_batch(&batch_path)
        .unwrap()
        .into_iter()
        .map(|spec| spec.into_record(&defaults))
        .collect();

    let report = DeploymentEngine::new(DeployMode::Apply).deploy(&records);

    assert_eq!(report.status, BatchStatus::Partial);
    assert!(report.failed);
    assert!(matches!(
        &report.results[1],
        RecordOutcome::Failed { name, kind: ErrorKind::Deployment, .. } if name == "second.crt"
    ));
    assert_eq!(fs::read_to_string(ok_dir.join("first.key")).unwrap(), "K1");
    assert_eq!(fs::read_to_string(ok_dir.join("third.crt")).unwrap(), "C3");
}

#[test]
fn test_unparseable_batch_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.yaml");
    fs::write(&path, "- name: a.crt\n  colour: blue\n").unwrap();

    let err = load_batch(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
