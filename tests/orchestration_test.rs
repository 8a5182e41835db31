//! End-to-end tests for issue -> deploy and the private CA flow, with a mock
//! Vault and scratch directories standing in for the trust-store layout.

use cert_deployer::config::{TrustSettings, VaultSettings};
use cert_deployer::orchestrate::{deploy_private_ca, issue_and_deploy, PrivateCaRequest};
use cert_deployer::record::{DeployDefaults, RecordSpec};
use cert_deployer::{DeployMode, DeploymentEngine, Error, ErrorKind, IssuanceClient, IssuanceRequest, VaultPki};
use serde_json::json;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn defaults_in(dir: &Path) -> DeployDefaults {
    fs::create_dir_all(dir.join("certs")).unwrap();
    fs::create_dir_all(dir.join("private")).unwrap();
    DeployDefaults {
        cert_dir: dir.join("certs"),
        key_dir: dir.join("private"),
        ..DeployDefaults::default()
    }
}

async fn vault_returning(body: serde_json::Value, status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pki/issue/web"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> IssuanceClient<VaultPki> {
    IssuanceClient::new(VaultPki::new(&VaultSettings::default()).unwrap())
        .with_default_addr(Some(server.uri()))
}

fn request() -> IssuanceRequest {
    IssuanceRequest::new("example.com", "pki", "web", "s.token")
}

#[tokio::test]
async fn test_issue_and_deploy_writes_pair_then_converges() {
    let server = vault_returning(
        json!({ "data": { "certificate": "CERT_A", "private_key": "KEY_A", "serial_number": "aa:bb" } }),
        200,
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let defaults = defaults_in(dir.path());
    let engine = DeploymentEngine::new(DeployMode::Apply);
    let mut client = client_for(&server);

    let first = issue_and_deploy(&mut client, &engine, &defaults, &request(), RecordSpec::default())
        .await
        .unwrap();
    assert!(first.changed);
    assert_eq!(first.serial_number.as_deref(), Some("aa:bb"));
    assert_eq!(fs::read_to_string(dir.path().join("certs/example.com.crt")).unwrap(), "CERT_A");
    assert_eq!(fs::read_to_string(dir.path().join("private/example.com.key")).unwrap(), "KEY_A");

    let second = issue_and_deploy(&mut client, &engine, &defaults, &request(), RecordSpec::default())
        .await
        .unwrap();
    assert!(!second.changed);

    let report = serde_json::to_string(&second).unwrap();
    assert!(!report.contains("KEY_A"));
}

#[tokio::test]
async fn test_issue_and_deploy_honours_placement_overrides() {
    let server = vault_returning(
        json!({ "data": { "certificate": "CERT", "private_key": "KEY" } }),
        200,
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let defaults = defaults_in(dir.path());
    let engine = DeploymentEngine::new(DeployMode::Apply);
    let mut client = client_for(&server);

    let placement = RecordSpec {
        name: Some("web-frontend.crt".to_string()),
        key_dir: Some(dir.path().join("nginx")),
        key_mode: Some("0640".parse().unwrap()),
        create_dirs: Some(true),
        ..RecordSpec::default()
    };
    let outcome = issue_and_deploy(&mut client, &engine, &defaults, &request(), placement)
        .await
        .unwrap();

    let key = dir.path().join("nginx/web-frontend.key");
    let deployment = outcome.deployment.expect("deployment result");
    assert_eq!(deployment.key_path.as_deref(), Some(key.as_path()));
    assert_eq!(fs::metadata(&key).unwrap().permissions().mode() & 0o777, 0o640);
}

#[tokio::test]
async fn test_check_mode_validates_without_contacting_vault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let defaults = defaults_in(dir.path());
    let engine = DeploymentEngine::new(DeployMode::Check);
    let mut client = client_for(&server);

    let outcome = issue_and_deploy(&mut client, &engine, &defaults, &request(), RecordSpec::default())
        .await
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.check_mode);
    assert!(outcome.deployment.is_none());
    assert_eq!(fs::read_dir(dir.path().join("certs")).unwrap().count(), 0);

    let mut incomplete = request();
    incomplete.role_name = None;
    let err = issue_and_deploy(&mut client, &engine, &defaults, &incomplete, RecordSpec::default())
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_authority_failure_skips_deployment() {
    let server = vault_returning(json!({ "errors": ["permission denied"] }), 403).await;
    let dir = tempfile::tempdir().unwrap();
    let defaults = defaults_in(dir.path());
    let engine = DeploymentEngine::new(DeployMode::Apply);
    let mut client = client_for(&server);

    let err = issue_and_deploy(&mut client, &engine, &defaults, &request(), RecordSpec::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authority);
    assert!(err.to_string().contains("permission denied"));
    assert_eq!(fs::read_dir(dir.path().join("certs")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_empty_material_fails_fast() {
    let server = vault_returning(json!({ "data": { "certificate": "CERT", "private_key": "" } }), 200).await;
    let dir = tempfile::tempdir().unwrap();
    let defaults = defaults_in(dir.path());
    let engine = DeploymentEngine::new(DeployMode::Apply);
    let mut client = client_for(&server);

    let err = issue_and_deploy(&mut client, &engine, &defaults, &request(), RecordSpec::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyIssuance { ref common_name } if common_name == "example.com"));
    assert_eq!(fs::read_dir(dir.path().join("certs")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_private_ca_runs_hook_but_changed_tracks_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let trust = TrustSettings {
        ca_trust_dir: dir.path().join("anchors"),
        update_command: "true".to_string(),
        ..TrustSettings::default()
    };
    let engine = DeploymentEngine::new(DeployMode::Apply);
    let ca_request = || PrivateCaRequest {
        private_ca: Some("CA_PEM".to_string()),
        create_dir: true,
        ..PrivateCaRequest::default()
    };

    let first = deploy_private_ca(&engine, &trust, ca_request()).await.unwrap();
    assert!(first.changed);
    assert!(first.hook.ran);
    assert_eq!(
        fs::read_to_string(dir.path().join("anchors/custom-ca.crt")).unwrap(),
        "CA_PEM"
    );
    assert!(first.cert_result.key_result.is_none());

    let second = deploy_private_ca(&engine, &trust, ca_request()).await.unwrap();
    assert!(!second.changed);
    assert!(second.hook.ran);
}

#[tokio::test]
async fn test_private_ca_hook_failure_keeps_the_deployed_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("anchors")).unwrap();
    let trust = TrustSettings {
        ca_trust_dir: dir.path().join("anchors"),
        ..TrustSettings::default()
    };
    let engine = DeploymentEngine::new(DeployMode::Apply);

    let err = deploy_private_ca(
        &engine,
        &trust,
        PrivateCaRequest {
            private_ca: Some("CA_PEM".to_string()),
            filename: Some("corp-root.pem".to_string()),
            update_ca_command: Some("false".to_string()),
            ..PrivateCaRequest::default()
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Hook);
    match err {
        Error::HookAfterDeploy { path, changed, source } => {
            assert_eq!(path, dir.path().join("anchors/corp-root.pem"));
            assert!(changed);
            assert!(matches!(*source, Error::Hook { ref command, .. } if command == "false"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(dir.path().join("anchors/corp-root.pem").is_file());
}

#[tokio::test]
async fn test_private_ca_check_mode_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("anchors")).unwrap();
    let trust = TrustSettings {
        ca_trust_dir: dir.path().join("anchors"),
        update_command: "false".to_string(),
        ..TrustSettings::default()
    };
    let engine = DeploymentEngine::new(DeployMode::Check);

    let report = deploy_private_ca(
        &engine,
        &trust,
        PrivateCaRequest {
            private_ca: Some("CA_PEM".to_string()),
            ..PrivateCaRequest::default()
        },
    )
    .await
    .unwrap();

    assert!(report.changed);
    assert!(!report.hook.ran);
    assert!(!dir.path().join("anchors/custom-ca.crt").exists());
}

#[tokio::test]
async fn test_private_ca_requires_content() {
    let engine = DeploymentEngine::new(DeployMode::Apply);
    let err = deploy_private_ca(&engine, &TrustSettings::default(), PrivateCaRequest::default())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("private_ca"));
}
