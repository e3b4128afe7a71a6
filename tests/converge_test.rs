//! End-to-end convergence against the recording host.
//!
//! Every test runs under its own temporary roots. Filesystem primitives take
//! effect there; package, shell and service primitives are only recorded.

use mysql_service::config::{InstanceSpec, Platform, Roots, Timeouts};
use mysql_service::host::HostCall;
use mysql_service::markers::{CompletionMarker, MarkerState};
use mysql_service::{
    Action, ActionResult, Config, Converger, Error, ErrorKind, ExecutionMode, InstanceClaims,
    Outcome, RecordingHost,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn sandbox(dir: &Path, instances: &[(&str, u16)]) -> Config {
    let mut config = Config::new(Platform::new("centos", "7.0"));
    config.roots = Roots::under(dir);
    config.package_lock = dir.join("package.lock");
    config.timeouts = Timeouts {
        shell: Duration::from_secs(5),
        daemon_startup: Duration::from_millis(500),
        daemon_grace: Duration::from_millis(200),
    };
    for (name, port) in instances {
        config.instances.insert(
            name.to_string(),
            InstanceSpec {
                version: Some("5.6".to_string()),
                port: *port,
                ..InstanceSpec::default()
            },
        );
    }
    config
}

fn data_marker(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("var/lib/mysql-{}/mysql/user.frm", name))
}

fn first_converge_marker(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("etc/mysql-{}/.first_converge", name))
}

/// A host whose database initialization produces the engine schema.
fn host_for(dir: &Path, names: &[&str]) -> Arc<RecordingHost> {
    let host = Arc::new(RecordingHost::new());
    for name in names {
        host.creates_on_shell(
            format!("--datadir={}", dir.join(format!("var/lib/mysql-{}", name)).display()),
            data_marker(dir, name),
        );
    }
    host
}

async fn converge_one(config: Config, host: Arc<RecordingHost>, action: Action) -> ActionResult {
    let mut results = Converger::new(config, host)
        .converge(action, &[])
        .await
        .expect("convergence should plan");
    assert_eq!(results.len(), 1);
    results.remove(0)
}

fn kinds(host: &RecordingHost) -> Vec<&'static str> {
    host.calls().iter().map(HostCall::kind).collect()
}

#[tokio::test]
async fn test_create_from_scratch() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(result.converged, "{:?}", result.failure());
    assert_eq!(result.reports.len(), 12);
    assert_eq!(result.skipped().count(), 0);

    assert_eq!(
        kinds(&host),
        vec![
            "enable-package-channel",
            "install-package",
            "delete-path",
            "delete-path",
            "create-directory",
            "create-directory",
            "create-directory",
            "create-directory",
            "create-directory",
            "write-file",
            "run-shell",
            "spawn-daemon",
            "run-shell",
            "daemon-reaped",
            "write-file",
        ]
    );

    let config = fs::read_to_string(dir.path().join("etc/mysql-default/my.cnf")).unwrap();
    assert!(config.contains("port = 3306"));
    assert!(config.contains(&format!(
        "datadir = {}",
        dir.path().join("var/lib/mysql-default").display()
    )));
    let mode = fs::metadata(dir.path().join("etc/mysql-default/my.cnf"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);

    assert!(data_marker(dir.path(), "default").exists());
    match CompletionMarker::read(&first_converge_marker(dir.path(), "default")).unwrap() {
        MarkerState::Written(marker) => assert_eq!(marker.step, "grant initial privs"),
        other => panic!("expected a written marker, got {:?}", other),
    }
}

#[tokio::test]
async fn test_marker_written_after_daemon_reaped() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;

    let calls = host.calls();
    let reaped = calls
        .iter()
        .position(|c| matches!(c, HostCall::DaemonReaped(_)))
        .unwrap();
    let marker = calls
        .iter()
        .position(|c| c.subject().ends_with(".first_converge"))
        .unwrap();
    assert!(reaped < marker);
    assert_eq!(marker, calls.len() - 1);
}

#[tokio::test]
async fn test_second_create_skips_guarded_steps() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    let config = sandbox(dir.path(), &[("default", 3306)]);

    converge_one(config.clone(), host.clone(), Action::Create).await;
    host.clear();

    let result = converge_one(config, host.clone(), Action::Create).await;
    assert!(result.converged);
    assert_eq!(result.skipped().count(), 2);
    assert!(host.calls_of("run-shell").is_empty());
    assert!(host.calls_of("spawn-daemon").is_empty());

    // Rendering identical content reports no change.
    let render = result
        .reports
        .iter()
        .find(|r| r.kind == "render-template")
        .unwrap();
    assert_eq!(render.outcome, Outcome::Applied { changed: false });
    assert_eq!(result.changed_count(), 0);
}

#[tokio::test]
async fn test_existing_data_dir_is_not_reinitialized() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);

    let marker = data_marker(dir.path(), "default");
    fs::create_dir_all(marker.parent().unwrap()).unwrap();
    fs::write(&marker, b"").unwrap();

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(result.converged);
    assert_eq!(result.reports[10].outcome, Outcome::SkippedByGuard);
    assert!(!host
        .calls_of("run-shell")
        .iter()
        .any(|c| c.subject().contains("mysql_install_db")));
    // The grant still runs on the first converge.
    assert_eq!(host.calls_of("spawn-daemon").len(), 1);
}

#[tokio::test]
async fn test_legacy_config_deleted_before_render() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    fs::create_dir_all(dir.path().join("etc/mysql")).unwrap();
    fs::write(dir.path().join("etc/my.cnf"), "[mysqld]\nport = 1\n").unwrap();
    fs::write(dir.path().join("etc/mysql/my.cnf"), "[mysqld]\n").unwrap();

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(result.converged);
    assert!(!dir.path().join("etc/my.cnf").exists());
    assert!(!dir.path().join("etc/mysql/my.cnf").exists());

    let deletes = result.reports.iter().filter(|r| r.kind == "delete-path");
    for report in deletes {
        assert_eq!(report.outcome, Outcome::Applied { changed: true });
    }
}

#[tokio::test]
async fn test_legacy_config_directory_is_not_removed() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    let legacy = dir.path().join("etc/my.cnf");
    fs::create_dir_all(&legacy).unwrap();
    fs::write(legacy.join("important.cnf"), "[mysqld]\n").unwrap();

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(!result.converged);

    let failure = result.failure().unwrap();
    assert_eq!(failure.description, format!("default :delete {}", legacy.display()));
    match &failure.outcome {
        Outcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::Filesystem),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(legacy.join("important.cnf").exists());
    assert!(host.calls_of("create-directory").is_empty());
}

#[tokio::test]
async fn test_create_under_root_with_spaces() {
    let dir = create_test_dir();
    let root = dir.path().join("my data");
    let host = Arc::new(RecordingHost::new());
    host.creates_on_shell(
        format!("--datadir='{}'", root.join("var/lib/mysql-default").display()),
        data_marker(&root, "default"),
    );

    let result = converge_one(sandbox(&root, &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(result.converged, "{:?}", result.failure());
    assert!(data_marker(&root, "default").exists());
    assert!(first_converge_marker(&root, "default").exists());
}

#[tokio::test]
async fn test_failure_stops_remaining_operations() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    host.fail_on(
        "install-package",
        None,
        "No package mysql-community-server available.",
    );

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(!result.converged);
    assert_eq!(result.reports.len(), 2);

    let failure = result.failure().unwrap();
    assert_eq!(failure.description, "default :install mysql-community-server");
    match &failure.outcome {
        Outcome::Failed { kind, reason, .. } => {
            assert_eq!(*kind, ErrorKind::ExternalTool);
            assert!(reason.contains("No package"), "{}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(host.calls_of("create-directory").is_empty());
    assert!(!dir.path().join("etc/mysql-default").exists());
}

#[tokio::test]
async fn test_grant_failure_reaps_daemon_and_leaves_marker_absent() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    host.fail_on("run-shell", Some("GRANT"), "ERROR 2002 (HY000)");

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(!result.converged);

    let failure = result.failure().unwrap();
    assert_eq!(failure.description, "default :run grant initial privs");
    assert_eq!(
        failure.target.as_deref(),
        Some(first_converge_marker(dir.path(), "default").as_path())
    );
    match &failure.outcome {
        Outcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::PartialConvergence),
        other => panic!("expected failure, got {:?}", other),
    }

    assert_eq!(host.calls_of("daemon-reaped").len(), 1);
    assert!(!first_converge_marker(dir.path(), "default").exists());
    assert!(!dir.path().join("var/run/mysql-default/mysql-default.sock").exists());
}

#[tokio::test]
async fn test_grant_retried_after_failure() {
    let dir = create_test_dir();
    let config = sandbox(dir.path(), &[("default", 3306)]);

    let failing = host_for(dir.path(), &["default"]);
    failing.fail_on("run-shell", Some("GRANT"), "ERROR 2002 (HY000)");
    assert!(!converge_one(config.clone(), failing, Action::Create).await.converged);

    let host = host_for(dir.path(), &["default"]);
    let result = converge_one(config, host.clone(), Action::Create).await;
    assert!(result.converged);
    // Data dir was initialized by the first run; only the grant repeats.
    assert_eq!(host.calls_of("run-shell").len(), 1);
    assert!(first_converge_marker(dir.path(), "default").exists());
}

#[tokio::test]
async fn test_daemon_that_never_listens_times_out() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    host.daemon_never_listens();

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(!result.converged);
    match &result.failure().unwrap().outcome {
        Outcome::Failed { reason, .. } => {
            assert!(reason.contains("accept connections"), "{}", reason)
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // The client never ran, the daemon was still reaped.
    assert!(!host
        .calls_of("run-shell")
        .iter()
        .any(|c| c.subject().contains("GRANT")));
    assert_eq!(host.calls_of("daemon-reaped").len(), 1);
    assert!(!first_converge_marker(dir.path(), "default").exists());
}

#[tokio::test]
async fn test_daemon_exiting_early_fails_fast() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    host.daemon_exits_early();

    let mut config = sandbox(dir.path(), &[("default", 3306)]);
    config.timeouts.daemon_startup = Duration::from_secs(60);

    let started = std::time::Instant::now();
    let result = converge_one(config, host.clone(), Action::Create).await;
    assert!(started.elapsed() < Duration::from_secs(30));

    assert!(!result.converged);
    match &result.failure().unwrap().outcome {
        Outcome::Failed { kind, reason, .. } => {
            assert_eq!(*kind, ErrorKind::PartialConvergence);
            assert!(reason.contains("mysqld"), "{}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(host.calls_of("daemon-reaped").len(), 1);
}

#[tokio::test]
async fn test_guard_evaluation_error_fails_operation() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);

    // The marker's parent is a regular file, so existence cannot be decided.
    let data_dir = dir.path().join("var/lib/mysql-default");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("mysql"), b"").unwrap();

    let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), Action::Create).await;
    assert!(!result.converged);
    let failure = result.failure().unwrap();
    assert_eq!(failure.description, "default :run initialize mysql database");
    match &failure.outcome {
        Outcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::GuardEvaluation),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(host.calls_of("run-shell").is_empty());
    assert!(host.calls_of("spawn-daemon").is_empty());
}

#[tokio::test]
async fn test_dry_run_dispatches_nothing() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);

    let results = Converger::new(sandbox(dir.path(), &[("default", 3306)]), host.clone())
        .with_mode(ExecutionMode::DryRun)
        .converge(Action::Create, &[])
        .await
        .unwrap();

    let result = &results[0];
    assert!(result.dry_run);
    assert!(result.converged);
    assert!(result
        .reports
        .iter()
        .all(|r| r.outcome == Outcome::WouldApply));
    assert!(host.calls().is_empty());
    assert!(!dir.path().join("etc").exists());
}

#[tokio::test]
async fn test_dry_run_reports_satisfied_guards() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    let config = sandbox(dir.path(), &[("default", 3306)]);
    converge_one(config.clone(), host.clone(), Action::Create).await;
    host.clear();

    let results = Converger::new(config, host.clone())
        .with_mode(ExecutionMode::DryRun)
        .converge(Action::Create, &[])
        .await
        .unwrap();
    assert_eq!(results[0].skipped().count(), 2);
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_start_installs_init_script_and_starts() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    let config = sandbox(dir.path(), &[("default", 3306)]);
    fs::create_dir_all(&config.roots.init).unwrap();

    let result = converge_one(config, host.clone(), Action::Start).await;
    assert!(result.converged);

    let script = dir.path().join("etc/init.d/mysql-default");
    let mode = fs::metadata(&script).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    let body = fs::read_to_string(&script).unwrap();
    assert!(body.contains("mysql-default"));

    assert_eq!(
        host.calls_of("manage-service"),
        vec![HostCall::ManageService {
            action: mysql_service::plan::ServiceAction::Start,
            service_name: "mysql-default".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_unsupported_start_touches_nothing() {
    let dir = create_test_dir();
    let host = Arc::new(RecordingHost::new());
    let mut config = sandbox(dir.path(), &[("default", 3306)]);
    config.platform = Platform::new("centos", "5.11");

    let err = Converger::new(config, host.clone())
        .converge(Action::Start, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedPlatform { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_teardown_actions_are_noops() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    for action in [Action::Delete, Action::Stop, Action::Restart, Action::Reload] {
        let result = converge_one(sandbox(dir.path(), &[("default", 3306)]), host.clone(), action).await;
        assert!(result.converged);
        assert!(result.reports.is_empty());
    }
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_instances_converge_concurrently() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["a", "b"]);

    let results = Converger::new(sandbox(dir.path(), &[("a", 3306), ("b", 3307)]), host.clone())
        .converge(Action::Create, &[])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.converged));
    assert_eq!(host.calls_of("spawn-daemon").len(), 2);
    assert_eq!(host.calls_of("daemon-reaped").len(), 2);
    assert!(first_converge_marker(dir.path(), "a").exists());
    assert!(first_converge_marker(dir.path(), "b").exists());

    let b_config = fs::read_to_string(dir.path().join("etc/mysql-b/my.cnf")).unwrap();
    assert!(b_config.contains("port = 3307"));
}

#[tokio::test]
async fn test_one_instance_failing_leaves_others_converged() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["a", "b"]);
    host.fail_on("create-directory", Some("mysql-b"), "Permission denied");

    let results = Converger::new(sandbox(dir.path(), &[("a", 3306), ("b", 3307)]), host.clone())
        .converge(Action::Create, &[])
        .await
        .unwrap();

    let a = results.iter().find(|r| r.instance == "a").unwrap();
    let b = results.iter().find(|r| r.instance == "b").unwrap();
    assert!(a.converged);
    assert!(!b.converged);
    match &b.failure().unwrap().outcome {
        Outcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::Filesystem),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_claimed_instance_is_busy() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["default"]);
    let claims = InstanceClaims::new();

    let converger = Converger::new(sandbox(dir.path(), &[("default", 3306)]), host.clone())
        .with_claims(Arc::clone(&claims));
    let contexts = converger.contexts(&[]).unwrap();
    let held = claims.claim(&contexts).unwrap();

    let err = converger.converge(Action::Create, &[]).await.unwrap_err();
    assert!(matches!(err, Error::InstanceBusy(ref name) if name == "default"));
    assert!(host.calls().is_empty());

    drop(held);
    let results = converger.converge(Action::Create, &[]).await.unwrap();
    assert!(results[0].converged);
    assert!(!claims.is_claimed("default"));
}

#[tokio::test]
async fn test_duplicate_ports_rejected_before_any_operation() {
    let dir = create_test_dir();
    let host = host_for(dir.path(), &["a", "b"]);

    let err = Converger::new(sandbox(dir.path(), &[("a", 3306), ("b", 3306)]), host.clone())
        .converge(Action::Create, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AllocationConflict { .. }));
    assert!(host.calls().is_empty());
}
