use std::fs;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use app_store::tasks::{spawn_connect, spawn_install, spawn_remove};
use app_store::{AppManager, AppStatus, ConnectOutcome, StoreConfig, StoreError, TaskKind};

fn setup(chunk_delay: Duration) -> (tempfile::TempDir, StoreConfig) {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::new(tmp.path().join("store"), tmp.path().join("local"))
        .without_delays();
    config.chunk_delay = chunk_delay;
    let entry = config.entry_path(&config.store_root, "calculator");
    fs::create_dir_all(entry.parent().unwrap()).unwrap();
    fs::write(entry, vec![b'c'; 250]).unwrap();
    (tmp, config)
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn callback_runs_after_catalogue_update() {
    let (_tmp, config) = setup(Duration::ZERO);
    let manager = Arc::new(AppManager::new(config).unwrap());
    assert_eq!(
        spawn_connect(manager.clone(), |_| {}).join().unwrap(),
        ConnectOutcome::Connected
    );

    let (done_tx, done_rx) = mpsc::channel();
    let observer = manager.clone();
    let handle = spawn_install(manager.clone(), "calculator", move |res| {
        let member = observer
            .installed_apps()
            .iter()
            .any(|a| a.id == "calculator");
        let _ = done_tx.send((res.is_ok(), member));
    });

    assert_eq!(handle.kind(), TaskKind::Install);
    assert_eq!(handle.app_id(), Some("calculator"));
    handle.join().unwrap();
    assert_eq!(done_rx.recv().unwrap(), (true, true));
}

#[test]
fn observer_sees_monotonic_progress_while_installing() {
    let (_tmp, config) = setup(Duration::from_millis(2));
    let manager = Arc::new(AppManager::new(config).unwrap());
    manager.connect();

    let handle = spawn_install(manager.clone(), "calculator", |_| {});
    let mut seen = Vec::new();
    while !handle.is_finished() {
        if let Some(snap) = manager.progress("calculator") {
            seen.push(snap);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    handle.join().unwrap();

    for pair in seen.windows(2) {
        if pair[0].kind == pair[1].kind {
            assert!(pair[0].progress <= pair[1].progress, "{:?}", pair);
        }
    }
    assert!(seen.iter().all(|s| s.progress <= 100));
    assert!(seen.iter().any(|s| s.status == AppStatus::Fetching));
    let last = manager.progress("calculator").unwrap();
    assert_eq!((last.kind, last.progress, last.status), (TaskKind::Install, 100, AppStatus::Installed));
}

#[test]
fn second_operation_on_a_busy_app_is_rejected() {
    let (_tmp, config) = setup(Duration::from_millis(5));
    let manager = Arc::new(AppManager::new(config).unwrap());
    manager.connect();

    let handle = spawn_install(manager.clone(), "calculator", |_| {});
    wait_until(|| manager.progress("calculator").is_some());

    let err = manager.install_app("calculator").unwrap_err();
    assert!(matches!(err, StoreError::ActionInProgress(ref id) if id == "calculator"));
    let err = manager.start_app("calculator").unwrap_err();
    assert!(matches!(err, StoreError::ActionInProgress(_)));

    handle.join().unwrap();
    assert_eq!(manager.installed_apps().len(), 1);
}

#[test]
fn progress_channel_reports_status_changes_and_failures() {
    let (_tmp, config) = setup(Duration::ZERO);
    let (tx, rx) = mpsc::channel();
    let manager = Arc::new(AppManager::new(config).unwrap().with_progress_channel(tx));
    manager.connect();

    spawn_install(manager.clone(), "calculator", |_| {}).join().unwrap();
    let err = spawn_remove(manager.clone(), "notes", |_| {}).join().unwrap_err();
    assert!(matches!(err, StoreError::AppNotAvailable(_)));

    let updates: Vec<_> = rx.try_iter().collect();
    let statuses: Vec<_> = updates.iter().filter_map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            AppStatus::Fetching,
            AppStatus::Fetched,
            AppStatus::Installing,
            AppStatus::Installed
        ]
    );

    let kinds: Vec<_> = updates
        .iter()
        .filter(|u| u.status.is_some())
        .map(|u| u.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TaskKind::Fetch,
            TaskKind::Fetch,
            TaskKind::Install,
            TaskKind::Install
        ]
    );

    let finished: Vec<_> = updates.iter().filter(|u| u.finished).collect();
    assert_eq!(finished.len(), 2);
    assert_eq!(finished[0].kind, TaskKind::Install);
    assert!(finished[0].error.is_none());
    assert_eq!(finished[1].kind, TaskKind::Remove);
    assert_eq!(finished[1].app_id.as_deref(), Some("notes"));
    assert!(finished[1].error.is_some());
}

#[test]
fn unreachable_connect_finishes_with_an_error_update() {
    let tmp = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(tmp.path().join("missing"), tmp.path().join("local"))
        .without_delays();
    let (tx, rx) = mpsc::channel();
    let manager = Arc::new(AppManager::new(config).unwrap().with_progress_channel(tx));

    let outcome = spawn_connect(manager.clone(), |_| {}).join().unwrap();
    assert_eq!(outcome, ConnectOutcome::Unreachable);
    assert!(!manager.is_connected());

    let last = rx.try_iter().last().unwrap();
    assert!(last.finished);
    assert_eq!(last.kind, TaskKind::Connect);
    assert!(last.error.is_some());
}
