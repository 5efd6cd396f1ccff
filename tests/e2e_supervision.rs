//! End-to-end supervision workflows across spawn, capture, query and stop
#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use procvisor_process::{
    MonitorSettings, ProcessMonitor, ProcessSpec, ProcessState, SettingsLoader,
};

#[tokio::test]
async fn test_sleep_stopped_by_tag() {
    let monitor = ProcessMonitor::new();
    monitor
        .spawn_with_tag(ProcessSpec::new("sleep").args(["100"]), "t1")
        .await
        .unwrap();

    let t1 = monitor.get_process("t1");
    assert!(t1.is_running());
    assert!(matches!(
        t1.details().state,
        ProcessState::Running | ProcessState::Sleeping
    ));

    monitor
        .stop_with_timeout("t1", 1, Duration::from_millis(50))
        .await
        .unwrap();

    assert!(!monitor.get_process("t1").is_running());
    // Terminated by a signal rather than exiting on its own
    assert_eq!(monitor.get_process("t1").exit_code(), -1);
    assert!(t1.exit_status().is_some_and(|status| !status.success()));
}

#[tokio::test]
async fn test_worker_pool_lifecycle() {
    let output = Arc::new(Mutex::new(Vec::<String>::new()));
    let stopped = Arc::new(AtomicUsize::new(0));

    let monitor = ProcessMonitor::new();
    let mut tags = Vec::new();
    for n in 0..3 {
        let sink = output.clone();
        let done = stopped.clone();
        let spec = ProcessSpec::new("/bin/sh")
            .args(["-c", "echo started $WORKER; exec sleep 100"])
            .env("WORKER", n.to_string())
            .on_stdout(move |line| sink.lock().push(String::from_utf8_lossy(line).into_owned()))
            .on_stopped(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        tags.push(monitor.spawn(spec).await.unwrap());
    }

    assert_eq!(tags, vec!["gen-tag-0", "gen-tag-1", "gen-tag-2"]);

    for _ in 0..500 {
        if output.lock().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut lines = output.lock().clone();
    lines.sort();
    assert_eq!(lines, vec!["started 0", "started 1", "started 2"]);

    for stop in monitor.stop_all_in_parallel() {
        stop.await.unwrap().unwrap();
    }

    for tag in &tags {
        let handle = monitor.get_process(tag);
        assert!(!handle.is_running());
        assert!(handle.stopped_at() > handle.started_at());
    }
    assert_eq!(stopped.load(Ordering::SeqCst), 3);

    for tag in &tags {
        monitor.remove(tag);
    }
    assert!(monitor.get_all_tags().is_empty());
}

#[tokio::test]
async fn test_process_killed_from_outside_is_noticed() {
    let monitor = ProcessMonitor::new();
    monitor
        .spawn_with_tag(ProcessSpec::new("sleep").args(["100"]), "victim")
        .await
        .unwrap();
    let victim = monitor.get_process("victim");
    let pid = victim.pid().unwrap();

    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    for _ in 0..500 {
        if !victim.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!victim.is_running());
    assert_eq!(victim.exit_code(), -1);

    // Nothing left to signal
    monitor.stop("victim").await.unwrap();
}

#[tokio::test]
async fn test_settings_drive_tags_and_stop_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "stop_attempts = 1\nstop_wait_interval_ms = 25\ntag_prefix = \"svc-\"\n")
        .unwrap();

    let settings = SettingsLoader::with_path(&path).load().unwrap();
    assert_eq!(
        settings,
        MonitorSettings {
            stop_attempts: 1,
            stop_wait_interval_ms: 25,
            tag_prefix: "svc-".to_string(),
            ..MonitorSettings::default()
        }
    );

    let monitor = ProcessMonitor::with_settings(settings);
    let tag = monitor
        .spawn(ProcessSpec::new("sleep").args(["100"]))
        .await
        .unwrap();
    assert_eq!(tag, "svc-0");

    monitor.restart(&tag).await.unwrap();
    assert!(monitor.get_process(&tag).is_running());

    monitor.stop(&tag).await.unwrap();
    assert!(!monitor.get_process(&tag).is_running());
}
