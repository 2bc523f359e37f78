//! Reaping real child processes through the host process table.
//!
//! Unix-only: relies on `sleep`, `sh`, and POSIX signals.

#![cfg(unix)]

use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;

use nts_radio::process::reaper::{Escalation, ProcessReaper, ReapSettings};
use nts_radio::process::table::{Discovery, ProcessTable, SystemProcessTable};

fn fast_settings() -> ReapSettings {
    ReapSettings {
        discovery: Discovery::Descendants,
        graceful_wait: Duration::from_millis(500),
        interrupt_wait: Duration::from_millis(300),
        poll_interval: Duration::from_millis(25),
    }
}

#[tokio::test]
#[serial_test::serial]
async fn descendant_listing_includes_spawned_child() {
    let mut child = Command::new("sleep")
        .arg("30")
        .kill_on_drop(true)
        .spawn()
        .expect("spawn sleep");
    let pid = child.id().expect("child pid");

    let entries = tokio::task::spawn_blocking(|| SystemProcessTable.list(Discovery::Descendants))
        .await
        .expect("join")
        .expect("listing works");

    assert!(entries.iter().any(|e| e.pid == pid && e.name == "sleep"));
    assert!(SystemProcessTable.is_alive(pid));

    child.kill().await.expect("kill child");
}

#[tokio::test]
#[serial_test::serial]
async fn cooperative_child_exits_on_sigterm() {
    let mut child = Command::new("sleep")
        .arg("30")
        .kill_on_drop(true)
        .spawn()
        .expect("spawn sleep");
    let pid = child.id().expect("child pid");

    let report = ProcessReaper::system(fast_settings()).reap("sleep").await;

    let outcome = report
        .outcomes
        .iter()
        .find(|(entry, _)| entry.pid == pid)
        .map(|(_, outcome)| *outcome);
    assert_eq!(outcome, Some(Escalation::Terminated));

    let status = child.wait().await.expect("wait child");
    assert!(!status.success());
}

#[tokio::test]
#[serial_test::serial]
async fn signal_ignoring_child_is_killed_within_budget() {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg("trap '' TERM INT; while true; do sleep 1; done")
        .kill_on_drop(true)
        .spawn()
        .expect("spawn sh");
    let pid = child.id().expect("child pid");
    // Let the shell install its traps.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let settings = fast_settings();
    let started = Instant::now();
    let report = ProcessReaper::system(settings).reap("sh").await;
    let elapsed = started.elapsed();

    let outcome = report
        .outcomes
        .iter()
        .find(|(entry, _)| entry.pid == pid)
        .map(|(_, outcome)| *outcome);
    assert_eq!(outcome, Some(Escalation::Killed));
    assert!(
        elapsed < settings.wait_budget() + Duration::from_millis(500),
        "reap took {elapsed:?}"
    );

    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("child reaped after SIGKILL")
        .expect("wait child");
    assert!(!status.success());
}

#[tokio::test]
#[serial_test::serial]
async fn unrelated_processes_are_not_matched() {
    let report = ProcessReaper::system(fast_settings())
        .reap("definitely-not-a-real-decoder*")
        .await;

    assert_eq!(report.matched(), 0);
    assert!(!report.used_fallback);
}
