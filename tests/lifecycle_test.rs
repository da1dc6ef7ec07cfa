//! Server lifecycle tests: port search, process-group launch and teardown,
//! and browser-driven readiness.
//!
//! Readiness tests launch Chrome (auto-downloaded when missing).


use std::net::{Ipv4Addr, TcpListener};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use test_server::TestServer;
use time_keeper_e2e::error::SetupPhase;
use time_keeper_e2e::server::PORT_WINDOW;
use time_keeper_e2e::{
    acquire_port, await_ready, launch_server, start_server, BrowserOptions, LifecycleError,
    ServerConfig, ServerState, TerminateOutcome,
};

/// Bind `count` consecutive ports on all interfaces, returning the first port
/// and the listeners holding them.
fn occupy_consecutive(count: u16) -> (u16, Vec<TcpListener>) {
    for _ in 0..50 {
        let first = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).expect("bind ephemeral port");
        let start = first.local_addr().unwrap().port();
        if start.checked_add(count).is_none() {
            continue;
        }

        let mut held = vec![first];
        for port in start + 1..start + count {
            match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
                Ok(listener) => held.push(listener),
                Err(_) => break,
            }
        }
        if held.len() == count as usize {
            return (start, held);
        }
    }
    panic!("could not reserve {} consecutive ports", count);
}

/// A port nothing is listening on
fn closed_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

#[test]
fn test_acquire_port_returns_start_when_free() {
    let (start, held) = occupy_consecutive(2);
    drop(held);

    let port = acquire_port(start).expect("free port");
    assert_eq!(port, start);

    // The probe listener is gone again
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).expect("port released after probe");
}

#[test]
fn test_acquire_port_skips_occupied_ports() {
    let (start, mut held) = occupy_consecutive(3);
    // Keep the first two busy, free the third
    held.truncate(2);

    let port = acquire_port(start).expect("free port in window");
    assert_eq!(port, start + 2);
}

#[test]
fn test_acquire_port_fails_when_window_is_full() {
    let (start, _held) = occupy_consecutive(PORT_WINDOW);

    let err = acquire_port(start).expect_err("every port in the window is busy");
    assert_eq!(err.phase(), SetupPhase::PortSearch);
    match err {
        LifecycleError::NoPortAvailable { start: s, attempts } => {
            assert_eq!(s, start);
            assert_eq!(attempts, PORT_WINDOW);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_acquire_port_window_is_clipped_at_max_port() {
    // Only u16::MAX itself is a candidate
    if let Err(LifecycleError::NoPortAvailable { attempts, .. }) = acquire_port(u16::MAX) {
        assert_eq!(attempts, 1);
    }
}

#[cfg(unix)]
#[test]
fn test_launch_and_terminate_process_group() {
    let server = launch_server("sleep 30", Path::new("."), 4321).expect("spawn");
    assert_eq!(server.state(), ServerState::Starting);
    assert_eq!(server.port(), 4321);
    assert_eq!(server.url(), "http://localhost:4321");
    assert!(!server.has_exited());

    let started = Instant::now();
    let outcome = server.terminate().expect("terminate");
    assert_eq!(outcome, TerminateOutcome::Stopped);
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(server.has_exited());
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "SIGTERM should stop sleep well within the grace period"
    );
}

#[cfg(unix)]
#[test]
fn test_terminate_is_idempotent() {
    let server = launch_server("sleep 30", Path::new("."), 4322).expect("spawn");

    assert_eq!(server.terminate().unwrap(), TerminateOutcome::Stopped);
    assert_eq!(server.terminate().unwrap(), TerminateOutcome::AlreadyStopped);
    assert_eq!(server.state(), ServerState::Stopped);
}

#[cfg(unix)]
#[test]
fn test_terminate_after_exit_is_already_stopped() {
    let server = launch_server("true", Path::new("."), 4323).expect("spawn");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !server.has_exited() {
        assert!(Instant::now() < deadline, "`true` should exit immediately");
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(server.terminate().unwrap(), TerminateOutcome::AlreadyStopped);
    assert_eq!(server.state(), ServerState::Stopped);
}

#[cfg(unix)]
#[test]
fn test_terminate_escalates_when_term_is_ignored() {
    let server = launch_server("trap '' TERM; sleep 30", Path::new("."), 4324)
        .expect("spawn")
        .with_grace(Duration::from_millis(500));

    // Let the shell install the trap
    std::thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    assert_eq!(server.terminate().unwrap(), TerminateOutcome::Stopped);
    assert!(server.has_exited());
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[test]
fn test_launch_exports_port_to_child() {
    let dir = std::env::temp_dir().join(format!("tk-port-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let server = launch_server("echo $PORT > port.txt", &dir, 4325).expect("spawn");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !server.has_exited() {
        assert!(Instant::now() < deadline, "echo should exit immediately");
        std::thread::sleep(Duration::from_millis(20));
    }

    let written = std::fs::read_to_string(dir.join("port.txt")).unwrap();
    assert_eq!(written.trim(), "4325");
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_launch_in_missing_directory_fails() {
    let err = match launch_server("sleep 30", Path::new("/definitely/not/here"), 4326) {
        Ok(_) => panic!("spawn should fail in a missing directory"),
        Err(e) => e,
    };
    assert_eq!(err.phase(), SetupPhase::Spawn);
    assert!(matches!(err, LifecycleError::SpawnFailed { .. }));
}

#[cfg(unix)]
#[test]
fn test_drop_stops_server() {
    let server = launch_server("sleep 30", Path::new("."), 4327).expect("spawn");
    let pid = server.pid() as i32;
    drop(server);

    // The group is gone once the handle is dropped
    let alive = unsafe { libc::kill(-pid, 0) } == 0;
    assert!(!alive, "process group {} should be gone", pid);
}

#[tokio::test]
async fn test_await_ready_against_running_server() {
    let server = TestServer::start().await;
    server.wait_ready().await.expect("Server failed to start");

    await_ready(
        &server.url(),
        Duration::from_secs(30),
        &BrowserOptions::headless(),
    )
    .await
    .expect("server should be ready");
}

#[tokio::test]
async fn test_await_ready_times_out_on_closed_port() {
    let url = format!("http://localhost:{}", closed_port());
    let timeout = Duration::from_secs(3);

    let started = Instant::now();
    let err = await_ready(&url, timeout, &BrowserOptions::headless())
        .await
        .expect_err("nothing listens on the port");

    assert_eq!(err.phase(), SetupPhase::Readiness);
    match err {
        LifecycleError::ServerNotReady { url: u, timeout: t } => {
            assert_eq!(u, url);
            assert_eq!(t, timeout);
        }
        other => panic!("unexpected error: {}", other),
    }
    // Browser launch is not part of the budget, but the probing is bounded
    assert!(started.elapsed() < Duration::from_secs(60));
}

/// Fresh working directory for a launched server, unique per test
#[cfg(target_os = "linux")]
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tk-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::canonicalize(&dir).unwrap()
}

/// Parse `/proc/<pid>/stat` into (state, process group)
#[cfg(target_os = "linux")]
fn proc_state(pid: &str) -> Option<(String, i32)> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // Fields after the parenthesised command name: state ppid pgrp ...
    let (_, rest) = stat.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    Some((fields.first()?.to_string(), fields.get(2)?.parse().ok()?))
}

/// Non-zombie processes that are either in group `pgid` or running in `cwd`
#[cfg(target_os = "linux")]
fn live_server_processes(pgid: Option<i32>, cwd: &Path) -> Vec<String> {
    let mut live = Vec::new();
    for entry in std::fs::read_dir("/proc").unwrap().flatten() {
        let pid = entry.file_name().to_string_lossy().to_string();
        if !pid.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Some((state, group)) = proc_state(&pid) else {
            continue;
        };
        if state == "Z" {
            continue;
        }
        let in_group = pgid == Some(group);
        let in_dir = std::fs::read_link(entry.path().join("cwd")).is_ok_and(|dir| dir == cwd);
        if in_group || in_dir {
            live.push(format!("{} ({}, pgrp {})", pid, state, group));
        }
    }
    live
}

/// Wait until nothing the server started is still running, returning what is left
#[cfg(target_os = "linux")]
async fn wait_until_stopped(dir: &Path) -> Vec<String> {
    let pgid = std::fs::read_to_string(dir.join("pid.txt"))
        .ok()
        .and_then(|text| text.trim().parse().ok());

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let live = live_server_processes(pgid, dir);
        if live.is_empty() || Instant::now() >= deadline {
            return live;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(target_os = "linux")]
fn never_ready_config(cwd: PathBuf, ready_timeout: Duration) -> ServerConfig {
    let (start, held) = occupy_consecutive(1);
    drop(held);

    ServerConfig {
        port_start: start,
        // The shell leads the group, so its pid is the group id
        command: "echo $$ > pid.txt; sleep 30".to_string(),
        cwd,
        ready_timeout,
        browser: BrowserOptions::headless(),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_start_server_stops_process_when_never_ready() {
    let dir = scratch_dir("never-ready");
    let config = never_ready_config(dir.clone(), Duration::from_secs(2));

    let err = match start_server(&config).await {
        Ok(_) => panic!("sleep never serves pages"),
        Err(e) => e,
    };
    assert_eq!(err.phase(), SetupPhase::Readiness);

    let left = wait_until_stopped(&dir).await;
    assert!(left.is_empty(), "server processes still running: {:?}", left);
    std::fs::remove_dir_all(&dir).ok();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancelled_setup_stops_process() {
    let dir = scratch_dir("cancelled-setup");
    let config = never_ready_config(dir.clone(), Duration::from_secs(30));

    // Dropping the setup future mid-readiness is what an interrupt does
    let outcome = tokio::time::timeout(Duration::from_secs(3), start_server(&config)).await;
    assert!(
        !matches!(outcome, Ok(Ok(_))),
        "sleep never serves pages"
    );

    let left = wait_until_stopped(&dir).await;
    assert!(left.is_empty(), "server processes still running: {:?}", left);
    std::fs::remove_dir_all(&dir).ok();
}
