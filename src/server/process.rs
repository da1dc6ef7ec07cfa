//! Spawning and stopping the application-under-test.
//!
//! The server runs through the platform shell in its own process group so
//! that one signal reaches the shell, the package manager, and the dev server
//! it forks.

use crate::config::PORT_ENV;
use crate::error::LifecycleError;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a terminated server gets to exit before it is force-killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Liveness of the launched server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Ready,
    Stopped,
}

/// What a teardown call actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process group was signalled and the server exited.
    Stopped,
    /// Nothing was left to stop, or teardown had already run.
    AlreadyStopped,
}

/// Result of delivering a termination request to a process tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NotFound,
}

/// Platform-specific way of stopping a whole process tree.
pub trait TerminationStrategy: Send + Sync {
    /// Ask the tree rooted at `pid` to stop.
    fn terminate(&self, pid: u32) -> io::Result<Delivery>;

    /// Stop the tree rooted at `pid` without giving it a chance to clean up.
    fn force(&self, pid: u32) -> io::Result<Delivery>;
}

/// SIGTERM / SIGKILL delivered to the process group (POSIX).
#[cfg(unix)]
pub struct ProcessGroupKill;

#[cfg(unix)]
impl ProcessGroupKill {
    fn signal(pid: u32, signal: libc::c_int) -> io::Result<Delivery> {
        let pgid = pid as libc::pid_t;
        // A negative pid addresses every member of the process group.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(Delivery::Delivered);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(Delivery::NotFound)
        } else {
            Err(err)
        }
    }
}

#[cfg(unix)]
impl TerminationStrategy for ProcessGroupKill {
    fn terminate(&self, pid: u32) -> io::Result<Delivery> {
        Self::signal(pid, libc::SIGTERM)
    }

    fn force(&self, pid: u32) -> io::Result<Delivery> {
        Self::signal(pid, libc::SIGKILL)
    }
}

/// `taskkill /T` over the process tree (Windows).
#[cfg(windows)]
pub struct TreeKill;

#[cfg(windows)]
impl TerminationStrategy for TreeKill {
    fn terminate(&self, pid: u32) -> io::Result<Delivery> {
        let status = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if status.success() {
            Ok(Delivery::Delivered)
        } else if status.code() == Some(128) {
            // taskkill: "The process ... not found"
            Ok(Delivery::NotFound)
        } else {
            Err(io::Error::other(format!("taskkill exited with {}", status)))
        }
    }

    fn force(&self, pid: u32) -> io::Result<Delivery> {
        self.terminate(pid)
    }
}

/// Termination strategy for the current platform.
pub fn platform_strategy() -> Box<dyn TerminationStrategy> {
    #[cfg(unix)]
    {
        Box::new(ProcessGroupKill)
    }
    #[cfg(windows)]
    {
        Box::new(TreeKill)
    }
}

struct Inner {
    child: Child,
    state: ServerState,
}

/// Owns the running application server for the duration of a test run.
///
/// Teardown happens at most once: either through an explicit
/// [`ServerHandle::terminate`] or when the handle is dropped.
pub struct ServerHandle {
    pid: u32,
    port: u16,
    grace: Duration,
    strategy: Box<dyn TerminationStrategy>,
    terminated: AtomicBool,
    inner: Mutex<Inner>,
}

impl ServerHandle {
    fn new(child: Child, port: u16) -> Self {
        Self {
            pid: child.id(),
            port,
            grace: DEFAULT_GRACE,
            strategy: platform_strategy(),
            terminated: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                child,
                state: ServerState::Starting,
            }),
        }
    }

    /// Override the grace period between the polite and the forced stop.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Replace the platform's way of stopping the process tree.
    pub fn with_strategy(mut self, strategy: Box<dyn TerminationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL of the application
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn state(&self) -> ServerState {
        self.lock().state
    }

    pub(crate) fn mark_ready(&self) {
        let mut inner = self.lock();
        if inner.state == ServerState::Starting {
            inner.state = ServerState::Ready;
        }
    }

    /// Whether the direct child (the shell) has exited. Reaps it if so.
    pub fn has_exited(&self) -> bool {
        matches!(self.lock().child.try_wait(), Ok(Some(_)))
    }

    /// Stop the whole process group.
    ///
    /// A group that no longer exists counts as already stopped and only logs a
    /// warning. Calls after the first one are no-ops, including after a
    /// failed first call.
    ///
    /// This blocks the calling thread for up to the grace period. From async
    /// code, run it on `tokio::task::spawn_blocking`.
    pub fn terminate(&self) -> Result<TerminateOutcome, LifecycleError> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(TerminateOutcome::AlreadyStopped);
        }

        log::info!("Stopping development server (pid {})...", self.pid);
        let delivery = self
            .strategy
            .terminate(self.pid)
            .map_err(|source| LifecycleError::TerminationFailure {
                pid: self.pid,
                source,
            })?;

        let mut inner = self.lock();
        let outcome = match delivery {
            Delivery::NotFound => {
                log::warn!("Dev server process not found. It may have already stopped.");
                let _ = inner.child.try_wait();
                TerminateOutcome::AlreadyStopped
            }
            Delivery::Delivered => {
                if !wait_for_exit(&mut inner.child, self.grace) {
                    log::warn!(
                        "Dev server did not exit within {:?}, killing process group {}",
                        self.grace,
                        self.pid
                    );
                    self.strategy.force(self.pid).map_err(|source| {
                        LifecycleError::TerminationFailure {
                            pid: self.pid,
                            source,
                        }
                    })?;
                    let _ = inner.child.wait();
                }
                TerminateOutcome::Stopped
            }
        };

        inner.state = ServerState::Stopped;
        log::info!("Development server stopped");
        Ok(outcome)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.terminate() {
            log::error!("Failed to stop development server: {}", e);
        }
    }
}

fn wait_for_exit(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL_INTERVAL),
            Ok(None) => return false,
            Err(e) => {
                log::warn!("Could not query dev server status: {}", e);
                return false;
            }
        }
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Start `command` in `cwd` as the leader of a new process group.
///
/// `PORT` and `TEST_SERVER_PORT` are exported to the child so the
/// application listens on the port the harness picked. Standard output and error are inherited.
pub fn launch_server(command: &str, cwd: &Path, port: u16) -> Result<ServerHandle, LifecycleError> {
    let mut cmd = shell_command(command);
    cmd.current_dir(cwd)
        .env("PORT", port.to_string())
        .env(PORT_ENV, port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    let child = cmd.spawn().map_err(|source| LifecycleError::SpawnFailed {
        command: command.to_string(),
        source,
    })?;

    log::info!(
        "Started `{}` in {} (pid {}, port {})",
        command,
        cwd.display(),
        child.id(),
        port
    );

    Ok(ServerHandle::new(child, port))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::SetupPhase;

    /// Refuses every signal, as if the group belonged to another user.
    struct Denied;

    impl TerminationStrategy for Denied {
        fn terminate(&self, _pid: u32) -> io::Result<Delivery> {
            Err(io::Error::from_raw_os_error(libc::EPERM))
        }

        fn force(&self, pid: u32) -> io::Result<Delivery> {
            self.terminate(pid)
        }
    }

    /// Accepts the polite stop without acting on it, then refuses the forced one.
    struct StubbornGroup;

    impl TerminationStrategy for StubbornGroup {
        fn terminate(&self, _pid: u32) -> io::Result<Delivery> {
            Ok(Delivery::Delivered)
        }

        fn force(&self, _pid: u32) -> io::Result<Delivery> {
            Err(io::Error::from_raw_os_error(libc::EPERM))
        }
    }

    /// Reports the group as already gone.
    struct Vanished;

    impl TerminationStrategy for Vanished {
        fn terminate(&self, _pid: u32) -> io::Result<Delivery> {
            Ok(Delivery::NotFound)
        }

        fn force(&self, _pid: u32) -> io::Result<Delivery> {
            Ok(Delivery::NotFound)
        }
    }

    fn sleeper(port: u16) -> ServerHandle {
        launch_server("sleep 30", Path::new("."), port).unwrap()
    }

    /// Kill the group behind the handle's back and wait for the shell to exit.
    fn kill_and_reap(server: &ServerHandle) {
        let _ = ProcessGroupKill.force(server.pid());
        let deadline = Instant::now() + Duration::from_secs(5);
        while !server.has_exited() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn refused_signal_is_a_fatal_termination_failure() {
        let server = sleeper(4340).with_strategy(Box::new(Denied));

        let err = server.terminate().unwrap_err();
        assert_eq!(err.phase(), SetupPhase::Teardown);
        match &err {
            LifecycleError::TerminationFailure { pid, source } => {
                assert_eq!(*pid, server.pid());
                assert_eq!(source.raw_os_error(), Some(libc::EPERM));
            }
            other => panic!("unexpected error: {}", other),
        }

        // Teardown already ran once
        assert_eq!(server.terminate().unwrap(), TerminateOutcome::AlreadyStopped);
        assert!(!server.has_exited());

        kill_and_reap(&server);
        assert!(server.has_exited());
    }

    #[test]
    fn refused_escalation_is_a_fatal_termination_failure() {
        let server = sleeper(4341)
            .with_grace(Duration::from_millis(100))
            .with_strategy(Box::new(StubbornGroup));

        let err = server.terminate().unwrap_err();
        assert_eq!(err.phase(), SetupPhase::Teardown);
        assert!(matches!(err, LifecycleError::TerminationFailure { .. }));
        assert_eq!(server.terminate().unwrap(), TerminateOutcome::AlreadyStopped);

        kill_and_reap(&server);
    }

    #[test]
    fn missing_group_is_already_stopped() {
        let server = sleeper(4342).with_strategy(Box::new(Vanished));

        assert_eq!(server.terminate().unwrap(), TerminateOutcome::AlreadyStopped);
        assert_eq!(server.state(), ServerState::Stopped);

        kill_and_reap(&server);
    }

    #[test]
    fn child_sees_both_port_variables() {
        let server = launch_server(
            "test \"$PORT\" = 4343 && test \"$TEST_SERVER_PORT\" = 4343",
            Path::new("."),
            4343,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Ok(Some(status)) = server.lock().child.try_wait() {
                break status;
            }
            assert!(Instant::now() < deadline, "shell should exit immediately");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert!(status.success());
    }
}
