//! Child process lifetime and exit status helpers.

use std::process::ExitStatus;

/// RAII guard that kills a child process on drop.
///
/// Wrap a spawned `tokio::process::Child` immediately after `spawn()` so the child
/// does not outlive a cancelled invocation. Call `disarm()` after the process exits
/// normally to prevent the kill.
pub struct ChildGuard {
    child: Option<tokio::process::Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> &mut tokio::process::Child {
        self.child.as_mut().expect("child present")
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Some(pid) = child.id() {
            tracing::warn!(pid, "Killing child abandoned before exit");
        }
        let _ = child.start_kill();
        let _ = child.try_wait();
    }
}

/// Map an exit status to the code a shell would report.
///
/// A child killed by signal `n` reports `128 + n`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
