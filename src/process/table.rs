//! OS process discovery and signalling.
//!
//! The [`ProcessTable`] trait is the seam between the reaper's escalation
//! logic and the host operating system. [`SystemProcessTable`] enumerates
//! processes with `sysinfo` and delivers signals with `nix` on Unix.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Deserialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::platform::BoxFuture;
use crate::{AppError, Result};

/// Where to look for candidate processes.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Discovery {
    /// Only processes descended from the current process.
    #[default]
    Descendants,
    /// Every process visible to the current user.
    SystemWide,
}

/// Termination signals, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReapSignal {
    /// Graceful terminate request (`SIGTERM`).
    Terminate,
    /// Interrupt, as if Ctrl-C were pressed (`SIGINT`).
    Interrupt,
    /// Unconditional kill (`SIGKILL`).
    Kill,
}

/// A process found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// OS process identifier.
    pub pid: u32,
    /// Executable name as reported by the OS.
    pub name: String,
}

/// Host process table operations used by the reaper.
pub trait ProcessTable: Send + Sync {
    /// Enumerate candidate processes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the host cannot enumerate processes.
    fn list(&self, discovery: Discovery) -> Result<Vec<ProcessEntry>>;

    /// Whether the process still exists and has not exited.
    fn is_alive(&self, pid: u32) -> bool;

    /// Deliver a signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process is gone or access is denied.
    fn signal(&self, pid: u32, signal: ReapSignal) -> Result<()>;

    /// Last-resort kill of every process whose name starts with `name`, via
    /// the OS command line tools. An empty name is a no-op. Output and
    /// failures are discarded.
    fn kill_by_name(&self, name: &str) -> BoxFuture<'_, ()>;
}

/// [`ProcessTable`] backed by the real operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    fn snapshot() -> Result<System> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(AppError::Process(
                "process enumeration is not supported on this host".into(),
            ));
        }
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        Ok(system)
    }
}

impl ProcessTable for SystemProcessTable {
    fn list(&self, discovery: Discovery) -> Result<Vec<ProcessEntry>> {
        let system = Self::snapshot()?;

        let root = match (discovery, sysinfo::get_current_pid()) {
            (Discovery::Descendants, Ok(pid)) => Some(pid),
            (Discovery::Descendants, Err(err)) => {
                debug!(err, "current pid unavailable, listing system-wide");
                None
            }
            (Discovery::SystemWide, _) => None,
        };

        // Thread entries share the parent's name on Linux; skip them.
        let processes = system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none());

        let Some(root) = root else {
            return Ok(processes
                .map(|(pid, process)| ProcessEntry {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                })
                .collect());
        };

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in processes {
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let mut seen = HashSet::new();
        let mut queue: VecDeque<Pid> = VecDeque::from([root]);
        let mut entries = Vec::new();
        while let Some(parent) = queue.pop_front() {
            for child in children.get(&parent).into_iter().flatten() {
                if !seen.insert(*child) {
                    continue;
                }
                if let Some(process) = system.process(*child) {
                    entries.push(ProcessEntry {
                        pid: child.as_u32(),
                        name: process.name().to_string_lossy().into_owned(),
                    });
                }
                queue.push_back(*child);
            }
        }
        Ok(entries)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        system
            .process(pid)
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: ReapSignal) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid as NixPid;

        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Process(format!("pid {pid} out of range")))?;
        let sig = match signal {
            ReapSignal::Terminate => Signal::SIGTERM,
            ReapSignal::Interrupt => Signal::SIGINT,
            ReapSignal::Kill => Signal::SIGKILL,
        };
        kill(NixPid::from_raw(raw), sig)
            .map_err(|errno| AppError::Process(format!("{sig} to pid {pid} failed: {errno}")))
    }

    #[cfg(not(unix))]
    fn signal(&self, pid: u32, signal: ReapSignal) -> Result<()> {
        let pid_handle = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid_handle]),
            true,
            ProcessRefreshKind::nothing(),
        );
        let process = system
            .process(pid_handle)
            .ok_or_else(|| AppError::Process(format!("pid {pid} not found")))?;
        let sig = match signal {
            ReapSignal::Terminate => sysinfo::Signal::Term,
            ReapSignal::Interrupt => sysinfo::Signal::Interrupt,
            ReapSignal::Kill => sysinfo::Signal::Kill,
        };
        // Hosts without the requested signal fall back to a hard kill.
        let delivered = process.kill_with(sig).unwrap_or_else(|| process.kill());
        if delivered {
            Ok(())
        } else {
            Err(AppError::Process(format!("{sig:?} to pid {pid} failed")))
        }
    }

    fn kill_by_name(&self, name: &str) -> BoxFuture<'_, ()> {
        let name = name.trim().to_owned();
        Box::pin(async move {
            if name.is_empty() {
                warn!("refusing kill-by-name with an empty name");
                return;
            }
            let mut cmd = if cfg!(windows) {
                let image = format!("{name}.exe");
                let mut cmd = tokio::process::Command::new("taskkill");
                cmd.args(["/F", "/IM", image.as_str()]);
                cmd
            } else {
                // Anchored to the start of the process name, not the command line.
                let pattern = format!("^{}", regex::escape(&name));
                let mut cmd = tokio::process::Command::new("pkill");
                cmd.arg(pattern);
                cmd
            };
            cmd.stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null());
            match cmd.status().await {
                Ok(status) => debug!(name, ?status, "kill-by-name finished"),
                Err(err) => debug!(name, %err, "kill-by-name could not run"),
            }
        })
    }
}
