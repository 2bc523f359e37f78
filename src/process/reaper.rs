//! Escalating termination of decoder subprocesses.
//!
//! The voice layer owns the decoder processes it spawns, and asking it to
//! stop does not reliably kill them. [`ProcessReaper`] finds every matching
//! process at call time and walks each one through `SIGTERM`, `SIGINT`, and
//! finally `SIGKILL`, polling for exit between steps. Matches are handled
//! concurrently so the whole pass is bounded by one escalation budget.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use glob::{MatchOptions, Pattern};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{AppError, Result};

use super::table::{Discovery, ProcessEntry, ProcessTable, ReapSignal, SystemProcessTable};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Timing and discovery knobs for one reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapSettings {
    /// Where to search for matches.
    pub discovery: Discovery,
    /// How long to wait for exit after `SIGTERM`.
    pub graceful_wait: Duration,
    /// How long to wait for exit after `SIGINT`.
    pub interrupt_wait: Duration,
    /// Delay between liveness checks while waiting.
    pub poll_interval: Duration,
}

impl Default for ReapSettings {
    fn default() -> Self {
        Self {
            discovery: Discovery::Descendants,
            graceful_wait: Duration::from_secs(1),
            interrupt_wait: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ReapSettings {
    /// Upper bound on the time one [`ProcessReaper::reap`] call spends waiting.
    #[must_use]
    pub fn wait_budget(&self) -> Duration {
        self.graceful_wait + self.interrupt_wait
    }
}

/// How far escalation went for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The process was gone before the first signal landed.
    AlreadyExited,
    /// Exited after `SIGTERM`.
    Terminated,
    /// Exited after `SIGINT`.
    Interrupted,
    /// `SIGKILL` was sent.
    Killed,
    /// Signals could not be delivered (e.g. permission denied); left alone.
    Unreachable,
}

/// Result of one reaper pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReapReport {
    /// Per-process outcome for every match.
    pub outcomes: Vec<(ProcessEntry, Escalation)>,
    /// Whether enumeration failed and the kill-by-name fallback ran.
    /// Stays `false` when the fallback was skipped for a short stem.
    pub used_fallback: bool,
}

impl ReapReport {
    /// Number of processes that matched the pattern.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.outcomes.len()
    }
}

/// Finds processes by name and terminates them with escalating signals.
///
/// Holds no per-call state, so one instance can serve concurrent callers.
pub struct ProcessReaper {
    table: Arc<dyn ProcessTable>,
    settings: ReapSettings,
}

impl ProcessReaper {
    /// Create a reaper over an arbitrary process table.
    #[must_use]
    pub fn new(table: Arc<dyn ProcessTable>, settings: ReapSettings) -> Self {
        Self { table, settings }
    }

    /// Create a reaper over the host operating system.
    #[must_use]
    pub fn system(settings: ReapSettings) -> Self {
        Self::new(Arc::new(SystemProcessTable), settings)
    }

    /// The settings this reaper was built with.
    #[must_use]
    pub fn settings(&self) -> &ReapSettings {
        &self.settings
    }

    /// Terminate every process whose name matches `name_pattern`.
    ///
    /// Best-effort: always returns `true`. Failures are logged, never raised.
    pub async fn terminate_matching(&self, name_pattern: &str) -> bool {
        let report = self.reap(name_pattern).await;
        debug!(
            pattern = name_pattern,
            matched = report.matched(),
            fallback = report.used_fallback,
            "terminate pass complete"
        );
        true
    }

    /// Run one discovery and escalation pass and report what happened.
    pub async fn reap(&self, name_pattern: &str) -> ReapReport {
        let span = info_span!("reap", pattern = name_pattern);
        self.reap_inner(name_pattern).instrument(span).await
    }

    async fn reap_inner(&self, name_pattern: &str) -> ReapReport {
        let pattern = match Pattern::new(name_pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(%err, "invalid process pattern, falling back to kill-by-name");
                return self.kill_by_stem(name_pattern).await;
            }
        };

        let table = Arc::clone(&self.table);
        let discovery = self.settings.discovery;
        let listing = tokio::task::spawn_blocking(move || table.list(discovery)).await;

        let entries = match listing {
            Ok(Ok(entries)) => entries,
            Ok(Err(err)) => {
                warn!(%err, "process enumeration failed, falling back to kill-by-name");
                return self.kill_by_stem(name_pattern).await;
            }
            Err(err) => {
                warn!(%err, "process enumeration task failed, falling back to kill-by-name");
                return self.kill_by_stem(name_pattern).await;
            }
        };

        let matches: Vec<ProcessEntry> = entries
            .into_iter()
            .filter(|entry| pattern.matches_with(&entry.name, MATCH_OPTIONS))
            .collect();

        if matches.is_empty() {
            debug!("no matching processes");
            return ReapReport::default();
        }

        let outcomes = join_all(matches.into_iter().map(|entry| async move {
            let outcome = self.escalate(entry.pid).await;
            (entry, outcome)
        }))
        .await;

        for (entry, outcome) in &outcomes {
            info!(pid = entry.pid, name = %entry.name, ?outcome, "reaped process");
        }

        ReapReport {
            outcomes,
            used_fallback: false,
        }
    }

    /// Kill-by-name on the pattern's literal stem, unless the stem is too
    /// short to identify a decoder.
    async fn kill_by_stem(&self, name_pattern: &str) -> ReapReport {
        let Some(name) = fallback_name(name_pattern) else {
            warn!(
                min_len = MIN_FALLBACK_STEM,
                "pattern has no usable literal stem, skipping kill-by-name"
            );
            return ReapReport::default();
        };
        self.table.kill_by_name(name).await;
        ReapReport {
            outcomes: Vec::new(),
            used_fallback: true,
        }
    }

    /// Walk one process through the signal ladder.
    async fn escalate(&self, pid: u32) -> Escalation {
        if let Err(err) = self.table.signal(pid, ReapSignal::Terminate) {
            return if self.table.is_alive(pid) {
                debug!(pid, %err, "cannot signal process, skipping");
                Escalation::Unreachable
            } else {
                Escalation::AlreadyExited
            };
        }
        if self.wait_for_exit(pid, self.settings.graceful_wait).await {
            return Escalation::Terminated;
        }

        debug!(pid, "process ignored SIGTERM, sending SIGINT");
        if let Err(err) = self.table.signal(pid, ReapSignal::Interrupt) {
            debug!(pid, %err, "SIGINT failed");
        }
        if self.wait_for_exit(pid, self.settings.interrupt_wait).await {
            return Escalation::Interrupted;
        }

        warn!(pid, "process did not exit gracefully, sending SIGKILL");
        if let Err(err) = self.table.signal(pid, ReapSignal::Kill) {
            if !self.table.is_alive(pid) {
                return Escalation::Interrupted;
            }
            debug!(pid, %err, "SIGKILL failed");
            return Escalation::Unreachable;
        }
        Escalation::Killed
    }

    /// Poll until the process is gone or `budget` elapses.
    ///
    /// Returns `true` if the process exited within the budget.
    async fn wait_for_exit(&self, pid: u32, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        loop {
            if !self.table.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = self.settings.poll_interval.min(deadline - now);
            tokio::time::sleep(step).await;
        }
    }
}

/// Shortest literal stem the kill-by-name fallback will act on.
pub const MIN_FALLBACK_STEM: usize = 3;

/// Literal prefix of a glob pattern, used for OS kill-by-name tools.
#[must_use]
pub fn literal_stem(pattern: &str) -> &str {
    let end = pattern
        .find(['*', '?', '[', ']'])
        .unwrap_or(pattern.len());
    &pattern[..end]
}

/// The kill-by-name target for `pattern`: its literal stem, or `None` when
/// the stem is shorter than [`MIN_FALLBACK_STEM`] characters.
#[must_use]
pub fn fallback_name(pattern: &str) -> Option<&str> {
    let stem = literal_stem(pattern).trim();
    (stem.chars().count() >= MIN_FALLBACK_STEM).then_some(stem)
}

/// Check that `pattern` is a valid glob with a usable literal stem.
///
/// # Errors
///
/// Returns `AppError::Config` describing the first problem found.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    Pattern::new(pattern).map_err(|err| {
        AppError::Config(format!("decoder pattern `{pattern}` is not a valid glob: {err}"))
    })?;
    if fallback_name(pattern).is_none() {
        return Err(AppError::Config(format!(
            "decoder pattern `{pattern}` must start with at least {MIN_FALLBACK_STEM} literal characters"
        )));
    }
    Ok(())
}
