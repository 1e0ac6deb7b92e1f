// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service record and its satellite enums.
//!
//! `state` and `restart_counter` are private: only the state machine in
//! [`crate::fsm`] transitions them, so the state/pid bookkeeping has a
//! single writer.

use crate::cond::CondExpr;
use crate::runlevel::{Runlevel, Runlevels};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What kind of process a record supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Monitored daemon, respawned on exit.
    Service,
    /// One-shot, runs in parallel with other work.
    Task,
    /// One-shot, the supervisor waits for completion.
    Run,
    /// Socket-activated; the socket layer owns the listener.
    Inetd,
}

crate::simple_display! {
    ServiceKind {
        Service => "service",
        Task => "task",
        Run => "run",
        Inetd => "inetd",
    }
}

impl ServiceKind {
    fn bit(self) -> u8 {
        match self {
            ServiceKind::Service => 1 << 0,
            ServiceKind::Task => 1 << 1,
            ServiceKind::Run => 1 << 2,
            ServiceKind::Inetd => 1 << 3,
        }
    }
}

/// Bitmask of service kinds, used to scope `step_all` sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindMask(u8);

impl KindMask {
    pub const SERVICE: KindMask = KindMask(1 << 0);
    pub const TASK: KindMask = KindMask(1 << 1);
    pub const RUN: KindMask = KindMask(1 << 2);
    pub const INETD: KindMask = KindMask(1 << 3);
    pub const ANY: KindMask = KindMask(0b1111);

    pub fn contains(self, kind: ServiceKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl std::ops::BitOr for KindMask {
    type Output = KindMask;

    fn bitor(self, rhs: KindMask) -> KindMask {
        KindMask(self.0 | rhs.0)
    }
}

/// Per-service state machine state. See [`crate::fsm`] for the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not allowed in the current runlevel, or blocked.
    Halted,
    /// Enabled, waiting for its conditions before starting.
    Ready,
    /// Process alive, see `pid`.
    Running,
    /// SIGTERM delivered, waiting for the reap.
    Stopping,
    /// Inetd socket armed, or SIGSTOP'd while conditions are in flux.
    Waiting,
    /// Suspended by the operator; no automatic transitions.
    Paused,
    /// One-shot finished.
    Done,
}

crate::simple_display! {
    ServiceState {
        Halted => "halted",
        Ready => "ready",
        Running => "running",
        Stopping => "stopping",
        Waiting => "waiting",
        Paused => "paused",
        Done => "done",
    }
}

/// Why a service is held back from running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    None,
    /// Command missing on disk; retried after the next conf reload.
    Missing,
    /// Quarantined after `RESPAWN_MAX` consecutive failed starts.
    Crashing,
    /// Stopped by the operator.
    User,
    /// Reserved.
    Busy,
}

crate::simple_display! {
    Block {
        None => "none",
        Missing => "missing",
        Crashing => "crashing",
        User => "user",
        Busy => "busy",
    }
}

/// Reload bookkeeping against the source `.conf` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dirty {
    /// Same mtime as last pass.
    Unchanged,
    /// New or modified in the current reload pass.
    Updated,
    /// Scheduled for removal; swept once `Halted`.
    Removed,
}

/// Inetd descriptor: the socket layer owns the listener, the record only
/// carries what registration parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InetdSpec {
    pub service: String,
    pub proto: String,
    /// `wait` semantics: single-threaded, the listener is handed over.
    pub wait: bool,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl InetdSpec {
    pub fn matches(&self, service: &str, proto: &str) -> bool {
        self.service == service && self.proto == proto
    }
}

/// Plugin capability attached to a record. The only hook the core consults
/// is the enablement override; everything else stays with the plugin layer.
pub trait ServiceCallback: Send + Sync {
    /// Override enablement; `None` falls through to runlevel + block.
    fn enabled(&self, svc: &ServiceRecord) -> Option<bool> {
        let _ = svc;
        None
    }
}

/// One supervised service, task, run command or inetd entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    job: u32,
    pub id: u32,
    pid: i32,
    state: ServiceState,
    kind: ServiceKind,
    pub runlevels: Runlevels,
    /// Modification time (seconds) of the source `.conf`; 0 means built-in.
    pub mtime: u64,
    pub dirty: Dirty,
    /// Reload is expressed with SIGHUP instead of stop/start.
    pub sighup: bool,
    pub cond: CondExpr,
    restart_counter: u32,
    pub block: Block,
    pub username: String,
    pub group: String,
    pub desc: String,
    cmd: String,
    /// Arguments after argv0.
    pub args: Vec<String>,
    pub inetd: Option<InetdSpec>,
    /// Recorded on reap, and synchronously for `Run` kind.
    pub exit_status: Option<i32>,
    #[serde(skip)]
    pub callback: Option<Arc<dyn ServiceCallback>>,
}

impl ServiceRecord {
    pub fn new(cmd: impl Into<String>, id: u32, kind: ServiceKind) -> Self {
        let state = match kind {
            ServiceKind::Inetd => ServiceState::Waiting,
            _ => ServiceState::Halted,
        };
        ServiceRecord {
            job: 0,
            id,
            pid: 0,
            state,
            kind,
            runlevels: Runlevels::default(),
            mtime: 0,
            dirty: Dirty::Unchanged,
            sighup: false,
            cond: CondExpr::none(),
            restart_counter: 0,
            block: Block::None,
            username: String::new(),
            group: String::new(),
            desc: String::new(),
            cmd: cmd.into(),
            args: Vec::new(),
            inetd: None,
            exit_status: None,
            callback: None,
        }
    }

    pub fn job(&self) -> u32 {
        self.job
    }

    pub(crate) fn set_job(&mut self, job: u32) {
        self.job = job;
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn set_pid(&mut self, pid: i32) {
        self.pid = pid;
    }

    pub fn clear_pid(&mut self) {
        self.pid = 0;
    }

    pub fn restart_counter(&self) -> u32 {
        self.restart_counter
    }

    pub(crate) fn set_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    pub(crate) fn bump_restart_counter(&mut self) {
        self.restart_counter = self.restart_counter.saturating_add(1);
    }

    pub(crate) fn reset_restart_counter(&mut self) {
        self.restart_counter = 0;
    }

    /// Test-only escape hatch for driving records into a given state.
    #[cfg(any(test, feature = "test-support"))]
    pub fn force_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    pub fn in_runlevel(&self, level: Runlevel) -> bool {
        self.runlevels.contains(level)
    }

    /// Should the service run? A plugin callback may override; otherwise the
    /// record must be allowed in `level`, not blocked, and not scheduled for
    /// removal.
    pub fn enabled(&self, level: Runlevel) -> bool {
        if let Some(cb) = &self.callback {
            if let Some(enabled) = cb.enabled(self) {
                return enabled;
            }
        }
        self.in_runlevel(level) && self.block == Block::None && !self.is_removed()
    }

    pub fn is_dynamic(&self) -> bool {
        self.mtime != 0
    }

    pub fn is_removed(&self) -> bool {
        self.dirty == Dirty::Removed
    }

    pub fn is_changed(&self) -> bool {
        self.dirty != Dirty::Unchanged
    }

    pub fn is_updated(&self) -> bool {
        self.dirty == Dirty::Updated
    }

    /// Reload bookkeeping: mark updated when the source mtime moved,
    /// otherwise clear any removal mark left by `mark_dynamic`.
    pub fn check_dirty(&mut self, mtime: u64) {
        self.dirty = if self.mtime != mtime { Dirty::Updated } else { Dirty::Unchanged };
        self.mtime = mtime;
    }

    /// Stable identity for logs and condition paths: command basename, with
    /// the instance id appended for multi-instance commands.
    pub fn ident(&self) -> String {
        let base = self.cmd.rsplit('/').next().unwrap_or(self.cmd.as_str());
        if self.id == 1 {
            base.to_string()
        } else {
            format!("{base}:{}", self.id)
        }
    }
}

impl std::fmt::Debug for ServiceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRecord")
            .field("job", &self.job)
            .field("id", &self.id)
            .field("cmd", &self.cmd)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .field("runlevels", &self.runlevels)
            .field("dirty", &self.dirty)
            .field("block", &self.block)
            .field("restart_counter", &self.restart_counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
