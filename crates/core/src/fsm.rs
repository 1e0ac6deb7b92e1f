// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-service state machine.
//!
//! Every start/stop/reload decision is centralised in [`step`]: external
//! events (signals, condition changes, reloads, runlevel commands) mutate
//! the registry or the condition store and then sweep the affected records
//! through here. Process and signal plumbing is abstracted behind
//! [`Backend`] so the machine itself stays deterministic and testable.

use crate::cond::{CondSource, CondState};
use crate::registry::Registry;
use crate::runlevel::Runlevel;
use crate::service::{Block, Dirty, KindMask, ServiceKind, ServiceRecord, ServiceState};
use thiserror::Error;
use tracing::{debug, warn};

/// Consecutive failed starts before a record is quarantined with
/// `Block::Crashing`.
pub const RESPAWN_MAX: u32 = 10;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("command {0} does not exist")]
    Missing(String),

    #[error("respawn suspended")]
    Suspended,

    #[error("spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("start rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("bad pid {0} for signalling")]
    BadPid(i32),

    #[error("service does not support SIGHUP")]
    NoSighup,

    #[error("signal delivery failed: {0}")]
    Kill(#[source] std::io::Error),
}

/// Supervision seam: the daemon implements this with fork/exec and real
/// signals, tests with an in-memory fake.
pub trait Backend {
    /// Spawn the service's process. On success the pid is recorded on the
    /// record — except for `Run` kind, where the backend waits for
    /// completion, records the exit status and leaves the pid cleared.
    fn start(&mut self, svc: &mut ServiceRecord) -> Result<(), StartError>;

    /// Deliver SIGTERM. Only meaningful for `Service` kind; refuses
    /// `pid <= 1`.
    fn stop(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError>;

    /// Deliver SIGHUP for in-place reload.
    fn reload(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError>;

    /// Deliver SIGSTOP (condition flux pause).
    fn pause(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError>;

    /// Deliver SIGCONT.
    fn resume(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError>;

    /// Observation hook, called after every state transition.
    fn on_transition(&mut self, svc: &ServiceRecord, from: ServiceState, to: ServiceState) {
        let _ = (svc, from, to);
    }
}

/// Drive one record. Re-runs the dispatch as long as the state changed, so
/// cascades like `Halted -> Ready -> Running` complete in a single call;
/// bounded by the finite state graph.
pub fn step<B: Backend>(
    svc: &mut ServiceRecord,
    runlevel: Runlevel,
    conds: &dyn CondSource,
    backend: &mut B,
) {
    loop {
        let from = svc.state();
        let enabled = svc.enabled(runlevel);

        match from {
            ServiceState::Halted => {
                svc.reset_restart_counter();
                if enabled {
                    // A re-enabled inetd entry re-arms its listener; only a
                    // dispatched connection moves it towards a start.
                    let next = match svc.kind() {
                        ServiceKind::Inetd => ServiceState::Waiting,
                        _ => ServiceState::Ready,
                    };
                    svc.set_state(next);
                }
            }
            ServiceState::Done => {
                // A changed one-shot re-executes after reload.
                if svc.is_changed() {
                    svc.set_state(ServiceState::Halted);
                }
            }
            ServiceState::Stopping => {
                if svc.pid() == 0 {
                    let next = match svc.kind() {
                        ServiceKind::Service => ServiceState::Halted,
                        ServiceKind::Task | ServiceKind::Run => ServiceState::Done,
                        // The listener stays armed for the next connection.
                        ServiceKind::Inetd => ServiceState::Waiting,
                    };
                    svc.set_state(next);
                }
            }
            ServiceState::Paused => {
                // Operator suspension; nothing automatic happens here.
            }
            ServiceState::Ready => step_ready(svc, enabled, conds, backend),
            ServiceState::Running => step_running(svc, enabled, conds, backend),
            ServiceState::Waiting => step_waiting(svc, enabled, conds, backend),
        }

        if svc.state() == from {
            break;
        }
        debug!(svc = %svc.ident(), %from, to = %svc.state(), "transition");
        backend.on_transition(svc, from, svc.state());
    }
}

fn step_ready<B: Backend>(
    svc: &mut ServiceRecord,
    enabled: bool,
    conds: &dyn CondSource,
    backend: &mut B,
) {
    if !enabled {
        svc.set_state(ServiceState::Halted);
        return;
    }
    if svc.cond.aggregate(conds) != CondState::On {
        return;
    }
    if svc.pid() != 0 {
        // A condition-driven stop left the old process winding down; never
        // fork a second copy before the reap.
        return;
    }
    if svc.restart_counter() >= RESPAWN_MAX {
        warn!(svc = %svc.ident(), "keeps crashing, not restarting");
        svc.block = Block::Crashing;
        svc.set_state(ServiceState::Halted);
        return;
    }

    match backend.start(svc) {
        Err(err) => {
            if matches!(err, StartError::Missing(_)) {
                svc.block = Block::Missing;
            }
            debug!(svc = %svc.ident(), %err, "start failed");
            svc.bump_restart_counter();
        }
        Ok(()) => {
            if svc.kind() != ServiceKind::Run && svc.pid() == 0 {
                svc.bump_restart_counter();
                return;
            }
            svc.dirty = Dirty::Unchanged;
            match svc.kind() {
                ServiceKind::Service => svc.set_state(ServiceState::Running),
                ServiceKind::Task | ServiceKind::Inetd => svc.set_state(ServiceState::Stopping),
                ServiceKind::Run => svc.set_state(ServiceState::Done),
            }
        }
    }
}

fn step_running<B: Backend>(
    svc: &mut ServiceRecord,
    enabled: bool,
    conds: &dyn CondSource,
    backend: &mut B,
) {
    if !enabled {
        deliver_stop(svc, backend);
        svc.set_state(ServiceState::Stopping);
        return;
    }
    if svc.pid() == 0 {
        // Crashed; back through Ready for the respawn throttle.
        svc.bump_restart_counter();
        svc.set_state(ServiceState::Ready);
        return;
    }

    let cond = svc.cond.aggregate(conds);
    if cond == CondState::Off || (!svc.sighup && (cond < CondState::On || svc.is_changed())) {
        deliver_stop(svc, backend);
        svc.set_state(ServiceState::Ready);
        return;
    }
    if cond == CondState::Flux {
        deliver_pause(svc, backend);
        svc.set_state(ServiceState::Waiting);
        return;
    }
    if svc.is_changed() {
        // SIGHUP-capable and conditions satisfied; reload in place, falling
        // back to stop+start when delivery fails.
        if let Err(err) = backend.reload(svc) {
            if let SignalError::BadPid(_) = err {
                svc.clear_pid();
            }
            deliver_stop(svc, backend);
            svc.set_state(ServiceState::Ready);
        }
        svc.dirty = Dirty::Unchanged;
    }
}

fn step_waiting<B: Backend>(
    svc: &mut ServiceRecord,
    enabled: bool,
    conds: &dyn CondSource,
    backend: &mut B,
) {
    if !enabled {
        deliver_resume(svc, backend);
        deliver_stop(svc, backend);
        svc.set_state(ServiceState::Halted);
        return;
    }
    if svc.pid() == 0 {
        if svc.kind() == ServiceKind::Inetd {
            // Armed inetd socket; the socket layer dispatches connections.
            return;
        }
        svc.bump_restart_counter();
        svc.set_state(ServiceState::Ready);
        return;
    }

    match svc.cond.aggregate(conds) {
        CondState::On => {
            deliver_resume(svc, backend);
            svc.set_state(ServiceState::Running);
        }
        CondState::Off => {
            deliver_resume(svc, backend);
            deliver_stop(svc, backend);
            svc.set_state(ServiceState::Ready);
        }
        CondState::Flux => {}
    }
}

/// Sweep every record matching `kinds`, in registry order.
pub fn step_all<B: Backend>(
    registry: &mut Registry,
    kinds: KindMask,
    runlevel: Runlevel,
    conds: &dyn CondSource,
    backend: &mut B,
) {
    for svc in registry.iter_mut() {
        if kinds.contains(svc.kind()) {
            step(svc, runlevel, conds, backend);
        }
    }
}

fn deliver_stop<B: Backend>(svc: &mut ServiceRecord, backend: &mut B) {
    match backend.stop(svc) {
        Ok(()) => {}
        Err(SignalError::BadPid(pid)) => {
            // Treated as if the child had already been reaped.
            debug!(svc = %svc.ident(), pid, "bad pid for SIGTERM, clearing");
            svc.clear_pid();
        }
        Err(err) => warn!(svc = %svc.ident(), %err, "failed stopping"),
    }
}

fn deliver_pause<B: Backend>(svc: &mut ServiceRecord, backend: &mut B) {
    match backend.pause(svc) {
        Ok(()) => {}
        Err(SignalError::BadPid(pid)) => {
            debug!(svc = %svc.ident(), pid, "bad pid for SIGSTOP, clearing");
            svc.clear_pid();
        }
        Err(err) => warn!(svc = %svc.ident(), %err, "failed pausing"),
    }
}

fn deliver_resume<B: Backend>(svc: &mut ServiceRecord, backend: &mut B) {
    match backend.resume(svc) {
        Ok(()) => {}
        Err(SignalError::BadPid(pid)) => {
            debug!(svc = %svc.ident(), pid, "bad pid for SIGCONT, clearing");
            svc.clear_pid();
        }
        Err(err) => warn!(svc = %svc.ident(), %err, "failed resuming"),
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
