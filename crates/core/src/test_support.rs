// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::cond::{CondSource, CondState};
use crate::fsm::{Backend, SignalError, StartError};
use crate::service::{ServiceKind, ServiceRecord, ServiceState};
use std::collections::{HashMap, HashSet};

/// Map-backed condition source.
#[derive(Debug, Default)]
pub struct MapConds(HashMap<String, CondState>);

impl MapConds {
    pub fn insert(&mut self, name: &str, state: CondState) {
        self.0.insert(name.to_string(), state);
    }

    pub fn set(&mut self, name: &str) {
        self.insert(name, CondState::On);
    }

    pub fn flux(&mut self, name: &str) {
        self.insert(name, CondState::Flux);
    }

    pub fn clear(&mut self, name: &str) {
        self.0.remove(name);
    }
}

impl CondSource for MapConds {
    fn state(&self, name: &str) -> CondState {
        self.0.get(name).copied().unwrap_or(CondState::Off)
    }
}

/// Signals a [`FakeBackend`] records instead of delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSignal {
    Term,
    Hup,
    Stop,
    Cont,
}

/// In-memory supervision backend: hands out fake pids, records every signal
/// and transition, and fails on demand.
#[derive(Debug)]
pub struct FakeBackend {
    pub(crate) next_pid: i32,
    /// Commands reported as missing on disk.
    pub missing: HashSet<String>,
    /// Force every spawn to fail while set.
    pub fail_start: bool,
    /// Respawn suspension (norespawn).
    pub suspended: bool,
    /// A connection is waiting on the inetd socket layer. Mirrors the real
    /// backend, which rejects inetd starts without one.
    pub inetd_pending: bool,
    /// Exit code handed to synchronous `Run` waits.
    pub run_exit: i32,
    /// `(cmd, id, pid)` per successful start.
    pub started: Vec<(String, u32, i32)>,
    pub signals: Vec<(i32, FakeSignal)>,
    pub transitions: Vec<(String, ServiceState, ServiceState)>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        FakeBackend {
            next_pid: 100,
            missing: HashSet::new(),
            fail_start: false,
            suspended: false,
            inetd_pending: false,
            run_exit: 0,
            started: Vec::new(),
            signals: Vec::new(),
            transitions: Vec::new(),
        }
    }
}

impl FakeBackend {
    pub fn last_pid(&self) -> i32 {
        self.next_pid - 1
    }

    pub fn sent(&self, pid: i32, signal: FakeSignal) -> bool {
        self.signals.contains(&(pid, signal))
    }

    pub fn start_count(&self, cmd: &str) -> usize {
        self.started.iter().filter(|(c, _, _)| c == cmd).count()
    }
}

impl Backend for FakeBackend {
    fn start(&mut self, svc: &mut ServiceRecord) -> Result<(), StartError> {
        if self.suspended {
            return Err(StartError::Suspended);
        }
        if svc.kind() == ServiceKind::Inetd && !self.inetd_pending {
            return Err(StartError::Rejected("no connection pending".to_string()));
        }
        if self.missing.contains(svc.cmd()) {
            return Err(StartError::Missing(svc.cmd().to_string()));
        }
        if self.fail_start {
            return Err(StartError::Spawn(std::io::Error::other("forced spawn failure")));
        }
        if svc.kind() == ServiceKind::Run {
            svc.exit_status = Some(self.run_exit);
            svc.clear_pid();
            self.started.push((svc.cmd().to_string(), svc.id, 0));
            return Ok(());
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        svc.set_pid(pid);
        self.started.push((svc.cmd().to_string(), svc.id, pid));
        Ok(())
    }

    fn stop(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        if svc.kind() != ServiceKind::Service {
            return Ok(());
        }
        self.signals.push((svc.pid(), FakeSignal::Term));
        Ok(())
    }

    fn reload(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if !svc.sighup {
            return Err(SignalError::NoSighup);
        }
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        self.signals.push((svc.pid(), FakeSignal::Hup));
        Ok(())
    }

    fn pause(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        self.signals.push((svc.pid(), FakeSignal::Stop));
        Ok(())
    }

    fn resume(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        self.signals.push((svc.pid(), FakeSignal::Cont));
        Ok(())
    }

    fn on_transition(&mut self, svc: &ServiceRecord, from: ServiceState, to: ServiceState) {
        self.transitions.push((svc.ident(), from, to));
    }
}
