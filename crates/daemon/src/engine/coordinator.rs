// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transition coordinator.
//!
//! Runlevel changes and dynamic reloads are two-phase: phase one tears down
//! everything that must stop, phase two starts what the new world demands.
//! The barrier between them is the reaping of every record that entered
//! `Stopping` — tracked here with an explicit [`Phase`] instead of the
//! booleans the design notes warn about. `monitor` drives the finisher once
//! the last straggler is collected.

use crate::conds::{CondError, CondStore};
use std::path::PathBuf;
use tend_conf::{loader, ConfError, NoInternals};
use tend_core::{
    fsm, Backend, Block, KindMask, Registry, Runlevel, ServiceKind, ServiceState,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where the coordinator stands in a two-phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Waiting for services stopped by a runlevel change to be reaped.
    RunlevelTeardown,
    /// Waiting for services quiesced by a dynamic reload to be reaped.
    ReloadTeardown,
}

tend_core::simple_display! {
    Phase {
        Idle => "idle",
        RunlevelTeardown => "runlevel-teardown",
        ReloadTeardown => "reload-teardown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Poweroff,
    Reboot,
}

#[derive(Debug, Error)]
pub enum RunlevelError {
    #[error("runlevel {0} out of range")]
    OutOfRange(u8),

    #[error("already in runlevel {0}")]
    SameLevel(u8),

    /// Configuration reload hit a fatal condition (service table full).
    /// The supervisor must terminate.
    #[error(transparent)]
    Fatal(#[from] ConfError),
}

/// External collaborators, all optional: hook points, tty respawn, shutdown
/// signalling. Out-of-scope subsystems live behind this seam.
pub trait Hooks {
    /// Runs between phase one and phase two of a runlevel change.
    fn runlevel_change(&mut self, prev: Runlevel, next: Runlevel) {
        let _ = (prev, next);
    }

    /// Runs between phase one and phase two of a dynamic reload.
    fn svc_reconf(&mut self) {}

    /// A swept dynamic record is about to be freed.
    fn service_removed(&mut self, svc: &tend_core::ServiceRecord) {
        let _ = svc;
    }

    /// Hand the ttys to their collaborator after a runlevel change.
    fn tty_runlevel(&mut self, level: Runlevel) {
        let _ = level;
    }

    /// Collaborators (tty, inetd) may consume a reaped pid; return true to
    /// stop the generic bookkeeping.
    fn reaped(&mut self, pid: i32) -> bool {
        let _ = pid;
        false
    }

    /// Runlevel 0 or 6 was entered; the shutdown collaborator takes over.
    fn shutdown(&mut self, kind: ShutdownKind) {
        let _ = kind;
    }
}

/// The plugin-less default: log and carry on.
#[derive(Debug, Default)]
pub struct LogHooks;

impl Hooks for LogHooks {
    fn runlevel_change(&mut self, prev: Runlevel, next: Runlevel) {
        info!(%prev, %next, "runlevel change hooks");
    }

    fn svc_reconf(&mut self) {
        info!("reconfiguration hooks");
    }

    fn service_removed(&mut self, svc: &tend_core::ServiceRecord) {
        info!(svc = %svc.ident(), "retired");
    }

    fn shutdown(&mut self, kind: ShutdownKind) {
        warn!(?kind, "shutdown requested");
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Reloadable `.conf` directory.
    pub conf_dir: PathBuf,
    /// Built-in configuration, registered with mtime 0. Optional.
    pub builtin_conf: Option<PathBuf>,
    /// Single-user login gate, toggled on runlevel 1.
    pub nologin: PathBuf,
    pub capacity: usize,
}

/// Registry, condition store and backend under one single-threaded owner.
pub struct Supervisor<B: Backend> {
    config: SupervisorConfig,
    registry: Registry,
    conds: CondStore,
    backend: B,
    hooks: Box<dyn Hooks>,
    current: Runlevel,
    prev: Option<Runlevel>,
    phase: Phase,
    /// Bumped on every mutation; observers poll it through the status file.
    generation: u64,
}

impl<B: Backend> Supervisor<B> {
    pub fn new(config: SupervisorConfig, conds: CondStore, backend: B, hooks: Box<dyn Hooks>) -> Self {
        let registry = Registry::with_capacity(config.capacity);
        Supervisor {
            config,
            registry,
            conds,
            backend,
            hooks,
            current: Runlevel::S,
            prev: None,
            phase: Phase::Idle,
            generation: 0,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn conds(&self) -> &CondStore {
        &self.conds
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn current_runlevel(&self) -> Runlevel {
        self.current
    }

    pub fn prev_runlevel(&self) -> Option<Runlevel> {
        self.prev
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Load the built-in configuration plus the `.conf` directory. Returns
    /// how many declarations were applied.
    pub fn load_config(&mut self) -> Result<usize, ConfError> {
        let mut applied = 0;
        if let Some(builtin) = self.config.builtin_conf.clone() {
            if builtin.exists() {
                applied += loader::apply_builtin(&mut self.registry, &builtin, &NoInternals)?;
            }
        }
        applied += loader::apply_dir(&mut self.registry, &self.config.conf_dir, &NoInternals)?;
        self.generation += 1;
        Ok(applied)
    }

    /// System startup: one sweep over everything eligible at runlevel `S`.
    pub fn bootstrap(&mut self) {
        debug!("bootstrapping runlevel S");
        self.step_all(KindMask::RUN | KindMask::TASK | KindMask::SERVICE);
    }

    /// Sweep all records matching `kinds` at the current runlevel.
    pub fn step_all(&mut self, kinds: KindMask) {
        let level = self.current;
        let Supervisor { registry, conds, backend, .. } = self;
        fsm::step_all(registry, kinds, level, &*conds, backend);
        self.generation += 1;
    }

    /// Change to a new runlevel: phase one stops what the new level forbids,
    /// phase two (once every `Stopping` record is reaped) starts the rest.
    /// A new call supersedes any transition in flight.
    pub fn runlevel(&mut self, new: u8) -> Result<(), RunlevelError> {
        if new > 9 {
            return Err(RunlevelError::OutOfRange(new));
        }
        if self.current == Runlevel::Level(new) {
            return Err(RunlevelError::SameLevel(new));
        }

        self.prev = Some(self.current);
        self.current = Runlevel::Level(new);
        info!(prev = %self.prev.map(|p| p.to_string()).unwrap_or_default(), next = new, "runlevel change");

        self.reload_conf()?;
        self.phase = Phase::RunlevelTeardown;
        self.step_all(KindMask::ANY);

        if self.registry.stop_is_done() {
            self.runlevel_finish();
        }
        Ok(())
    }

    fn runlevel_finish(&mut self) {
        debug!("all stopped services collected, running runlevel hooks");
        let prev = self.prev.unwrap_or(Runlevel::S);
        self.hooks.runlevel_change(prev, self.current);

        self.phase = Phase::Idle;
        self.step_all(KindMask::ANY);

        let Supervisor { registry, hooks, .. } = self;
        registry.clean_dynamic(|svc| hooks.service_removed(svc));

        match self.current {
            Runlevel::Level(0) => {
                self.hooks.shutdown(ShutdownKind::Poweroff);
                return;
            }
            Runlevel::Level(6) => {
                self.hooks.shutdown(ShutdownKind::Reboot);
                return;
            }
            _ => {}
        }

        self.toggle_nologin();

        // No ttys run at bootstrap; they get a delayed start.
        if prev.numbered().is_some_and(|n| n > 0) {
            self.hooks.tty_runlevel(self.current);
        }
    }

    /// Dynamic reload (`SIGHUP`, `tend reload`): re-read the configuration,
    /// mark conditions in flux and quiesce affected services; phase two runs
    /// once the stragglers are reaped. An `Err` is fatal for the supervisor.
    pub fn reload_dynamic(&mut self) -> Result<(), ConfError> {
        info!("reloading dynamic configuration");
        self.reload_conf()?;

        // A runlevel teardown in flight keeps its phase; its finisher
        // re-sweeps everything anyway.
        if self.phase == Phase::Idle {
            self.phase = Phase::ReloadTeardown;
        }
        if let Err(err) = self.conds.reload() {
            warn!(%err, "condition reload failed");
        }
        self.step_all(KindMask::SERVICE);

        if self.phase == Phase::ReloadTeardown && self.registry.stop_is_done() {
            self.reload_dynamic_finish();
        }
        Ok(())
    }

    fn reload_dynamic_finish(&mut self) {
        debug!("all quiesced services collected, running reconf hooks");
        self.phase = Phase::Idle;
        self.hooks.svc_reconf();
        self.step_all(KindMask::SERVICE);

        let Supervisor { registry, hooks, .. } = self;
        registry.clean_dynamic(|svc| hooks.service_removed(svc));

        // Surviving services re-assert their conditions.
        for svc in self.registry.iter() {
            if svc.state() == ServiceState::Running {
                self.conds.publish_running(svc);
            }
        }
        self.conds.finish_reconf();
    }

    /// Bookkeeping for one reaped child. Collaborators get first refusal;
    /// bootstrap one-shots are retired; everything else is stepped and the
    /// pending phase finisher gets its chance.
    pub fn monitor(&mut self, pid: i32, exit_status: Option<i32>) {
        if pid <= 1 {
            return;
        }
        if self.hooks.reaped(pid) {
            return;
        }
        if self.prev.is_none() && self.registry.clean_bootstrap(pid) {
            self.generation += 1;
            return;
        }

        let level = self.current;
        {
            let Supervisor { registry, conds, backend, .. } = self;
            match registry.find_by_pid(pid) {
                Some(svc) => {
                    debug!(svc = %svc.ident(), pid, "collected");
                    svc.exit_status = exit_status;
                    svc.clear_pid();
                    fsm::step(svc, level, &*conds, backend);
                }
                None => {
                    warn!(pid, "collected unknown pid");
                    return;
                }
            }
        }
        self.generation += 1;

        self.teardown_finish();
    }

    /// Phase-two gate: run the pending finisher exactly once, only after
    /// every record that entered `Stopping` has been reaped.
    fn teardown_finish(&mut self) {
        if self.phase == Phase::Idle || !self.registry.stop_is_done() {
            return;
        }
        match self.phase {
            Phase::RunlevelTeardown => self.runlevel_finish(),
            Phase::ReloadTeardown => self.reload_dynamic_finish(),
            Phase::Idle => {}
        }
    }

    /// Assert a condition and step the services it affects.
    pub fn cond_set(&mut self, name: &str) -> Result<(), CondError> {
        self.conds.set(name)?;
        self.step_affected(name);
        Ok(())
    }

    /// Clear a condition and step the services it affects.
    pub fn cond_clear(&mut self, name: &str) -> Result<(), CondError> {
        self.conds.clear(name)?;
        self.step_affected(name);
        Ok(())
    }

    fn step_affected(&mut self, name: &str) {
        let level = self.current;
        let Supervisor { registry, conds, backend, .. } = self;
        for svc in registry.iter_mut() {
            if svc.kind() == ServiceKind::Service && svc.cond.affects(name) {
                fsm::step(svc, level, &*conds, backend);
            }
        }
        self.generation += 1;
    }

    /// Operator stop: block the record and let the sweep take it down.
    pub fn stop_service(&mut self, job: u32, id: u32) -> bool {
        self.apply_block(job, id, Block::User)
    }

    /// Operator start: clear any block (including `Crashing` quarantine).
    pub fn start_service(&mut self, job: u32, id: u32) -> bool {
        self.apply_block(job, id, Block::None)
    }

    fn apply_block(&mut self, job: u32, id: u32, block: Block) -> bool {
        let level = self.current;
        let found = {
            let Supervisor { registry, conds, backend, .. } = self;
            match registry.find_by_job_id(job, id) {
                Some(svc) => {
                    svc.block = block;
                    fsm::step(svc, level, &*conds, backend);
                    true
                }
                None => false,
            }
        };
        if found {
            self.generation += 1;
        }
        found
    }

    /// Re-read the `.conf` directory, sweeping records whose files are
    /// gone. Table exhaustion is fatal and must reach the caller; lesser
    /// failures only cost the affected declarations.
    fn reload_conf(&mut self) -> Result<(), ConfError> {
        self.registry.mark_dynamic();
        match loader::apply_dir(&mut self.registry, &self.config.conf_dir, &NoInternals) {
            Ok(applied) => debug!(applied, "configuration reloaded"),
            Err(err @ ConfError::Fatal(_)) => return Err(err),
            Err(err) => warn!(%err, "configuration reload failed"),
        }
        self.generation += 1;
        Ok(())
    }

    fn toggle_nologin(&mut self) {
        if self.current == Runlevel::Level(1) {
            // Single-user: no logins.
            if let Err(e) = std::fs::write(&self.config.nologin, b"") {
                warn!(path = %self.config.nologin.display(), %e, "failed creating nologin");
            }
        } else if let Err(e) = std::fs::remove_file(&self.config.nologin) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.config.nologin.display(), %e, "failed removing nologin");
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
