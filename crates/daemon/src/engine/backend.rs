// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fork/exec/signal/reap plumbing behind the [`Backend`] seam.
//!
//! The SIGCHLD-vs-fork race of the original is serialised by the event
//! loop: the pid is recorded on the record before the signal stream is
//! polled again, so `monitor` always finds the reaped child.

use crate::conds::CondStore;
use crate::env;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{Pid, User};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tend_core::{Backend, ServiceKind, ServiceRecord, ServiceState, SignalError, StartError};
use tracing::{debug, info, warn};

/// PATH handed to children running as non-root users.
const DEFAULT_PATH: &str = "/usr/bin:/bin";

#[derive(Debug)]
pub struct UnixBackend {
    conds: CondStore,
    /// Operator-toggled respawn stand-down; the norespawn files are checked
    /// as well.
    pub norespawn: bool,
}

impl UnixBackend {
    pub fn new(conds: CondStore) -> Self {
        UnixBackend { conds, norespawn: false }
    }

    fn respawn_suspended(&self) -> bool {
        self.norespawn || env::norespawn_file_present()
    }

    /// Drain every ready child: `waitpid(-1, WNOHANG)` until nothing is
    /// left. Returns `(pid, exit_status)` pairs for `monitor`.
    pub fn reap() -> Vec<(i32, Option<i32>)> {
        let mut reaped = Vec::new();
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => reaped.push((pid.as_raw(), Some(code))),
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    reaped.push((pid.as_raw(), Some(128 + signal as i32)));
                }
                Ok(WaitStatus::StillAlive) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        reaped
    }

    fn send(pid: i32, signal: Signal) -> Result<(), SignalError> {
        kill(Pid::from_raw(pid), signal)
            .map_err(|errno| SignalError::Kill(io::Error::from_raw_os_error(errno as i32)))
    }
}

impl Backend for UnixBackend {
    #[allow(unsafe_code)] // pre_exec runs between fork and exec
    fn start(&mut self, svc: &mut ServiceRecord) -> Result<(), StartError> {
        if self.respawn_suspended() {
            return Err(StartError::Suspended);
        }
        if svc.kind() == ServiceKind::Inetd {
            // Connection dispatch belongs to the socket layer; without it
            // armed inetd entries never reach this path.
            return Err(StartError::Rejected("no inetd socket layer attached".to_string()));
        }
        if !Path::new(svc.cmd()).exists() {
            return Err(StartError::Missing(svc.cmd().to_string()));
        }

        let mut cmd = Command::new(svc.cmd());
        cmd.args(&svc.args).stdin(Stdio::null());
        // The child resets every handler and clears the signal mask before
        // exec, so services never inherit the supervisor's signal setup.
        unsafe {
            cmd.pre_exec(reset_child_signals);
        }
        if !svc.username.is_empty() {
            let user = User::from_name(&svc.username)
                .ok()
                .flatten()
                .ok_or_else(|| StartError::Rejected(format!("unknown user {}", svc.username)))?;
            cmd.uid(user.uid.as_raw()).gid(user.gid.as_raw());
            if !user.uid.is_root() {
                cmd.env("PATH", DEFAULT_PATH);
            }
        }

        let child = cmd.spawn().map_err(StartError::Spawn)?;
        let pid = child.id() as i32;
        // Reaping happens through the SIGCHLD path, not the Child handle.
        drop(child);
        svc.set_pid(pid);
        info!(svc = %svc.ident(), pid, "started");

        if svc.kind() == ServiceKind::Run {
            // Run commands complete before the sweep continues.
            match waitpid(Pid::from_raw(pid), None) {
                Ok(WaitStatus::Exited(_, code)) => svc.exit_status = Some(code),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    svc.exit_status = Some(128 + signal as i32);
                }
                Ok(status) => debug!(svc = %svc.ident(), ?status, "unexpected wait status"),
                Err(errno) => warn!(svc = %svc.ident(), %errno, "wait failed"),
            }
            svc.clear_pid();
        }
        Ok(())
    }

    fn stop(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        if svc.kind() != ServiceKind::Service {
            return Ok(());
        }
        debug!(svc = %svc.ident(), pid = svc.pid(), "sending SIGTERM");
        Self::send(svc.pid(), Signal::SIGTERM)
    }

    fn reload(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if !svc.sighup {
            return Err(SignalError::NoSighup);
        }
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        debug!(svc = %svc.ident(), pid = svc.pid(), "sending SIGHUP");
        Self::send(svc.pid(), Signal::SIGHUP)
    }

    fn pause(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        Self::send(svc.pid(), Signal::SIGSTOP)
    }

    fn resume(&mut self, svc: &mut ServiceRecord) -> Result<(), SignalError> {
        if svc.pid() <= 1 {
            return Err(SignalError::BadPid(svc.pid()));
        }
        Self::send(svc.pid(), Signal::SIGCONT)
    }

    fn on_transition(&mut self, svc: &ServiceRecord, from: ServiceState, to: ServiceState) {
        info!(svc = %svc.ident(), %from, %to, "transition");
        match (from, to) {
            (_, ServiceState::Running) => self.conds.publish_running(svc),
            (ServiceState::Running, _) => self.conds.retract(svc),
            _ => {}
        }
    }
}

/// Child-side setup between fork and exec: default dispositions, empty mask.
#[allow(unsafe_code)]
fn reset_child_signals() -> io::Result<()> {
    use nix::sys::signal::{sigprocmask, SigHandler, SigSet, SigmaskHow};

    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
    for signal in Signal::iterator() {
        if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
            continue;
        }
        // Best effort; unknown/unsettable signals are skipped.
        let _ = unsafe { nix::sys::signal::signal(signal, SigHandler::SigDfl) };
    }
    Ok(())
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
