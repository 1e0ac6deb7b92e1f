// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity service table.
//!
//! Slot order is registry order: sweeps visit records in the order they were
//! registered. `job` numbers are shared by every instance of the same
//! command; `(cmd, id)` is the unique lookup key.

use crate::service::{Dirty, ServiceKind, ServiceRecord, ServiceState};
use thiserror::Error;

/// Default table size. PID 1 cannot degrade safely, so exhaustion is fatal
/// to registration.
pub const CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("service table full ({0} slots)")]
    Capacity(usize),

    #[error("service {0}:{1} already registered")]
    Duplicate(String, u32),
}

#[derive(Debug)]
pub struct Registry {
    slots: Vec<Option<ServiceRecord>>,
    capacity: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Registry { slots: Vec::new(), capacity }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a record. Every instance of the same command shares a job
    /// number; fresh commands get the next free one.
    pub fn create(
        &mut self,
        cmd: &str,
        id: u32,
        kind: ServiceKind,
    ) -> Result<&mut ServiceRecord, RegistryError> {
        if self.find(cmd, id).is_some() {
            return Err(RegistryError::Duplicate(cmd.to_string(), id));
        }

        let job = self
            .iter()
            .find(|svc| svc.cmd() == cmd)
            .map(|svc| svc.job())
            .unwrap_or_else(|| self.iter().map(|svc| svc.job()).max().unwrap_or(0) + 1);

        let mut record = ServiceRecord::new(cmd, id, kind);
        record.set_job(job);

        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(free) => free,
            None if self.slots.len() < self.capacity => {
                self.slots.push(None);
                self.slots.len() - 1
            }
            None => return Err(RegistryError::Capacity(self.capacity)),
        };
        Ok(self.slots[slot].insert(record))
    }

    pub fn remove(&mut self, cmd: &str, id: u32) -> Option<ServiceRecord> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|svc| svc.cmd() == cmd && svc.id == id))?;
        self.slots[slot].take()
    }

    pub fn find(&mut self, cmd: &str, id: u32) -> Option<&mut ServiceRecord> {
        self.iter_mut().find(|svc| svc.cmd() == cmd && svc.id == id)
    }

    pub fn find_by_pid(&mut self, pid: i32) -> Option<&mut ServiceRecord> {
        if pid <= 1 {
            return None;
        }
        self.iter_mut().find(|svc| svc.pid() == pid)
    }

    pub fn find_by_job_id(&mut self, job: u32, id: u32) -> Option<&mut ServiceRecord> {
        self.iter_mut().find(|svc| svc.job() == job && svc.id == id)
    }

    /// Next free instance id for anonymous instances of `cmd`.
    pub fn next_id(&self, cmd: &str) -> u32 {
        self.iter().filter(|svc| svc.cmd() == cmd).map(|svc| svc.id).max().unwrap_or(0) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ServiceRecord> {
        self.slots.iter_mut().flatten()
    }

    pub fn inetd(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.iter().filter(|svc| svc.kind() == ServiceKind::Inetd)
    }

    pub fn dynamic(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.iter().filter(|svc| svc.is_dynamic())
    }

    pub fn named<'a>(&'a self, cmd: &'a str) -> impl Iterator<Item = &'a ServiceRecord> {
        self.iter().filter(move |svc| svc.cmd() == cmd)
    }

    /// Mark every dynamic record for removal. The reload pass that follows
    /// clears the mark on records still present in the configuration, so
    /// only true leftovers get swept.
    pub fn mark_dynamic(&mut self) {
        for svc in self.iter_mut() {
            if svc.is_dynamic() {
                svc.dirty = Dirty::Removed;
            }
        }
    }

    /// Sweep records still marked for removal once they have reached
    /// `Halted`. Calls `cb` for each record before freeing the slot.
    /// Idempotent: a second sweep finds nothing left to do.
    pub fn clean_dynamic(&mut self, mut cb: impl FnMut(&ServiceRecord)) {
        for slot in &mut self.slots {
            let sweep = slot
                .as_ref()
                .is_some_and(|svc| svc.dirty == Dirty::Removed && svc.state() == ServiceState::Halted);
            if sweep {
                if let Some(svc) = slot.take() {
                    cb(&svc);
                }
            }
        }
    }

    /// Free a bootstrap-only one-shot after its reap. Returns true when the
    /// record was retired.
    pub fn clean_bootstrap(&mut self, pid: i32) -> bool {
        let slot = self.slots.iter().position(|s| {
            s.as_ref().is_some_and(|svc| {
                svc.pid() == pid
                    && svc.runlevels.bootstrap_only()
                    && svc.kind() != ServiceKind::Service
            })
        });
        match slot {
            Some(slot) => {
                self.slots[slot] = None;
                true
            }
            None => false,
        }
    }

    /// Phase-one barrier predicate: have all stopped services been reaped?
    pub fn stop_is_done(&self) -> bool {
        self.iter().all(|svc| svc.state() != ServiceState::Stopping)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
