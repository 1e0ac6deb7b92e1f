// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scaffolding for the scenario specs: a supervisor over the fake
//! backend, a real condition store, and a writable `.conf` directory.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use tend_core::test_support::FakeBackend;
use tend_core::{Runlevel, ServiceRecord, ServiceState};
use tend_daemon::conds::CondStore;
use tend_daemon::engine::{Hooks, ShutdownKind, Supervisor, SupervisorConfig};

#[derive(Default, Clone)]
pub struct Counters {
    pub runlevel_changes: Rc<Cell<usize>>,
    pub reconfs: Rc<Cell<usize>>,
    pub removed: Rc<RefCell<Vec<String>>>,
    pub shutdowns: Rc<RefCell<Vec<ShutdownKind>>>,
}

pub struct CountingHooks(pub Counters);

impl Hooks for CountingHooks {
    fn runlevel_change(&mut self, _prev: Runlevel, _next: Runlevel) {
        self.0.runlevel_changes.set(self.0.runlevel_changes.get() + 1);
    }

    fn svc_reconf(&mut self) {
        self.0.reconfs.set(self.0.reconfs.get() + 1);
    }

    fn service_removed(&mut self, svc: &ServiceRecord) {
        self.0.removed.borrow_mut().push(svc.cmd().to_string());
    }

    fn shutdown(&mut self, kind: ShutdownKind) {
        self.0.shutdowns.borrow_mut().push(kind);
    }
}

pub struct World {
    pub dir: tempfile::TempDir,
    pub sup: Supervisor<FakeBackend>,
    pub counters: Counters,
}

impl World {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let conf_dir = dir.path().join("tend.d");
        std::fs::create_dir_all(&conf_dir).expect("conf dir");
        let conds = CondStore::new(dir.path().join("cond"));
        conds.init().expect("cond store");

        let counters = Counters::default();
        let sup = Supervisor::new(
            SupervisorConfig {
                conf_dir,
                builtin_conf: Some(dir.path().join("tend.conf")),
                nologin: dir.path().join("nologin"),
                capacity: 32,
            },
            conds,
            FakeBackend::default(),
            Box::new(CountingHooks(counters.clone())),
        );
        World { dir, sup, counters }
    }

    pub fn conf_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("tend.d").join(name)
    }

    /// Write a `.conf` file and (re)load the configuration.
    pub fn write_conf(&self, name: &str, contents: &str) {
        std::fs::write(self.conf_path(name), contents).expect("write conf");
    }

    pub fn write_builtin(&self, contents: &str) {
        std::fs::write(self.dir.path().join("tend.conf"), contents).expect("write builtin");
    }

    /// Push a conf file's mtime into the future so a reload sees it as
    /// modified even within the same wall-clock second.
    pub fn touch_forward(&self, name: &str, secs: u64) {
        let file = std::fs::File::options()
            .write(true)
            .open(self.conf_path(name))
            .expect("open conf");
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(secs);
        file.set_times(std::fs::FileTimes::new().set_modified(later)).expect("set mtime");
    }

    pub fn find(&self, cmd: &str) -> &ServiceRecord {
        self.sup
            .registry()
            .iter()
            .find(|svc| svc.cmd() == cmd)
            .unwrap_or_else(|| panic!("no record for {cmd}"))
    }

    pub fn state(&self, cmd: &str) -> ServiceState {
        self.find(cmd).state()
    }

    pub fn pid(&self, cmd: &str) -> i32 {
        self.find(cmd).pid()
    }

    /// Simulate the kernel reaping `pid` with exit code 0.
    pub fn reap(&mut self, pid: i32) {
        self.sup.monitor(pid, Some(0));
    }

    /// Reap whatever is currently in `Stopping`, like the SIGCHLD drain
    /// would after a teardown sweep.
    pub fn reap_stopping(&mut self) {
        let pids: Vec<i32> = self
            .sup
            .registry()
            .iter()
            .filter(|svc| svc.state() == ServiceState::Stopping && svc.pid() > 1)
            .map(|svc| svc.pid())
            .collect();
        for pid in pids {
            self.reap(pid);
        }
    }

    pub fn stopping_count(&self) -> usize {
        self.sup
            .registry()
            .iter()
            .filter(|svc| svc.state() == ServiceState::Stopping)
            .count()
    }
}
