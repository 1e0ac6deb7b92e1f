// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S5/S6: dynamic reload — SIGHUP-capable services reload in place, the
//! rest go through stop/start, added services come up, removed services are
//! stopped and swept.

use super::support::World;
use tend_core::test_support::FakeSignal;
use tend_core::ServiceState;

#[test]
fn sighup_capable_service_reloads_in_place() {
    let mut world = World::new();
    world.write_conf("a.conf", "service [2345] <> /sbin/a -n -- A\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    let pid = world.pid("/sbin/a");

    world.touch_forward("a.conf", 5);
    world.sup.reload_dynamic().unwrap();

    assert_eq!(world.state("/sbin/a"), ServiceState::Running, "stays up across the reload");
    assert_eq!(world.pid("/sbin/a"), pid);
    assert!(world.sup.backend().sent(pid, FakeSignal::Hup));
    assert!(!world.find("/sbin/a").is_changed(), "dirty clears after the SIGHUP");
    assert_eq!(world.counters.reconfs.get(), 1);
}

#[test]
fn non_sighup_service_restarts_across_ready() {
    let mut world = World::new();
    world.write_conf("b.conf", "service [2345] /sbin/b -n -- B\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    let pid = world.pid("/sbin/b");

    world.touch_forward("b.conf", 5);
    world.sup.reload_dynamic().unwrap();

    assert_eq!(world.state("/sbin/b"), ServiceState::Ready);
    assert!(world.sup.backend().sent(pid, FakeSignal::Term));

    world.reap(pid);
    assert_eq!(world.state("/sbin/b"), ServiceState::Running);
    assert_ne!(world.pid("/sbin/b"), pid, "fresh process after stop/start");
    assert_eq!(world.sup.backend().start_count("/sbin/b"), 2);
}

#[test]
fn dynamic_add_and_remove() {
    let mut world = World::new();
    world.write_conf("d.conf", "service [2345] /sbin/oldd -n -- D\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    let d_pid = world.pid("/sbin/oldd");

    std::fs::remove_file(world.conf_path("d.conf")).unwrap();
    world.write_conf("c.conf", "service [2345] /sbin/newc -n -- C\n");
    world.sup.reload_dynamic().unwrap();

    assert_eq!(world.state("/sbin/newc"), ServiceState::Running, "added service comes up");
    assert_eq!(world.state("/sbin/oldd"), ServiceState::Stopping);
    assert!(world.sup.backend().sent(d_pid, FakeSignal::Term));
    assert_eq!(world.counters.reconfs.get(), 0, "phase two waits for D's reap");

    world.reap(d_pid);
    assert_eq!(world.counters.reconfs.get(), 1);
    assert_eq!(*world.counters.removed.borrow(), vec!["/sbin/oldd".to_string()]);
    assert!(world.sup.registry().iter().all(|svc| svc.cmd() != "/sbin/oldd"), "swept");
    assert_eq!(world.state("/sbin/newc"), ServiceState::Running);
}

#[test]
fn one_shots_rearm_when_their_conf_changes() {
    let mut world = World::new();
    world.write_conf("t.conf", "task [2345] /bin/tidy -- tidy\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    let pid = world.pid("/bin/tidy");
    world.reap(pid);
    assert_eq!(world.state("/bin/tidy"), ServiceState::Done);

    world.touch_forward("t.conf", 5);
    world.sup.reload_dynamic().unwrap();
    // Reload sweeps services; the task re-arms on the next full sweep.
    world.sup.step_all(tend_core::KindMask::ANY);
    assert_eq!(world.state("/bin/tidy"), ServiceState::Stopping, "running again");
    assert_eq!(world.sup.backend().start_count("/bin/tidy"), 2);
}
