// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S4: runlevel 3→2 teardown is two-phase; the finisher waits for the reap
//! and runs exactly once.

use super::support::World;
use tend_core::{Runlevel, ServiceState};
use tend_daemon::engine::ShutdownKind;

#[test]
fn runlevel_three_to_two_teardown() {
    let mut world = World::new();
    world.write_builtin("service [23] /sbin/a -n -- A\nservice [3] /sbin/b -n -- B\n");
    world.sup.load_config().unwrap();

    world.sup.runlevel(3).unwrap();
    assert_eq!(world.state("/sbin/a"), ServiceState::Running);
    assert_eq!(world.state("/sbin/b"), ServiceState::Running);
    assert_eq!(world.counters.runlevel_changes.get(), 1);
    let b_pid = world.pid("/sbin/b");

    world.sup.runlevel(2).unwrap();
    assert_eq!(world.state("/sbin/b"), ServiceState::Stopping);
    assert_eq!(world.state("/sbin/a"), ServiceState::Running, "A is untouched");
    assert_eq!(
        world.counters.runlevel_changes.get(),
        1,
        "phase two waits for the reap"
    );

    world.reap(b_pid);
    assert_eq!(world.state("/sbin/b"), ServiceState::Halted);
    assert_eq!(world.state("/sbin/a"), ServiceState::Running);
    assert_eq!(world.counters.runlevel_changes.get(), 2, "hooks fire exactly once");
    assert_eq!(world.stopping_count(), 0);
}

#[test]
fn runlevel_zero_tears_everything_down_then_powers_off() {
    let mut world = World::new();
    world.write_builtin("service [2345] /sbin/syslogd -n -- syslog\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    let pid = world.pid("/sbin/syslogd");

    world.sup.runlevel(0).unwrap();
    assert_eq!(world.state("/sbin/syslogd"), ServiceState::Stopping);
    assert!(world.counters.shutdowns.borrow().is_empty(), "poweroff waits for the reaps");

    world.reap(pid);
    assert_eq!(*world.counters.shutdowns.borrow(), vec![ShutdownKind::Poweroff]);
}

#[test]
fn every_record_lands_where_the_new_level_demands() {
    let mut world = World::new();
    world.write_builtin(
        "service [2] /sbin/two -n\nservice [3] /sbin/three -n\nservice [23] /sbin/both -n\n",
    );
    world.sup.load_config().unwrap();

    world.sup.runlevel(3).unwrap();
    world.reap_stopping();
    assert_eq!(world.state("/sbin/two"), ServiceState::Halted);
    assert_eq!(world.state("/sbin/three"), ServiceState::Running);
    assert_eq!(world.state("/sbin/both"), ServiceState::Running);

    world.sup.runlevel(2).unwrap();
    world.reap_stopping();
    assert_eq!(world.state("/sbin/two"), ServiceState::Running);
    assert_eq!(world.state("/sbin/three"), ServiceState::Halted);
    assert_eq!(world.state("/sbin/both"), ServiceState::Running);
    assert_eq!(world.sup.current_runlevel(), Runlevel::Level(2));
    assert_eq!(world.sup.prev_runlevel(), Some(Runlevel::Level(3)));
}
