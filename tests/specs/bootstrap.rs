// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S1: bootstrap runs the one-shots and brings daemons up in the target
//! runlevel.

use super::support::World;
use tend_core::ServiceState;

#[test]
fn bootstrap_then_runlevel_two() {
    let mut world = World::new();
    world.write_builtin(
        "run [S] /bin/mount -a -- mount fs\nservice [2345] /sbin/syslogd -n -- syslog\n",
    );
    world.sup.load_config().unwrap();

    world.sup.bootstrap();
    assert_eq!(world.state("/bin/mount"), ServiceState::Done);
    assert_eq!(world.find("/bin/mount").exit_status, Some(0));
    assert_eq!(world.state("/sbin/syslogd"), ServiceState::Halted, "not yet in its runlevel");

    world.sup.runlevel(2).unwrap();
    assert_eq!(world.state("/bin/mount"), ServiceState::Done);
    assert_eq!(world.state("/sbin/syslogd"), ServiceState::Running);
    assert!(world.pid("/sbin/syslogd") > 1);
    assert_eq!(world.stopping_count(), 0);
}

#[test]
fn builtin_records_survive_reloads() {
    let mut world = World::new();
    world.write_builtin("service [2345] /sbin/syslogd -n -- syslog\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();

    world.sup.reload_dynamic().unwrap();
    world.reap_stopping();

    assert_eq!(world.state("/sbin/syslogd"), ServiceState::Running, "mtime 0 is never dynamic");
}
