// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S3: condition flux pauses a running service with SIGSTOP and resumes it
//! with SIGCONT once the producer settles.

use super::support::World;
use tend_core::test_support::FakeSignal;
use tend_core::ServiceState;

#[test]
fn condition_pause_and_resume() {
    let mut world = World::new();
    world.write_builtin("service [2345] <net/route/default> /sbin/ntpd -n -- NTP\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    assert_eq!(world.state("/sbin/ntpd"), ServiceState::Ready, "gated until the route exists");

    world.sup.cond_set("net/route/default").unwrap();
    assert_eq!(world.state("/sbin/ntpd"), ServiceState::Running);
    let pid = world.pid("/sbin/ntpd");

    // A reload marks every condition as in flux; within the same sweep the
    // service is paused.
    world.sup.reload_dynamic().unwrap();
    assert_eq!(world.state("/sbin/ntpd"), ServiceState::Waiting);
    assert!(world.sup.backend().sent(pid, FakeSignal::Stop));

    // The producer re-asserts; the service continues without a restart.
    world.sup.cond_set("net/route/default").unwrap();
    assert_eq!(world.state("/sbin/ntpd"), ServiceState::Running);
    assert!(world.sup.backend().sent(pid, FakeSignal::Cont));
    assert_eq!(world.pid("/sbin/ntpd"), pid, "same process throughout");
    assert_eq!(world.sup.backend().start_count("/sbin/ntpd"), 1);
}

#[test]
fn condition_off_stops_and_restarts_when_satisfied_again() {
    let mut world = World::new();
    world.write_builtin("service [2345] <net/up> /sbin/ntpd -n\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();
    world.sup.cond_set("net/up").unwrap();
    let pid = world.pid("/sbin/ntpd");

    world.sup.cond_clear("net/up").unwrap();
    assert_eq!(world.state("/sbin/ntpd"), ServiceState::Ready);
    assert!(world.sup.backend().sent(pid, FakeSignal::Term));

    world.reap(pid);
    world.sup.cond_set("net/up").unwrap();
    assert_eq!(world.state("/sbin/ntpd"), ServiceState::Running);
    assert_ne!(world.pid("/sbin/ntpd"), pid);
}

#[test]
fn running_services_publish_their_condition() {
    let mut world = World::new();
    world.write_builtin("service [2345] /sbin/syslogd -n\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();

    // The reload-finish pass re-asserts svc/ conditions for survivors.
    world.sup.reload_dynamic().unwrap();
    world.reap_stopping();
    assert_eq!(world.sup.conds().get("svc/syslogd"), tend_core::CondState::On);
    assert!(!world.sup.conds().in_reconf());
}
