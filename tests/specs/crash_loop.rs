// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S2: a service that keeps dying is quarantined after ten failed respawns.

use super::support::World;
use tend_core::{Block, ServiceState, RESPAWN_MAX};

#[test]
fn crash_loop_quarantine() {
    let mut world = World::new();
    world.write_builtin("service [2345] /bin/false -- flaky\n");
    world.sup.load_config().unwrap();
    world.sup.runlevel(2).unwrap();

    for _ in 0..RESPAWN_MAX {
        assert_eq!(world.state("/bin/false"), ServiceState::Running);
        let pid = world.pid("/bin/false");
        world.reap(pid);
    }

    let svc = world.find("/bin/false");
    assert_eq!(svc.state(), ServiceState::Halted);
    assert_eq!(svc.block, Block::Crashing);
    assert_eq!(
        world.sup.backend().start_count("/bin/false"),
        RESPAWN_MAX as usize,
        "no eleventh fork"
    );

    // Quarantine holds across further sweeps until the operator intervenes.
    world.sup.reload_dynamic().unwrap();
    world.reap_stopping();
    assert_eq!(world.state("/bin/false"), ServiceState::Halted);

    let job = world.find("/bin/false").job();
    assert!(world.sup.start_service(job, 1));
    assert_eq!(world.state("/bin/false"), ServiceState::Running);
}
