// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tend-core: service records, registry, conditions and the supervision
//! state machine. Pure logic — all process and filesystem I/O lives behind
//! the [`fsm::Backend`] and [`cond::CondSource`] seams in `tend-daemon`.

pub mod macros;

pub mod cond;
pub mod fsm;
pub mod registry;
pub mod runlevel;
pub mod service;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cond::{CondAtom, CondExpr, CondParseError, CondSource, CondState};
pub use fsm::{step, step_all, Backend, SignalError, StartError, RESPAWN_MAX};
pub use registry::{Registry, RegistryError};
pub use runlevel::{Runlevel, RunlevelParseError, Runlevels};
pub use service::{
    Block, Dirty, InetdSpec, KindMask, ServiceCallback, ServiceKind, ServiceRecord, ServiceState,
};
