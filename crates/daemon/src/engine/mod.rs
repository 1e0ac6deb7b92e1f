// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervision engine: process plumbing and the transition coordinator.

pub mod backend;
mod coordinator;

pub use coordinator::{
    Hooks, LogHooks, Phase, RunlevelError, ShutdownKind, Supervisor, SupervisorConfig,
};
