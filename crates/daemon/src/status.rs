// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status snapshots for external observers.
//!
//! The original parked the service table in a shared-memory segment so
//! helper tools could peek at it. Here the supervisor stays the sole owner
//! and publishes a JSON snapshot to `<runtime>/tend/status.json` after every
//! mutation, atomically via temp file + `rename(2)`. The `generation`
//! counter is the version observers use to detect progress.

use crate::engine::Supervisor;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tend_core::{Backend, ServiceRecord};

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generation: u64,
    pub runlevel: String,
    pub prev_runlevel: Option<String>,
    pub phase: String,
    pub services: Vec<ServiceRecord>,
}

impl StatusSnapshot {
    pub fn capture<B: Backend>(sup: &Supervisor<B>) -> Self {
        StatusSnapshot {
            generation: sup.generation(),
            runlevel: sup.current_runlevel().to_string(),
            prev_runlevel: sup.prev_runlevel().map(|l| l.to_string()),
            phase: sup.phase().to_string(),
            services: sup.registry().iter().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(io::Error::other)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
