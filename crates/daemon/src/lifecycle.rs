// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and teardown: runtime directories, pidfile lock, control
//! socket.

use crate::env::Paths;
use fs2::FileExt;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed creating runtime dir {0}: {1}")]
    RuntimeDir(PathBuf, #[source] io::Error),

    #[error("failed acquiring pidfile lock: supervisor already running?")]
    LockFailed(#[source] io::Error),

    #[error("failed binding control socket {0}: {1}")]
    Bind(PathBuf, #[source] io::Error),

    #[error(transparent)]
    Cond(#[from] crate::conds::CondError),
}

pub struct Startup {
    // NOTE(lifetime): held for the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
}

/// Create the runtime tree, take the pidfile lock, bind the control socket.
pub fn startup(paths: &Paths) -> Result<Startup, StartupError> {
    std::fs::create_dir_all(&paths.runtime_dir)
        .map_err(|e| StartupError::RuntimeDir(paths.runtime_dir.clone(), e))?;

    // Open without truncating so a failed lock leaves the running
    // supervisor's pid intact.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.pidfile)
        .map_err(StartupError::LockFailed)?;
    lock_file.try_lock_exclusive().map_err(StartupError::LockFailed)?;
    lock_file.set_len(0).map_err(StartupError::LockFailed)?;
    writeln!(lock_file, "{}", std::process::id()).map_err(StartupError::LockFailed)?;

    // A stale socket from a dead supervisor would fail the bind; the lock
    // above already proved nobody owns it.
    if paths.socket_path.exists() {
        let _ = std::fs::remove_file(&paths.socket_path);
    }
    let listener = UnixListener::bind(&paths.socket_path)
        .map_err(|e| StartupError::Bind(paths.socket_path.clone(), e))?;

    Ok(Startup { lock_file, listener })
}

/// Remove the runtime artifacts we own. The lock itself releases on drop.
pub fn cleanup(paths: &Paths) {
    for path in [&paths.socket_path, &paths.pidfile] {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), %e, "cleanup failed");
            }
        }
    }
}
