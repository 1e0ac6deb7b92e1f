// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed condition store.
//!
//! Layout under `<runtime>/tend/cond/`:
//!
//! - `svc/<name>` — published by the supervisor as each service reaches
//!   `Running` (content: pid); removed on stop.
//! - `reconf` — sentinel; present while a reconfiguration is in progress.
//! - other subtrees (`net/`, `hook/`) — written by external producers, only
//!   read here.
//!
//! A leaf with non-empty content is `on`, an empty leaf is `flux`, an absent
//! leaf is `off`. Writes go through a temp file and `rename(2)` so readers
//! never observe partial content.

use std::io;
use std::path::{Path, PathBuf};
use tend_core::{CondSource, CondState, ServiceRecord};
use thiserror::Error;
use tracing::{debug, warn};

const RECONF: &str = "reconf";

#[derive(Debug, Error)]
pub enum CondError {
    #[error("invalid condition name {0:?}")]
    InvalidName(String),

    #[error("condition io on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct CondStore {
    root: PathBuf,
}

impl CondStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CondStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory skeleton.
    pub fn init(&self) -> Result<(), CondError> {
        for dir in [self.root.clone(), self.root.join("svc")] {
            std::fs::create_dir_all(&dir).map_err(|e| CondError::Io(dir.clone(), e))?;
        }
        Ok(())
    }

    fn path(&self, name: &str) -> Result<PathBuf, CondError> {
        let valid = !name.is_empty()
            && !name.starts_with('/')
            && !name.ends_with('/')
            && name.split('/').all(|seg| {
                !seg.is_empty()
                    && seg != ".."
                    && seg != "."
                    && seg.chars().all(|c| {
                        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
                    })
            });
        if !valid {
            return Err(CondError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    pub fn get(&self, name: &str) -> CondState {
        let Ok(path) = self.path(name) else {
            return CondState::Off;
        };
        match std::fs::read(&path) {
            Ok(content) if content.is_empty() => CondState::Flux,
            Ok(_) => CondState::On,
            Err(_) => CondState::Off,
        }
    }

    pub fn set(&self, name: &str) -> Result<(), CondError> {
        self.set_content(name, "1")
    }

    /// Atomic publish: temp file in the target directory, then rename.
    pub fn set_content(&self, name: &str, content: &str) -> Result<(), CondError> {
        let path = self.path(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CondError::Io(parent.to_path_buf(), e))?;
        }
        let tmp = path.with_file_name(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("cond")
        ));
        std::fs::write(&tmp, content).map_err(|e| CondError::Io(tmp.clone(), e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CondError::Io(path.clone(), e))?;
        debug!(cond = name, "condition asserted");
        Ok(())
    }

    pub fn clear(&self, name: &str) -> Result<(), CondError> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(cond = name, "condition cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CondError::Io(path, e)),
        }
    }

    /// Mark every currently-`on` condition as in flux and raise the reconf
    /// sentinel. Producers re-assert their conditions as they settle.
    pub fn reload(&self) -> Result<(), CondError> {
        flux_tree(&self.root);
        let sentinel = self.root.join(RECONF);
        std::fs::write(&sentinel, b"").map_err(|e| CondError::Io(sentinel.clone(), e))
    }

    /// Drop the reconf sentinel once phase two has completed.
    pub fn finish_reconf(&self) {
        let sentinel = self.root.join(RECONF);
        if let Err(e) = std::fs::remove_file(&sentinel) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %sentinel.display(), %e, "failed clearing reconf sentinel");
            }
        }
    }

    pub fn in_reconf(&self) -> bool {
        self.root.join(RECONF).exists()
    }

    /// Published as the service enters `Running`; content is the pid.
    pub fn publish_running(&self, svc: &ServiceRecord) {
        let name = format!("svc/{}", svc.ident());
        if let Err(e) = self.set_content(&name, &svc.pid().to_string()) {
            warn!(cond = name, %e, "failed publishing service condition");
        }
    }

    /// Retracted as the service leaves `Running`.
    pub fn retract(&self, svc: &ServiceRecord) {
        let name = format!("svc/{}", svc.ident());
        if let Err(e) = self.clear(&name) {
            warn!(cond = name, %e, "failed retracting service condition");
        }
    }
}

impl CondSource for CondStore {
    fn state(&self, name: &str) -> CondState {
        self.get(name)
    }
}

/// Truncate every non-empty leaf under `dir` to empty (`flux`).
fn flux_tree(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => flux_tree(&path),
            Ok(ft) if ft.is_file() => {
                let non_empty = std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
                if non_empty {
                    if let Err(e) = std::fs::write(&path, b"") {
                        warn!(path = %path.display(), %e, "failed marking condition in flux");
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "conds_tests.rs"]
mod tests;
