// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading `.conf` files and applying declarations to the registry.
//!
//! The built-in configuration registers with mtime 0 and is never dynamic;
//! everything under the configuration directory carries its file mtime so
//! reloads can tell updated records from unchanged ones.

use crate::declaration::{Declaration, DeclarationError};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tend_core::{Registry, RegistryError, ServiceKind};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("failed reading {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    #[error("{file}:{line}: {err}")]
    Parse {
        file: PathBuf,
        line: usize,
        #[source]
        err: DeclarationError,
    },

    /// The service table is full. PID 1 cannot degrade safely, so this one
    /// is not skippable.
    #[error("fatal registration failure: {0}")]
    Fatal(#[source] RegistryError),
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("unknown internal inetd service {0}")]
    UnknownPlugin(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Lookup seam for `internal.<name>` inetd commands provided by plugins.
pub trait InternalServices {
    fn provides(&self, name: &str) -> bool;
}

/// The plugin-less default: no internal services exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInternals;

impl InternalServices for NoInternals {
    fn provides(&self, _name: &str) -> bool {
        false
    }
}

/// Apply one declaration to the registry.
///
/// Find-or-create by `(cmd, id)`; `check_dirty` runs before the field
/// refresh so reload survivors drop the removal mark `mark_dynamic` left.
/// Inetd declarations matching an existing `(cmd, service, proto)` record
/// only extend its interface lists.
pub fn register(
    registry: &mut Registry,
    decl: &Declaration,
    mtime: u64,
    internals: &dyn InternalServices,
) -> Result<(), RegisterError> {
    let mut id = decl.id;
    if decl.kind == ServiceKind::Inetd {
        if let Some(name) = internal_name(decl) {
            if !internals.provides(name) {
                return Err(RegisterError::UnknownPlugin(name.to_string()));
            }
        }
        if let Some(spec) = &decl.inetd {
            if let Some(svc) = registry
                .iter_mut()
                .find(|svc| {
                    svc.cmd() == decl.cmd
                        && svc.inetd.as_ref().is_some_and(|i| i.matches(&spec.service, &spec.proto))
                })
            {
                // Known inetd entry: this line only adds interface filters.
                if let Some(existing) = svc.inetd.as_mut() {
                    existing.allow.extend(spec.allow.iter().cloned());
                    existing.deny.extend(spec.deny.iter().cloned());
                }
                debug!(cmd = %decl.cmd, service = %spec.service, "extended inetd filters");
                return Ok(());
            }
        }
        id = registry.next_id(&decl.cmd);
    }

    if registry.find(&decl.cmd, id).is_none() {
        debug!(cmd = %decl.cmd, id, kind = %decl.kind, "creating service record");
        registry.create(&decl.cmd, id, decl.kind)?;
    }
    let Some(svc) = registry.find(&decl.cmd, id) else {
        return Ok(());
    };

    svc.check_dirty(mtime);

    svc.desc = decl.desc.clone().unwrap_or_default();
    svc.username = decl.user.clone().unwrap_or_default();
    svc.group = decl.group.clone().unwrap_or_default();
    svc.args = decl.args.clone();
    svc.runlevels = decl.runlevels;
    if decl.kind == ServiceKind::Service {
        svc.cond = decl.cond.clone();
        svc.sighup = decl.sighup;
    }
    if decl.kind == ServiceKind::Inetd {
        svc.inetd = decl.inetd.clone();
    }

    Ok(())
}

fn internal_name(decl: &Declaration) -> Option<&str> {
    if !decl.cmd.to_ascii_lowercase().starts_with("internal") {
        return None;
    }
    match decl.cmd.split_once('.') {
        Some((_, name)) => Some(name),
        None => decl.inetd.as_ref().map(|i| i.service.as_str()),
    }
}

/// Parse one `.conf` file. Returns the declarations and the file mtime in
/// seconds. Blank lines and `#` comments are skipped.
pub fn load_file(path: &Path) -> Result<(Vec<Declaration>, u64), ConfError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| ConfError::Io(path.to_path_buf(), e))?;
    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut decls = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let decl = Declaration::parse_line(line).map_err(|err| ConfError::Parse {
            file: path.to_path_buf(),
            line: lineno + 1,
            err,
        })?;
        decls.push(decl);
    }
    Ok((decls, mtime))
}

/// Load every `*.conf` under `dir`, sorted by name for a stable registry
/// order. A missing directory is simply empty.
pub fn load_dir(dir: &Path) -> Result<Vec<(Declaration, u64)>, ConfError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no configuration directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(ConfError::Io(dir.to_path_buf(), e)),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
        .collect();
    files.sort();

    let mut out = Vec::new();
    for file in files {
        let (decls, mtime) = load_file(&file)?;
        out.extend(decls.into_iter().map(|d| (d, mtime)));
    }
    Ok(out)
}

/// Register every declaration from `dir`, logging and skipping the ones
/// that fail. Table exhaustion is the exception: it aborts the pass with
/// `ConfError::Fatal` and the caller must treat it as terminal. Returns how
/// many were applied.
pub fn apply_dir(
    registry: &mut Registry,
    dir: &Path,
    internals: &dyn InternalServices,
) -> Result<usize, ConfError> {
    let mut applied = 0;
    for (decl, mtime) in load_dir(dir)? {
        match register(registry, &decl, mtime, internals) {
            Ok(()) => applied += 1,
            Err(RegisterError::Registry(err @ RegistryError::Capacity(_))) => {
                return Err(ConfError::Fatal(err))
            }
            Err(err) => warn!(cmd = %decl.cmd, %err, "skipping declaration"),
        }
    }
    Ok(applied)
}

/// Register the built-in configuration file with mtime 0, so its records
/// are never treated as dynamic.
pub fn apply_builtin(
    registry: &mut Registry,
    path: &Path,
    internals: &dyn InternalServices,
) -> Result<usize, ConfError> {
    let (decls, _) = load_file(path)?;
    let mut applied = 0;
    for decl in decls {
        match register(registry, &decl, 0, internals) {
            Ok(()) => applied += 1,
            Err(RegisterError::Registry(err @ RegistryError::Capacity(_))) => {
                return Err(ConfError::Fatal(err))
            }
            Err(err) => warn!(cmd = %decl.cmd, %err, "skipping declaration"),
        }
    }
    Ok(applied)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
