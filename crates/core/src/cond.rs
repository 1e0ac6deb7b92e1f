// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tri-state conditions and the aggregation of per-service condition
//! expressions.
//!
//! A condition is a named tri-state published by a producer (a plugin or the
//! supervisor itself). Services consume them through a comma-separated
//! expression such as `net/route/default,!hook/sys/down`; the expression is
//! parsed once at registration and aggregated against a [`CondSource`] on
//! every state-machine pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State of a single named condition.
///
/// Ordering matters to the state machine: `Off < Flux < On`, and a service
/// only starts (or keeps running without SIGHUP support) at `On`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CondState {
    Off,
    Flux,
    On,
}

crate::simple_display! {
    CondState {
        Off => "off",
        Flux => "flux",
        On => "on",
    }
}

/// Provider of condition states, keyed by path-like name.
///
/// The daemon backs this with the runtime condition directory; tests back it
/// with a plain map.
pub trait CondSource {
    fn state(&self, name: &str) -> CondState;
}

/// A single atom of a condition expression: a condition name, optionally
/// negated. A negated atom is satisfied when the condition is `off`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondAtom {
    pub name: String,
    pub negated: bool,
}

impl CondAtom {
    fn eval(&self, src: &dyn CondSource) -> CondState {
        let state = src.state(&self.name);
        if !self.negated {
            return state;
        }
        match state {
            CondState::On => CondState::Off,
            CondState::Off => CondState::On,
            CondState::Flux => CondState::Flux,
        }
    }
}

/// Errors from parsing a condition expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CondParseError {
    #[error("empty condition atom")]
    EmptyAtom,

    #[error("invalid character {1:?} in condition atom {0:?}")]
    InvalidChar(String, char),
}

/// A parsed condition expression: comma-separated AND over atoms.
///
/// Parsed once when the service is registered so that aggregation on every
/// `step` is a walk over prepared atoms rather than a string scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CondExpr {
    atoms: Vec<CondAtom>,
}

impl CondExpr {
    /// The empty expression, which aggregates to `on`.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[CondAtom] {
        &self.atoms
    }

    /// Parse `a,!b,c` into atoms. An empty string is the empty expression.
    pub fn parse(expr: &str) -> Result<Self, CondParseError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(Self::none());
        }

        let mut atoms = Vec::new();
        for part in expr.split(',') {
            let part = part.trim();
            let (negated, name) = match part.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, part),
            };
            if name.is_empty() {
                return Err(CondParseError::EmptyAtom);
            }
            if let Some(bad) = name
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.' | ':')))
            {
                return Err(CondParseError::InvalidChar(name.to_string(), bad));
            }
            atoms.push(CondAtom { name: name.to_string(), negated });
        }
        Ok(Self { atoms })
    }

    /// Aggregate the expression against `src`.
    ///
    /// Empty expression is `on`. Otherwise: `flux` if any atom evaluates to
    /// `flux`, `off` if any evaluates to `off` and none to `flux`, `on` when
    /// every atom is satisfied.
    pub fn aggregate(&self, src: &dyn CondSource) -> CondState {
        let mut agg = CondState::On;
        for atom in &self.atoms {
            match atom.eval(src) {
                CondState::Flux => return CondState::Flux,
                CondState::Off => agg = CondState::Off,
                CondState::On => {}
            }
        }
        agg
    }

    /// Does a change to the condition named `name` affect this expression?
    ///
    /// Matching is prefix-based so a producer of `net/ifup/ppp0` triggers
    /// services subscribed to `net/ifup/ppp`.
    pub fn affects(&self, name: &str) -> bool {
        self.atoms.iter().any(|a| name.starts_with(a.name.as_str()))
    }
}

impl std::fmt::Display for CondExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if atom.negated {
                f.write_str("!")?;
            }
            f.write_str(&atom.name)?;
        }
        Ok(())
    }
}

impl serde::Serialize for CondExpr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for CondExpr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CondExpr::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "cond_tests.rs"]
mod tests;
