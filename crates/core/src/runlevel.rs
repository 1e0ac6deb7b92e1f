// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runlevels and per-service runlevel masks.
//!
//! Numeric levels 0-9 follow SysV convention (`0` poweroff, `1` single-user,
//! `6` reboot) with the addition of `S`, the bootstrap level run once at
//! startup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A runlevel: the bootstrap level `S` or a numeric level 0-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runlevel {
    S,
    Level(u8),
}

impl Runlevel {
    pub fn is_bootstrap(self) -> bool {
        matches!(self, Runlevel::S)
    }

    /// Numeric value, `None` for `S`.
    pub fn numbered(self) -> Option<u8> {
        match self {
            Runlevel::S => None,
            Runlevel::Level(n) => Some(n),
        }
    }
}

impl std::fmt::Display for Runlevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Runlevel::S => f.write_str("S"),
            Runlevel::Level(n) => write!(f, "{n}"),
        }
    }
}

/// Errors from parsing a `[runlevels]` bracket expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunlevelParseError {
    #[error("empty runlevel specification")]
    Empty,

    #[error("invalid character {0:?} in runlevel specification")]
    InvalidChar(char),

    #[error("invalid runlevel range {0}-{1}")]
    BadRange(u8, u8),
}

const BIT_S: u16 = 1 << 10;
const ALL: u16 = BIT_S | 0x03ff;

/// Set of runlevels a service is allowed in, e.g. `[2345]` or `[S]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runlevels(u16);

impl Default for Runlevels {
    /// Services default to the multi-user levels, `[2345]`.
    fn default() -> Self {
        let mut levels = Runlevels::none();
        for n in 2..=5 {
            levels.insert(Runlevel::Level(n));
        }
        levels
    }
}

impl Runlevels {
    pub fn none() -> Self {
        Runlevels(0)
    }

    pub fn insert(&mut self, level: Runlevel) {
        match level {
            Runlevel::S => self.0 |= BIT_S,
            Runlevel::Level(n) if n <= 9 => self.0 |= 1 << n,
            Runlevel::Level(_) => {}
        }
    }

    pub fn remove(&mut self, level: Runlevel) {
        match level {
            Runlevel::S => self.0 &= !BIT_S,
            Runlevel::Level(n) if n <= 9 => self.0 &= !(1 << n),
            Runlevel::Level(_) => {}
        }
    }

    pub fn contains(&self, level: Runlevel) -> bool {
        match level {
            Runlevel::S => self.0 & BIT_S != 0,
            Runlevel::Level(n) => n <= 9 && self.0 & (1 << n) != 0,
        }
    }

    /// True when the mask names only `S` — bootstrap one-shots that can be
    /// retired once they have run.
    pub fn bootstrap_only(&self) -> bool {
        self.0 == BIT_S
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parse a bracket expression: digits and `S`, ranges like `2-5`, commas
    /// ignored, leading `!` selects every level except those listed.
    pub fn parse(spec: &str) -> Result<Self, RunlevelParseError> {
        let spec = spec.strip_prefix('[').unwrap_or(spec);
        let spec = spec.strip_suffix(']').unwrap_or(spec);
        if spec.is_empty() {
            return Err(RunlevelParseError::Empty);
        }

        let (negate, spec) = match spec.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        if spec.is_empty() {
            return Err(RunlevelParseError::Empty);
        }

        let mut listed = Runlevels::none();
        let mut chars = spec.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ',' => {}
                'S' | 's' => listed.insert(Runlevel::S),
                '0'..='9' => {
                    let lo = c as u8 - b'0';
                    if chars.peek() == Some(&'-') {
                        chars.next();
                        let hi = match chars.next() {
                            Some(d @ '0'..='9') => d as u8 - b'0',
                            Some(other) => return Err(RunlevelParseError::InvalidChar(other)),
                            None => return Err(RunlevelParseError::InvalidChar('-')),
                        };
                        if hi < lo {
                            return Err(RunlevelParseError::BadRange(lo, hi));
                        }
                        for n in lo..=hi {
                            listed.insert(Runlevel::Level(n));
                        }
                    } else {
                        listed.insert(Runlevel::Level(lo));
                    }
                }
                other => return Err(RunlevelParseError::InvalidChar(other)),
            }
        }

        if negate {
            Ok(Runlevels(ALL & !listed.0))
        } else {
            Ok(listed)
        }
    }

    fn iter(&self) -> impl Iterator<Item = Runlevel> + '_ {
        std::iter::once(Runlevel::S)
            .chain((0..=9).map(Runlevel::Level))
            .filter(|l| self.contains(*l))
    }
}

impl std::fmt::Display for Runlevels {
    /// Canonical bracket form: `S` first, then digits ascending.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for level in self.iter() {
            write!(f, "{level}")?;
        }
        f.write_str("]")
    }
}

impl serde::Serialize for Runlevels {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Runlevels {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Runlevels::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "runlevel_tests.rs"]
mod tests;
