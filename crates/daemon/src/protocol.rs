// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol: one request line, one response line over the unix
//! socket. Kept deliberately textual so `echo runlevel 1 | nc -U` works in
//! a pinch.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("invalid argument {0:?}")]
    Invalid(String),
}

const KNOWN: [&str; 7] = ["status", "reload", "runlevel", "cond", "start", "stop", "norespawn"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Runlevel(u8),
    Reload,
    CondSet(String),
    CondClear(String),
    Start { job: u32, id: u32 },
    Stop { job: u32, id: u32 },
    Norespawn(bool),
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let req = match words.as_slice() {
            ["status"] => Request::Status,
            ["reload"] => Request::Reload,
            ["runlevel", level] => {
                let level =
                    level.parse::<u8>().map_err(|_| ProtocolError::Invalid(level.to_string()))?;
                Request::Runlevel(level)
            }
            ["cond", "set", name] => Request::CondSet(name.to_string()),
            ["cond", "clear", name] => Request::CondClear(name.to_string()),
            ["start", job] => {
                let (job, id) = parse_job(job)?;
                Request::Start { job, id }
            }
            ["stop", job] => {
                let (job, id) = parse_job(job)?;
                Request::Stop { job, id }
            }
            ["norespawn", "on"] => Request::Norespawn(true),
            ["norespawn", "off"] => Request::Norespawn(false),
            [] => return Err(ProtocolError::Unknown(String::new())),
            [command, ..] if !KNOWN.contains(command) => {
                return Err(ProtocolError::Unknown(command.to_string()))
            }
            _ => return Err(ProtocolError::Invalid(line.to_string())),
        };
        Ok(req)
    }
}

/// `JOB[:ID]`, id defaulting to 1.
fn parse_job(spec: &str) -> Result<(u32, u32), ProtocolError> {
    let (job, id) = match spec.split_once(':') {
        Some((job, id)) => (job, id),
        None => (spec, "1"),
    };
    let job = job.parse::<u32>().map_err(|_| ProtocolError::Invalid(spec.to_string()))?;
    let id = id
        .parse::<u32>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| ProtocolError::Invalid(spec.to_string()))?;
    Ok((job, id))
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Status => f.write_str("status"),
            Request::Runlevel(level) => write!(f, "runlevel {level}"),
            Request::Reload => f.write_str("reload"),
            Request::CondSet(name) => write!(f, "cond set {name}"),
            Request::CondClear(name) => write!(f, "cond clear {name}"),
            Request::Start { job, id } => write!(f, "start {job}:{id}"),
            Request::Stop { job, id } => write!(f, "stop {job}:{id}"),
            Request::Norespawn(true) => f.write_str("norespawn on"),
            Request::Norespawn(false) => f.write_str("norespawn off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error(String),
    /// Status snapshot as one JSON line.
    Status(String),
}

impl Response {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end();
        match line.strip_prefix("error ") {
            Some(msg) => Response::Error(msg.to_string()),
            None if line == "ok" => Response::Ok,
            None => Response::Status(line.to_string()),
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Ok => f.write_str("ok"),
            Response::Error(msg) => write!(f, "error {msg}"),
            Response::Status(json) => f.write_str(json),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
