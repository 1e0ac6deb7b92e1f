// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declaration lines.
//!
//! One line registers one entry:
//!
//! ```text
//! service @user[:group] [2345] <net/route/default> :2 /sbin/udhcpc -i eth2 -- DHCP eth2
//! task [S] /sbin/mdev -s -- populate /dev
//! run [S] /bin/mount -a -- mount filesystems
//! inetd ssh/tcp@eth0,!eth1 nowait [2345] /sbin/sshd -i -- SSH daemon
//! ```
//!
//! Tokens starting with `@`, `[`, `<`, `:` are modifiers; `wait`/`nowait`
//! apply to inetd; the first `/`-containing token that is not an absolute
//! path is an inetd `service/proto@ifaces` triple; the first remaining token
//! is the command. Everything after `-- ` is the description.

use serde::{Deserialize, Serialize};
use tend_core::{CondExpr, InetdSpec, Runlevels, ServiceKind};
use thiserror::Error;

/// Hard cap on command arguments, matching the registration table layout.
pub const MAX_ARGS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("incomplete declaration: {0}")]
    Incomplete(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("too many arguments ({0}, max {MAX_ARGS})")]
    TooManyArgs(usize),
}

/// A parsed declaration line, ready to be applied to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: ServiceKind,
    pub user: Option<String>,
    pub group: Option<String>,
    pub runlevels: Runlevels,
    /// Conditions gate `Service` kind only; stored verbatim for the others.
    pub cond: CondExpr,
    pub sighup: bool,
    pub id: u32,
    pub inetd: Option<InetdSpec>,
    pub cmd: String,
    pub args: Vec<String>,
    pub desc: Option<String>,
}

/// Map a declaration keyword to its service kind.
pub fn kind_from_keyword(word: &str) -> Option<ServiceKind> {
    match word.to_ascii_lowercase().as_str() {
        "service" => Some(ServiceKind::Service),
        "task" => Some(ServiceKind::Task),
        "run" => Some(ServiceKind::Run),
        "inetd" => Some(ServiceKind::Inetd),
        _ => None,
    }
}

impl Declaration {
    /// Parse a complete line, keyword included.
    pub fn parse_line(line: &str) -> Result<Self, DeclarationError> {
        let line = line.trim();
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .ok_or(DeclarationError::Incomplete("missing command"))?;
        let kind = kind_from_keyword(keyword)
            .ok_or_else(|| DeclarationError::InvalidArgument(format!("keyword {keyword:?}")))?;
        Self::parse(kind, rest)
    }

    /// Parse the remainder of a declaration after its keyword.
    pub fn parse(kind: ServiceKind, line: &str) -> Result<Self, DeclarationError> {
        let (head, desc) = match line.split_once("-- ") {
            Some((head, desc)) => (head, Some(desc.trim().to_string())),
            None => (line, None),
        };

        let mut user = None;
        let mut group = None;
        let mut runlevels = Runlevels::default();
        let mut cond = CondExpr::none();
        let mut sighup = false;
        let mut id = 1u32;
        let mut wait = true;
        let mut inetd_token: Option<&str> = None;

        let mut tokens = head.split_whitespace();
        let cmd = loop {
            let Some(token) = tokens.next() else {
                return Err(DeclarationError::Incomplete("missing command"));
            };
            if let Some(spec) = token.strip_prefix('@') {
                match spec.split_once(':') {
                    Some((u, g)) => {
                        user = Some(u.to_string());
                        group = Some(g.to_string());
                    }
                    None => user = Some(spec.to_string()),
                }
            } else if token.starts_with('[') {
                runlevels = Runlevels::parse(token)
                    .map_err(|e| DeclarationError::InvalidArgument(e.to_string()))?;
            } else if let Some(inner) = token.strip_prefix('<') {
                let inner = inner
                    .strip_suffix('>')
                    .ok_or_else(|| DeclarationError::InvalidArgument(format!("condition {token:?}")))?;
                let (hup, expr) = match inner.strip_prefix('!') {
                    // <!...> declares the service incapable of SIGHUP reload
                    Some(rest) => (false, rest),
                    None => (true, inner),
                };
                sighup = hup;
                cond = CondExpr::parse(expr)
                    .map_err(|e| DeclarationError::InvalidArgument(e.to_string()))?;
            } else if let Some(num) = token.strip_prefix(':') {
                id = num
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| DeclarationError::InvalidArgument(format!("instance id {num:?}")))?;
            } else if token.eq_ignore_ascii_case("nowait") {
                wait = false;
            } else if token.eq_ignore_ascii_case("wait") {
                wait = true;
            } else if !token.starts_with('/') && token.contains('/') {
                inetd_token = Some(token);
            } else {
                break token;
            }
        };

        let args: Vec<String> = tokens.map(str::to_string).collect();
        if args.len() > MAX_ARGS {
            return Err(DeclarationError::TooManyArgs(args.len()));
        }

        let inetd = match (kind, inetd_token) {
            (ServiceKind::Inetd, Some(token)) => Some(parse_inetd(token, wait)?),
            (ServiceKind::Inetd, None) => {
                return Err(DeclarationError::Incomplete("inetd needs service/proto"))
            }
            (_, Some(token)) => {
                return Err(DeclarationError::InvalidArgument(format!(
                    "service/proto {token:?} only valid for inetd"
                )))
            }
            (_, None) => None,
        };

        Ok(Declaration {
            kind,
            user,
            group,
            runlevels,
            cond,
            sighup,
            id,
            inetd,
            cmd: cmd.to_string(),
            args,
            desc,
        })
    }
}

fn parse_inetd(token: &str, wait: bool) -> Result<InetdSpec, DeclarationError> {
    let (svc_proto, ifaces) = match token.split_once('@') {
        Some((sp, ifaces)) => (sp, Some(ifaces)),
        None => (token, None),
    };
    let (service, proto) = svc_proto
        .split_once('/')
        .filter(|(s, p)| !s.is_empty() && !p.is_empty())
        .ok_or(DeclarationError::Incomplete("inetd needs service/proto"))?;

    let mut allow = Vec::new();
    let mut deny = Vec::new();
    if let Some(ifaces) = ifaces {
        for iface in ifaces.split(',') {
            if iface.is_empty() {
                return Err(DeclarationError::InvalidArgument(format!("interfaces {ifaces:?}")));
            }
            match iface.strip_prefix('!') {
                Some(denied) => deny.push(denied.to_string()),
                None => allow.push(iface.to_string()),
            }
        }
    }

    Ok(InetdSpec { service: service.to_string(), proto: proto.to_string(), wait, allow, deny })
}

impl std::fmt::Display for Declaration {
    /// Canonical declaration line; `parse_line` of the output yields an
    /// equal declaration (modulo whitespace and defaulted modifiers).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(user) = &self.user {
            match &self.group {
                Some(group) => write!(f, " @{user}:{group}")?,
                None => write!(f, " @{user}")?,
            }
        }
        write!(f, " {}", self.runlevels)?;
        if !self.cond.is_empty() || self.sighup {
            let bang = if self.sighup { "" } else { "!" };
            write!(f, " <{bang}{}>", self.cond)?;
        }
        if self.id != 1 {
            write!(f, " :{}", self.id)?;
        }
        if let Some(inetd) = &self.inetd {
            if !inetd.wait {
                write!(f, " nowait")?;
            }
            write!(f, " {}/{}", inetd.service, inetd.proto)?;
            if !inetd.allow.is_empty() || !inetd.deny.is_empty() {
                let ifaces: Vec<String> = inetd
                    .allow
                    .iter()
                    .cloned()
                    .chain(inetd.deny.iter().map(|d| format!("!{d}")))
                    .collect();
                write!(f, "@{}", ifaces.join(","))?;
            }
        }
        write!(f, " {}", self.cmd)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(desc) = &self.desc {
            write!(f, " -- {desc}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "declaration_tests.rs"]
mod tests;
