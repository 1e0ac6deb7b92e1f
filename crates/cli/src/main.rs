// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tend` — control client for the supervisor.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tend_daemon::env;
use tend_daemon::protocol::{Request, Response};
use tend_daemon::status::StatusSnapshot;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Debug, Parser)]
#[command(name = "tend", about = "control the service supervisor", version)]
struct Cli {
    /// Runtime state directory of the supervisor.
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the service table.
    Status,
    /// Change runlevel (0-9).
    Runlevel { level: u8 },
    /// Reload the configuration directory.
    Reload,
    /// Assert or clear a condition.
    Cond {
        #[command(subcommand)]
        action: CondAction,
    },
    /// Start (unblock) a service by JOB[:ID].
    Start { job: String },
    /// Stop (block) a service by JOB[:ID].
    Stop { job: String },
    /// Suspend or resume respawning.
    Norespawn {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
}

#[derive(Debug, Subcommand)]
enum CondAction {
    Set { name: String },
    Clear { name: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("tend: failed building runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tend: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let runtime_dir = cli.runtime_dir.unwrap_or_else(env::runtime_dir);
    let paths = env::Paths::under(&runtime_dir);

    let request = match &cli.command {
        Command::Status => Request::Status,
        Command::Runlevel { level } => Request::Runlevel(*level),
        Command::Reload => Request::Reload,
        Command::Cond { action } => match action {
            CondAction::Set { name } => Request::CondSet(name.clone()),
            CondAction::Clear { name } => Request::CondClear(name.clone()),
        },
        Command::Start { job } => {
            let (job, id) = parse_job(job)?;
            Request::Start { job, id }
        }
        Command::Stop { job } => {
            let (job, id) = parse_job(job)?;
            Request::Stop { job, id }
        }
        Command::Norespawn { state } => Request::Norespawn(state == "on"),
    };

    let stream = UnixStream::connect(&paths.socket_path).await.map_err(|e| {
        format!("cannot reach the supervisor at {}: {e}", paths.socket_path.display())
    })?;
    let mut stream = BufReader::new(stream);
    let mut line = request.to_string();
    line.push('\n');
    stream.get_mut().write_all(line.as_bytes()).await?;

    let mut reply = String::new();
    stream.read_line(&mut reply).await?;

    match Response::parse(&reply) {
        Response::Ok => Ok(ExitCode::SUCCESS),
        Response::Error(msg) => {
            eprintln!("tend: {msg}");
            Ok(ExitCode::FAILURE)
        }
        Response::Status(json) => {
            let snapshot: StatusSnapshot = serde_json::from_str(&json)?;
            render_status(&snapshot);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_job(spec: &str) -> Result<(u32, u32), String> {
    let (job, id) = match spec.split_once(':') {
        Some((job, id)) => (job, id),
        None => (spec, "1"),
    };
    let job = job.parse::<u32>().map_err(|_| format!("bad job spec {spec:?}"))?;
    let id = id.parse::<u32>().map_err(|_| format!("bad job spec {spec:?}"))?;
    Ok((job, id))
}

fn render_status(snapshot: &StatusSnapshot) {
    println!(
        "runlevel {} (prev {}), phase {}, generation {}",
        snapshot.runlevel,
        snapshot.prev_runlevel.as_deref().unwrap_or("-"),
        snapshot.phase,
        snapshot.generation
    );
    println!("{:<8} {:<9} {:<7} {:<8} {:<24} {}", "JOB:ID", "STATE", "PID", "LEVELS", "COMMAND", "DESCRIPTION");
    for svc in &snapshot.services {
        println!(
            "{:<8} {:<9} {:<7} {:<8} {:<24} {}",
            format!("{}:{}", svc.job(), svc.id),
            svc.state().to_string(),
            svc.pid(),
            svc.runlevels.to_string(),
            svc.cmd(),
            svc.desc
        );
    }
}
