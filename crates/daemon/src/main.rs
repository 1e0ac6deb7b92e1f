// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tendd` — the supervisor binary.
//!
//! Single-threaded cooperative: one current-thread runtime, one `select!`
//! loop. Children die concurrently; everything else happens in here.

use clap::Parser;
use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tend_daemon::engine::backend::UnixBackend;
use tend_daemon::engine::{
    Hooks, LogHooks, Phase, RunlevelError, ShutdownKind, Supervisor, SupervisorConfig,
};
use tend_daemon::status::StatusSnapshot;
use tend_daemon::{conds::CondStore, env, lifecycle, listener, protocol::Request, protocol::Response};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tendd", about = "service supervisor", version)]
struct Args {
    /// Built-in configuration file (never reloaded).
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Reloadable configuration directory.
    #[arg(long)]
    conf_dir: Option<PathBuf>,

    /// Runtime state directory.
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Runlevel to enter after bootstrap.
    #[arg(long, default_value_t = 2)]
    runlevel: u8,

    /// Service table capacity.
    #[arg(long, default_value_t = tend_core::registry::CAPACITY)]
    capacity: usize,

    /// Log to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Collaborator hooks plus the loop's exit latch.
struct MainHooks {
    inner: LogHooks,
    requested: Rc<Cell<Option<ShutdownKind>>>,
}

impl Hooks for MainHooks {
    fn runlevel_change(&mut self, prev: tend_core::Runlevel, next: tend_core::Runlevel) {
        self.inner.runlevel_change(prev, next);
    }

    fn svc_reconf(&mut self) {
        self.inner.svc_reconf();
    }

    fn service_removed(&mut self, svc: &tend_core::ServiceRecord) {
        self.inner.service_removed(svc);
    }

    fn shutdown(&mut self, kind: ShutdownKind) {
        self.inner.shutdown(kind);
        self.requested.set(Some(kind));
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("tendd: failed building runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tendd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let runtime_dir = args.runtime_dir.unwrap_or_else(env::runtime_dir);
    let paths = env::Paths::under(&runtime_dir);

    std::fs::create_dir_all(&paths.runtime_dir)?;
    let _log_guard = init_logging(args.log_file.as_ref());

    let startup = lifecycle::startup(&paths)?;
    let conds = CondStore::new(&paths.cond_dir);
    conds.init()?;

    let requested = Rc::new(Cell::new(None));
    let hooks = MainHooks { inner: LogHooks, requested: requested.clone() };
    let config = SupervisorConfig {
        conf_dir: args.conf_dir.unwrap_or_else(env::conf_dir),
        builtin_conf: Some(args.conf.unwrap_or_else(env::builtin_conf)),
        nologin: paths.nologin.clone(),
        capacity: args.capacity,
    };
    let backend = UnixBackend::new(conds.clone());
    let mut sup = Supervisor::new(config, conds, backend, Box::new(hooks));

    match sup.load_config() {
        Ok(applied) => info!(applied, "configuration loaded"),
        Err(e @ tend_conf::ConfError::Fatal(_)) => {
            lifecycle::cleanup(&paths);
            return Err(e.into());
        }
        Err(e) => warn!(%e, "configuration incomplete"),
    }

    sup.bootstrap();
    match sup.runlevel(args.runlevel) {
        Ok(()) => {}
        Err(e @ RunlevelError::Fatal(_)) => {
            lifecycle::cleanup(&paths);
            return Err(e.into());
        }
        Err(e) => warn!(%e, "initial runlevel change failed"),
    }
    publish_status(&sup, &paths);

    let (tx, mut rx) = listener::channel();
    tokio::spawn(listener::serve(startup.listener, tx));

    let mut sigchld = signal(SignalKind::child())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(runlevel = %sup.current_runlevel(), "supervisor up");
    let mut last_generation = sup.generation();
    loop {
        // PID 1 cannot degrade safely: a fatal configuration failure
        // (service table full) terminates the supervisor.
        let mut fatal: Option<Box<dyn std::error::Error>> = None;
        tokio::select! {
            _ = sigchld.recv() => {
                for (pid, status) in UnixBackend::reap() {
                    sup.monitor(pid, status);
                }
            }
            _ = sighup.recv() => {
                if let Err(e) = sup.reload_dynamic() {
                    fatal = Some(e.into());
                }
            }
            _ = sigusr1.recv() => {
                match sup.runlevel(6) {
                    Ok(()) => {}
                    Err(e @ RunlevelError::Fatal(_)) => fatal = Some(e.into()),
                    Err(e) => warn!(%e, "reboot request failed"),
                }
            }
            _ = sigusr2.recv() => {
                match sup.runlevel(0) {
                    Ok(()) => {}
                    Err(e @ RunlevelError::Fatal(_)) => fatal = Some(e.into()),
                    Err(e) => warn!(%e, "poweroff request failed"),
                }
            }
            _ = sigterm.recv() => break,
            _ = sigint.recv() => break,
            Some((request, resp_tx)) = rx.recv() => {
                let (response, fatal_err) = apply(&mut sup, request);
                let _ = resp_tx.send(response);
                if let Some(e) = fatal_err {
                    fatal = Some(Box::new(e));
                }
            }
        }

        if let Some(e) = fatal {
            error!(%e, "fatal configuration failure, terminating");
            lifecycle::cleanup(&paths);
            return Err(e);
        }

        if sup.generation() != last_generation {
            last_generation = sup.generation();
            publish_status(&sup, &paths);
        }
        if requested.get().is_some() && sup.phase() == Phase::Idle {
            info!(kind = ?requested.get(), "leaving the loop for shutdown");
            break;
        }
    }

    lifecycle::cleanup(&paths);
    Ok(())
}

/// Apply one control request. The second slot carries a fatal
/// configuration failure the loop must terminate on, after replying.
fn apply(
    sup: &mut Supervisor<UnixBackend>,
    request: Request,
) -> (Response, Option<tend_conf::ConfError>) {
    match request {
        Request::Status => match StatusSnapshot::capture(sup).to_json() {
            Ok(json) => (Response::Status(json), None),
            Err(e) => (Response::Error(e.to_string()), None),
        },
        Request::Runlevel(level) => match sup.runlevel(level) {
            Ok(()) => (Response::Ok, None),
            Err(RunlevelError::Fatal(e)) => (Response::Error(e.to_string()), Some(e)),
            Err(e) => (Response::Error(e.to_string()), None),
        },
        Request::Reload => match sup.reload_dynamic() {
            Ok(()) => (Response::Ok, None),
            Err(e) => (Response::Error(e.to_string()), Some(e)),
        },
        Request::CondSet(name) => match sup.cond_set(&name) {
            Ok(()) => (Response::Ok, None),
            Err(e) => (Response::Error(e.to_string()), None),
        },
        Request::CondClear(name) => match sup.cond_clear(&name) {
            Ok(()) => (Response::Ok, None),
            Err(e) => (Response::Error(e.to_string()), None),
        },
        Request::Start { job, id } => {
            if sup.start_service(job, id) {
                (Response::Ok, None)
            } else {
                (Response::Error(format!("no such job {job}:{id}")), None)
            }
        }
        Request::Stop { job, id } => {
            if sup.stop_service(job, id) {
                (Response::Ok, None)
            } else {
                (Response::Error(format!("no such job {job}:{id}")), None)
            }
        }
        Request::Norespawn(on) => {
            sup.backend_mut().norespawn = on;
            (Response::Ok, None)
        }
    }
}

fn publish_status(sup: &Supervisor<UnixBackend>, paths: &env::Paths) {
    if let Err(e) = StatusSnapshot::capture(sup).write(&paths.status_file) {
        error!(%e, "failed writing status snapshot");
    }
}

fn init_logging(log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
