//! Top-level CLI definition and dispatch.
//!
//! `run` is the only place that turns an engine error into a process exit:
//! every run, successful or not, ends with one audit record.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

use drift_tracker::core::config::{Config, LoggingConfig};
use drift_tracker::core::env::{EnvOptions, Environment, executable_dir, short_hostname};
use drift_tracker::core::errors::{DtsError, ErrorKind};
use drift_tracker::core::identity::Instance;
use drift_tracker::core::paths::clean_path;
use drift_tracker::engine::{Action, Engine, RunArgs, RunState, StatusOutcome};
use drift_tracker::logger::activity::ActivityLog;
use drift_tracker::logger::audit::AuditLog;
use drift_tracker::metrics::format_report;
use drift_tracker::registry::client::HttpRegistry;
use drift_tracker::snapshot::GitSnapshotStore;

/// Data tracking system: snapshots application directories and reports
/// changed lines per file for a metrics collector.
#[derive(Debug, Parser)]
#[command(
    name = "dts",
    author,
    version,
    about = "Data Tracking System - configuration drift tracker",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Action to perform.
    #[arg(short, long, value_enum)]
    action: Action,
    /// Application directory or its `current` symlink (init).
    #[arg(
        short,
        long,
        value_name = "PATH",
        required_if_eq("action", "init")
    )]
    work_tree: Option<PathBuf>,
    /// Instance id of a tracked application (status).
    #[arg(
        short,
        long,
        value_name = "ID",
        required_if_eq("action", "status")
    )]
    instance: Option<String>,
    /// Override the snapshot root directory.
    #[arg(short = 'd', long = "dts-dir", value_name = "DIR")]
    dts_dir: Option<PathBuf>,
    /// Use the fixed test-mode registry coordinates.
    #[arg(short, long)]
    test: bool,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Failure raised by the engine or its collaborators.
    #[error(transparent)]
    Engine(#[from] DtsError),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Engine(err) => match err {
                DtsError::Serialization { .. } => 3,
                _ => match err.kind() {
                    ErrorKind::Config => 1,
                    _ => 2,
                },
            },
            Self::Io(_) => 2,
        }
    }

    /// Error code for the audit record, when the failure has one.
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Engine(err) => Some(err.code()),
            Self::User(_) | Self::Io(_) => None,
        }
    }
}

/// Config, environment and parsed instance of a run that got past setup.
struct Prepared {
    config: Config,
    env: Environment,
    instance: Option<Instance>,
}

/// Run one action end to end.
///
/// Log locations are settled before anything that can fail, so a run that
/// dies during setup still leaves its audit record.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let exe_dir = executable_dir();
    let fallback_dir = exe_dir
        .as_ref()
        .map_or_else(|_| PathBuf::from("."), Clone::clone);
    let loaded = exe_dir.and_then(|dir| Config::read(cli.config.as_deref(), &dir));

    let (logging, tool_dir) = match &loaded {
        Ok(config) => (
            config.logging.clone(),
            config.tool.dir.clone().unwrap_or_else(|| fallback_dir.clone()),
        ),
        Err(_) => (LoggingConfig::default(), fallback_dir),
    };
    let env_tool_dir = match &loaded {
        Ok(config) if cli.test => config.test_mode.tool_dir.clone(),
        _ => None,
    }
    .unwrap_or_else(|| tool_dir.clone());
    let log_dir = logging
        .dir
        .clone()
        .unwrap_or_else(|| clean_path(&env_tool_dir).join("logs"));

    let mut activity = ActivityLog::open(
        &log_dir.join("dts.log"),
        logging.max_size_bytes,
        logging.mirror_stderr,
    );
    let mut audit = AuditLog::open(&log_dir.join("dts.json"), logging.max_size_bytes);

    let args = RunArgs {
        action: cli.action,
        work_tree: cli.work_tree.clone(),
        instance: cli.instance.clone(),
        test: cli.test,
    };
    let prepared = loaded
        .map_err(CliError::from)
        .and_then(|config| prepare(cli, config, &tool_dir));

    let (mut state, outcome, lines) = match prepared {
        Ok(prepared) => execute(cli, &prepared, args, &mut activity),
        Err(err) => {
            let hostname = short_hostname().unwrap_or_default();
            let env = Environment::explicit(&hostname, "", "", &env_tool_dir, &env_tool_dir);
            (RunState::new(args, env), Err(err), Vec::new())
        }
    };

    if let Err(err) = &outcome {
        state.record_failure(err.to_string(), err.code());
        activity.error(err.to_string());
    }
    for line in &lines {
        activity.info(line);
    }
    audit.write_record(&state);
    outcome?;

    let mut stdout = io::stdout().lock();
    for line in &lines {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}

fn prepare(cli: &Cli, config: Config, tool_dir: &Path) -> Result<Prepared, CliError> {
    config.validate()?;
    let instance = match (&cli.action, &cli.instance) {
        (Action::Status, Some(raw)) => Some(
            Instance::parse(raw)
                .ok_or_else(|| CliError::User(format!("invalid instance id: {raw:?}")))?,
        ),
        _ => None,
    };
    let env = Environment::prepare(
        &config,
        tool_dir,
        &EnvOptions {
            test_mode: cli.test,
            snapshot_root: cli.dts_dir.clone(),
        },
    )?;
    Ok(Prepared {
        config,
        env,
        instance,
    })
}

fn execute(
    cli: &Cli,
    prepared: &Prepared,
    args: RunArgs,
    activity: &mut ActivityLog,
) -> (RunState, Result<(), CliError>, Vec<String>) {
    let Prepared {
        config,
        env,
        instance,
    } = prepared;
    let registry = HttpRegistry::new(&env.registry_url, &env.apps_path, &config.registry);
    let snapshots = GitSnapshotStore::new(&config.snapshot);
    activity.info(format!(
        "{} on {} (registry {}{})",
        cli.action, env.hostname, env.registry_url, env.apps_path
    ));

    let mut engine = Engine::new(
        &registry,
        &snapshots,
        config,
        activity,
        RunState::new(args, env.clone()),
    );

    let mut lines = Vec::new();
    let outcome = match (cli.action, *instance, &cli.work_tree) {
        (Action::Init, _, Some(work_tree)) => engine.init(work_tree),
        (Action::Status, Some(instance), _) => match engine.status(instance) {
            Ok(StatusOutcome::Report { label, diff }) => {
                lines = format_report(&diff, &config.job.measurement, &label);
                Ok(())
            }
            Ok(StatusOutcome::Redeployed { .. }) => Ok(()),
            Err(err) => Err(err),
        },
        (Action::Deploy, _, _) => engine
            .deploy(&config.deploy.excluded_apps)
            .map(drop),
        _ => Err(DtsError::InvalidConfig {
            details: format!("missing argument for {}", cli.action),
        }),
    };
    (engine.into_state(), outcome.map_err(CliError::from), lines)
}
