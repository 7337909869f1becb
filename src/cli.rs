//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::adapters::auto_delete::AutoDeleteDispatcher;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::http_market_gateway::HttpMarketGateway;
use crate::adapters::log_dispatcher::LogDispatcher;
use crate::adapters::system_clock::SystemClock;
use crate::domain::cycle::Orchestrator;
use crate::domain::engine_config::{LoggingConfig, NotifyBackend, NotifyConfig, Settings, SqliteConfig};
use crate::domain::error::EngineError;
use crate::ports::alert_repository::AlertRepository;
use crate::ports::notification_port::{NotificationPort, RetentionPolicy};

#[derive(Parser, Debug)]
#[command(name = "tripwire", version, about = "Price and indicator alert engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate alerts on a fixed interval until Ctrl-C
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a single cycle and print its report as JSON
    Once {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Parse and validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the SQLite schema if it does not exist
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config } => run_scheduler(&config),
        Command::Once { config } => run_once(&config),
        Command::Validate { config } => run_validate(&config),
        Command::InitDb { config } => run_init_db(&config),
    }
}

pub fn load_settings(path: &Path) -> Result<Settings, EngineError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    Settings::from_config(&adapter)
}

fn fail(err: &EngineError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so `once`
/// can print its report on stdout.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("warning: logging not initialised: {e}");
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, ExitCode> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            eprintln!("error: cannot start runtime: {e}");
            ExitCode::from(1)
        })
}

struct Store {
    repo: Arc<dyn AlertRepository>,
    retention: Arc<dyn RetentionPolicy>,
}

#[cfg(feature = "sqlite")]
fn open_store(config: &SqliteConfig) -> Result<Store, EngineError> {
    use crate::adapters::sqlite_alert_repository::SqliteAlertRepository;

    let repo = Arc::new(SqliteAlertRepository::from_config(config)?);
    Ok(Store {
        repo: repo.clone(),
        retention: repo,
    })
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &SqliteConfig) -> Result<Store, EngineError> {
    Err(EngineError::ConfigInvalid {
        section: "sqlite".into(),
        key: "path".into(),
        reason: "built without the sqlite feature".into(),
    })
}

fn notifier(config: &NotifyConfig, retention: Arc<dyn RetentionPolicy>) -> Result<Arc<dyn NotificationPort>, EngineError> {
    let base: Arc<dyn NotificationPort> = match &config.backend {
        NotifyBackend::Log => Arc::new(LogDispatcher::new()),
        #[cfg(feature = "telegram")]
        NotifyBackend::Telegram { token } => {
            Arc::new(crate::adapters::telegram_dispatcher::TelegramDispatcher::new(token))
        }
        #[cfg(not(feature = "telegram"))]
        NotifyBackend::Telegram { .. } => {
            return Err(EngineError::ConfigInvalid {
                section: "notify".into(),
                key: "backend".into(),
                reason: "built without the telegram feature".into(),
            })
        }
    };
    if config.autodelete {
        return Ok(Arc::new(AutoDeleteDispatcher::new(base, retention)));
    }
    Ok(base)
}

/// Wires the configured adapters into an orchestrator.
pub fn build_orchestrator(settings: &Settings) -> Result<Arc<Orchestrator>, EngineError> {
    let store = open_store(&settings.sqlite)?;
    let market = Arc::new(HttpMarketGateway::new(settings.market.clone())?);
    let notifier = notifier(&settings.notify, store.retention)?;
    Ok(Arc::new(Orchestrator::new(
        store.repo,
        market,
        notifier,
        Arc::new(SystemClock),
        settings.engine.clone(),
    )))
}

fn prepare(config_path: &Path) -> Result<Arc<Orchestrator>, ExitCode> {
    let settings = load_settings(config_path).map_err(|e| fail(&e))?;
    init_logging(&settings.logging);
    build_orchestrator(&settings).map_err(|e| fail(&e))
}

fn run_scheduler(config_path: &Path) -> ExitCode {
    let orchestrator = match prepare(config_path) {
        Ok(o) => o,
        Err(code) => return code,
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    rt.block_on(orchestrator.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping");
        }
    }));
    ExitCode::SUCCESS
}

fn run_once(config_path: &Path) -> ExitCode {
    let orchestrator = match prepare(config_path) {
        Ok(o) => o,
        Err(code) => return code,
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    let report = rt.block_on(orchestrator.run_cycle());
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: cannot serialise report: {e}");
            return ExitCode::from(1);
        }
    }
    // A cycle only records an error when alerts could not be listed.
    if report.error.is_some() {
        return ExitCode::from(3);
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    match load_settings(config_path) {
        Ok(settings) => {
            println!("{}: ok", config_path.display());
            println!(
                "  interval {}s, deadline {}s, fan-out {}, candle limit {}",
                settings.engine.interval.as_secs(),
                settings.engine.deadline.as_secs(),
                settings.engine.fan_out,
                settings.engine.candle_limit
            );
            println!("  store {}", settings.sqlite.path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

#[cfg(feature = "sqlite")]
fn run_init_db(config_path: &Path) -> ExitCode {
    use crate::adapters::sqlite_alert_repository::SqliteAlertRepository;

    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let result = SqliteAlertRepository::from_config(&settings.sqlite).and_then(|repo| repo.initialize_schema());
    match result {
        Ok(()) => {
            println!("schema ready at {}", settings.sqlite.path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

#[cfg(not(feature = "sqlite"))]
fn run_init_db(_config_path: &Path) -> ExitCode {
    eprintln!("error: sqlite feature is required for init-db");
    ExitCode::from(1)
}
