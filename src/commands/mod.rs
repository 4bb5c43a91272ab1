use clap::Args;
use std::path::PathBuf;

use sfdeploy::config::{self, DeployConfig};
use sfdeploy::confirm::{Confirm, FixedAnswer};
use sfdeploy::release::ReleaseLayout;
use sfdeploy::session::Session;
use sfdeploy::ssh::{DryRunLog, Executor, PlannedCommand};

pub type CmdResult<T> = sfdeploy::Result<(T, i32)>;

/// Flags accepted by every command.
#[derive(Args, Debug, Default)]
pub(crate) struct GlobalArgs {
    /// Config file (default: sfdeploy.json or sfdeploy.toml in the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override a config key (repeatable), e.g. --set symfony_env_prod=staging
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Act on this release instead of the newest one
    #[arg(long, global = true, value_name = "NAME")]
    pub release: Option<String>,

    /// Print the commands that would run without running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

impl GlobalArgs {
    pub fn load_config(&self) -> sfdeploy::Result<DeployConfig> {
        let cwd = std::env::current_dir().map_err(|e| {
            sfdeploy::Error::internal_io(e.to_string(), Some("resolve working directory".to_string()))
        })?;
        let path = config::resolve_path(self.config.as_deref(), &cwd)?;
        let overrides = self
            .overrides
            .iter()
            .map(|raw| config::parse_override(raw))
            .collect::<sfdeploy::Result<Vec<_>>>()?;

        config::load(&path, &overrides)
    }

    /// Load config, connect, and locate the release to act on.
    pub fn context(&self) -> sfdeploy::Result<Context> {
        let config = self.load_config()?;
        let connected = Session::connect(&config)?;
        // Listing releases is read-only, so dry runs still ask the real hosts.
        let layout = ReleaseLayout::discover(&connected, &config, self.release.as_deref())?;

        if !self.dry_run {
            return Ok(Context {
                config,
                session: connected,
                layout,
                dry_run: None,
            });
        }

        let log = DryRunLog::new();
        let session = Session::with_executors(&config, |server| {
            Box::new(log.executor(server.host.clone())) as Box<dyn Executor>
        });
        Ok(Context {
            config,
            session,
            layout,
            dry_run: Some(log),
        })
    }

    pub fn confirmer(&self) -> Box<dyn Confirm> {
        if self.yes {
            Box::new(FixedAnswer(true))
        } else {
            Box::new(crate::tty::TtyConfirm)
        }
    }
}

pub(crate) struct Context {
    pub config: DeployConfig,
    pub session: Session,
    pub layout: ReleaseLayout,
    pub dry_run: Option<DryRunLog>,
}

impl Context {
    /// Commands recorded by a dry run; empty otherwise.
    pub fn planned(&self) -> Vec<PlannedCommand> {
        self.dry_run
            .as_ref()
            .map(DryRunLog::commands)
            .unwrap_or_default()
    }
}

pub mod deploy;
pub mod doctrine;
pub mod symfony;
pub mod tasks;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run_json($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (sfdeploy::Result<serde_json::Value>, i32) {
    crate::tty::status("sfdeploy is working...");

    match command {
        // Commands without global context
        crate::Commands::Tasks(args) => dispatch!(args, tasks),

        // Commands with global context
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Symfony(args) => dispatch!(args, global, symfony),
        crate::Commands::Doctrine(args) => dispatch!(args, global, doctrine),
    }
}
