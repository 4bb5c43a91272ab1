use clap::{Args, Subcommand};
use serde::Serialize;

use sfdeploy::confirm::Confirm;
use sfdeploy::console::{self, ConsoleTask, TaskReport};
use sfdeploy::ssh::PlannedCommand;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct SymfonyArgs {
    #[command(subcommand)]
    command: SymfonyCommand,
}

#[derive(Subcommand)]
enum SymfonyCommand {
    /// Run a console command in the release (default: cache:clear)
    Console {
        /// Console arguments, e.g. `cache:clear --no-warmup`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Cache tasks
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Install bundle's assets into the web directory
    Assets {
        #[command(subcommand)]
        command: AssetsCommand,
    },
    /// Assetic tasks
    Assetic {
        #[command(subcommand)]
        command: AsseticCommand,
    },
    /// Vendor tasks
    Vendors {
        #[command(subcommand)]
        command: VendorsCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Clear the cache
    Clear,
    /// Warm up an empty cache
    Warmup,
}

#[derive(Subcommand)]
enum AssetsCommand {
    Install,
}

#[derive(Subcommand)]
enum AsseticCommand {
    Dump,
}

#[derive(Subcommand)]
enum VendorsCommand {
    /// Run bin/vendors install --reinstall
    Update,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    pub command: String,
    pub release: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TaskReport>,
    /// Set when the operator declined a destructive task.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub declined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<PlannedCommand>,
}

pub fn run(args: SymfonyArgs, global: &GlobalArgs) -> CmdResult<TaskOutput> {
    let task = match args.command {
        SymfonyCommand::Console { args } => return run_console(&args, global),
        SymfonyCommand::Cache {
            command: CacheCommand::Clear,
        } => ConsoleTask::CacheClear,
        SymfonyCommand::Cache {
            command: CacheCommand::Warmup,
        } => ConsoleTask::CacheWarmup,
        SymfonyCommand::Assets {
            command: AssetsCommand::Install,
        } => ConsoleTask::AssetsInstall,
        SymfonyCommand::Assetic {
            command: AsseticCommand::Dump,
        } => ConsoleTask::AsseticDump,
        SymfonyCommand::Vendors {
            command: VendorsCommand::Update,
        } => ConsoleTask::VendorsUpdate,
    };

    run_task(task, global)
}

fn run_console(args: &[String], global: &GlobalArgs) -> CmdResult<TaskOutput> {
    let ctx = global.context()?;
    let report = console::run_custom(&ctx.session, &ctx.config, &ctx.layout, args)?;

    Ok((
        TaskOutput {
            command: "symfony.console".to_string(),
            release: ctx.layout.latest_release.clone(),
            report: Some(report),
            declined: false,
            current_version: None,
            planned: ctx.planned(),
        },
        0,
    ))
}

/// Run one named task, asking first when it can destroy data.
pub(crate) fn run_task(task: ConsoleTask, global: &GlobalArgs) -> CmdResult<TaskOutput> {
    let ctx = global.context()?;
    let mut output = TaskOutput {
        command: task.name().to_string(),
        release: ctx.layout.latest_release.clone(),
        report: None,
        declined: false,
        current_version: None,
        planned: Vec::new(),
    };

    if task.is_destructive() {
        let question = format!(
            "Do you really want to run {} on {}'s database? (y/N)",
            task.name(),
            ctx.config.symfony_env_prod
        );
        if !global.confirmer().confirm(&question)? {
            output.declined = true;
            return Ok((output, 0));
        }
    }

    let report = console::run_task(&ctx.session, &ctx.config, &ctx.layout, task)?;
    if task == ConsoleTask::DoctrineMigrationsStatus {
        output.current_version = report
            .output
            .first()
            .and_then(|host| sfdeploy::migration::parse_current_version(&host.stdout))
            .map(|version| version.to_string());
    }

    output.report = Some(report);
    output.planned = ctx.planned();
    Ok((output, 0))
}
