//! Release rollout pipelines.
//!
//! `run` takes an uploaded release to live: finalize it, prepare vendors,
//! assets and cache, optionally migrate, then switch `current`. Steps after
//! the first compensable one run inside a [`Transaction`].

use serde::Serialize;

use crate::command::{Invocation, RemoteCommand};
use crate::config::DeployConfig;
use crate::confirm::Confirm;
use crate::console::{self, ConsoleTask, TaskReport};
use crate::error::Result;
use crate::finalize::{self, FinalizeReport};
use crate::migration::{Coordinator, MigrationReport, Prepared};
use crate::release::ReleaseLayout;
use crate::session::{HostFilter, HostOutput, Session};
use crate::symlink;
use crate::transaction::{self, RollbackAction, Transaction};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Run Doctrine migrations before switching `current`.
    pub migrate: bool,
    /// Commands are only recorded, so nothing can be read back from hosts.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub release: String,
    pub finalize: FinalizeReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_output: Vec<HostOutput>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl DeployReport {
    fn new(layout: &ReleaseLayout, finalize: FinalizeReport) -> Self {
        Self {
            release: layout.latest_release.clone(),
            finalize,
            tasks: Vec::new(),
            migration: None,
            current: None,
            test_output: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Console tasks run between finalize and the symlink switch.
pub fn pipeline_tasks(config: &DeployConfig) -> Vec<ConsoleTask> {
    let mut tasks = Vec::new();
    if config.update_vendors {
        tasks.push(ConsoleTask::VendorsUpdate);
    }
    tasks.push(ConsoleTask::AssetsInstall);
    if config.dump_assetic_assets {
        tasks.push(ConsoleTask::AsseticDump);
    }
    tasks.push(ConsoleTask::CacheWarmup);
    tasks
}

pub fn run<C: Confirm>(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    options: DeployOptions,
    confirm: C,
) -> Result<DeployReport> {
    log_status!("deploy", "Deploying {}", layout.latest_name());
    let finalized = finalize::finalize(session, config, layout)?;
    let mut report = DeployReport::new(layout, finalized);
    let mut tx = Transaction::new();

    let outcome = run_steps(session, config, layout, options, &confirm, &mut tx, &mut report);
    finish(session, config, layout, &confirm, tx, report, outcome)
}

fn run_steps<C: Confirm>(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    options: DeployOptions,
    confirm: &C,
    tx: &mut Transaction,
    report: &mut DeployReport,
) -> Result<()> {
    for task in pipeline_tasks(config) {
        report.tasks.push(console::run_task(session, config, layout, task)?);
    }

    if options.migrate {
        if options.dry_run {
            let warning = "Dry run: migration skipped, the current database version cannot be read".to_string();
            log_status!("warning", "{}", warning);
            report.warnings.push(warning);
        } else {
            let mut coordinator = Coordinator::new(session, config, layout, confirm);
            let migrated = match coordinator.prepare()? {
                Prepared::Declined(declined) => declined,
                Prepared::Approved(rollback) => {
                    tx.register(RollbackAction::Migration(rollback.clone()));
                    coordinator.apply(&rollback)?
                }
            };
            report.migration = Some(migrated);
        }
    }

    tx.register(RollbackAction::Symlink);
    report.current = Some(symlink::switch(session, config, layout)?);
    Ok(())
}

/// Finalize, go live, then run the test suite against the live release.
///
/// A failing suite rolls `current` back.
pub fn testall<C: Confirm>(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    confirm: C,
) -> Result<DeployReport> {
    log_status!("deploy", "Deploying {} and running tests", layout.latest_name());
    let finalized = finalize::finalize(session, config, layout)?;
    let mut report = DeployReport::new(layout, finalized);
    let mut tx = Transaction::new();

    let outcome = switch_and_test(session, config, layout, &mut tx, &mut report);
    finish(session, config, layout, &confirm, tx, report, outcome)
}

fn switch_and_test(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    tx: &mut Transaction,
    report: &mut DeployReport,
) -> Result<()> {
    tx.register(RollbackAction::Symlink);
    report.current = Some(symlink::switch(session, config, layout)?);
    report.test_output = session.run_collect(HostFilter::Releases, &phpunit_command(config, layout))?;
    Ok(())
}

/// `cd <release> && phpunit -c <app_path> src`
pub fn phpunit_command(config: &DeployConfig, layout: &ReleaseLayout) -> RemoteCommand {
    RemoteCommand::new(Invocation::new("phpunit").args(["-c", config.app_path.as_str(), "src"]))
        .in_dir(layout.latest_release.clone())
}

fn finish<C: Confirm>(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    confirm: &C,
    tx: Transaction,
    report: DeployReport,
    outcome: Result<()>,
) -> Result<DeployReport> {
    match outcome {
        Ok(()) => Ok(report),
        Err(error) => {
            log_status!("deploy", "Failed: {}", error.message);
            let reports = tx.rollback(session, config, layout, confirm);
            Err(transaction::annotate(error, &reports))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Server;
    use crate::confirm::FixedAnswer;
    use crate::ssh::{DryRunLog, Executor};

    fn config() -> DeployConfig {
        DeployConfig::new("/srv/shop").with_server(Server::new("web1", "deploy"))
    }

    fn layout(config: &DeployConfig) -> ReleaseLayout {
        ReleaseLayout::from_releases(config, &["20240101000000".to_string()], None).unwrap()
    }

    #[test]
    fn pipeline_respects_toggles() {
        let mut config = config();
        assert_eq!(
            pipeline_tasks(&config),
            vec![ConsoleTask::AssetsInstall, ConsoleTask::CacheWarmup]
        );

        config.update_vendors = true;
        config.dump_assetic_assets = true;
        assert_eq!(
            pipeline_tasks(&config),
            vec![
                ConsoleTask::VendorsUpdate,
                ConsoleTask::AssetsInstall,
                ConsoleTask::AsseticDump,
                ConsoleTask::CacheWarmup,
            ]
        );
    }

    #[test]
    fn phpunit_runs_from_release_dir() {
        let config = config();
        assert_eq!(
            phpunit_command(&config, &layout(&config)).render(),
            "cd /srv/shop/releases/20240101000000 && phpunit -c app src"
        );
    }

    #[test]
    fn dry_run_skips_migration_with_warning() {
        let config = config();
        let log = DryRunLog::new();
        let session = Session::with_executors(&config, |server| {
            Box::new(log.executor(server.host.clone())) as Box<dyn Executor>
        });
        let options = DeployOptions {
            migrate: true,
            dry_run: true,
        };

        let report = run(&session, &config, &layout(&config), options, FixedAnswer(true)).unwrap();

        assert!(report.migration.is_none());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.current.as_deref(), Some("/srv/shop/releases/20240101000000/web"));
        let commands = log.commands();
        assert!(!commands.iter().any(|c| c.command.contains("doctrine:migrations")));
        assert!(commands.last().unwrap().command.starts_with("ln -sfn"));
    }
}
