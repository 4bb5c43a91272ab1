//! Deploy pipeline ordering, migration gating and rollback, driven by a
//! scripted executor.

use std::cell::RefCell;
use std::rc::Rc;

use sfdeploy::config::{DeployConfig, Server};
use sfdeploy::confirm::{Confirm, FixedAnswer};
use sfdeploy::deploy::{self, DeployOptions};
use sfdeploy::migration::MigrationState;
use sfdeploy::release::ReleaseLayout;
use sfdeploy::session::Session;
use sfdeploy::ssh::{CommandOutput, Executor};

const STATUS: &str = " >> Current Version:        2012-03-01 10:00:00 (20120301100000)\n";
const LATEST: &str = "/srv/shop/releases/20240102000000";

type Log = Rc<RefCell<Vec<String>>>;

struct Scripted {
    log: Log,
    status: &'static str,
    fail_on: Option<&'static str>,
}

impl Executor for Scripted {
    fn execute(&self, command: &str) -> CommandOutput {
        self.log.borrow_mut().push(command.to_string());
        if self.fail_on.is_some_and(|needle| command.contains(needle)) {
            return CommandOutput::failed(1, "simulated failure");
        }
        if command.contains("doctrine:migrations:status") {
            return CommandOutput::ok(self.status);
        }
        CommandOutput::ok("")
    }
}

/// Answers from a script and remembers the questions.
struct Answers {
    answers: RefCell<Vec<bool>>,
    asked: RefCell<Vec<String>>,
}

impl Answers {
    fn new(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().rev().copied().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }
}

impl Confirm for Answers {
    fn confirm(&self, question: &str) -> sfdeploy::Result<bool> {
        self.asked.borrow_mut().push(question.to_string());
        Ok(self.answers.borrow_mut().pop().unwrap_or(false))
    }
}

fn config() -> DeployConfig {
    DeployConfig::new("/srv/shop").with_server(Server::new("web1", "deploy"))
}

fn layout(config: &DeployConfig) -> ReleaseLayout {
    let names = vec!["20240101000000".to_string(), "20240102000000".to_string()];
    ReleaseLayout::from_releases(config, &names, None).unwrap()
}

fn session(config: &DeployConfig, log: &Log, status: &'static str, fail_on: Option<&'static str>) -> Session {
    Session::with_executors(config, |_| {
        Box::new(Scripted {
            log: log.clone(),
            status,
            fail_on,
        }) as Box<dyn Executor>
    })
}

fn position(log: &Log, needle: &str) -> usize {
    log.borrow()
        .iter()
        .position(|c| c.contains(needle))
        .unwrap_or_else(|| panic!("no command containing {needle}"))
}

const MIGRATE: DeployOptions = DeployOptions {
    migrate: true,
    dry_run: false,
};

#[test]
fn pipeline_runs_in_order() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, STATUS, None);

    let report = deploy::run(&session, &config, &layout(&config), MIGRATE, FixedAnswer(true)).unwrap();

    assert_eq!(report.current.as_deref(), Some("/srv/shop/releases/20240102000000/web"));
    assert!(position(&log, "rm -rf /srv/shop/releases/20240102000000/app/cache") < position(&log, "assets:install web"));
    assert!(position(&log, "assets:install web") < position(&log, "cache:warmup"));
    assert!(position(&log, "cache:warmup") < position(&log, "doctrine:migrations:migrate"));
    assert!(position(&log, "doctrine:migrations:migrate") < position(&log, "ln -sfn"));
    assert_eq!(report.migration.unwrap().state, MigrationState::Done);
}

#[test]
fn declined_migration_still_goes_live() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, STATUS, None);

    let report = deploy::run(&session, &config, &layout(&config), MIGRATE, FixedAnswer(false)).unwrap();

    assert_eq!(report.migration.unwrap().state, MigrationState::Declined);
    assert!(!log.borrow().iter().any(|c| c.contains("doctrine:migrations:migrate")));
    assert!(report.current.is_some());
}

#[test]
fn unknown_version_aborts_before_going_live() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, "Migrations are not configured\n", None);

    let err = deploy::run(&session, &config, &layout(&config), MIGRATE, FixedAnswer(true)).unwrap_err();

    assert_eq!(err.code.as_str(), "migration.version_unknown");
    let log = log.borrow();
    assert!(!log.iter().any(|c| c.contains("doctrine:migrations:migrate")));
    // Only the registered symlink rollback may touch current, and it was not registered yet.
    assert!(!log.iter().any(|c| c.contains("ln -sfn")));
}

#[test]
fn failed_switch_rolls_back_newest_first() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, STATUS, Some("ln -sfn /srv/shop/releases/20240102000000/web"));
    let answers = Answers::new(&[true, true]);

    let err = deploy::run(&session, &config, &layout(&config), MIGRATE, &answers).unwrap_err();

    assert_eq!(err.code.as_str(), "remote.command_failed");
    let rollback = err.details["rollback"].as_array().unwrap();
    assert_eq!(rollback[0]["action"], "symlink");
    assert_eq!(rollback[0]["status"], "reverted");
    assert_eq!(rollback[1]["action"], "migration");
    assert_eq!(rollback[1]["status"], "rolled_back");

    let reverted = position(&log, "ln -sfn /srv/shop/releases/20240101000000/web");
    let migrated_back = position(&log, "doctrine:migrations:migrate 20120301100000 --env=prod --no-interaction");
    assert!(reverted < migrated_back);

    let asked = answers.asked.borrow();
    assert_eq!(asked.len(), 2);
    assert!(asked[1].contains("back to version 20120301100000"));
}

#[test]
fn failed_migration_offers_migrate_back() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, STATUS, Some("doctrine:migrations:migrate --env"));
    let answers = Answers::new(&[true, true]);

    let err = deploy::run(&session, &config, &layout(&config), MIGRATE, &answers).unwrap_err();

    assert_eq!(err.code.as_str(), "remote.command_failed");
    let rollback = err.details["rollback"].as_array().unwrap();
    assert_eq!(rollback.len(), 1);
    assert_eq!(rollback[0]["action"], "migration");
    assert_eq!(rollback[0]["status"], "rolled_back");
    assert_eq!(rollback[0]["version"], "20120301100000");

    let asked = answers.asked.borrow();
    assert_eq!(asked.len(), 2);
    assert!(asked[1].contains("back to version 20120301100000"));

    let log = log.borrow();
    assert!(log
        .iter()
        .any(|c| c.contains("doctrine:migrations:migrate 20120301100000 --env=prod --no-interaction")));
    // Never went live, so current was not touched.
    assert!(!log.iter().any(|c| c.contains("ln -sfn")));
}

#[test]
fn declined_rollback_is_reported_not_run() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, STATUS, Some("ln -sfn /srv/shop/releases/20240102000000/web"));
    let answers = Answers::new(&[true, false]);

    let err = deploy::run(&session, &config, &layout(&config), MIGRATE, &answers).unwrap_err();

    assert_eq!(err.details["rollback"][1]["status"], "declined");
    assert!(!log.borrow().iter().any(|c| c.contains("migrate 20120301100000")));
    assert!(err.hints.iter().any(|h| h.message.contains("migration: declined")));
}

#[test]
fn failing_test_suite_reverts_current() {
    let config = config();
    let log = Log::default();
    let session = session(&config, &log, STATUS, Some("phpunit"));

    let err = deploy::testall(&session, &config, &layout(&config), FixedAnswer(true)).unwrap_err();

    assert_eq!(err.details["command"], format!("cd {LATEST} && phpunit -c app src"));
    assert!(position(&log, "phpunit") < position(&log, "ln -sfn /srv/shop/releases/20240101000000/web"));
}
