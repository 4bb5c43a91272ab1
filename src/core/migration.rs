//! Doctrine migration coordinator.
//!
//! ```text
//! Idle -> VersionQueried -> ConfirmPending -> Migrating -> Done
//!              |                  |
//!              v                  v
//!           Aborted            Declined
//! ```
//!
//! The current schema version is read from `doctrine:migrations:status`
//! before anything runs. It is both shown to the operator and kept as the
//! target of the compensating rollback.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

use crate::command::RemoteCommand;
use crate::config::DeployConfig;
use crate::confirm::Confirm;
use crate::console;
use crate::error::{Error, Result};
use crate::release::ReleaseLayout;
use crate::session::{HostFilter, Session};

const STATUS: &str = "doctrine:migrations:status";
const MIGRATE: &str = "doctrine:migrations:migrate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationVersion {
    /// No migration has been applied yet.
    Zero,
    Version(String),
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationVersion::Zero => f.write_str("0"),
            MigrationVersion::Version(v) => f.write_str(v),
        }
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    VersionQueried,
    ConfirmPending,
    Migrating,
    Done,
    Aborted,
    Declined,
}

/// `Current Version: 2012-03-01 10:00:00 (20120301100000)`
static VERSIONED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Current Version:[^$]+\(([0-9]+)\)").expect("Invalid regex pattern")
});

/// `Current Version: 0`, before any migration ran.
static ZERO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Current Version:\s*0\s*$").expect("Invalid regex pattern"));

/// Scan status output line by line. The last matching line wins.
pub fn parse_current_version(stdout: &str) -> Option<MigrationVersion> {
    let mut version = None;

    for line in stdout.lines() {
        if let Some(caps) = VERSIONED_PATTERN.captures(line) {
            version = Some(MigrationVersion::Version(caps[1].to_string()));
        }
        if ZERO_PATTERN.is_match(line) {
            version = Some(MigrationVersion::Zero);
        }
    }

    version
}

pub fn status_command(config: &DeployConfig, layout: &ReleaseLayout) -> RemoteCommand {
    console::console_command(config, layout, STATUS, &[])
}

pub fn migrate_command(config: &DeployConfig, layout: &ReleaseLayout) -> RemoteCommand {
    console::console_command_non_interactive(config, layout, MIGRATE, &[])
}

pub fn migrate_to_command(
    config: &DeployConfig,
    layout: &ReleaseLayout,
    version: &MigrationVersion,
) -> RemoteCommand {
    console::console_command_non_interactive(config, layout, MIGRATE, &[version.to_string()])
}

pub fn migrate_prompt(config: &DeployConfig) -> String {
    format!(
        "Do you really want to migrate {}'s database? (y/N)",
        config.symfony_env_prod
    )
}

pub fn rollback_prompt(config: &DeployConfig, version: &MigrationVersion) -> String {
    format!(
        "Do you really want to migrate {}'s database back to version {}? (y/N)",
        config.symfony_env_prod, version
    )
}

/// Compensating action for a migration that ran: migrate back to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRollback {
    pub version: MigrationVersion,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub state: MigrationState,
    pub version: MigrationVersion,
    pub commands: Vec<String>,
}

/// Outcome of [`Coordinator::prepare`].
#[derive(Debug, Clone)]
pub enum Prepared {
    /// The operator agreed. Register the rollback, then [`Coordinator::apply`].
    Approved(MigrationRollback),
    Declined(MigrationReport),
}

pub struct Coordinator<'a, C: Confirm> {
    session: &'a Session,
    config: &'a DeployConfig,
    layout: &'a ReleaseLayout,
    confirm: C,
    state: MigrationState,
    commands: Vec<String>,
}

impl<'a, C: Confirm> Coordinator<'a, C> {
    pub fn new(session: &'a Session, config: &'a DeployConfig, layout: &'a ReleaseLayout, confirm: C) -> Self {
        Self {
            session,
            config,
            layout,
            confirm,
            state: MigrationState::Idle,
            commands: Vec::new(),
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Query the version, ask, migrate.
    ///
    /// An undeterminable version is an error and nothing is migrated.
    /// Declining is a normal outcome reported as [`MigrationState::Declined`].
    pub fn run(&mut self) -> Result<MigrationReport> {
        match self.prepare()? {
            Prepared::Declined(report) => Ok(report),
            Prepared::Approved(rollback) => self.apply(&rollback),
        }
    }

    /// Query the version and ask, without migrating.
    ///
    /// On approval the returned rollback targets the version read here; it
    /// must be registered before [`Coordinator::apply`] so that a failing
    /// migrate can still be undone.
    pub fn prepare(&mut self) -> Result<Prepared> {
        let version = self.query_version()?;
        log_status!("migrate", "Current database version: {}", version);

        self.state = MigrationState::ConfirmPending;
        if !self.confirm.confirm(&migrate_prompt(self.config))? {
            log_status!("migrate", "Migration declined, database left at {}", version);
            self.state = MigrationState::Declined;
            return Ok(Prepared::Declined(self.report(version)));
        }

        Ok(Prepared::Approved(MigrationRollback { version }))
    }

    /// Run the forward migration approved by [`Coordinator::prepare`].
    pub fn apply(&mut self, approved: &MigrationRollback) -> Result<MigrationReport> {
        self.state = MigrationState::Migrating;
        let command = migrate_command(self.config, self.layout);
        self.commands.push(command.render());
        self.session.run(HostFilter::PrimaryApp, &command)?;

        self.state = MigrationState::Done;
        Ok(self.report(approved.version.clone()))
    }

    fn query_version(&mut self) -> Result<MigrationVersion> {
        let command = status_command(self.config, self.layout);
        let rendered = command.render();
        self.commands.push(rendered.clone());
        let output = self.session.capture(HostFilter::PrimaryApp, &command)?;
        self.state = MigrationState::VersionQueried;

        match parse_current_version(&output.stdout) {
            Some(version) => Ok(version),
            None => {
                self.state = MigrationState::Aborted;
                Err(Error::migration_version_unknown(rendered, output.stdout))
            }
        }
    }

    fn report(&self, version: MigrationVersion) -> MigrationReport {
        MigrationReport {
            state: self.state,
            version,
            commands: self.commands.clone(),
        }
    }
}

/// Migrate the primary host's database after confirmation.
pub fn migrate<C: Confirm>(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    confirm: C,
) -> Result<MigrationReport> {
    Coordinator::new(session, config, layout, confirm).run()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationRollbackOutcome {
    RolledBack { version: MigrationVersion },
    Declined { version: MigrationVersion },
}

/// Re-prompt, then migrate back to the version recorded before the deploy.
pub fn rollback<C: Confirm>(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    confirm: C,
    target: &MigrationRollback,
) -> Result<MigrationRollbackOutcome> {
    let version = target.version.clone();
    if !confirm.confirm(&rollback_prompt(config, &version))? {
        log_status!("migrate", "Database rollback declined");
        return Ok(MigrationRollbackOutcome::Declined { version });
    }

    log_status!("migrate", "Migrating database back to {}", version);
    session.run(
        HostFilter::PrimaryApp,
        &migrate_to_command(config, layout, &version),
    )?;
    Ok(MigrationRollbackOutcome::RolledBack { version })
}
