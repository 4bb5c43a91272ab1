use clap::{Args, Subcommand};
use serde::Serialize;

use sfdeploy::deploy::{self, DeployOptions, DeployReport};
use sfdeploy::finalize::{self, FinalizeReport};
use sfdeploy::migration::{self, MigrationReport};
use sfdeploy::ssh::PlannedCommand;
use sfdeploy::symlink::{self, RevertOutcome};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DeployArgs {
    #[command(subcommand)]
    command: Option<DeployCommand>,

    /// Run Doctrine migrations before going live (asks for confirmation)
    #[arg(long)]
    migrate: bool,
}

#[derive(Subcommand)]
enum DeployCommand {
    /// Finalize, go live, then run phpunit; a failing suite rolls back
    Testall,
    /// Fix permissions, recreate the cache, link shared paths, stamp assets
    Finalize,
    /// Link shared directories and files into the release
    Share,
    /// Point current at the release
    Symlink,
    /// Point current back at the release before it
    Rollback,
    /// Migrate the database of the primary app server
    Migrate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    command: &'static str,
    release: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy: Option<DeployReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finalize: Option<FinalizeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback: Option<RevertOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    migration: Option<MigrationReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    planned: Vec<PlannedCommand>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

impl DeployOutput {
    fn new(command: &'static str, release: String) -> Self {
        Self {
            command,
            release,
            deploy: None,
            finalize: None,
            current: None,
            rollback: None,
            migration: None,
            planned: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<DeployOutput> {
    let ctx = global.context()?;
    let confirm = global.confirmer();
    let (config, session, layout) = (&ctx.config, &ctx.session, &ctx.layout);
    let release = layout.latest_release.clone();

    let mut output = match args.command {
        None => {
            let options = DeployOptions {
                migrate: args.migrate,
                dry_run: global.dry_run,
            };
            let mut report = deploy::run(session, config, layout, options, &*confirm)?;
            let mut output = DeployOutput::new("deploy", release);
            output.warnings = std::mem::take(&mut report.warnings);
            output.deploy = Some(report);
            output
        }
        Some(DeployCommand::Testall) => {
            let report = deploy::testall(session, config, layout, &*confirm)?;
            let mut output = DeployOutput::new("deploy.testall", release);
            output.deploy = Some(report);
            output
        }
        Some(DeployCommand::Finalize) => {
            let mut output = DeployOutput::new("deploy.finalize", release);
            output.finalize = Some(finalize::finalize(session, config, layout)?);
            output
        }
        Some(DeployCommand::Share) => {
            let mut output = DeployOutput::new("deploy.share", release);
            output.finalize = Some(finalize::share(session, config, layout)?);
            output
        }
        Some(DeployCommand::Symlink) => {
            let mut output = DeployOutput::new("deploy.symlink", release);
            output.current = Some(symlink::switch(session, config, layout)?);
            output
        }
        Some(DeployCommand::Rollback) => {
            let outcome = symlink::revert(session, config, layout)?;
            let mut output = DeployOutput::new("deploy.rollback", release);
            if let RevertOutcome::Skipped { reason } = &outcome {
                output.warnings.push(reason.clone());
            }
            output.rollback = Some(outcome);
            output
        }
        Some(DeployCommand::Migrate) => {
            let mut output = DeployOutput::new("deploy.migrate", release);
            if global.dry_run {
                output.warnings.push(
                    "Dry run: migration skipped, the current database version cannot be read"
                        .to_string(),
                );
            } else {
                output.migration = Some(migration::migrate(session, config, layout, &*confirm)?);
            }
            output
        }
    };

    output.planned = ctx.planned();
    Ok((output, 0))
}
