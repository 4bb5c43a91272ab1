//! Compensating actions for a deploy in progress.
//!
//! Steps that change live state register how to undo themselves. When a
//! later step fails, the registered actions run newest first. Their own
//! failures are reported alongside the original error rather than replacing it.

use serde::Serialize;

use crate::config::DeployConfig;
use crate::confirm::Confirm;
use crate::error::Error;
use crate::migration::{self, MigrationRollback, MigrationRollbackOutcome};
use crate::release::ReleaseLayout;
use crate::session::Session;
use crate::symlink::{self, RevertOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RollbackAction {
    /// Point `current` back at the previous release.
    Symlink,
    /// Migrate the database back to the recorded version.
    Migration(MigrationRollback),
}

impl RollbackAction {
    pub fn name(&self) -> &'static str {
        match self {
            RollbackAction::Symlink => "symlink",
            RollbackAction::Migration(_) => "migration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackResult {
    Reverted { target: String },
    Skipped { reason: String },
    RolledBack { version: String },
    Declined { version: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub action: String,
    #[serde(flatten)]
    pub result: RollbackResult,
}

impl RollbackReport {
    pub fn summary(&self) -> String {
        let detail = match &self.result {
            RollbackResult::Reverted { target } => format!("reverted to {}", target),
            RollbackResult::Skipped { reason } => format!("skipped ({})", reason),
            RollbackResult::RolledBack { version } => format!("rolled back to {}", version),
            RollbackResult::Declined { version } => format!("declined, still past {}", version),
            RollbackResult::Failed { error } => format!("failed: {}", error),
        };
        format!("{}: {}", self.action, detail)
    }

    /// Rollbacks that leave something for the operator to look at.
    pub fn is_warning(&self) -> bool {
        !matches!(
            self.result,
            RollbackResult::Reverted { .. } | RollbackResult::RolledBack { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct Transaction {
    actions: Vec<RollbackAction>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: RollbackAction) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[RollbackAction] {
        &self.actions
    }

    /// Run every registered action, newest first.
    pub fn rollback<C: Confirm>(
        self,
        session: &Session,
        config: &DeployConfig,
        layout: &ReleaseLayout,
        confirm: C,
    ) -> Vec<RollbackReport> {
        let mut reports = Vec::with_capacity(self.actions.len());

        for action in self.actions.into_iter().rev() {
            log_status!("rollback", "Rolling back {}", action.name());
            let result = match &action {
                RollbackAction::Symlink => match symlink::revert(session, config, layout) {
                    Ok(RevertOutcome::Reverted { target }) => RollbackResult::Reverted { target },
                    Ok(RevertOutcome::Skipped { reason }) => RollbackResult::Skipped { reason },
                    Err(e) => RollbackResult::Failed { error: e.message },
                },
                RollbackAction::Migration(target) => {
                    match migration::rollback(session, config, layout, &confirm, target) {
                        Ok(MigrationRollbackOutcome::RolledBack { version }) => {
                            RollbackResult::RolledBack {
                                version: version.to_string(),
                            }
                        }
                        Ok(MigrationRollbackOutcome::Declined { version }) => {
                            RollbackResult::Declined {
                                version: version.to_string(),
                            }
                        }
                        Err(e) => RollbackResult::Failed { error: e.message },
                    }
                }
            };

            reports.push(RollbackReport {
                action: action.name().to_string(),
                result,
            });
        }

        reports
    }
}

/// Attach rollback results to the error that triggered them.
pub fn annotate(mut error: Error, reports: &[RollbackReport]) -> Error {
    if reports.is_empty() {
        return error;
    }

    if let serde_json::Value::Object(details) = &mut error.details {
        if let Ok(value) = serde_json::to_value(reports) {
            details.insert("rollback".to_string(), value);
        }
    }

    let summary: Vec<String> = reports.iter().map(RollbackReport::summary).collect();
    error.with_hint(format!("Rolled back: {}", summary.join("; ")))
}
