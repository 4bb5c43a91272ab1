//! Switching the live `current` link between releases.
//!
//! The link is replaced by renaming a freshly created temporary link over
//! it, so `current` always resolves to some release.
//!
//! The rename relies on GNU `mv -T`, which treats `current` as a plain
//! destination instead of descending into the directory it points at. Hosts
//! need GNU coreutils; BSD `mv` has no `-T`.

use serde::Serialize;

use crate::command::{Invocation, RemoteCommand};
use crate::config::DeployConfig;
use crate::error::Result;
use crate::release::{join, ReleaseLayout};
use crate::session::{HostFilter, Session};

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevertOutcome {
    Reverted { target: String },
    Skipped { reason: String },
}

impl RevertOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RevertOutcome::Skipped { .. })
    }
}

/// Web root of `release`: `<release>/<web_path>`.
pub fn web_root(config: &DeployConfig, release: &str) -> String {
    join(release, &config.web_path)
}

/// `ln -sfn <target> <current>.tmp && mv -Tf <current>.tmp <current>`
pub fn switch_command(layout: &ReleaseLayout, target: &str) -> RemoteCommand {
    let tmp = format!("{}{}", layout.current_path, TMP_SUFFIX);
    RemoteCommand::new(Invocation::new("ln").args(["-sfn", target, tmp.as_str()])).and_then(
        Invocation::new("mv").args(["-Tf", tmp.as_str(), layout.current_path.as_str()]),
    )
}

/// Point `current` at the latest release.
pub fn switch(session: &Session, config: &DeployConfig, layout: &ReleaseLayout) -> Result<String> {
    let target = web_root(config, &layout.latest_release);
    log_status!("symlink", "{} -> {}", layout.current_path, target);
    session.run(HostFilter::Releases, &switch_command(layout, &target))?;
    Ok(target)
}

/// Point `current` back at the previous release, if there is one.
pub fn revert(session: &Session, config: &DeployConfig, layout: &ReleaseLayout) -> Result<RevertOutcome> {
    let Some(previous) = &layout.previous_release else {
        let reason = "no previous release to rollback to, rollback of symlink skipped".to_string();
        log_status!("warning", "{}", reason);
        return Ok(RevertOutcome::Skipped { reason });
    };

    let target = web_root(config, previous);
    log_status!("symlink", "Reverting {} -> {}", layout.current_path, target);
    session.run(HostFilter::Releases, &switch_command(layout, &target))?;
    Ok(RevertOutcome::Reverted { target })
}
