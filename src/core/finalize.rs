//! Release finalization: permissions, a fresh cache directory, shared links
//! and asset timestamps.
//!
//! Every step is an independent remote command run on each host holding a
//! release. A failing step aborts; steps already applied stay applied.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::command::{Invocation, RemoteCommand};
use crate::config::DeployConfig;
use crate::defaults;
use crate::error::Result;
use crate::release::ReleaseLayout;
use crate::session::{HostFilter, Session};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReport {
    pub release: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_stamp: Option<String>,
    pub commands: Vec<String>,
}

/// `touch -t` stamp for `now`.
pub fn asset_stamp(now: DateTime<Utc>) -> String {
    now.format(defaults::ASSET_STAMP_FORMAT).to_string()
}

/// Commands that finalize `layout.latest_release`, in execution order.
///
/// `stamp` is the single timestamp applied to every asset file.
pub fn finalize_plan(config: &DeployConfig, layout: &ReleaseLayout, stamp: &str) -> Vec<RemoteCommand> {
    let mut plan = Vec::new();
    let cache = layout.in_latest(&config.cache_path());

    if config.group_writable {
        plan.push(chmod_group_writable(&layout.latest_release));
    }

    plan.push(RemoteCommand::new(Invocation::new("rm").args(["-rf", cache.as_str()])));
    plan.push(
        RemoteCommand::new(Invocation::new("mkdir").args(["-p", cache.as_str()]))
            .and_then(Invocation::new("chmod").args(["-R", "0777", cache.as_str()])),
    );
    plan.push(chmod_group_writable(&cache));

    plan.extend(share_plan(config, layout));

    if config.normalize_asset_timestamps {
        let assets = config.asset_children();
        if !assets.is_empty() {
            plan.push(touch_assets(layout, &assets, stamp));
        }
    }

    plan
}

/// Commands that link shared children and shared files into the release.
pub fn share_plan(config: &DeployConfig, layout: &ReleaseLayout) -> Vec<RemoteCommand> {
    let mut plan = Vec::new();

    for child in config.shared_children() {
        let shared = layout.in_shared(&child);
        let linked = layout.in_latest(&child);

        plan.push(RemoteCommand::new(Invocation::new("mkdir").args(["-p", shared.as_str()])));
        plan.push(RemoteCommand::new(Invocation::new("rm").args(["-rf", linked.as_str()])));
        plan.push(link_into_release(&shared, &linked));
    }

    for file in config.shared_files() {
        let shared = layout.in_shared(file);
        let linked = layout.in_latest(file);

        plan.push(RemoteCommand::new(
            Invocation::new("mkdir").args(["-p".to_string(), parent_dir(&shared)]),
        ));
        plan.push(RemoteCommand::new(Invocation::new("touch").arg(shared.clone())));
        plan.push(RemoteCommand::new(Invocation::new("rm").args(["-rf", linked.as_str()])));
        plan.push(link_into_release(&shared, &linked));
    }

    plan
}

/// Run [`finalize_plan`] on every release host.
pub fn finalize(session: &Session, config: &DeployConfig, layout: &ReleaseLayout) -> Result<FinalizeReport> {
    let stamp = asset_stamp(Utc::now());
    log_status!("finalize", "Finalizing {}", layout.latest_release);

    let plan = finalize_plan(config, layout, &stamp);
    run_plan(session, &plan)?;

    Ok(FinalizeReport {
        release: layout.latest_release.clone(),
        asset_stamp: config.normalize_asset_timestamps.then_some(stamp),
        commands: plan.iter().map(RemoteCommand::render).collect(),
    })
}

/// Run only [`share_plan`] on every release host.
pub fn share(session: &Session, config: &DeployConfig, layout: &ReleaseLayout) -> Result<FinalizeReport> {
    log_status!("finalize", "Linking shared paths into {}", layout.latest_release);

    let plan = share_plan(config, layout);
    run_plan(session, &plan)?;

    Ok(FinalizeReport {
        release: layout.latest_release.clone(),
        asset_stamp: None,
        commands: plan.iter().map(RemoteCommand::render).collect(),
    })
}

fn run_plan(session: &Session, plan: &[RemoteCommand]) -> Result<()> {
    for command in plan {
        session.run(HostFilter::Releases, command)?;
    }
    Ok(())
}

fn chmod_group_writable(path: &str) -> RemoteCommand {
    RemoteCommand::new(Invocation::new("chmod").args(["-R", "g+w", path]))
}

/// `mkdir -p <parent> && ln -nfs <shared> <linked>`
fn link_into_release(shared: &str, linked: &str) -> RemoteCommand {
    RemoteCommand::new(Invocation::new("mkdir").args(["-p".to_string(), parent_dir(linked)]))
        .and_then(Invocation::new("ln").args(["-nfs", shared, linked]))
}

/// `TZ=UTC find <dirs> -exec touch -t <stamp> {} ';'; true`
///
/// Missing asset directories make `find` fail, which the trailing `true` absorbs.
fn touch_assets(layout: &ReleaseLayout, assets: &[String], stamp: &str) -> RemoteCommand {
    let dirs = assets.iter().map(|asset| layout.in_latest(asset));
    RemoteCommand::new(
        Invocation::new("find")
            .env("TZ", "UTC")
            .args(dirs)
            .args(["-exec", "touch", "-t", stamp, "{}", ";"]),
    )
    .then(Invocation::new("true"))
}

fn parent_dir(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const STAMP: &str = "202403090705.01";

    fn layout(config: &DeployConfig) -> ReleaseLayout {
        ReleaseLayout::from_releases(config, &["20240309070501".to_string()], None).unwrap()
    }

    fn rendered(config: &DeployConfig) -> Vec<String> {
        finalize_plan(config, &layout(config), STAMP)
            .iter()
            .map(RemoteCommand::render)
            .collect()
    }

    #[test]
    fn stamp_uses_touch_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(asset_stamp(now), STAMP);
    }

    #[test]
    fn default_plan_matches_recipe_order() {
        let config = DeployConfig::new("/srv/shop");
        let r = "/srv/shop/releases/20240309070501";
        let s = "/srv/shop/shared";

        assert_eq!(
            rendered(&config),
            vec![
                format!("chmod -R g+w {r}"),
                format!("rm -rf {r}/app/cache"),
                format!("mkdir -p {r}/app/cache && chmod -R 0777 {r}/app/cache"),
                format!("chmod -R g+w {r}/app/cache"),
                format!("mkdir -p {s}/app/logs"),
                format!("rm -rf {r}/app/logs"),
                format!("mkdir -p {r}/app && ln -nfs {s}/app/logs {r}/app/logs"),
                format!("mkdir -p {s}/web/uploads"),
                format!("rm -rf {r}/web/uploads"),
                format!("mkdir -p {r}/web && ln -nfs {s}/web/uploads {r}/web/uploads"),
                format!(
                    "TZ=UTC find {r}/web/css {r}/web/images {r}/web/js -exec touch -t {STAMP} '{{}}' ';'; true"
                ),
            ]
        );
    }

    #[test]
    fn toggles_drop_their_steps() {
        let mut config = DeployConfig::new("/srv/shop");
        config.group_writable = false;
        config.normalize_asset_timestamps = false;

        let commands = rendered(&config);
        assert!(commands[0].starts_with("rm -rf"));
        assert!(!commands.iter().any(|c| c.contains("find")));
        // Cache permissions are not governed by group_writable.
        assert!(commands.iter().any(|c| c.contains("chmod -R 0777")));
    }

    #[test]
    fn shared_files_are_touched_then_linked() {
        let mut config = DeployConfig::new("/srv/shop");
        config.shared_children = Some(Vec::new());
        config.shared_files = Some(vec!["app/config/parameters.yml".to_string()]);

        let commands: Vec<String> = share_plan(&config, &layout(&config))
            .iter()
            .map(RemoteCommand::render)
            .collect();

        assert_eq!(
            commands,
            vec![
                "mkdir -p /srv/shop/shared/app/config",
                "touch /srv/shop/shared/app/config/parameters.yml",
                "rm -rf /srv/shop/releases/20240309070501/app/config/parameters.yml",
                "mkdir -p /srv/shop/releases/20240309070501/app/config && ln -nfs /srv/shop/shared/app/config/parameters.yml /srv/shop/releases/20240309070501/app/config/parameters.yml",
            ]
        );
    }

    #[test]
    fn paths_with_spaces_stay_quoted() {
        let mut config = DeployConfig::new("/srv/my shop");
        config.shared_children = Some(vec!["app/logs".to_string()]);
        let commands = rendered(&config);
        assert!(commands.contains(&"mkdir -p '/srv/my shop/shared/app/logs'".to_string()));
    }

    #[test]
    fn parent_dir_handles_edges() {
        assert_eq!(parent_dir("/srv/shop/app/logs"), "/srv/shop/app");
        assert_eq!(parent_dir("/logs"), "/");
        assert_eq!(parent_dir("logs"), ".");
    }
}
