//! Release directory layout under `deploy_to`.
//!
//! ```text
//! <deploy_to>/releases/<YYYYmmddHHMMSS>/   one immutable checkout per deploy
//! <deploy_to>/shared/                      state kept across releases
//! <deploy_to>/current -> releases/<latest>/<web_path>
//! ```

use serde::Serialize;

use crate::command::{Invocation, RemoteCommand};
use crate::config::DeployConfig;
use crate::defaults;
use crate::error::{Error, Result};
use crate::session::{HostFilter, Session};

/// Join a relative path onto a directory without doubling slashes.
pub fn join(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches("./").trim_matches('/')
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseLayout {
    pub deploy_to: String,
    pub releases_path: String,
    pub shared_path: String,
    pub current_path: String,
    /// Absolute path of the release being finalized.
    pub latest_release: String,
    /// Absolute path of the release before it, if any.
    pub previous_release: Option<String>,
}

impl ReleaseLayout {
    /// Pick latest/previous out of a listing of release names.
    ///
    /// `requested` selects a specific release as "latest"; otherwise the newest
    /// name wins. Names sort chronologically because they are timestamps.
    pub fn from_releases(
        config: &DeployConfig,
        releases: &[String],
        requested: Option<&str>,
    ) -> Result<Self> {
        let deploy_to = config.deploy_to.trim_end_matches('/').to_string();
        let releases_path = join(&deploy_to, defaults::RELEASES_DIR);

        let mut names: Vec<&str> = releases.iter().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();

        if names.is_empty() {
            return Err(Error::release_none_deployed(releases_path));
        }

        let index = match requested {
            Some(name) => names.iter().position(|n| *n == name).ok_or_else(|| {
                Error::release_not_found(
                    name,
                    releases_path.clone(),
                    names.iter().map(|n| n.to_string()).collect(),
                )
            })?,
            None => names.len() - 1,
        };

        let latest_release = join(&releases_path, names[index]);
        let previous_release = index
            .checked_sub(1)
            .map(|prev| join(&releases_path, names[prev]));

        Ok(Self {
            shared_path: join(&deploy_to, defaults::SHARED_DIR),
            current_path: join(&deploy_to, defaults::CURRENT_LINK),
            releases_path,
            latest_release,
            previous_release,
            deploy_to,
        })
    }

    /// List `releases/` on the primary host and build the layout from it.
    pub fn discover(
        session: &Session,
        config: &DeployConfig,
        requested: Option<&str>,
    ) -> Result<Self> {
        let releases_path = join(&config.deploy_to, defaults::RELEASES_DIR);
        let output = session.capture(HostFilter::PrimaryApp, &list_releases(&releases_path))?;
        let names = parse_release_listing(&output.stdout);
        Self::from_releases(config, &names, requested)
    }

    /// Name (last path segment) of the latest release.
    pub fn latest_name(&self) -> &str {
        self.latest_release
            .rsplit('/')
            .next()
            .unwrap_or(&self.latest_release)
    }

    pub fn in_latest(&self, relative: &str) -> String {
        join(&self.latest_release, relative)
    }

    pub fn in_shared(&self, relative: &str) -> String {
        join(&self.shared_path, relative)
    }
}

fn list_releases(releases_path: &str) -> RemoteCommand {
    RemoteCommand::new(Invocation::new("ls").args(["-1", releases_path]))
}

/// Release names from `ls -1` output, skipping hidden entries.
pub fn parse_release_listing(stdout: &str) -> Vec<String> {
    stdout
        .split_whitespace()
        .filter(|name| !name.starts_with('.'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeployConfig {
        DeployConfig::new("/srv/shop/")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn newest_release_is_latest() {
        let layout = ReleaseLayout::from_releases(
            &config(),
            &names(&["20240102000000", "20240101000000", "20240103000000"]),
            None,
        )
        .unwrap();

        assert_eq!(layout.latest_release, "/srv/shop/releases/20240103000000");
        assert_eq!(
            layout.previous_release.as_deref(),
            Some("/srv/shop/releases/20240102000000")
        );
        assert_eq!(layout.shared_path, "/srv/shop/shared");
        assert_eq!(layout.current_path, "/srv/shop/current");
        assert_eq!(layout.latest_name(), "20240103000000");
    }

    #[test]
    fn single_release_has_no_previous() {
        let layout =
            ReleaseLayout::from_releases(&config(), &names(&["20240101000000"]), None).unwrap();
        assert!(layout.previous_release.is_none());
    }

    #[test]
    fn requested_release_picks_its_predecessor() {
        let layout = ReleaseLayout::from_releases(
            &config(),
            &names(&["20240101000000", "20240102000000", "20240103000000"]),
            Some("20240102000000"),
        )
        .unwrap();

        assert_eq!(layout.latest_name(), "20240102000000");
        assert_eq!(
            layout.previous_release.as_deref(),
            Some("/srv/shop/releases/20240101000000")
        );
    }

    #[test]
    fn unknown_requested_release_is_not_found() {
        let err = ReleaseLayout::from_releases(
            &config(),
            &names(&["20240101000000"]),
            Some("20991231000000"),
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "release.not_found");
    }

    #[test]
    fn empty_listing_is_an_error() {
        let err = ReleaseLayout::from_releases(&config(), &[], None).unwrap_err();
        assert_eq!(err.code.as_str(), "release.none_deployed");
    }

    #[test]
    fn listing_skips_hidden_entries() {
        assert_eq!(
            parse_release_listing("20240101000000\n.tmp\n20240102000000\n"),
            vec!["20240101000000", "20240102000000"]
        );
    }

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(join("/srv/shop/", "/app/logs/"), "/srv/shop/app/logs");
        assert_eq!(join("/srv/shop", "./web"), "/srv/shop/web");
    }
}
