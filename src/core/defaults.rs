//! Default values for every overridable deploy setting.
//!
//! These mirror the conventional Symfony 2 layout: everything lives under
//! `app/` except the public `web/` directory.

/// Config files looked up (in order) when no `--config` is given.
pub const CONFIG_FILE_CANDIDATES: &[&str] = &[
    "sfdeploy.json",
    "sfdeploy.toml",
    "config/deploy.json",
    "config/deploy.toml",
];

pub const RELEASES_DIR: &str = "releases";
pub const SHARED_DIR: &str = "shared";
pub const CURRENT_LINK: &str = "current";

/// `touch -t` timestamp pattern used for asset normalization.
pub const ASSET_STAMP_FORMAT: &str = "%Y%m%d%H%M.%S";

/// Default task arguments for `sfdeploy console` with no arguments.
pub const DEFAULT_CONSOLE_TASK: &str = "cache:clear";

pub fn app_path() -> String {
    "app".to_string()
}

pub fn web_path() -> String {
    "web".to_string()
}

pub fn console_binary_path(app_path: &str) -> String {
    format!("{}/console", app_path)
}

pub fn log_path(app_path: &str) -> String {
    format!("{}/logs", app_path)
}

pub fn cache_path(app_path: &str) -> String {
    format!("{}/cache", app_path)
}

/// Shared children default to the log directory and uploads.
pub fn shared_children(log_path: &str, web_path: &str) -> Vec<String> {
    vec![log_path.to_string(), format!("{}/uploads", web_path)]
}

pub fn asset_children(web_path: &str) -> Vec<String> {
    ["css", "images", "js"]
        .iter()
        .map(|dir| format!("{}/{}", web_path, dir))
        .collect()
}

pub fn php_bin() -> String {
    "php".to_string()
}

pub fn symfony_env_prod() -> String {
    "prod".to_string()
}

pub fn ssh_port() -> u16 {
    22
}

pub fn server_roles() -> Vec<crate::config::Role> {
    use crate::config::Role;
    vec![Role::App, Role::Web, Role::Db]
}

pub fn enabled() -> bool {
    true
}
