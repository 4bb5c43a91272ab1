use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::defaults;
use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Server role, as used to pick which hosts a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    App,
    Web,
    Db,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub host: String,
    pub user: String,
    #[serde(default = "defaults::ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default = "defaults::server_roles")]
    pub roles: Vec<Role>,
    /// Runs master-only tasks (migrations, schema, database).
    #[serde(default)]
    pub primary: bool,
    /// Host has no release checkout (e.g. a database box).
    #[serde(default)]
    pub no_release: bool,
}

impl Server {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: defaults::ssh_port(),
            identity_file: None,
            roles: defaults::server_roles(),
            primary: false,
            no_release: false,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Everything a deploy task needs to know, passed explicitly to each operation.
///
/// Path settings other than `deploy_to` are relative to a release directory.
/// Unset derived settings fall back to values computed from `app_path` and
/// `web_path`, so overriding `app_path` alone moves the console, logs and cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    pub deploy_to: String,
    #[serde(default)]
    pub servers: Vec<Server>,

    #[serde(default = "defaults::app_path")]
    pub app_path: String,
    #[serde(default = "defaults::web_path")]
    pub web_path: String,
    #[serde(default)]
    pub console_binary_path: Option<String>,
    #[serde(default)]
    pub log_path: Option<String>,
    #[serde(default)]
    pub cache_path: Option<String>,

    #[serde(default)]
    pub shared_children: Option<Vec<String>>,
    /// `false` (or absent) disables shared files.
    #[serde(default, deserialize_with = "deserialize_shared_files")]
    pub shared_files: Option<Vec<String>>,
    #[serde(default)]
    pub asset_children: Option<Vec<String>>,

    #[serde(default = "defaults::enabled")]
    pub normalize_asset_timestamps: bool,
    #[serde(default = "defaults::enabled")]
    pub group_writable: bool,

    #[serde(default = "defaults::php_bin")]
    pub php_bin: String,
    #[serde(default = "defaults::symfony_env_prod")]
    pub symfony_env_prod: String,

    #[serde(default)]
    pub update_vendors: bool,
    #[serde(default)]
    pub dump_assetic_assets: bool,
}

impl DeployConfig {
    pub fn new(deploy_to: impl Into<String>) -> Self {
        Self {
            deploy_to: deploy_to.into(),
            servers: Vec::new(),
            app_path: defaults::app_path(),
            web_path: defaults::web_path(),
            console_binary_path: None,
            log_path: None,
            cache_path: None,
            shared_children: None,
            shared_files: None,
            asset_children: None,
            normalize_asset_timestamps: true,
            group_writable: true,
            php_bin: defaults::php_bin(),
            symfony_env_prod: defaults::symfony_env_prod(),
            update_vendors: false,
            dump_assetic_assets: false,
        }
    }

    pub fn with_server(mut self, server: Server) -> Self {
        self.servers.push(server);
        self
    }

    pub fn console_binary_path(&self) -> String {
        self.console_binary_path
            .clone()
            .unwrap_or_else(|| defaults::console_binary_path(&self.app_path))
    }

    pub fn log_path(&self) -> String {
        self.log_path
            .clone()
            .unwrap_or_else(|| defaults::log_path(&self.app_path))
    }

    pub fn cache_path(&self) -> String {
        self.cache_path
            .clone()
            .unwrap_or_else(|| defaults::cache_path(&self.app_path))
    }

    pub fn shared_children(&self) -> Vec<String> {
        match &self.shared_children {
            Some(children) => children.clone(),
            None => defaults::shared_children(&self.log_path(), &self.web_path),
        }
    }

    pub fn shared_files(&self) -> &[String] {
        self.shared_files.as_deref().unwrap_or(&[])
    }

    pub fn asset_children(&self) -> Vec<String> {
        self.asset_children
            .clone()
            .unwrap_or_else(|| defaults::asset_children(&self.web_path))
    }

    /// Split `php_bin` into program and leading arguments (`php -d memory_limit=-1`).
    pub fn php_command(&self) -> (String, Vec<String>) {
        let mut words = self.php_bin.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(defaults::php_bin);
        (program, words.collect())
    }

    pub fn validate(&self) -> Result<()> {
        if self.deploy_to.trim().is_empty() {
            return Err(Error::config_missing_key("deploy_to", None));
        }
        if !self.deploy_to.starts_with('/') {
            return Err(Error::config_invalid_value(
                "deploy_to",
                Some(self.deploy_to.clone()),
                "must be an absolute path",
            ));
        }

        validate_relative("app_path", &self.app_path)?;
        validate_relative("web_path", &self.web_path)?;
        validate_relative("console_binary_path", &self.console_binary_path())?;
        validate_relative("log_path", &self.log_path())?;
        validate_relative("cache_path", &self.cache_path())?;
        for child in self.shared_children() {
            validate_relative("shared_children", &child)?;
        }
        for file in self.shared_files() {
            validate_relative("shared_files", file)?;
        }
        for asset in self.asset_children() {
            validate_relative("asset_children", &asset)?;
        }

        if self.php_bin.trim().is_empty() {
            return Err(Error::config_invalid_value("php_bin", None, "must not be empty"));
        }
        if self.symfony_env_prod.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "symfony_env_prod",
                None,
                "must not be empty",
            ));
        }

        if self.servers.is_empty() {
            return Err(Error::config_missing_key("servers", None)
                .with_hint("Add at least one server: {\"host\": \"...\", \"user\": \"...\"}"));
        }
        for server in &self.servers {
            if server.host.trim().is_empty() || server.user.trim().is_empty() {
                return Err(Error::config_invalid_value(
                    "servers",
                    Some(server.host.clone()),
                    "every server needs a host and a user",
                ));
            }
        }
        if self.servers.iter().filter(|s| s.primary).count() > 1 {
            return Err(Error::config_invalid_value(
                "servers",
                None,
                "at most one server may be marked primary",
            ));
        }

        Ok(())
    }
}

/// A path relative to the release root: non-empty, not absolute, no `..`.
fn validate_relative(key: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::config_invalid_value(key, None, "must not be empty"));
    }

    let path = Path::new(trimmed);
    if path.is_absolute() {
        return Err(Error::config_invalid_value(
            key,
            Some(value.to_string()),
            "must be relative to the release directory",
        ));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::config_invalid_value(
            key,
            Some(value.to_string()),
            "must not contain '..'",
        ));
    }

    Ok(())
}

fn deserialize_shared_files<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        List(Vec<String>),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None | Some(Raw::Flag(false)) => Ok(None),
        Some(Raw::Flag(true)) => Err(serde::de::Error::custom(
            "shared_files must be a list of paths or false",
        )),
        Some(Raw::List(list)) if list.is_empty() => Ok(None),
        Some(Raw::List(list)) => Ok(Some(list)),
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Find the config file: the explicit path, or the first existing candidate in `dir`.
pub fn resolve_path(explicit: Option<&Path>, dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::internal_io(
                format!("Config file not found: {}", path.display()),
                Some("resolve config".to_string()),
            ));
        }
        return Ok(path.to_path_buf());
    }

    defaults::CONFIG_FILE_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.exists())
        .ok_or_else(|| {
            Error::config_missing_key("config", Some(dir.display().to_string())).with_hint(
                format!(
                    "Create one of: {}",
                    defaults::CONFIG_FILE_CANDIDATES.join(", ")
                ),
            )
        })
}

/// Load a config file (JSON, or TOML by extension) and apply `--set` overrides.
pub fn load(path: &Path, overrides: &[(String, Value)]) -> Result<DeployConfig> {
    let raw = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;
    let display = path.display().to_string();

    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let value: Value = if is_toml {
        toml::from_str(&raw).map_err(|e| Error::config_invalid_toml(&display, e))?
    } else {
        serde_json::from_str(&raw).map_err(|e| Error::config_invalid_json(&display, e))?
    };

    from_value(value, overrides, &display)
}

/// Build a config from an already-parsed document plus overrides.
pub fn from_value(mut value: Value, overrides: &[(String, Value)], source: &str) -> Result<DeployConfig> {
    let Value::Object(ref mut obj) = value else {
        return Err(Error::config_invalid_value(
            "config",
            Some(source.to_string()),
            "top level must be an object",
        ));
    };
    apply_overrides(obj, overrides);

    let config: DeployConfig =
        serde_json::from_value(value).map_err(|e| Error::config_invalid_json(source, e))?;
    config.validate()?;
    Ok(config)
}

fn apply_overrides(obj: &mut Map<String, Value>, overrides: &[(String, Value)]) {
    for (key, value) in overrides {
        obj.insert(key.clone(), value.clone());
    }
}

/// Parse a `key=value` override flag.
pub fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        Error::validation_invalid_argument(
            "set",
            format!("Expected key=value, got '{}'", raw),
            None,
            None,
        )
    })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::validation_invalid_argument(
            "set",
            "Override key must not be empty",
            Some(raw.to_string()),
            None,
        ));
    }

    Ok((key.to_string(), parse_value(value)))
}

/// Parse a string value into appropriate JSON type.
/// Order: JSON literal → bool → number → string
fn parse_value(s: &str) -> Value {
    // JSON first: arrays, objects, quoted strings
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }
    if s == "true" {
        return Value::Bool(true);
    }
    if s == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::from(n);
    }
    Value::String(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "deploy_to": "/srv/shop",
            "servers": [{ "host": "web1.example.com", "user": "deploy" }]
        })
    }

    #[test]
    fn defaults_match_symfony_layout() {
        let config = from_value(minimal(), &[], "test").unwrap();

        assert_eq!(config.app_path, "app");
        assert_eq!(config.web_path, "web");
        assert_eq!(config.console_binary_path(), "app/console");
        assert_eq!(config.log_path(), "app/logs");
        assert_eq!(config.cache_path(), "app/cache");
        assert_eq!(config.shared_children(), vec!["app/logs", "web/uploads"]);
        assert!(config.shared_files().is_empty());
        assert_eq!(config.asset_children(), vec!["web/css", "web/images", "web/js"]);
        assert!(config.normalize_asset_timestamps);
        assert!(config.group_writable);
        assert_eq!(config.symfony_env_prod, "prod");
        assert_eq!(config.servers[0].port, 22);
        assert!(config.servers[0].has_role(Role::App));
    }

    #[test]
    fn app_path_override_moves_derived_paths() {
        let overrides = vec![parse_override("app_path=symfony").unwrap()];
        let config = from_value(minimal(), &overrides, "test").unwrap();

        assert_eq!(config.console_binary_path(), "symfony/console");
        assert_eq!(config.shared_children(), vec!["symfony/logs", "web/uploads"]);
    }

    #[test]
    fn shared_files_accepts_false_and_lists() {
        let mut doc = minimal();
        doc["shared_files"] = json!(false);
        assert!(from_value(doc.clone(), &[], "t").unwrap().shared_files.is_none());

        doc["shared_files"] = json!(["app/config/parameters.yml"]);
        let config = from_value(doc.clone(), &[], "t").unwrap();
        assert_eq!(config.shared_files(), ["app/config/parameters.yml".to_string()]);

        doc["shared_files"] = json!(true);
        assert!(from_value(doc, &[], "t").is_err());
    }

    #[test]
    fn rejects_relative_deploy_to() {
        let mut doc = minimal();
        doc["deploy_to"] = json!("srv/shop");
        let err = from_value(doc, &[], "t").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn rejects_escaping_shared_child() {
        let mut doc = minimal();
        doc["shared_children"] = json!(["../etc"]);
        assert!(from_value(doc, &[], "t").is_err());
    }

    #[test]
    fn rejects_missing_servers() {
        let doc = json!({ "deploy_to": "/srv/shop" });
        let err = from_value(doc, &[], "t").unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
    }

    #[test]
    fn parse_override_types() {
        assert_eq!(parse_override("group_writable=false").unwrap().1, json!(false));
        assert_eq!(
            parse_override(r#"asset_children=["web/bundles"]"#).unwrap().1,
            json!(["web/bundles"])
        );
        assert_eq!(parse_override("symfony_env_prod=staging").unwrap().1, json!("staging"));
        assert!(parse_override("no-equals").is_err());
        assert!(parse_override("=value").is_err());
    }

    #[test]
    fn php_command_splits_leading_flags() {
        let mut config = DeployConfig::new("/srv/shop");
        config.php_bin = "php -d memory_limit=-1".to_string();
        let (program, args) = config.php_command();
        assert_eq!(program, "php");
        assert_eq!(args, vec!["-d", "memory_limit=-1"]);
    }

    #[test]
    fn load_reads_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sfdeploy.toml");
        fs::write(
            &path,
            r#"
deploy_to = "/srv/shop"
shared_files = false
update_vendors = true

[[servers]]
host = "web1"
user = "deploy"
primary = true
"#,
        )
        .unwrap();

        let config = load(&path, &[]).unwrap();
        assert!(config.update_vendors);
        assert!(config.servers[0].primary);
        assert_eq!(resolve_path(None, dir.path()).unwrap(), path);
    }
}
