//! Symfony console and Doctrine tasks.
//!
//! Each task is one (occasionally two) console subcommands run from the
//! release directory: `cd <release> && <php> <console> <subcommand> --env=<env>`.
//! The console's own behavior is opaque; only the exit status matters.

use serde::Serialize;

use crate::command::{Invocation, RemoteCommand};
use crate::config::DeployConfig;
use crate::defaults;
use crate::error::Result;
use crate::release::ReleaseLayout;
use crate::session::{HostFilter, HostOutput, Session};

/// Build `cd <release> && <php> <console> <subcommand> <args> --env=<env>`.
pub fn console_command(
    config: &DeployConfig,
    layout: &ReleaseLayout,
    subcommand: &str,
    args: &[String],
) -> RemoteCommand {
    let (php, php_args) = config.php_command();
    let invocation = Invocation::new(php)
        .args(php_args)
        .arg(config.console_binary_path())
        .arg(subcommand)
        .args(args.iter().cloned())
        .arg(env_flag(config));

    RemoteCommand::new(invocation).in_dir(layout.latest_release.clone())
}

/// [`console_command`] with `--no-interaction` appended.
pub fn console_command_non_interactive(
    config: &DeployConfig,
    layout: &ReleaseLayout,
    subcommand: &str,
    args: &[String],
) -> RemoteCommand {
    let mut command = console_command(config, layout, subcommand, args);
    command.first.args.push("--no-interaction".to_string());
    command
}

pub fn env_flag(config: &DeployConfig) -> String {
    format!("--env={}", config.symfony_env_prod)
}

/// `chmod -R g+w <release>/<cache_path>`
pub fn cache_group_writable(config: &DeployConfig, layout: &ReleaseLayout) -> RemoteCommand {
    RemoteCommand::new(Invocation::new("chmod").args([
        "-R".to_string(),
        "g+w".to_string(),
        layout.in_latest(&config.cache_path()),
    ]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleTask {
    CacheClear,
    CacheWarmup,
    AssetsInstall,
    AsseticDump,
    VendorsUpdate,
    DoctrineCacheClearMetadata,
    DoctrineCacheClearQuery,
    DoctrineCacheClearResult,
    DoctrineDatabaseCreate,
    DoctrineDatabaseDrop,
    DoctrineGenerateProxies,
    DoctrineGenerateRepositories,
    DoctrineSchemaCreate,
    DoctrineSchemaDrop,
    DoctrineMigrationsMigrate,
    DoctrineMigrationsStatus,
    MongodbGenerateHydrators,
    MongodbGenerateProxies,
    MongodbGenerateRepositories,
    MongodbSchemaCreate,
    MongodbSchemaDrop,
}

impl ConsoleTask {
    pub fn all() -> &'static [ConsoleTask] {
        use ConsoleTask::*;
        &[
            CacheClear,
            CacheWarmup,
            AssetsInstall,
            AsseticDump,
            VendorsUpdate,
            DoctrineCacheClearMetadata,
            DoctrineCacheClearQuery,
            DoctrineCacheClearResult,
            DoctrineDatabaseCreate,
            DoctrineDatabaseDrop,
            DoctrineGenerateProxies,
            DoctrineGenerateRepositories,
            DoctrineSchemaCreate,
            DoctrineSchemaDrop,
            DoctrineMigrationsMigrate,
            DoctrineMigrationsStatus,
            MongodbGenerateHydrators,
            MongodbGenerateProxies,
            MongodbGenerateRepositories,
            MongodbSchemaCreate,
            MongodbSchemaDrop,
        ]
    }

    /// Fully qualified task name.
    pub fn name(&self) -> &'static str {
        use ConsoleTask::*;
        match self {
            CacheClear => "symfony:cache:clear",
            CacheWarmup => "symfony:cache:warmup",
            AssetsInstall => "symfony:assets:install",
            AsseticDump => "symfony:assetic:dump",
            VendorsUpdate => "symfony:vendors:update",
            DoctrineCacheClearMetadata => "symfony:doctrine:cache:clear_metadata",
            DoctrineCacheClearQuery => "symfony:doctrine:cache:clear_query",
            DoctrineCacheClearResult => "symfony:doctrine:cache:clear_result",
            DoctrineDatabaseCreate => "symfony:doctrine:database:create",
            DoctrineDatabaseDrop => "symfony:doctrine:database:drop",
            DoctrineGenerateProxies => "symfony:doctrine:generate:proxies",
            DoctrineGenerateRepositories => "symfony:doctrine:generate:repositories",
            DoctrineSchemaCreate => "symfony:doctrine:schema:create",
            DoctrineSchemaDrop => "symfony:doctrine:schema:drop",
            DoctrineMigrationsMigrate => "symfony:doctrine:migrations:migrate",
            DoctrineMigrationsStatus => "symfony:doctrine:migrations:status",
            MongodbGenerateHydrators => "symfony:doctrine:mongodb:generate:hydrators",
            MongodbGenerateProxies => "symfony:doctrine:mongodb:generate:proxies",
            MongodbGenerateRepositories => "symfony:doctrine:mongodb:generate:repositories",
            MongodbSchemaCreate => "symfony:doctrine:mongodb:schema:create",
            MongodbSchemaDrop => "symfony:doctrine:mongodb:schema:drop",
        }
    }

    pub fn description(&self) -> &'static str {
        use ConsoleTask::*;
        match self {
            CacheClear => "Clears project cache.",
            CacheWarmup => "Warms up an empty cache.",
            AssetsInstall => "Install bundle's assets",
            AsseticDump => "Dumps all assets to the filesystem",
            VendorsUpdate => "Runs the bin/vendors script to update the vendors",
            DoctrineCacheClearMetadata => "Clear all metadata cache for an entity manager.",
            DoctrineCacheClearQuery => "Clear all query cache for an entity manager.",
            DoctrineCacheClearResult => "Clear result cache for an entity manager.",
            DoctrineDatabaseCreate => "Create the configured databases.",
            DoctrineDatabaseDrop => "Drop the configured databases.",
            DoctrineGenerateProxies => "Generates proxy classes for entity classes.",
            DoctrineGenerateRepositories => {
                "Generate repository classes from your mapping information."
            }
            DoctrineSchemaCreate => "Create the database schema on the entity manager connection.",
            DoctrineSchemaDrop => "Drop the complete database schema of the entity manager connection.",
            DoctrineMigrationsMigrate => {
                "Execute a migration to a specified version or the latest available version."
            }
            DoctrineMigrationsStatus => "View the status of a set of migrations.",
            MongodbGenerateHydrators => "Generates hydrator classes for document classes.",
            MongodbGenerateProxies => "Generates proxy classes for document classes.",
            MongodbGenerateRepositories => "Generates repository classes for document classes.",
            MongodbSchemaCreate => "Create databases, collections and indexes for your documents.",
            MongodbSchemaDrop => "Drop databases, collections and indexes for your documents.",
        }
    }

    /// Console subcommand this task wraps. `None` for the vendors script.
    pub fn subcommand(&self) -> Option<&'static str> {
        use ConsoleTask::*;
        Some(match self {
            CacheClear => "cache:clear",
            CacheWarmup => "cache:warmup",
            AssetsInstall => "assets:install",
            AsseticDump => "assetic:dump",
            VendorsUpdate => return None,
            DoctrineCacheClearMetadata => "doctrine:cache:clear-metadata",
            DoctrineCacheClearQuery => "doctrine:cache:clear-query",
            DoctrineCacheClearResult => "doctrine:cache:clear-result",
            DoctrineDatabaseCreate => "doctrine:database:create",
            DoctrineDatabaseDrop => "doctrine:database:drop",
            DoctrineGenerateProxies => "doctrine:generate:proxies",
            DoctrineGenerateRepositories => "doctrine:generate:repositories",
            DoctrineSchemaCreate => "doctrine:schema:create",
            DoctrineSchemaDrop => "doctrine:schema:drop",
            DoctrineMigrationsMigrate => "doctrine:migrations:migrate",
            DoctrineMigrationsStatus => "doctrine:migrations:status",
            MongodbGenerateHydrators => "doctrine:mongodb:generate:hydrators",
            MongodbGenerateProxies => "doctrine:mongodb:generate:proxies",
            MongodbGenerateRepositories => "doctrine:mongodb:generate:repositories",
            MongodbSchemaCreate => "doctrine:mongodb:schema:create",
            MongodbSchemaDrop => "doctrine:mongodb:schema:drop",
        })
    }

    /// Master-only tasks touch the database and run once, on the primary app host.
    pub fn host_filter(&self) -> HostFilter {
        use ConsoleTask::*;
        match self {
            DoctrineDatabaseCreate
            | DoctrineDatabaseDrop
            | DoctrineSchemaCreate
            | DoctrineSchemaDrop
            | DoctrineMigrationsMigrate
            | DoctrineMigrationsStatus
            | MongodbSchemaCreate
            | MongodbSchemaDrop => HostFilter::PrimaryApp,
            _ => HostFilter::App,
        }
    }

    /// Tasks that can lose data; callers confirm before running them.
    pub fn is_destructive(&self) -> bool {
        use ConsoleTask::*;
        matches!(
            self,
            DoctrineDatabaseDrop | DoctrineSchemaDrop | DoctrineMigrationsMigrate | MongodbSchemaDrop
        )
    }

    pub fn commands(&self, config: &DeployConfig, layout: &ReleaseLayout) -> Vec<RemoteCommand> {
        use ConsoleTask::*;
        let web = vec![config.web_path.clone()];
        match self {
            CacheClear => vec![
                console_command(config, layout, "cache:clear", &[]),
                cache_group_writable(config, layout),
            ],
            CacheWarmup => vec![
                console_command(config, layout, "cache:warmup", &[]),
                console_command(config, layout, "cache:create-cache-class", &[]),
                cache_group_writable(config, layout),
            ],
            AssetsInstall => vec![console_command(config, layout, "assets:install", &web)],
            AsseticDump => vec![console_command(config, layout, "assetic:dump", &web)],
            VendorsUpdate => {
                let (php, php_args) = config.php_command();
                vec![RemoteCommand::new(
                    Invocation::new(php)
                        .args(php_args)
                        .args(["bin/vendors", "install", "--reinstall"]),
                )
                .in_dir(layout.latest_release.clone())]
            }
            DoctrineMigrationsMigrate => vec![console_command_non_interactive(
                config,
                layout,
                "doctrine:migrations:migrate",
                &[],
            )],
            task => match task.subcommand() {
                Some(sub) => vec![console_command(config, layout, sub, &[])],
                None => Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task: String,
    pub hosts: HostFilter,
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<HostOutput>,
}

/// Run every command of `task` on the task's hosts.
pub fn run_task(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    task: ConsoleTask,
) -> Result<TaskReport> {
    log_status!("console", "{}", task.name());
    let filter = task.host_filter();
    let mut rendered = Vec::new();
    let mut output = Vec::new();

    for command in task.commands(config, layout) {
        rendered.push(command.render());
        output.extend(session.run_collect(filter, &command)?);
    }

    Ok(TaskReport {
        task: task.name().to_string(),
        hosts: filter,
        commands: rendered,
        output,
    })
}

/// Run arbitrary console arguments (`cache:clear` when none are given).
pub fn run_custom(
    session: &Session,
    config: &DeployConfig,
    layout: &ReleaseLayout,
    args: &[String],
) -> Result<TaskReport> {
    let (subcommand, rest) = match args.split_first() {
        Some((first, rest)) => (first.clone(), rest.to_vec()),
        None => (defaults::DEFAULT_CONSOLE_TASK.to_string(), Vec::new()),
    };

    let command = console_command(config, layout, &subcommand, &rest);
    let output = session.run_collect(HostFilter::App, &command)?;

    Ok(TaskReport {
        task: format!("symfony:console {}", subcommand),
        hosts: HostFilter::App,
        commands: vec![command.render()],
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(config: &DeployConfig) -> ReleaseLayout {
        ReleaseLayout::from_releases(config, &["20240101000000".to_string()], None).unwrap()
    }

    fn rendered(task: ConsoleTask, config: &DeployConfig) -> Vec<String> {
        task.commands(config, &layout(config))
            .iter()
            .map(RemoteCommand::render)
            .collect()
    }

    #[test]
    fn cache_clear_then_group_write() {
        let config = DeployConfig::new("/srv/shop");
        assert_eq!(
            rendered(ConsoleTask::CacheClear, &config),
            vec![
                "cd /srv/shop/releases/20240101000000 && php app/console cache:clear --env=prod",
                "chmod -R g+w /srv/shop/releases/20240101000000/app/cache",
            ]
        );
    }

    #[test]
    fn warmup_also_creates_cache_class() {
        let config = DeployConfig::new("/srv/shop");
        let commands = rendered(ConsoleTask::CacheWarmup, &config);
        assert_eq!(commands.len(), 3);
        assert!(commands[1].ends_with("php app/console cache:create-cache-class --env=prod"));
    }

    #[test]
    fn assets_install_targets_web_path() {
        let mut config = DeployConfig::new("/srv/shop");
        config.symfony_env_prod = "staging".to_string();
        assert_eq!(
            rendered(ConsoleTask::AssetsInstall, &config),
            vec!["cd /srv/shop/releases/20240101000000 && php app/console assets:install web --env=staging"]
        );
    }

    #[test]
    fn vendors_update_skips_console() {
        let config = DeployConfig::new("/srv/shop");
        assert_eq!(
            rendered(ConsoleTask::VendorsUpdate, &config),
            vec!["cd /srv/shop/releases/20240101000000 && php bin/vendors install --reinstall"]
        );
    }

    #[test]
    fn proxy_and_repository_generation_are_distinct_tasks() {
        let config = DeployConfig::new("/srv/shop");
        let proxies = rendered(ConsoleTask::DoctrineGenerateProxies, &config);
        let repositories = rendered(ConsoleTask::DoctrineGenerateRepositories, &config);

        assert!(proxies[0].contains("doctrine:generate:proxies"));
        assert!(repositories[0].contains("doctrine:generate:repositories"));
        assert_ne!(
            ConsoleTask::DoctrineGenerateProxies.name(),
            ConsoleTask::DoctrineGenerateRepositories.name()
        );
    }

    #[test]
    fn task_names_are_unique() {
        let mut names: Vec<&str> = ConsoleTask::all().iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ConsoleTask::all().len());
    }

    #[test]
    fn database_tasks_run_on_primary_only() {
        assert_eq!(ConsoleTask::DoctrineSchemaDrop.host_filter(), HostFilter::PrimaryApp);
        assert_eq!(ConsoleTask::CacheClear.host_filter(), HostFilter::App);
        assert!(ConsoleTask::DoctrineDatabaseDrop.is_destructive());
        assert!(!ConsoleTask::DoctrineDatabaseCreate.is_destructive());
    }

    #[test]
    fn standalone_migrate_is_non_interactive() {
        let config = DeployConfig::new("/srv/shop");
        let commands = rendered(ConsoleTask::DoctrineMigrationsMigrate, &config);
        assert!(commands[0].ends_with("doctrine:migrations:migrate --env=prod --no-interaction"));
    }

    #[test]
    fn php_flags_precede_console_path() {
        let mut config = DeployConfig::new("/srv/shop");
        config.php_bin = "php -d memory_limit=-1".to_string();
        let command = console_command(&config, &layout(&config), "cache:clear", &[]);
        assert!(command
            .render()
            .ends_with("php -d memory_limit=-1 app/console cache:clear --env=prod"));
    }
}
