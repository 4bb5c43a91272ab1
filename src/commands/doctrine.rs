use clap::{Args, Subcommand};

use sfdeploy::console::ConsoleTask;

use super::symfony::{run_task, TaskOutput};
use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DoctrineArgs {
    #[command(subcommand)]
    command: DoctrineCommand,
}

#[derive(Subcommand)]
enum DoctrineCommand {
    /// ORM cache tasks
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Database tasks (primary app server only)
    Database {
        #[command(subcommand)]
        command: CreateDrop,
    },
    /// Entity class generation
    Generate {
        #[command(subcommand)]
        command: GenerateCommand,
    },
    /// ORM schema tasks (primary app server only)
    Schema {
        #[command(subcommand)]
        command: CreateDrop,
    },
    /// Migration tasks (primary app server only)
    Migrations {
        #[command(subcommand)]
        command: MigrationsCommand,
    },
    /// MongoDB ODM tasks
    Mongodb {
        #[command(subcommand)]
        command: MongodbCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    ClearMetadata,
    ClearQuery,
    ClearResult,
}

#[derive(Subcommand, Clone, Copy)]
enum CreateDrop {
    Create,
    /// Asks for confirmation
    Drop,
}

#[derive(Subcommand)]
enum GenerateCommand {
    Proxies,
    Repositories,
}

#[derive(Subcommand)]
enum MigrationsCommand {
    /// Migrate to the latest version (asks for confirmation)
    Migrate,
    /// Show migration status and the current version
    Status,
}

#[derive(Subcommand)]
enum MongodbCommand {
    Generate {
        #[command(subcommand)]
        command: MongodbGenerateCommand,
    },
    Schema {
        #[command(subcommand)]
        command: CreateDrop,
    },
}

#[derive(Subcommand)]
enum MongodbGenerateCommand {
    Hydrators,
    Proxies,
    Repositories,
}

fn task_for(command: DoctrineCommand) -> ConsoleTask {
    match command {
        DoctrineCommand::Cache { command } => match command {
            CacheCommand::ClearMetadata => ConsoleTask::DoctrineCacheClearMetadata,
            CacheCommand::ClearQuery => ConsoleTask::DoctrineCacheClearQuery,
            CacheCommand::ClearResult => ConsoleTask::DoctrineCacheClearResult,
        },
        DoctrineCommand::Database { command } => match command {
            CreateDrop::Create => ConsoleTask::DoctrineDatabaseCreate,
            CreateDrop::Drop => ConsoleTask::DoctrineDatabaseDrop,
        },
        DoctrineCommand::Generate { command } => match command {
            GenerateCommand::Proxies => ConsoleTask::DoctrineGenerateProxies,
            GenerateCommand::Repositories => ConsoleTask::DoctrineGenerateRepositories,
        },
        DoctrineCommand::Schema { command } => match command {
            CreateDrop::Create => ConsoleTask::DoctrineSchemaCreate,
            CreateDrop::Drop => ConsoleTask::DoctrineSchemaDrop,
        },
        DoctrineCommand::Migrations { command } => match command {
            MigrationsCommand::Migrate => ConsoleTask::DoctrineMigrationsMigrate,
            MigrationsCommand::Status => ConsoleTask::DoctrineMigrationsStatus,
        },
        DoctrineCommand::Mongodb { command } => match command {
            MongodbCommand::Generate { command } => match command {
                MongodbGenerateCommand::Hydrators => ConsoleTask::MongodbGenerateHydrators,
                MongodbGenerateCommand::Proxies => ConsoleTask::MongodbGenerateProxies,
                MongodbGenerateCommand::Repositories => ConsoleTask::MongodbGenerateRepositories,
            },
            MongodbCommand::Schema { command } => match command {
                CreateDrop::Create => ConsoleTask::MongodbSchemaCreate,
                CreateDrop::Drop => ConsoleTask::MongodbSchemaDrop,
            },
        },
    }
}

pub fn run(args: DoctrineArgs, global: &GlobalArgs) -> CmdResult<TaskOutput> {
    run_task(task_for(args.command), global)
}
