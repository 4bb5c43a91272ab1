use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{deploy, doctrine, symfony, tasks};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "sfdeploy")]
#[command(version = VERSION)]
#[command(about = "Release finalization, symlink switching and migrations for Symfony deployments")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take the newest release live (finalize, assets, cache, migrate, symlink)
    Deploy(deploy::DeployArgs),
    /// Symfony console tasks
    Symfony(symfony::SymfonyArgs),
    /// Doctrine ORM and ODM tasks
    Doctrine(doctrine::DoctrineArgs),
    /// List the available console tasks
    Tasks(tasks::TasksArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command, &cli.global);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
