use clap::Args;
use serde::Serialize;

use sfdeploy::console::ConsoleTask;
use sfdeploy::session::HostFilter;

use super::CmdResult;

#[derive(Args)]
pub struct TasksArgs {
    /// Only list tasks that ask for confirmation
    #[arg(long)]
    pub destructive: bool,
}

#[derive(Serialize)]
pub struct TaskInfo {
    name: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subcommand: Option<&'static str>,
    hosts: HostFilter,
    destructive: bool,
}

#[derive(Serialize)]
pub struct TasksOutput {
    command: &'static str,
    tasks: Vec<TaskInfo>,
}

pub fn run_json(args: TasksArgs) -> CmdResult<TasksOutput> {
    let tasks = ConsoleTask::all()
        .iter()
        .filter(|task| !args.destructive || task.is_destructive())
        .map(|task| TaskInfo {
            name: task.name(),
            description: task.description(),
            subcommand: task.subcommand(),
            hosts: task.host_filter(),
            destructive: task.is_destructive(),
        })
        .collect();

    Ok((
        TasksOutput {
            command: "tasks",
            tasks,
        },
        0,
    ))
}
