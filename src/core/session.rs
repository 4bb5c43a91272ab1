//! The set of hosts a deploy talks to, and serial command fan-out across them.

use serde::Serialize;

use crate::command::RemoteCommand;
use crate::config::{DeployConfig, Role, Server};
use crate::error::{Error, RemoteCommandFailedDetails, Result, TargetDetails};
use crate::ssh::{is_transient_ssh_error, CommandOutput, Executor, SshClient};

/// Which hosts a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostFilter {
    /// Every host that holds a release checkout.
    Releases,
    /// Every app-role host with a release checkout.
    App,
    /// The single primary app host (master-only tasks).
    PrimaryApp,
}

impl HostFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostFilter::Releases => "releases",
            HostFilter::App => "app",
            HostFilter::PrimaryApp => "primary app",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostOutput {
    pub host: String,
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

pub struct Host {
    pub server: Server,
    executor: Box<dyn Executor>,
}

impl Host {
    pub fn new(server: Server, executor: Box<dyn Executor>) -> Self {
        Self { server, executor }
    }

    fn target(&self) -> TargetDetails {
        TargetDetails {
            host: Some(self.server.host.clone()),
            user: Some(self.server.user.clone()),
        }
    }
}

pub struct Session {
    hosts: Vec<Host>,
}

impl Session {
    /// Open an SSH client (or local executor for localhost) per configured server.
    pub fn connect(config: &DeployConfig) -> Result<Self> {
        let mut hosts = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            let client = SshClient::from_server(server)?;
            hosts.push(Host::new(server.clone(), Box::new(client)));
        }
        Ok(Self { hosts })
    }

    /// Build a session whose executors come from `factory` (dry runs, tests).
    pub fn with_executors<F>(config: &DeployConfig, mut factory: F) -> Self
    where
        F: FnMut(&Server) -> Box<dyn Executor>,
    {
        let hosts = config
            .servers
            .iter()
            .map(|server| Host::new(server.clone(), factory(server)))
            .collect();
        Self { hosts }
    }

    pub fn hosts(&self, filter: HostFilter) -> Vec<&Host> {
        match filter {
            HostFilter::Releases => self
                .hosts
                .iter()
                .filter(|h| !h.server.no_release)
                .collect(),
            HostFilter::App => self.app_hosts().collect(),
            HostFilter::PrimaryApp => {
                let primary = self
                    .app_hosts()
                    .find(|h| h.server.primary)
                    .or_else(|| self.app_hosts().next());
                primary.into_iter().collect()
            }
        }
    }

    fn app_hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts
            .iter()
            .filter(|h| h.server.has_role(Role::App) && !h.server.no_release)
    }

    /// Run `command` on every matching host in turn; the first failure aborts.
    pub fn run(&self, filter: HostFilter, command: &RemoteCommand) -> Result<()> {
        self.run_collect(filter, command).map(|_| ())
    }

    /// Like [`Session::run`], keeping each host's output.
    pub fn run_collect(&self, filter: HostFilter, command: &RemoteCommand) -> Result<Vec<HostOutput>> {
        let hosts = self.require_hosts(filter)?;
        let rendered = command.render();
        let mut outputs = Vec::with_capacity(hosts.len());

        for host in hosts {
            let output = check(host, &rendered, run_on(host, &rendered))?;
            outputs.push(HostOutput {
                host: host.server.host.clone(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(outputs)
    }

    /// Run `command` on the first matching host and return its output.
    pub fn capture(&self, filter: HostFilter, command: &RemoteCommand) -> Result<CommandOutput> {
        let hosts = self.require_hosts(filter)?;
        let host = hosts[0];
        let rendered = command.render();
        let output = run_on(host, &rendered);
        check(host, &rendered, output)
    }

    fn require_hosts(&self, filter: HostFilter) -> Result<Vec<&Host>> {
        let hosts = self.hosts(filter);
        if hosts.is_empty() {
            return Err(Error::remote_no_matching_hosts(filter.as_str()));
        }
        Ok(hosts)
    }
}

fn run_on(host: &Host, rendered: &str) -> CommandOutput {
    log_status!("run", "{} $ {}", host.server.host, rendered);
    host.executor.execute(rendered)
}

fn check(host: &Host, rendered: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success {
        return Ok(output);
    }

    // Connection-level failures never reached the remote command.
    let retryable = is_transient_ssh_error(&output);
    let err = Error::remote_command_failed(RemoteCommandFailedDetails {
        command: rendered.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        target: host.target(),
    });

    Err(if retryable {
        err.with_retryable(true)
            .with_hint("The SSH connection failed after retries; the command can be run again")
    } else {
        err
    })
}
