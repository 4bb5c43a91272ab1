use crate::config::Server;
use crate::error::{Error, Result};
use serde::Serialize;
use std::cell::RefCell;
use std::process::Command;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }
}

/// Runs a rendered command line on one host.
pub trait Executor {
    fn execute(&self, command: &str) -> CommandOutput;
}

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the server host is localhost/127.0.0.1/::1.
    pub is_local: bool,
    pub max_attempts: u32,
}

impl SshClient {
    pub fn from_server(server: &Server) -> Result<Self> {
        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        server.host.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&server.host);
        if is_local {
            log_status!("ssh", "Server '{}' is localhost, using local execution", server.host);
        }

        Ok(Self {
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            is_local,
            max_attempts: 3,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Never block on prompts or stalled connections mid-deploy.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    fn execute_with_retry(&self, command: &str) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3
        let mut last = CommandOutput::failed(-1, "SSH retry exhausted");

        for attempt in 0..self.max_attempts {
            let result = self.execute_once(command);

            // Only retry on transient connection errors, not command failures
            if result.success
                || attempt + 1 >= self.max_attempts
                || !is_transient_ssh_error(&result)
            {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt + 1,
                self.max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
            last = result;
        }

        last
    }

    fn execute_once(&self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command(command);
        }

        let output = Command::new("ssh")
            .args(self.build_ssh_args(command))
            .output();

        match output {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput::failed(-1, format!("SSH error: {}", e)),
        }
    }
}

impl Executor for SshClient {
    fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command)
    }
}

/// Executes command lines with the local `sh`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn execute(&self, command: &str) -> CommandOutput {
        execute_local_command(command)
    }
}

/// One command a dry run would have sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCommand {
    pub host: String,
    pub command: String,
}

/// Shared record of everything the executors of a dry run were asked to do.
#[derive(Debug, Default, Clone)]
pub struct DryRunLog {
    commands: Rc<RefCell<Vec<PlannedCommand>>>,
}

impl DryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executor(&self, host: impl Into<String>) -> DryRunExecutor {
        DryRunExecutor {
            host: host.into(),
            log: self.clone(),
        }
    }

    pub fn commands(&self) -> Vec<PlannedCommand> {
        self.commands.borrow().clone()
    }
}

/// Records every command and reports success without running anything.
#[derive(Debug)]
pub struct DryRunExecutor {
    host: String,
    log: DryRunLog,
}

impl Executor for DryRunExecutor {
    fn execute(&self, command: &str) -> CommandOutput {
        self.log.commands.borrow_mut().push(PlannedCommand {
            host: self.host.clone(),
            command: command.to_string(),
        });
        CommandOutput::ok("")
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    let output = Command::new("sh").args(["-c", command]).output();

    match output {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::failed(-1, format!("Command error: {}", e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
pub fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(port: u16) -> SshClient {
        SshClient {
            host: "web1.example.com".to_string(),
            user: "deploy".to_string(),
            port,
            identity_file: Some("/home/deploy/.ssh/id_ed25519".to_string()),
            is_local: false,
            max_attempts: 3,
        }
    }

    #[test]
    fn ssh_args_are_batch_mode_with_target_last() {
        let args = client(2222).build_ssh_args("true");

        assert_eq!(&args[..4], ["-i", "/home/deploy/.ssh/id_ed25519", "-p", "2222"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@web1.example.com");
        assert_eq!(args[args.len() - 1], "true");
    }

    #[test]
    fn default_port_is_omitted() {
        let args = client(22).build_ssh_args("true");
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn localhost_detection() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("web1"));
    }

    #[test]
    fn transient_errors_are_connection_level_only() {
        assert!(is_transient_ssh_error(&CommandOutput::failed(255, "")));
        assert!(is_transient_ssh_error(&CommandOutput::failed(
            1,
            "ssh: connect to host web1: Connection refused"
        )));
        assert!(!is_transient_ssh_error(&CommandOutput::failed(
            1,
            "chmod: Operation not permitted"
        )));
    }

    #[test]
    fn local_executor_captures_exit_status() {
        let ok = LocalExecutor.execute("echo hi");
        assert!(ok.success);
        assert_eq!(ok.stdout.trim(), "hi");

        let failed = LocalExecutor.execute("exit 3");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 3);
    }

    #[test]
    fn dry_run_records_in_order_across_hosts() {
        let log = DryRunLog::new();
        log.executor("web1").execute("a");
        log.executor("web2").execute("b");

        let commands = log.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].host, "web1");
        assert_eq!(commands[1].command, "b");
    }

    #[test]
    fn missing_identity_file_is_an_error() {
        let mut server = Server::new("web1", "deploy");
        server.identity_file = Some("/nonexistent/sfdeploy/key".to_string());
        let err = SshClient::from_server(&server).err().unwrap();
        assert_eq!(err.code.as_str(), "ssh.identity_file_not_found");
    }
}
