//! Typed remote command builder.
//!
//! Commands are built from explicit argument vectors and only turned into a
//! shell string at the very end, with every word quoted. Callers never
//! concatenate configuration values into shell text themselves.

use serde::Serialize;
use std::fmt;

use crate::utils::shell;

/// One program invocation: `NAME=value ... program arg ...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            env: Vec::new(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for this invocation only.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(shell::is_env_name(&name), "invalid env name: {}", name);
        self.env.push((name, value.into()));
        self
    }

    fn render(&self) -> String {
        let mut words = Vec::with_capacity(self.env.len() + self.args.len() + 1);
        for (name, value) in &self.env {
            words.push(format!("{}={}", name, shell::quote_arg(value)));
        }
        words.push(shell::quote_arg(&self.program));
        words.extend(self.args.iter().map(|a| shell::quote_arg(a)));
        words.join(" ")
    }
}

/// How a step is joined to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    /// `&&`: run only if the previous step succeeded.
    And,
    /// `;`: run regardless of the previous step.
    Then,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub chain: Chain,
    pub invocation: Invocation,
}

/// A complete command line sent to a host: an optional working directory
/// followed by one or more chained invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    pub first: Invocation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rest: Vec<Step>,
}

impl RemoteCommand {
    pub fn new(first: Invocation) -> Self {
        Self {
            working_dir: None,
            first,
            rest: Vec::new(),
        }
    }

    /// Prefix the command with `cd <dir> &&`.
    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn and_then(mut self, invocation: Invocation) -> Self {
        self.rest.push(Step {
            chain: Chain::And,
            invocation,
        });
        self
    }

    pub fn then(mut self, invocation: Invocation) -> Self {
        self.rest.push(Step {
            chain: Chain::Then,
            invocation,
        });
        self
    }

    /// All invocations in execution order.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|s| &s.invocation))
    }

    /// Render to a single `sh` command line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(dir) = &self.working_dir {
            out.push_str("cd ");
            out.push_str(&shell::quote_arg(dir));
            out.push_str(" && ");
        }
        out.push_str(&self.first.render());
        for step in &self.rest {
            out.push_str(match step.chain {
                Chain::And => " && ",
                Chain::Then => "; ",
            });
            out.push_str(&step.invocation.render());
        }
        out
    }
}

impl From<Invocation> for RemoteCommand {
    fn from(invocation: Invocation) -> Self {
        Self::new(invocation)
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
