//! Command descriptions and their classified outcomes

use std::fmt;

/// An external command plus the human-readable description used in logs
/// and in the failure ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub description: String,
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(description: impl Into<String>, program: &str, args: &[&str]) -> Self {
        Self {
            description: description.into(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Build from an argv vector; `None` when the vector is empty
    pub fn from_argv(description: impl Into<String>, argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            description: description.into(),
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Classification of a single command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    NonZeroExit(i32),
    TimedOut,
    /// The process never started (missing executable, permissions, ...)
    LaunchError(String),
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Success => f.write_str("success"),
            CommandResult::NonZeroExit(code) => write!(f, "exit code {}", code),
            CommandResult::TimedOut => f.write_str("timed out"),
            CommandResult::LaunchError(msg) => write!(f, "launch error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub command_description: String,
    pub result: CommandResult,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn success(description: &str, stdout: String, stderr: String) -> Self {
        Self {
            command_description: description.to_string(),
            result: CommandResult::Success,
            stdout,
            stderr,
        }
    }

    pub fn failed(description: &str, result: CommandResult) -> Self {
        Self {
            command_description: description.to_string(),
            result,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == CommandResult::Success
    }

    /// Stdout when the command ran at all, whatever its exit code.
    /// Several probes (systemd-detect-virt, dpkg -l) report through stdout
    /// while exiting non-zero.
    pub fn output(&self) -> Option<&str> {
        match self.result {
            CommandResult::Success | CommandResult::NonZeroExit(_) => Some(&self.stdout),
            CommandResult::TimedOut | CommandResult::LaunchError(_) => None,
        }
    }
}
