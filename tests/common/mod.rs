//! Shared test utilities: a scripted command runner and config fixtures

use hostprep::data::{CommandResult, CommandSpec, ExecutionOutcome};
use hostprep::{CommandRunner, Config};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Replies keyed by program name. Unscripted programs fail to launch, the
/// same as a tool missing from the host.
#[derive(Default)]
pub struct FakeHost {
    replies: HashMap<String, (CommandResult, String)>,
    calls: RefCell<Vec<String>>,
}

#[allow(dead_code)]
impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, program: &str, stdout: &str) -> Self {
        self.replies
            .insert(program.to_string(), (CommandResult::Success, stdout.to_string()));
        self
    }

    pub fn fail(mut self, program: &str, code: i32) -> Self {
        self.replies
            .insert(program.to_string(), (CommandResult::NonZeroExit(code), String::new()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .count()
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, command: &CommandSpec, _timeout: Duration) -> ExecutionOutcome {
        self.calls.borrow_mut().push(command.to_string());
        match self.replies.get(&command.program) {
            Some((result, stdout)) => ExecutionOutcome {
                command_description: command.description.clone(),
                result: result.clone(),
                stdout: stdout.clone(),
                stderr: String::new(),
            },
            None => ExecutionOutcome::failed(
                &command.description,
                CommandResult::LaunchError(format!("{}: No such file or directory", command.program)),
            ),
        }
    }
}

#[allow(dead_code)]
pub const STEAM_ONLY: &str = r#"
[[component]]
name = "Steam"
group = "platforms"
native = "steam-installer"
sandbox = "com.valvesoftware.Steam"
steps = [{ description = "Installing Steam", argv = ["apt-get", "install", "-y", "steam-installer"] }]
"#;

#[allow(dead_code)]
pub fn config(text: &str) -> Config {
    Config::parse(text, Path::new("fixture.toml")).expect("fixture config parses")
}
