//! Turning package state plus policy into a per-component decision

use crate::data::{Decision, PackageState, Policy};
use crate::interrupt::InterruptFlag;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const PROMPT_POLL: Duration = Duration::from_millis(25);

/// Blocking yes/no question to the operator
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

/// Line-based prompt over any reader/writer pair (stdin/stdout in production).
///
/// Lines are read on a background thread so the prompt can notice an
/// interrupt while it waits. Re-prompts on unrecognised input. End of input,
/// a read error or an interrupt raised during the question is a "no" for this
/// question only.
pub struct PromptConfirm<W> {
    lines: Receiver<String>,
    output: W,
    interrupt: InterruptFlag,
}

impl PromptConfirm<io::Stdout> {
    pub fn stdio(interrupt: InterruptFlag) -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout()).with_interrupt(interrupt)
    }
}

impl<W: Write> PromptConfirm<W> {
    pub fn new<R: BufRead + Send + 'static>(input: R, output: W) -> Self {
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!("Could not read answer: {}", err);
                        return;
                    }
                }
            }
        });
        Self {
            lines,
            output,
            interrupt: InterruptFlag::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }
}

impl<W: Write> Confirm for PromptConfirm<W> {
    fn confirm(&mut self, question: &str) -> bool {
        // Raised before we asked: leave it for the pipeline to abort on
        if self.interrupt.is_raised() {
            return false;
        }
        loop {
            let _ = write!(self.output, "{} (y/n): ", question);
            let _ = self.output.flush();

            let answer = loop {
                if self.interrupt.take() {
                    let _ = writeln!(self.output);
                    info!("Interrupted, treating \"{}\" as no", question);
                    return false;
                }
                match self.lines.recv_timeout(PROMPT_POLL) {
                    Ok(line) => break line,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        let _ = writeln!(self.output);
                        return false;
                    }
                }
            };

            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => {
                    let _ = writeln!(self.output, "Please answer 'y' or 'n'");
                }
            }
        }
    }
}

/// Prompt shown in interactive mode, derived from the package state
pub fn status_question(label: &str, state: &PackageState) -> String {
    if !state.installed {
        return format!("Install {}?", label);
    }
    match (&state.installed_version, &state.available_version) {
        (Some(installed), Some(available)) if state.update_available => {
            format!("{} {} is installed, update available to {}. Update?", label, installed, available)
        }
        (Some(installed), _) => format!("{} {} is already installed. Reinstall?", label, installed),
        (None, _) => format!("{} is already installed. Reinstall?", label),
    }
}

/// Decide what to do with one component.
///
/// Priority: auto-yes, then dry-run (never prompts), then exactly one
/// operator confirmation.
pub fn decide<C: Confirm + ?Sized>(
    label: &str,
    state: &PackageState,
    policy: &Policy,
    confirm: &mut C,
) -> Decision {
    if policy.auto_yes {
        info!("Auto-installing {}", label);
        return Decision::install(&state.component, "auto-yes");
    }

    if policy.dry_run {
        info!("[DRY RUN] {} [would prompt]", status_question(label, state));
        return Decision::install(&state.component, "dry-run simulation");
    }

    let question = status_question(label, state);
    let intent = match (state.installed, state.update_available) {
        (false, _) => "install",
        (true, true) => "update",
        (true, false) => "reinstall",
    };
    if confirm.confirm(&question) {
        Decision::install(&state.component, format!("operator accepted {}", intent))
    } else {
        Decision::skip(&state.component, format!("operator declined {}", intent))
    }
}
