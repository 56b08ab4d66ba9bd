//! hostprep library
//!
//! Prepares a Debian-family workstation for gaming: detects the hypervisor and
//! GPU, decides per component what to install and runs the install commands.

pub mod collectors;
pub mod config;
pub mod data;
pub mod decision;
pub mod display;
pub mod environment;
pub mod error;
pub mod interrupt;
pub mod provision;
pub mod session;
pub mod utils;

pub use config::{load_config, Config};
pub use decision::{decide, Confirm, PromptConfirm};
pub use error::{HostprepError, Result};
pub use interrupt::InterruptFlag;
pub use provision::{Detection, InstalledComponent, Provisioner, RunReport};
pub use session::{SessionState, Snapshot};
pub use utils::command::{CommandExecutor, CommandRunner, SystemRunner};
