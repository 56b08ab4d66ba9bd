//! Data structures shared by the collectors, the decision engine and the session

pub mod decision;
pub mod execution;
pub mod hardware;
pub mod package;
pub mod system;

pub use decision::{Action, Decision, Policy};
pub use execution::{CommandResult, CommandSpec, ExecutionOutcome};
pub use hardware::{GpuClassification, GpuVendor, ProbeSource, VmClassification, VmKind};
pub use package::{Backend, PackageState};
pub use system::{DistroFamily, SystemInfo};
