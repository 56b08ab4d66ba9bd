//! Detectors: host system, hypervisor, GPU and package state

pub mod desktop;
pub mod gpu;
pub mod packages;
pub mod system;
pub mod virtualization;

pub use gpu::GpuClassifier;
pub use packages::PackageStateResolver;
pub use virtualization::{ProbeOutcome, VirtualizationProbe};
