//! Shared helpers for the collectors and the pipeline

pub mod command;
pub mod file;
pub mod parsing;
