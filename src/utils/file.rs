//! File reading utilities

use crate::error::{HostprepError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Safely read a file to string with error handling
pub fn read_file_safe<P: AsRef<Path>>(path: P) -> Result<String> {
    fs::read_to_string(path).map_err(HostprepError::from)
}

/// Read first line of a file, trimmed
pub fn read_first_line<P: AsRef<Path>>(path: P) -> Result<String> {
    let content = read_file_safe(path)?;
    Ok(content.lines().next().unwrap_or("").trim().to_string())
}

/// Check if a file exists safely
pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}

/// Parse `KEY=value` / `KEY="value"` lines as found in /etc/os-release
pub fn parse_key_values(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(key, value)| (key.to_string(), value.trim().trim_matches('"').to_string()))
        .collect()
}

/// Move a file, copying across filesystems when a rename is not possible
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}
