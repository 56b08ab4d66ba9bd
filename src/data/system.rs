//! Operating system information structures

use std::fmt;

/// Debian-derived distribution families we recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    Ubuntu,
    Mint,
    Kali,
    PopOs,
    Elementary,
    Zorin,
    Unknown,
}

impl DistroFamily {
    pub fn is_debian_based(&self) -> bool {
        !matches!(self, DistroFamily::Unknown)
    }
}

impl fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistroFamily::Debian => "debian",
            DistroFamily::Ubuntu => "ubuntu",
            DistroFamily::Mint => "mint",
            DistroFamily::Kali => "kali",
            DistroFamily::PopOs => "popos",
            DistroFamily::Elementary => "elementary",
            DistroFamily::Zorin => "zorin",
            DistroFamily::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Operating system related information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub distro_name: String,
    pub distro_version: String,
    pub distro_id: String,
    pub family: DistroFamily,
    pub kernel_version: String,
    pub architecture: String,
    pub desktop_environment: String,
    pub is_wsl: bool,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            distro_name: "Unknown".to_string(),
            distro_version: "Unknown".to_string(),
            distro_id: "unknown".to_string(),
            family: DistroFamily::Unknown,
            kernel_version: "Unknown".to_string(),
            architecture: "Unknown".to_string(),
            desktop_environment: "Unknown".to_string(),
            is_wsl: false,
        }
    }
}
