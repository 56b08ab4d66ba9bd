//! Package state structures

use std::fmt;

/// Packaging backend that reported a component as installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// dpkg / apt
    NativePackage,
    /// Flatpak
    SandboxedApp,
    None,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::NativePackage => "apt",
            Backend::SandboxedApp => "flatpak",
            Backend::None => "-",
        };
        f.write_str(name)
    }
}

/// Installed/available state of one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageState {
    pub component: String,
    pub backend_used: Backend,
    pub installed: bool,
    pub installed_version: Option<String>,
    pub available_version: Option<String>,
    /// Plain string inequality of the two versions, not version ordering:
    /// an older candidate also counts as an update.
    pub update_available: bool,
}

impl PackageState {
    pub fn not_installed(component: &str) -> Self {
        Self {
            component: component.to_string(),
            backend_used: Backend::None,
            installed: false,
            installed_version: None,
            available_version: None,
            update_available: false,
        }
    }
}
