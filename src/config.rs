//! TOML configuration: run behaviour, per-area selections and the component catalog

use crate::data::{CommandSpec, GpuClassification, Policy, VmClassification};
use crate::error::{HostprepError, Result};
use dirs::config_dir;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const SYSTEM_CONFIG: &str = "/usr/share/hostprep/config.toml";

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub behavior: BehaviorConfig,
    pub drivers: GroupConfig,
    pub platforms: GroupConfig,
    pub tools: GroupConfig,
    pub preflight: PreflightConfig,
    #[serde(rename = "component")]
    pub components: Vec<ComponentSpec>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BehaviorConfig {
    pub auto_yes: bool,
    pub dry_run: bool,
    pub skip_update: bool,
    pub command_timeout_secs: u64,
    pub state_dir: Option<String>,
    pub reboot_when_done: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            auto_yes: false,
            dry_run: false,
            skip_update: false,
            command_timeout_secs: 300,
            state_dir: None,
            reboot_when_done: false,
        }
    }
}

impl BehaviorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn state_dir(&self) -> Option<PathBuf> {
        self.state_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }
}

/// Switches for one feature area
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GroupConfig {
    /// A disabled area is not evaluated at all
    pub enabled: bool,
    /// Components installed without asking
    pub select: Vec<String>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            select: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PreflightConfig {
    pub steps: Vec<StepSpec>,
    pub repair: RepairConfig,
}

/// Third-party apt sources set aside when a repairable step fails
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RepairConfig {
    pub sources_dir: String,
    /// Case-insensitive file name fragments
    pub patterns: Vec<String>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            sources_dir: "/etc/apt/sources.list.d".to_string(),
            patterns: vec!["lutris".to_string(), "mangohud".to_string()],
        }
    }
}

impl RepairConfig {
    pub fn sources_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sources_dir).into_owned())
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && name.contains(&pattern.to_lowercase()))
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Drivers,
    Platforms,
    Tools,
}

/// Hardware a driver component is meant for
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// GPU vendor slug: nvidia, amd, intel, virtual, unknown_generic, unknown_none
    Gpu(String),
    /// Hypervisor slug: vmware, virtualbox, kvm, qemu, hyperv, xen, parallels, other
    Vm(String),
    AnyVm,
    Physical,
}

impl Requirement {
    pub fn is_met(&self, vm: &VmClassification, gpu: &GpuClassification) -> bool {
        match self {
            Requirement::Gpu(vendor) => vendor.eq_ignore_ascii_case(gpu.vendor.slug()),
            Requirement::Vm(kind) => vm.is_virtual() && kind.eq_ignore_ascii_case(vm.kind.slug()),
            Requirement::AnyVm => vm.is_virtual(),
            Requirement::Physical => !vm.is_virtual(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub description: String,
    pub argv: Vec<String>,
    pub timeout_secs: Option<u64>,
    /// Set aside broken third-party sources and retry once on failure
    #[serde(default)]
    pub repair_on_failure: bool,
}

impl StepSpec {
    pub fn command(&self, component: Option<&str>) -> Option<CommandSpec> {
        let description = match component {
            Some(name) => format!("{}: {}", name, self.description),
            None => self.description.clone(),
        };
        CommandSpec::from_argv(description, &self.argv)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// One optional software component
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub group: Group,
    /// Prompt label when it differs from the name
    pub label: Option<String>,
    /// dpkg package name
    pub native: Option<String>,
    /// Flatpak application id
    pub sandbox: Option<String>,
    pub requires: Option<Requirement>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl ComponentSpec {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

impl Config {
    pub fn parse(data: &str, path: &Path) -> Result<Config> {
        let config: Config = toml::de::from_str(data).map_err(|source| HostprepError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for component in &self.components {
            if !seen.insert(component.name.as_str()) {
                return Err(HostprepError::Config(format!(
                    "component '{}' is defined twice",
                    component.name
                )));
            }
            if let Some(step) = component.steps.iter().find(|s| s.argv.is_empty()) {
                return Err(HostprepError::Config(format!(
                    "component '{}': step '{}' has an empty argv",
                    component.name, step.description
                )));
            }
        }
        if let Some(step) = self.preflight.steps.iter().find(|s| s.argv.is_empty()) {
            return Err(HostprepError::Config(format!(
                "preflight step '{}' has an empty argv",
                step.description
            )));
        }
        Ok(())
    }

    pub fn group(&self, group: Group) -> &GroupConfig {
        match group {
            Group::Drivers => &self.drivers,
            Group::Platforms => &self.platforms,
            Group::Tools => &self.tools,
        }
    }

    /// Resolve the run policy: CLI switches OR the `[behavior]` defaults
    pub fn policy(&self, yes: bool, dry_run: bool) -> Policy {
        Policy::new(yes || self.behavior.auto_yes, dry_run || self.behavior.dry_run)
    }
}

fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("hostprep/config.toml"))
}

/// Seed the user config from the system-wide default the first time round
pub fn ensure_user_config_exists() -> Result<()> {
    let Some(user_config_path) = user_config_path() else {
        return Ok(());
    };
    if user_config_path.exists() || !Path::new(SYSTEM_CONFIG).exists() {
        return Ok(());
    }
    if let Some(parent) = user_config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(SYSTEM_CONFIG, &user_config_path)?;
    info!("Created config at {}", user_config_path.display());
    Ok(())
}

/// Load the config: explicit path, else the user config, else the system one.
/// With no file anywhere the defaults (empty catalog) are used.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config_path = match explicit {
        Some(path) => PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned()),
        None => match user_config_path().filter(|p| p.exists()) {
            Some(path) => path,
            None => PathBuf::from(SYSTEM_CONFIG),
        },
    };

    if explicit.is_none() && !config_path.exists() {
        warn!("No config file found, continuing with an empty catalog");
        return Ok(Config::default());
    }

    let config_data = fs::read_to_string(&config_path)?;
    info!("Using config {}", config_path.display());
    Config::parse(&config_data, &config_path)
}
