//! The provisioning pipeline: detect the host, decide each catalog component,
//! apply the decisions.
//!
//! Strictly sequential. A failing step is recorded and the pipeline moves on;
//! nothing is rolled back.

use crate::collectors::system::collect_system_info;
use crate::collectors::{GpuClassifier, PackageStateResolver, VirtualizationProbe};
use crate::config::{ComponentSpec, Config, RepairConfig};
use crate::data::{
    Action, Backend, CommandSpec, Decision, ExecutionOutcome, GpuClassification, Policy,
    SystemInfo, VmClassification,
};
use crate::decision::{decide, Confirm};
use crate::error::HostprepError;
use crate::interrupt::InterruptFlag;
use crate::session::SessionState;
use crate::utils::command::{CommandExecutor, CommandRunner};
use crate::utils::file::move_file;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Everything learned about the host, gathered once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub system: SystemInfo,
    pub vm: VmClassification,
    pub gpu: GpuClassification,
}

/// A component found installed after the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledComponent {
    pub name: String,
    pub backend: Backend,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub detection: Detection,
    pub installed: Vec<InstalledComponent>,
    /// The operator declined to continue on an unsupported distribution
    pub cancelled: bool,
    /// Ctrl-C arrived outside a prompt; the remaining work was skipped
    pub interrupted: bool,
}

pub struct Provisioner<'a, R: CommandRunner, C: Confirm> {
    config: &'a Config,
    policy: Policy,
    runner: &'a R,
    executor: CommandExecutor<&'a R>,
    confirm: C,
    selected: HashSet<String>,
    skip_preflight: bool,
    interrupt: InterruptFlag,
    backup_dir: Option<PathBuf>,
}

impl<'a, R: CommandRunner, C: Confirm> Provisioner<'a, R, C> {
    pub fn new(config: &'a Config, policy: Policy, runner: &'a R, confirm: C) -> Self {
        let executor = CommandExecutor::new(runner, policy.dry_run)
            .with_default_timeout(config.behavior.command_timeout());
        let selected = [&config.drivers, &config.platforms, &config.tools]
            .iter()
            .flat_map(|group| group.select.iter().cloned())
            .collect();
        Self {
            config,
            policy,
            runner,
            executor,
            confirm,
            selected,
            skip_preflight: config.behavior.skip_update,
            interrupt: InterruptFlag::new(),
            backup_dir: None,
        }
    }

    /// Pre-approve components by name, as `--select` does
    pub fn select<I: IntoIterator<Item = String>>(mut self, names: I) -> Self {
        self.selected.extend(names);
        self
    }

    pub fn skip_preflight(mut self, skip: bool) -> Self {
        self.skip_preflight |= skip;
        self
    }

    /// Watch this flag between steps and stop once it is raised
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Where set-aside apt sources are kept
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn confirm(&mut self, question: &str) -> bool {
        self.confirm.confirm(question)
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }

    /// Full run: preflight, detection, then every applicable component
    pub fn run(&mut self, session: &mut SessionState) -> RunReport {
        self.preflight(session);

        let detection = self.detect();
        session.set_distro(&detection.system.distro_name);

        if self.interrupted() {
            warn!("Interrupted, nothing further will be installed");
            return RunReport {
                detection,
                installed: Vec::new(),
                cancelled: false,
                interrupted: true,
            };
        }

        if !detection.system.family.is_debian_based() {
            warn!(
                "{} is not a recognised Debian-based distribution; packages may not resolve",
                detection.system.distro_name
            );
            if self.policy.interactive && !self.confirm.confirm("Continue anyway?") {
                return RunReport {
                    detection,
                    installed: Vec::new(),
                    cancelled: true,
                    interrupted: self.interrupted(),
                };
            }
        }

        self.provision(detection, session)
    }

    pub fn preflight(&self, session: &mut SessionState) {
        if self.skip_preflight {
            info!("Skipping preflight steps as requested");
            return;
        }
        for step in &self.config.preflight.steps {
            if self.interrupted() {
                warn!("Interrupted, skipping the remaining preflight steps");
                return;
            }
            let Some(command) = step.command(None) else {
                continue;
            };
            let outcome = self.execute_step(&command, step.timeout(), session);
            if outcome.is_success() || !step.repair_on_failure || self.interrupted() {
                continue;
            }

            warn!("{} failed, checking for broken repositories", command.description);
            set_aside_sources(
                &self.config.preflight.repair,
                self.backup_dir.as_deref(),
                self.policy.dry_run,
            );
            let retry = CommandSpec {
                description: format!("{} after repository cleanup", command.description),
                ..command
            };
            self.execute_step(&retry, step.timeout(), session);
        }
    }

    fn execute_step(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
        session: &mut SessionState,
    ) -> ExecutionOutcome {
        match timeout {
            Some(timeout) => self.executor.execute_with_timeout(command, timeout, session),
            None => self.executor.execute(command, session),
        }
    }

    /// Host, hypervisor and GPU detection. The hypervisor is probed once and
    /// the result reused for the GPU.
    pub fn detect(&self) -> Detection {
        let system = collect_system_info();
        let vm = VirtualizationProbe::new(self.runner).detect();
        let gpu = GpuClassifier::new(self.runner).classify(&vm);
        Detection { system, vm, gpu }
    }

    /// Decide and apply every applicable component, then report what is installed
    pub fn provision(&mut self, detection: Detection, session: &mut SessionState) -> RunReport {
        let config = self.config;
        let components: Vec<&ComponentSpec> = config
            .components
            .iter()
            .filter(|c| self.is_applicable(c, &detection))
            .collect();
        info!("{} applicable components", components.len());

        let mut interrupted = false;
        for component in &components {
            if self.interrupted() {
                warn!("Interrupted before {}, stopping", component.name);
                interrupted = true;
                break;
            }
            let decision = self.decide_component(component);
            let install = decision.action == Action::Install;
            session.record_decision(decision);
            if install {
                self.apply(component, session);
            }
        }

        let installed = self.installed_summary(session);
        RunReport {
            detection,
            installed,
            cancelled: false,
            interrupted: interrupted || self.interrupted(),
        }
    }

    fn is_applicable(&self, component: &ComponentSpec, detection: &Detection) -> bool {
        if !self.config.group(component.group).enabled {
            return false;
        }
        component
            .requires
            .as_ref()
            .map_or(true, |req| req.is_met(&detection.vm, &detection.gpu))
    }

    fn decide_component(&mut self, component: &ComponentSpec) -> Decision {
        let state = PackageStateResolver::new(self.runner).resolve(
            &component.name,
            component.native.as_deref(),
            component.sandbox.as_deref(),
        );

        if self.selected.contains(&component.name) {
            info!("{} explicitly selected", component.name);
            return Decision::install(&component.name, "explicitly selected");
        }
        decide(component.label(), &state, &self.policy, &mut self.confirm)
    }

    /// Run each install step in order. Later steps run even when an earlier
    /// one failed; the failures are in the ledger.
    fn apply(&self, component: &ComponentSpec, session: &mut SessionState) {
        if component.steps.is_empty() {
            warn!("{} has no install steps configured", component.name);
            return;
        }
        info!("Installing {}", component.label());
        for step in &component.steps {
            if self.interrupted() {
                warn!("Interrupted, remaining {} steps skipped", component.name);
                return;
            }
            let Some(command) = step.command(Some(&component.name)) else {
                continue;
            };
            self.execute_step(&command, step.timeout(), session);
        }
    }

    /// Re-resolve every component this run chose to install
    fn installed_summary(&self, session: &SessionState) -> Vec<InstalledComponent> {
        let resolver = PackageStateResolver::new(self.runner);
        session
            .decisions()
            .iter()
            .filter(|d| d.action == Action::Install)
            .filter_map(|d| self.config.components.iter().find(|c| c.name == d.component))
            .map(|c| resolver.resolve(&c.name, c.native.as_deref(), c.sandbox.as_deref()))
            .filter(|state| state.installed)
            .map(|state| InstalledComponent {
                name: state.component,
                backend: state.backend_used,
                version: state.installed_version,
            })
            .collect()
    }
}

/// Move third-party apt sources matching the repair patterns out of the way
/// as `<name>.broken`, into `backup_dir` when one is given. Returns the new
/// locations; under dry-run nothing moves and the list is empty.
pub fn set_aside_sources(
    repair: &RepairConfig,
    backup_dir: Option<&Path>,
    dry_run: bool,
) -> Vec<PathBuf> {
    let sources_dir = repair.sources_dir();
    let entries = match fs::read_dir(&sources_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Cannot read {}: {}", sources_dir.display(), err);
            return Vec::new();
        }
    };

    let mut matching: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| !name.ends_with(".broken") && repair.matches(name))
        })
        .collect();
    matching.sort();

    let mut moved = Vec::new();
    for source in matching {
        let Some(name) = source.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let target_dir = backup_dir.unwrap_or(&sources_dir);
        let target = target_dir.join(format!("{}.broken", name));
        if dry_run {
            info!("[DRY RUN] would move {} to {}", source.display(), target.display());
            continue;
        }
        let result = fs::create_dir_all(target_dir)
            .map_err(HostprepError::from)
            .and_then(|()| move_file(&source, &target));
        if let Err(err) = result {
            error!("Could not set aside {}: {}", source.display(), err);
            continue;
        }
        info!("Set aside broken repository {} as {}", name, target.display());
        moved.push(target);
    }
    if moved.is_empty() {
        info!("No matching repositories set aside in {}", sources_dir.display());
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CommandResult, GpuVendor};
    use crate::utils::command::fake::ScriptedRunner;

    const CATALOG: &str = r#"
[[preflight.steps]]
description = "Updating package lists"
argv = ["apt-get", "update"]

[[component]]
name = "NVIDIA drivers"
group = "drivers"
native = "nvidia-driver"
requires = { gpu = "nvidia" }
steps = [{ description = "Installing NVIDIA drivers", argv = ["apt-get", "install", "-y", "nvidia-driver"] }]

[[component]]
name = "VirtualBox guest additions"
group = "drivers"
requires = { vm = "virtualbox" }
steps = [{ description = "Installing guest additions", argv = ["apt-get", "install", "-y", "virtualbox-guest-x11"] }]

[[component]]
name = "Steam"
group = "platforms"
native = "steam-installer"

[[component.steps]]
description = "Enabling i386 architecture"
argv = ["dpkg", "--add-architecture", "i386"]

[[component.steps]]
description = "Installing Steam"
argv = ["apt-get", "install", "-y", "steam-installer"]

[[component]]
name = "OBS Studio"
group = "tools"
sandbox = "com.obsproject.Studio"
steps = [{ description = "Installing OBS Studio", argv = ["flatpak", "install", "-y", "flathub", "com.obsproject.Studio"] }]
"#;

    fn catalog(extra: &str) -> Config {
        Config::parse(&format!("{}\n{}", extra, CATALOG), Path::new("test.toml")).unwrap()
    }

    fn nvidia_host() -> Detection {
        Detection {
            system: SystemInfo::default(),
            vm: VmClassification::bare_metal(),
            gpu: GpuClassification::new(GpuVendor::Nvidia),
        }
    }

    fn failing_apt() -> ScriptedRunner {
        ScriptedRunner::new().reply_with("apt-get", CommandResult::NonZeroExit(100), "")
    }

    #[test]
    fn accepted_component_with_failing_step_lands_in_ledger() {
        let config = catalog("[tools]\nenabled = false");
        let runner = failing_apt();
        let mut questions = Vec::new();
        let confirm = |q: &str| {
            questions.push(q.to_string());
            q.contains("Steam")
        };
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(false, false), &runner, confirm)
            .provision(nvidia_host(), &mut session);

        assert_eq!(questions, vec!["Install NVIDIA drivers?", "Install Steam?"]);
        let steam = session
            .decisions()
            .iter()
            .find(|d| d.component == "Steam")
            .unwrap();
        assert_eq!(steam.action, Action::Install);
        assert_eq!(steam.rationale, "operator accepted install");

        // unscripted dpkg fails to launch; the apt step still runs after it
        let failures = session.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.command_description.starts_with("Steam: ")));
        assert_eq!(failures[1].result, CommandResult::NonZeroExit(100));
    }

    #[test]
    fn declined_component_runs_nothing() {
        let config = catalog("[tools]\nenabled = false");
        let runner = failing_apt();
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(false, false), &runner, |_: &str| false)
            .provision(nvidia_host(), &mut session);

        assert_eq!(runner.calls_to("apt-get"), 0);
        assert!(session.failures().is_empty());
        assert!(session.decisions().iter().all(|d| d.action == Action::Skip));
    }

    #[test]
    fn disabled_groups_and_unmet_requirements_are_not_evaluated() {
        let config = catalog("[tools]\nenabled = false");
        let runner = ScriptedRunner::new();
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(false, true), &runner, |_: &str| true)
            .provision(nvidia_host(), &mut session);

        let names: Vec<&str> = session.decisions().iter().map(|d| d.component.as_str()).collect();
        assert_eq!(names, vec!["NVIDIA drivers", "Steam"]);
        assert_eq!(runner.calls_to("flatpak"), 0);
    }

    #[test]
    fn selected_components_skip_the_prompt() {
        let config = catalog("[tools]\nenabled = false");
        let runner = ScriptedRunner::new().reply("apt-get", "").reply("dpkg", "");
        let mut asked = 0;
        let confirm = |_: &str| {
            asked += 1;
            false
        };
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(false, false), &runner, confirm)
            .select(vec!["Steam".to_string()])
            .provision(nvidia_host(), &mut session);

        assert_eq!(asked, 1);
        let steam = &session.decisions()[1];
        assert_eq!(steam.rationale, "explicitly selected");
        assert_eq!(runner.calls_to("apt-get"), 1);
    }

    #[test]
    fn dry_run_decides_everything_and_executes_nothing() {
        let config = catalog("");
        let runner = failing_apt();
        let mut session = SessionState::new();

        let mut provisioner =
            Provisioner::new(&config, Policy::new(false, true), &runner, |_: &str| false);
        provisioner.preflight(&mut session);
        provisioner.provision(nvidia_host(), &mut session);

        assert_eq!(session.decisions().len(), 3);
        assert!(session
            .decisions()
            .iter()
            .all(|d| d.rationale == "dry-run simulation"));
        assert_eq!(runner.calls_to("apt-get"), 0);
        assert!(session.failures().is_empty());
    }

    #[test]
    fn preflight_can_be_skipped() {
        let config = catalog("");
        let runner = failing_apt();
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(true, false), &runner, |_: &str| true)
            .skip_preflight(true)
            .preflight(&mut session);
        assert_eq!(runner.total_calls(), 0);

        Provisioner::new(&config, Policy::new(true, false), &runner, |_: &str| true)
            .preflight(&mut session);
        assert_eq!(runner.calls_to("apt-get"), 1);
        assert_eq!(session.failures()[0].command_description, "Updating package lists");
    }

    #[test]
    fn summary_lists_what_is_installed_after_the_run() {
        let config = catalog("[drivers]\nenabled = false\n[tools]\nenabled = false");
        let runner = ScriptedRunner::new()
            .reply("apt-get", "")
            .reply("dpkg", "ii  steam-installer  1:1.0.0.79~ds-2  amd64  Steam\n")
            .reply("apt-cache", "steam-installer:\n  Installed: 1:1.0.0.79~ds-2\n  Candidate: 1:1.0.0.79~ds-2\n");
        let mut session = SessionState::new();

        let report = Provisioner::new(&config, Policy::new(true, false), &runner, |_: &str| true)
            .provision(nvidia_host(), &mut session);

        assert!(!report.cancelled);
        assert!(!report.interrupted);
        assert_eq!(
            report.installed,
            vec![InstalledComponent {
                name: "Steam".to_string(),
                backend: Backend::NativePackage,
                version: Some("1:1.0.0.79~ds-2".to_string()),
            }]
        );
    }

    fn repairing_preflight(sources: &Path) -> Config {
        let text = format!(
            r#"
[[preflight.steps]]
description = "Updating package lists"
argv = ["apt-get", "update"]
repair_on_failure = true

[preflight.repair]
sources_dir = "{}"
"#,
            sources.display()
        );
        Config::parse(&text, Path::new("test.toml")).unwrap()
    }

    fn sources_dir_with(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), "deb http://example.invalid ./\n").unwrap();
        }
        dir
    }

    #[test]
    fn failed_update_sets_aside_broken_sources_and_retries_once() {
        let sources = sources_dir_with(&["lutris.list", "mangohud-jammy.sources", "steam.list"]);
        let backups = tempfile::tempdir().unwrap();
        let config = repairing_preflight(sources.path());
        let runner = failing_apt();
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(true, false), &runner, |_: &str| true)
            .backup_dir(backups.path())
            .preflight(&mut session);

        assert_eq!(runner.calls_to("apt-get"), 2);
        assert!(sources.path().join("steam.list").exists());
        assert!(!sources.path().join("lutris.list").exists());
        assert!(!sources.path().join("mangohud-jammy.sources").exists());
        assert!(backups.path().join("lutris.list.broken").exists());
        assert!(backups.path().join("mangohud-jammy.sources.broken").exists());

        let described: Vec<&str> = session
            .failures()
            .iter()
            .map(|f| f.command_description.as_str())
            .collect();
        assert_eq!(
            described,
            vec!["Updating package lists", "Updating package lists after repository cleanup"]
        );
    }

    #[test]
    fn successful_update_leaves_sources_alone() {
        let sources = sources_dir_with(&["lutris.list"]);
        let config = repairing_preflight(sources.path());
        let runner = ScriptedRunner::new().reply("apt-get", "");
        let mut session = SessionState::new();

        Provisioner::new(&config, Policy::new(true, false), &runner, |_: &str| true)
            .preflight(&mut session);

        assert_eq!(runner.calls_to("apt-get"), 1);
        assert!(sources.path().join("lutris.list").exists());
    }

    #[test]
    fn without_a_backup_dir_sources_are_kept_beside_the_original() {
        let sources = sources_dir_with(&["Lutris.list", "lutris.list.broken"]);
        let repair = repairing_preflight(sources.path()).preflight.repair;

        assert!(set_aside_sources(&repair, None, true).is_empty());
        assert!(sources.path().join("Lutris.list").exists());

        let moved = set_aside_sources(&repair, None, false);
        assert_eq!(moved, vec![sources.path().join("Lutris.list.broken")]);
        assert!(!sources.path().join("Lutris.list").exists());
        assert!(sources.path().join("lutris.list.broken").exists());
    }

    #[test]
    fn interrupt_outside_a_prompt_stops_before_the_next_component() {
        let config = catalog("[tools]\nenabled = false");
        let runner = failing_apt();
        let flag = InterruptFlag::new();
        let raiser = flag.clone();
        let confirm = move |_: &str| {
            raiser.raise();
            true
        };
        let mut session = SessionState::new();

        let report = Provisioner::new(&config, Policy::new(false, false), &runner, confirm)
            .with_interrupt(flag)
            .provision(nvidia_host(), &mut session);

        assert!(report.interrupted);
        let names: Vec<&str> = session.decisions().iter().map(|d| d.component.as_str()).collect();
        assert_eq!(names, vec!["NVIDIA drivers"]);
        assert_eq!(runner.calls_to("apt-get"), 0);
    }

    #[test]
    fn interrupt_skips_the_remaining_preflight() {
        let config = catalog("");
        let runner = failing_apt();
        let flag = InterruptFlag::new();
        flag.raise();
        let mut session = SessionState::new();

        let mut provisioner =
            Provisioner::new(&config, Policy::new(true, false), &runner, |_: &str| true)
                .with_interrupt(flag);
        provisioner.preflight(&mut session);

        assert!(provisioner.interrupted());
        assert_eq!(runner.total_calls(), 0);
    }
}
