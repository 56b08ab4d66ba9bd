//! Package state across the native (dpkg/apt) and sandboxed (Flatpak) backends

use crate::data::{Backend, CommandSpec, PackageState};
use crate::utils::command::{CommandRunner, PROBE_TIMEOUT};
use crate::utils::parsing::find_field;
use tracing::debug;

pub struct PackageStateResolver<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> PackageStateResolver<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Resolve installed/available state for one component.
    ///
    /// The native backend wins when it reports the package installed; Flatpak
    /// is only asked when it does not. Query failures read as "not installed".
    pub fn resolve(
        &self,
        component: &str,
        native_name: Option<&str>,
        sandbox_id: Option<&str>,
    ) -> PackageState {
        if let Some(package) = native_name {
            if let Some(installed_version) = self.native_installed(package) {
                let installed_version = installed_version.or_else(|| self.native_version(package));
                let available_version = self.native_candidate(package);
                return finish(
                    component,
                    Backend::NativePackage,
                    installed_version,
                    available_version,
                );
            }
        }

        if let Some(app_id) = sandbox_id {
            if self.sandbox_installed(app_id) {
                let installed_version = self.sandbox_version(app_id);
                return finish(component, Backend::SandboxedApp, installed_version, None);
            }
        }

        debug!("{} is not installed", component);
        PackageState::not_installed(component)
    }

    fn query(&self, description: &str, program: &str, args: &[&str]) -> Option<String> {
        let outcome = self
            .runner
            .run(&CommandSpec::new(description, program, args), PROBE_TIMEOUT);
        outcome.is_success().then_some(outcome.stdout)
    }

    /// `Some(version)` when dpkg lists the package as `ii`; the version is
    /// `None` if the row carried none
    fn native_installed(&self, package: &str) -> Option<Option<String>> {
        let listing = self.query("Checking package status", "dpkg", &["-l", package])?;
        parse_dpkg_status(&listing, package)
    }

    fn native_version(&self, package: &str) -> Option<String> {
        let out = self.query(
            "Reading installed version",
            "dpkg-query",
            &["-W", "-f=${Version}", package],
        )?;
        let version = out.trim();
        (!version.is_empty()).then(|| version.to_string())
    }

    fn native_candidate(&self, package: &str) -> Option<String> {
        let policy = self.query("Reading candidate version", "apt-cache", &["policy", package])?;
        parse_candidate(&policy)
    }

    fn sandbox_installed(&self, app_id: &str) -> bool {
        self.query(
            "Listing Flatpak apps",
            "flatpak",
            &["list", "--app", "--columns=application"],
        )
        .map(|list| flatpak_list_contains(&list, app_id))
        .unwrap_or(false)
    }

    fn sandbox_version(&self, app_id: &str) -> Option<String> {
        let info = self.query("Reading Flatpak version", "flatpak", &["info", app_id])?;
        find_field(&info, "Version:")
    }
}

fn finish(
    component: &str,
    backend: Backend,
    installed_version: Option<String>,
    available_version: Option<String>,
) -> PackageState {
    let update_available = matches!(
        (&installed_version, &available_version),
        (Some(installed), Some(available)) if installed != available
    );
    PackageState {
        component: component.to_string(),
        backend_used: backend,
        installed: true,
        installed_version,
        available_version,
        update_available,
    }
}

/// Find the `ii` row for `package` in `dpkg -l` output.
///
/// Rows look like `ii  steam-installer  1:1.0.0.79~ds-2  amd64  Installer for...`;
/// the name column may carry an `:arch` suffix.
pub fn parse_dpkg_status(listing: &str, package: &str) -> Option<Option<String>> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let status = fields.next()?;
        let name = fields.next()?;
        let base_name = name.split(':').next().unwrap_or(name);
        if status != "ii" || base_name != package {
            return None;
        }
        Some(fields.next().filter(|v| *v != "<none>").map(str::to_string))
    })
}

/// `Candidate:` line of `apt-cache policy`; `(none)` means nothing installable
pub fn parse_candidate(policy: &str) -> Option<String> {
    find_field(policy, "Candidate:").filter(|candidate| candidate != "(none)")
}

pub fn flatpak_list_contains(list: &str, app_id: &str) -> bool {
    list.lines()
        .flat_map(|line| line.split_whitespace())
        .any(|field| field == app_id)
}
