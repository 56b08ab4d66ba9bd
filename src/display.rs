use crate::data::{Decision, ExecutionOutcome};
use crate::provision::{Detection, InstalledComponent};
use crate::utils::parsing::ellipsize;
use unicode_width::UnicodeWidthStr;

const VERSION_WIDTH: usize = 30;

/// Pad by display width so component names with wide glyphs still line up
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(UnicodeWidthStr::width(text));
    format!("{}{}", text, " ".repeat(fill))
}

fn key_width<'a>(keys: impl Iterator<Item = &'a str>) -> usize {
    keys.map(UnicodeWidthStr::width).max().unwrap_or(0)
}

fn section(out: &mut String, title: &str) {
    out.push_str(&format!("\n{}\n{}\n", title, "-".repeat(UnicodeWidthStr::width(title))));
}

pub fn render_detection(detection: &Detection) -> String {
    let system = &detection.system;
    let vm = match &detection.vm.source {
        Some(source) => format!("{} (via {})", detection.vm.kind, source),
        None => detection.vm.kind.to_string(),
    };
    let gpu = match &detection.gpu.model {
        Some(model) => format!("{} - {}", detection.gpu.vendor, model),
        None => detection.gpu.vendor.to_string(),
    };
    let wsl = if system.is_wsl { " (WSL)" } else { "" };

    let rows = [
        ("Distribution", format!("{} {}{}", system.distro_name, system.distro_version, wsl)),
        ("Family", system.family.to_string()),
        ("Kernel", system.kernel_version.clone()),
        ("Architecture", system.architecture.clone()),
        ("Desktop", system.desktop_environment.clone()),
        ("Virtualization", vm),
        ("GPU", gpu),
    ];
    let width = key_width(rows.iter().map(|(k, _)| *k));

    let mut out = String::new();
    section(&mut out, "System");
    for (key, value) in &rows {
        out.push_str(&format!("  {}: {}\n", pad(key, width), value));
    }
    out
}

pub fn render_decisions(decisions: &[Decision]) -> String {
    let mut out = String::new();
    section(&mut out, "Decisions");
    if decisions.is_empty() {
        out.push_str("  (no components evaluated)\n");
        return out;
    }
    let width = key_width(decisions.iter().map(|d| d.component.as_str()));
    for decision in decisions {
        out.push_str(&format!(
            "  {}  {:<7}  {}\n",
            pad(&decision.component, width),
            decision.action.to_string(),
            decision.rationale
        ));
    }
    out
}

pub fn render_installed(installed: &[InstalledComponent]) -> String {
    let mut out = String::new();
    section(&mut out, "Installed");
    if installed.is_empty() {
        out.push_str("  (nothing confirmed installed)\n");
        return out;
    }
    let width = key_width(installed.iter().map(|c| c.name.as_str()));
    for component in installed {
        let version = component.version.as_deref().unwrap_or("unknown");
        out.push_str(&format!(
            "  {}  {:<7}  {}\n",
            pad(&component.name, width),
            component.backend.to_string(),
            ellipsize(version, VERSION_WIDTH)
        ));
    }
    out
}

pub fn render_failures(failures: &[ExecutionOutcome]) -> String {
    let mut out = String::new();
    if failures.is_empty() {
        return out;
    }
    section(&mut out, &format!("Failures ({})", failures.len()));
    for failure in failures {
        out.push_str(&format!("  {}: {}\n", failure.command_description, failure.result));
    }
    out
}

pub fn print_report(detection: &Detection, decisions: &[Decision], installed: &[InstalledComponent]) {
    print!("{}", render_detection(detection));
    print!("{}", render_decisions(decisions));
    print!("{}", render_installed(installed));
}
