//! Host operating system detection

use crate::collectors::desktop::detect_desktop_environment;
use crate::data::{DistroFamily, SystemInfo};
use crate::utils::file::{file_exists, parse_key_values, read_file_safe, read_first_line};
use std::collections::HashMap;
use tracing::{info, warn};

const OS_RELEASE: &str = "/etc/os-release";
const KERNEL_RELEASE: &str = "/proc/sys/kernel/osrelease";
const WSL_INTEROP: &str = "/proc/sys/fs/binfmt_misc/WSLInterop";

/// Collect OS-related information. Missing sources leave `Unknown` fields.
pub fn collect_system_info() -> SystemInfo {
    let os_release = match read_file_safe(OS_RELEASE) {
        Ok(content) => parse_key_values(&content),
        Err(err) => {
            warn!("Could not read {}: {}", OS_RELEASE, err);
            HashMap::new()
        }
    };

    let mut info = system_info_from_os_release(&os_release);
    info.kernel_version =
        read_first_line(KERNEL_RELEASE).unwrap_or_else(|_| "Unknown".to_string());
    info.architecture = std::env::consts::ARCH.to_string();
    info.desktop_environment = detect_desktop_environment();
    info.is_wsl = file_exists(WSL_INTEROP);

    info!(
        "System detection complete: {} {} ({})",
        info.distro_name, info.distro_version, info.family
    );
    info
}

pub fn system_info_from_os_release(os_release: &HashMap<String, String>) -> SystemInfo {
    let field = |key: &str, default: &str| {
        os_release
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };
    SystemInfo {
        distro_name: field("NAME", "Unknown"),
        distro_version: field("VERSION_ID", "Unknown"),
        distro_id: field("ID", "unknown"),
        family: detect_distro_family(os_release),
        ..SystemInfo::default()
    }
}

/// Specific derivatives first, then ubuntu, then debian (which also look at ID_LIKE)
pub fn detect_distro_family(os_release: &HashMap<String, String>) -> DistroFamily {
    let lower = |key: &str| os_release.get(key).map(|v| v.to_lowercase()).unwrap_or_default();
    let name = lower("NAME");
    let id = lower("ID");
    let id_like = lower("ID_LIKE");
    let named = |needle: &str| name.contains(needle) || id.contains(needle);

    if named("mint") {
        DistroFamily::Mint
    } else if named("kali") {
        DistroFamily::Kali
    } else if named("pop") {
        DistroFamily::PopOs
    } else if named("elementary") {
        DistroFamily::Elementary
    } else if named("zorin") {
        DistroFamily::Zorin
    } else if named("ubuntu") || id_like.contains("ubuntu") {
        DistroFamily::Ubuntu
    } else if named("debian") || id_like.contains("debian") {
        DistroFamily::Debian
    } else {
        DistroFamily::Unknown
    }
}
