//! Hypervisor detection
//!
//! Three independent probes are tried in a fixed order and the first
//! definitive answer wins. A probe that cannot run, times out, or sees
//! nothing is inconclusive and the next one is consulted.

use crate::data::{CommandSpec, ProbeSource, VmClassification, VmKind};
use crate::utils::command::{CommandRunner, PROBE_TIMEOUT};
use tracing::{debug, info};

/// Probes in evaluation order
pub const PROBE_ORDER: [ProbeSource; 3] = [
    ProbeSource::DetectVirt,
    ProbeSource::KernelLog,
    ProbeSource::DeviceScan,
];

/// What a single probe concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Definitive(VmKind),
    Inconclusive,
}

pub struct VirtualizationProbe<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> VirtualizationProbe<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn detect(&self) -> VmClassification {
        for source in PROBE_ORDER {
            match self.probe(source) {
                ProbeOutcome::Definitive(kind) => {
                    info!("Virtualization detected by {}: {}", source, kind);
                    return VmClassification {
                        kind,
                        source: Some(source),
                    };
                }
                ProbeOutcome::Inconclusive => debug!("{} inconclusive", source),
            }
        }
        info!("No hypervisor detected");
        VmClassification::bare_metal()
    }

    fn probe(&self, source: ProbeSource) -> ProbeOutcome {
        let command = match source {
            ProbeSource::DetectVirt => {
                CommandSpec::new("Detecting virtualization", "systemd-detect-virt", &[])
            }
            ProbeSource::KernelLog => CommandSpec::new("Scanning kernel log", "dmesg", &[]),
            ProbeSource::DeviceScan => CommandSpec::new("Scanning PCI devices", "lspci", &[]),
        };

        let outcome = self.runner.run(&command, PROBE_TIMEOUT);
        // systemd-detect-virt exits 1 while printing "none"; only the text matters
        let Some(output) = outcome.output() else {
            return ProbeOutcome::Inconclusive;
        };

        match source {
            ProbeSource::DetectVirt => classify_detect_virt(output),
            ProbeSource::KernelLog => classify_kernel_log(output),
            ProbeSource::DeviceScan => classify_device_listing(output),
        }
    }
}

/// Map a `systemd-detect-virt` token onto the canonical set
pub fn classify_detect_virt(output: &str) -> ProbeOutcome {
    let token = output.trim();
    let kind = match token.to_ascii_lowercase().as_str() {
        "" | "none" => return ProbeOutcome::Inconclusive,
        "vmware" => VmKind::Vmware,
        "kvm" => VmKind::Kvm,
        "qemu" => VmKind::Qemu,
        "virtualbox" | "oracle" => VmKind::VirtualBox,
        "microsoft" => VmKind::HyperV,
        "xen" => VmKind::Xen,
        "parallels" => VmKind::Parallels,
        _ => VmKind::Other(token.to_string()),
    };
    ProbeOutcome::Definitive(kind)
}

/// Look for hypervisor vendor names in kernel messages
pub fn classify_kernel_log(output: &str) -> ProbeOutcome {
    let log = output.to_ascii_lowercase();
    if log.contains("vmware") {
        ProbeOutcome::Definitive(VmKind::Vmware)
    } else if log.contains("virtualbox") {
        ProbeOutcome::Definitive(VmKind::VirtualBox)
    } else if log.contains("hypervisor detected") {
        ProbeOutcome::Definitive(VmKind::Other("hypervisor".to_string()))
    } else {
        ProbeOutcome::Inconclusive
    }
}

/// Look for emulated devices in the PCI listing
pub fn classify_device_listing(output: &str) -> ProbeOutcome {
    let listing = output.to_ascii_lowercase();
    if listing.contains("vmware") {
        ProbeOutcome::Definitive(VmKind::Vmware)
    } else if listing.contains("virtualbox") {
        ProbeOutcome::Definitive(VmKind::VirtualBox)
    } else if listing.contains("qxl") || listing.contains("virtio") {
        ProbeOutcome::Definitive(VmKind::Kvm)
    } else {
        ProbeOutcome::Inconclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CommandResult;
    use crate::utils::command::fake::ScriptedRunner;

    #[test]
    fn oracle_tokens_map_onto_canonical_kinds() {
        let cases = [
            ("vmware\n", VmKind::Vmware),
            ("kvm", VmKind::Kvm),
            ("qemu", VmKind::Qemu),
            ("oracle", VmKind::VirtualBox),
            ("microsoft", VmKind::HyperV),
            ("xen", VmKind::Xen),
            ("parallels", VmKind::Parallels),
            ("bochs", VmKind::Other("bochs".to_string())),
        ];
        for (token, kind) in cases {
            assert_eq!(classify_detect_virt(token), ProbeOutcome::Definitive(kind));
        }
        assert_eq!(classify_detect_virt("none\n"), ProbeOutcome::Inconclusive);
        assert_eq!(classify_detect_virt("   "), ProbeOutcome::Inconclusive);
    }

    #[test]
    fn first_definitive_probe_short_circuits() {
        let runner = ScriptedRunner::new()
            .reply("systemd-detect-virt", "kvm\n")
            .reply("dmesg", "Hypervisor detected: VMware")
            .reply("lspci", "00:02.0 VGA compatible controller: VMware SVGA II Adapter");

        let vm = VirtualizationProbe::new(&runner).detect();

        assert_eq!(vm.kind, VmKind::Kvm);
        assert_eq!(vm.source, Some(ProbeSource::DetectVirt));
        assert_eq!(runner.calls_to("systemd-detect-virt"), 1);
        assert_eq!(runner.calls_to("dmesg"), 0);
        assert_eq!(runner.calls_to("lspci"), 0);
    }

    #[test]
    fn none_from_oracle_falls_through_to_kernel_log() {
        let runner = ScriptedRunner::new()
            .reply_with("systemd-detect-virt", CommandResult::NonZeroExit(1), "none\n")
            .reply("dmesg", "[    0.000000] Hypervisor detected: KVM\n")
            .reply("lspci", "");

        let vm = VirtualizationProbe::new(&runner).detect();

        assert_eq!(vm.kind, VmKind::Other("hypervisor".to_string()));
        assert_eq!(vm.source, Some(ProbeSource::KernelLog));
        assert_eq!(runner.calls_to("lspci"), 0);
    }

    #[test]
    fn missing_tools_and_timeouts_are_inconclusive() {
        let runner = ScriptedRunner::new()
            .reply_with("dmesg", CommandResult::TimedOut, "")
            .reply("lspci", "00:01.0 VGA compatible controller: Red Hat, Inc. QXL paravirtual graphic card");

        let vm = VirtualizationProbe::new(&runner).detect();

        assert_eq!(vm.kind, VmKind::Kvm);
        assert_eq!(vm.source, Some(ProbeSource::DeviceScan));
        assert_eq!(runner.total_calls(), 3);
    }

    #[test]
    fn all_inconclusive_means_bare_metal() {
        let runner = ScriptedRunner::new()
            .reply_with("systemd-detect-virt", CommandResult::NonZeroExit(1), "none")
            .reply("dmesg", "usb 1-1: new high-speed USB device")
            .reply("lspci", "01:00.0 VGA compatible controller: NVIDIA Corporation GA104");

        let vm = VirtualizationProbe::new(&runner).detect();

        assert_eq!(vm, VmClassification::bare_metal());
        assert!(!vm.is_virtual());
    }
}
