//! Hardware classification structures

use std::fmt;

/// Hypervisor hosting this machine, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmKind {
    Vmware,
    VirtualBox,
    Kvm,
    Qemu,
    HyperV,
    Xen,
    Parallels,
    /// A hypervisor we have no canonical name for; keeps the raw token
    Other(String),
    None,
}

impl VmKind {
    /// Lowercase identifier used by catalog `requires` clauses
    pub fn slug(&self) -> &str {
        match self {
            VmKind::Vmware => "vmware",
            VmKind::VirtualBox => "virtualbox",
            VmKind::Kvm => "kvm",
            VmKind::Qemu => "qemu",
            VmKind::HyperV => "hyperv",
            VmKind::Xen => "xen",
            VmKind::Parallels => "parallels",
            VmKind::Other(_) => "other",
            VmKind::None => "none",
        }
    }

    pub fn is_virtual(&self) -> bool {
        !matches!(self, VmKind::None)
    }
}

impl fmt::Display for VmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmKind::Vmware => write!(f, "VMware"),
            VmKind::VirtualBox => write!(f, "VirtualBox"),
            VmKind::Kvm => write!(f, "KVM"),
            VmKind::Qemu => write!(f, "QEMU"),
            VmKind::HyperV => write!(f, "Hyper-V"),
            VmKind::Xen => write!(f, "Xen"),
            VmKind::Parallels => write!(f, "Parallels"),
            VmKind::Other(raw) => write!(f, "{}", raw),
            VmKind::None => write!(f, "none"),
        }
    }
}

/// Which virtualization probe produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSource {
    /// `systemd-detect-virt`
    DetectVirt,
    /// Kernel ring buffer (`dmesg`)
    KernelLog,
    /// PCI device listing (`lspci`)
    DeviceScan,
}

impl fmt::Display for ProbeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeSource::DetectVirt => "systemd-detect-virt",
            ProbeSource::KernelLog => "dmesg",
            ProbeSource::DeviceScan => "lspci",
        };
        f.write_str(name)
    }
}

/// Result of virtualization detection; computed once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmClassification {
    pub kind: VmKind,
    /// `None` when every probe was inconclusive
    pub source: Option<ProbeSource>,
}

impl VmClassification {
    pub fn bare_metal() -> Self {
        Self {
            kind: VmKind::None,
            source: None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.kind.is_virtual()
    }
}

/// Display hardware vendor, listed in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Virtual,
    Nvidia,
    Amd,
    Intel,
    /// Graphics devices were found but no vendor marker matched
    UnknownGeneric,
    /// No graphics device lines at all
    UnknownNone,
}

impl GpuVendor {
    pub fn slug(&self) -> &'static str {
        match self {
            GpuVendor::Virtual => "virtual",
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Intel => "intel",
            GpuVendor::UnknownGeneric => "unknown_generic",
            GpuVendor::UnknownNone => "unknown_none",
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuVendor::Virtual => "Virtual",
            GpuVendor::Nvidia => "NVIDIA",
            GpuVendor::Amd => "AMD",
            GpuVendor::Intel => "Intel",
            GpuVendor::UnknownGeneric => "Unknown (generic)",
            GpuVendor::UnknownNone => "None detected",
        };
        f.write_str(name)
    }
}

/// GPU information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuClassification {
    pub vendor: GpuVendor,
    pub model: Option<String>,
}

impl GpuClassification {
    pub fn new(vendor: GpuVendor) -> Self {
        Self {
            vendor,
            model: None,
        }
    }
}
