//! GPU vendor classification

use crate::data::{CommandSpec, GpuClassification, GpuVendor, VmClassification};
use crate::utils::command::{CommandRunner, PROBE_TIMEOUT};
use crate::utils::parsing::{truncate_chars, words};
use tracing::info;

/// Line markers for graphics devices in the PCI listing. Anything else
/// (host bridges, NICs, audio) is ignored before vendor matching.
const CLASS_MARKERS: [&str; 3] = ["vga", "3d", "display"];

/// Embedded hypervisor graphics
const VIRTUAL_MARKERS: [&str; 5] = ["vmware", "virtualbox", "qxl", "virtio", "svga3d"];
const AMD_MARKERS: [&str; 3] = ["amd", "radeon", "ati"];
const INTEL_QUALIFIERS: [&str; 5] = ["graphics", "hd", "iris", "uhd", "arc"];

const CLASS_PREFIXES: [&str; 3] = [
    "vga compatible controller:",
    "3d controller:",
    "display controller:",
];

const MAX_MODEL_LEN: usize = 80;

pub struct GpuClassifier<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> GpuClassifier<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Classify the display hardware. A detected hypervisor short-circuits to
    /// `Virtual` without enumerating devices.
    pub fn classify(&self, vm: &VmClassification) -> GpuClassification {
        if vm.is_virtual() {
            info!("Running in {} VM, GPU handled by guest tools", vm.kind);
            return GpuClassification::new(GpuVendor::Virtual);
        }

        let listing = self
            .runner
            .run(
                &CommandSpec::new("Enumerating PCI devices", "lspci", &[]),
                PROBE_TIMEOUT,
            )
            .output()
            .map(str::to_string)
            .unwrap_or_default();
        let lines = filter_graphics_lines(&listing);
        let renderer = self.renderer();

        info!("GPU detection - lspci graphics lines: {:?}", lines);
        info!("GPU detection - GL renderer: {:?}", renderer);

        let gpu = classify_lines(&lines, renderer.as_deref());
        info!("GPU classified as {}", gpu.vendor);
        gpu
    }

    /// Best-effort OpenGL renderer string
    fn renderer(&self) -> Option<String> {
        let outcome = self.runner.run(
            &CommandSpec::new("Querying OpenGL renderer", "glxinfo", &["-B"]),
            PROBE_TIMEOUT,
        );
        if !outcome.is_success() {
            return None;
        }
        renderer_from_glxinfo(&outcome.stdout)
    }
}

/// Keep only graphics-class lines of an `lspci` listing
pub fn filter_graphics_lines(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            CLASS_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .map(|line| line.trim().to_string())
        .collect()
}

/// Extract the `OpenGL renderer string` line
pub fn renderer_from_glxinfo(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("OpenGL renderer"))
        .map(|line| line.trim().to_string())
}

/// Vendor precedence over already-filtered lines plus an optional renderer
/// string. Pure: the same inputs always give the same classification.
pub fn classify_lines(lines: &[String], renderer: Option<&str>) -> GpuClassification {
    let mut combined = lines.join(" ");
    if let Some(renderer) = renderer {
        combined.push(' ');
        combined.push_str(renderer);
    }
    let combined_lower = combined.to_ascii_lowercase();
    let combined_words: Vec<String> = words(&combined).collect();
    let has_word = |w: &str| combined_words.iter().any(|x| x == w);

    if VIRTUAL_MARKERS.iter().any(|m| combined_lower.contains(m)) {
        return GpuClassification::new(GpuVendor::Virtual);
    }

    if combined_lower.contains("nvidia") {
        return with_model(GpuVendor::Nvidia, lines, |w| w.iter().any(|x| x.contains("nvidia")));
    }

    if AMD_MARKERS.iter().any(|m| has_word(m)) {
        return with_model(GpuVendor::Amd, lines, |w| {
            w.iter().any(|x| AMD_MARKERS.contains(&x.as_str()))
        });
    }

    // Intel alone is too broad (chipsets, NICs); require a graphics qualifier
    if has_word("intel") && INTEL_QUALIFIERS.iter().any(|q| has_word(q)) {
        return with_model(GpuVendor::Intel, lines, |w| w.iter().any(|x| x == "intel"));
    }

    if lines.is_empty() {
        GpuClassification::new(GpuVendor::UnknownNone)
    } else {
        GpuClassification::new(GpuVendor::UnknownGeneric)
    }
}

fn with_model<F>(vendor: GpuVendor, lines: &[String], matches: F) -> GpuClassification
where
    F: Fn(&[String]) -> bool,
{
    let model = lines
        .iter()
        .find(|line| matches(&words(line).collect::<Vec<_>>()))
        .map(|line| extract_model(line));
    GpuClassification { vendor, model }
}

/// Turn `01:00.0 VGA compatible controller: NVIDIA Corporation GA104 [GeForce RTX 3070] (rev a1)`
/// into `NVIDIA Corporation GA104 [GeForce RTX 3070]`
pub fn extract_model(line: &str) -> String {
    let mut rest = line.trim();

    // Drop the PCI slot (`01:00.0`) if present
    if let Some((slot, tail)) = rest.split_once(' ') {
        if slot.contains(':') && slot.contains('.') {
            rest = tail.trim_start();
        }
    }

    let lower = rest.to_ascii_lowercase();
    for prefix in CLASS_PREFIXES {
        if lower.starts_with(prefix) {
            rest = rest[prefix.len()..].trim_start();
            break;
        }
    }

    // Clean up revision info
    let cleaned = rest.split(" (rev ").next().unwrap_or(rest).trim();
    truncate_chars(cleaned, MAX_MODEL_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ProbeSource, VmKind};
    use crate::utils::command::fake::ScriptedRunner;

    const DESKTOP_LSPCI: &str = "\
00:00.0 Host bridge: Intel Corporation 12th Gen Core Processor Host Bridge/DRAM Registers (rev 02)
00:14.3 Network controller: Intel Corporation Alder Lake-S PCH CNVi WiFi (rev 11)
01:00.0 VGA compatible controller: NVIDIA Corporation GA104 [GeForce RTX 3070] (rev a1)
01:00.1 Audio device: NVIDIA Corporation GA104 High Definition Audio Controller (rev a1)
";

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn non_graphics_lines_are_filtered_out() {
        let filtered = filter_graphics_lines(DESKTOP_LSPCI);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].contains("GeForce RTX 3070"));
    }

    #[test]
    fn nvidia_model_is_extracted() {
        let gpu = classify_lines(&filter_graphics_lines(DESKTOP_LSPCI), None);
        assert_eq!(gpu.vendor, GpuVendor::Nvidia);
        assert_eq!(
            gpu.model.as_deref(),
            Some("NVIDIA Corporation GA104 [GeForce RTX 3070]")
        );
    }

    #[test]
    fn amd_takes_precedence_over_intel() {
        let input = lines(&[
            "00:02.0 VGA compatible controller: Intel Corporation UHD Graphics 630",
            "03:00.0 VGA compatible controller: Advanced Micro Devices, Inc. [AMD/ATI] Navi 22 [Radeon RX 6700 XT]",
        ]);
        let first = classify_lines(&input, None);
        let second = classify_lines(&input, None);

        assert_eq!(first.vendor, GpuVendor::Amd);
        assert_eq!(first, second);
        assert!(first.model.unwrap().contains("Radeon RX 6700 XT"));
    }

    #[test]
    fn intel_needs_a_graphics_qualifier() {
        let intel = lines(&["00:02.0 VGA compatible controller: Intel Corporation Iris Xe Graphics (rev 01)"]);
        let gpu = classify_lines(&intel, None);
        assert_eq!(gpu.vendor, GpuVendor::Intel);
        assert_eq!(gpu.model.as_deref(), Some("Intel Corporation Iris Xe Graphics"));

        let bare = lines(&["00:02.0 Display controller: Intel Corporation Device 46a6"]);
        assert_eq!(classify_lines(&bare, None).vendor, GpuVendor::UnknownGeneric);
    }

    #[test]
    fn compatible_does_not_read_as_ati() {
        let unknown = lines(&["00:02.0 VGA compatible controller: Matrox Electronics Systems Ltd. G200eR2"]);
        assert_eq!(classify_lines(&unknown, None).vendor, GpuVendor::UnknownGeneric);
    }

    #[test]
    fn renderer_string_contributes_markers() {
        let generic = lines(&["00:02.0 VGA compatible controller: Device 1234:5678"]);
        let gpu = classify_lines(&generic, Some("OpenGL renderer string: NVIDIA GeForce GTX 1060/PCIe/SSE2"));
        assert_eq!(gpu.vendor, GpuVendor::Nvidia);

        let virt = classify_lines(&generic, Some("OpenGL renderer string: SVGA3D; build: RELEASE"));
        assert_eq!(virt.vendor, GpuVendor::Virtual);
    }

    #[test]
    fn no_graphics_lines_is_unknown_none() {
        assert_eq!(classify_lines(&[], None).vendor, GpuVendor::UnknownNone);
    }

    #[test]
    fn detected_vm_skips_device_enumeration() {
        let runner = ScriptedRunner::new().reply("lspci", DESKTOP_LSPCI);
        let vm = VmClassification {
            kind: VmKind::Vmware,
            source: Some(ProbeSource::DetectVirt),
        };

        let gpu = GpuClassifier::new(&runner).classify(&vm);

        assert_eq!(gpu.vendor, GpuVendor::Virtual);
        assert_eq!(runner.total_calls(), 0);
    }

    #[test]
    fn missing_glxinfo_does_not_fail_classification() {
        let runner = ScriptedRunner::new().reply("lspci", DESKTOP_LSPCI);

        let gpu = GpuClassifier::new(&runner).classify(&VmClassification::bare_metal());

        assert_eq!(gpu.vendor, GpuVendor::Nvidia);
        assert_eq!(runner.calls_to("lspci"), 1);
        assert_eq!(runner.calls_to("glxinfo"), 1);
    }

    #[test]
    fn missing_lspci_is_unknown_none() {
        let runner = ScriptedRunner::new();
        let gpu = GpuClassifier::new(&runner).classify(&VmClassification::bare_metal());
        assert_eq!(gpu.vendor, GpuVendor::UnknownNone);
    }
}
