//! Desktop environment detection

use crate::utils::parsing::capitalize_first_letter;
use std::env;

/// Detect the current desktop environment from the session variables
pub fn detect_desktop_environment() -> String {
    let session = env::var("DESKTOP_SESSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| env::var("XDG_CURRENT_DESKTOP").ok())
        .unwrap_or_default();
    normalize_desktop(&session)
}

/// Map a raw session name onto a display name
pub fn normalize_desktop(raw: &str) -> String {
    let de = raw.to_lowercase();
    let name = if de.contains("gnome") {
        "GNOME"
    } else if de.contains("kde") || de.contains("plasma") {
        "KDE Plasma"
    } else if de.contains("xfce") {
        "XFCE"
    } else if de.contains("cinnamon") {
        "Cinnamon"
    } else if de.contains("mate") {
        "MATE"
    } else if de.contains("pantheon") {
        "Pantheon"
    } else if de.contains("lxde") || de.contains("lxqt") {
        "LXDE/LXQt"
    } else if de.contains("i3") || de.contains("sway") {
        "Tiling WM"
    } else if raw.trim().is_empty() {
        "Unknown"
    } else {
        return capitalize_first_letter(raw.trim());
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sessions_are_normalized() {
        assert_eq!(normalize_desktop("ubuntu:GNOME"), "GNOME");
        assert_eq!(normalize_desktop("plasmawayland"), "KDE Plasma");
        assert_eq!(normalize_desktop("sway"), "Tiling WM");
        assert_eq!(normalize_desktop("hyprland"), "Hyprland");
        assert_eq!(normalize_desktop(""), "Unknown");
    }
}
