//! Coarse device metadata derived from a `User-Agent` header.
//!
//! Stored alongside each session so users can recognise their logins in
//! the active-session list. This is display metadata only; it plays no part
//! in identifying the current session.

use std::collections::BTreeMap;

/// Free-form key/value device metadata as stored in `user_sessions.device_info`.
pub type DeviceInfo = BTreeMap<String, String>;

const UNKNOWN: &str = "Unknown";

/// Derive `browser`, `os`, `device` (and `raw`) from a user agent string.
///
/// A missing user agent yields all three keys set to `"Unknown"`.
pub fn parse_user_agent(user_agent: Option<&str>) -> DeviceInfo {
    let mut info = DeviceInfo::new();

    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        info.insert("browser".into(), UNKNOWN.into());
        info.insert("os".into(), UNKNOWN.into());
        info.insert("device".into(), UNKNOWN.into());
        return info;
    };

    // Edge and Chrome both advertise "Chrome"; Chrome and Safari both
    // advertise "Safari". Order matters.
    let browser = if ua.contains("Edg") {
        "Edge"
    } else if ua.contains("Chrome") {
        "Chrome"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Safari") {
        "Safari"
    } else {
        UNKNOWN
    };

    let os = if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        "iOS"
    } else if ua.contains("Mac OS") || ua.contains("macOS") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        UNKNOWN
    };

    let device = if ua.contains("Tablet") || ua.contains("iPad") {
        "Tablet"
    } else if ua.contains("Mobile") || ua.contains("Android") {
        "Mobile"
    } else {
        "Desktop"
    };

    info.insert("browser".into(), browser.into());
    info.insert("os".into(), os.into());
    info.insert("device".into(), device.into());
    info.insert("raw".into(), ua.into());
    info
}
