//! User agent handling for HTTP requests.

/// Identifying agent sent by default. The mix site serves its regular markup
/// to this Android WebView string.
pub const USER_AGENT: &str = "Dalvik/2.1.0 (Linux; U; Android 9; Standard PC (i440FX + PIIX, 1996) Build/PI [Android Fronteir 6.3.2)";

/// The configured agent, or [`USER_AGENT`] when none (or a blank one) is set.
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim) {
        Some(custom) if !custom.is_empty() => custom.to_string(),
        _ => USER_AGENT.to_string(),
    }
}
