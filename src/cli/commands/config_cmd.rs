//! Configuration management commands.

use crate::cli::icons::{dim_arrow, info};
use crate::config::{Config, Settings};

/// Print the effective settings and where they came from.
pub fn cmd_config_show(settings: &Settings, config: &Config, as_toml: bool) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    eprintln!("{} Config source: {}", info(), source);
    eprintln!(
        "  {} Environment overrides use the AMBIENTMIX_ prefix",
        dim_arrow()
    );

    let rendered = if as_toml {
        toml::to_string_pretty(settings)?
    } else {
        serde_json::to_string_pretty(settings)?
    };
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_render_both_formats() {
        let settings = Settings::default();
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["output"], "mixes.json");
        assert_eq!(json["concurrent_requests"], 24);

        let toml_text = toml::to_string_pretty(&settings).unwrap();
        assert!(toml_text.contains("job_dir = \"persistency\""));
    }
}
