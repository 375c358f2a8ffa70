//! Review prompts for an external LLM pass over mix descriptions.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::load_mixes;

pub const DEFAULT_CHUNK_SIZE: usize = 150;

const PROMPT_TEMPLATE: &str = r#"
[noprompt]
[onlyjson]
I have a list of descriptions of audio files. I'd like you to remove descriptions that are not proper English. Please output only the descriptions you have decided to keep. Please format your response as a JSON list of strings. I'll provide the descriptions now:
---
{DESCRIPTIONS}
"#;

/// Fill the template with one quoted description per line.
pub fn render_prompt(descriptions: &[String]) -> String {
    let quoted: Vec<String> = descriptions.iter().map(|d| format!("\"{}\"", d)).collect();
    PROMPT_TEMPLATE.replace("{DESCRIPTIONS}", &quoted.join("\n"))
}

/// Write `<output_dir>/<start>.txt` for every chunk of descriptions.
pub fn write_prompts(mixes: &Path, output_dir: &Path, chunk_size: usize) -> anyhow::Result<Vec<PathBuf>> {
    let descriptions: Vec<String> = load_mixes(mixes)?
        .into_iter()
        .map(|m| m.description)
        .collect();

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let chunk_size = chunk_size.max(1);
    let mut written = Vec::new();
    for (n, chunk) in descriptions.chunks(chunk_size).enumerate() {
        let path = output_dir.join(format!("{}.txt", n * chunk_size));
        std::fs::write(&path, render_prompt(chunk))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_render_prompt() {
        let prompt = render_prompt(&["Rain".to_string(), "Owls at dusk".to_string()]);
        assert!(prompt.ends_with("---\n\"Rain\"\n\"Owls at dusk\"\n"));
        assert!(prompt.contains("[onlyjson]"));
    }

    #[test]
    fn test_write_prompts_chunks() {
        let dir = tempdir().unwrap();
        let mixes = dir.path().join("mixes.json");
        let records: Vec<serde_json::Value> = (0..5)
            .map(|i| serde_json::json!({"title": "t", "description": format!("d{}", i), "mix": {}}))
            .collect();
        std::fs::write(&mixes, serde_json::to_string(&records).unwrap()).unwrap();

        let out = dir.path().join("prompts");
        let written = write_prompts(&mixes, &out, 2).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0.txt", "2.txt", "4.txt"]);
        let last = std::fs::read_to_string(out.join("4.txt")).unwrap();
        assert!(last.contains("\"d4\""));
        assert!(!last.contains("\"d3\""));
    }
}
