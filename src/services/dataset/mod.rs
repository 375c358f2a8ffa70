//! Dataset tools: turn scraped mixes into an instruction-tuning dataset and
//! curate it.

pub mod clean;
pub mod convert;
pub mod prompts;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;

use crate::models::{Conversation, MixRecord};

pub use clean::{clean_dataset, parse_concatenated, resume_index, CleanError, CleanSummary, Reviewer};
pub use convert::{convert, convert_file, ConvertOptions, ConvertSummary};
pub use prompts::{render_prompt, write_prompts, DEFAULT_CHUNK_SIZE};

/// Load a scraped mixes file (a JSON array of records).
pub fn load_mixes(path: &Path) -> anyhow::Result<Vec<MixRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid mixes file {}", path.display()))
}

/// Write conversations as JSON Lines.
pub fn write_jsonl(path: &Path, conversations: &[Conversation]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for conversation in conversations {
        serde_json::to_writer(&mut writer, conversation)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
