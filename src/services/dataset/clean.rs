//! Interactive keep/drop review of a conversation dataset.
//!
//! The output is rewritten after every decision, so a review can stop at any
//! point and continue later with `resume`.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use super::write_jsonl;
use crate::models::Conversation;

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("last checkpoint entry does not appear in the dataset")]
    CheckpointMismatch,
}

/// Decides whether a conversation stays.
pub trait Reviewer {
    fn keep(&mut self, position: usize, total: usize, conversation: &Conversation) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct CleanSummary {
    pub reviewed: usize,
    pub kept: usize,
    /// Entries carried over from an earlier session.
    pub checkpoint: usize,
}

/// Parse back-to-back JSON values (JSON Lines or simply concatenated).
pub fn parse_concatenated<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, serde_json::Error> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<T>()
        .collect()
}

/// Index of the first dataset entry that still needs review.
///
/// Review continues after the dataset entry equal to the last kept one.
pub fn resume_index(dataset: &[Conversation], checkpoint: &[Conversation]) -> Result<usize, CleanError> {
    let Some(last) = checkpoint.last() else {
        return Ok(0);
    };
    dataset
        .iter()
        .position(|c| c == last)
        .map(|i| i + 1)
        .ok_or(CleanError::CheckpointMismatch)
}

fn read_conversations(path: &Path) -> anyhow::Result<Vec<Conversation>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_concatenated(&text).with_context(|| format!("Invalid dataset {}", path.display()))
}

pub fn clean_dataset(
    input: &Path,
    output: &Path,
    resume: bool,
    reviewer: &mut dyn Reviewer,
) -> anyhow::Result<CleanSummary> {
    let dataset = read_conversations(input)?;

    let mut kept = Vec::new();
    let mut start = 0;
    if resume && output.exists() {
        kept = read_conversations(output)?;
        start = resume_index(&dataset, &kept)?;
    }

    let remaining = &dataset[start..];
    info!(
        "Loaded {} conversations. Checkpoint has {}",
        remaining.len(),
        kept.len()
    );

    let mut summary = CleanSummary {
        checkpoint: kept.len(),
        ..Default::default()
    };
    for (i, conversation) in remaining.iter().enumerate() {
        if reviewer.keep(i + 1, remaining.len(), conversation)? {
            kept.push(conversation.clone());
            summary.kept += 1;
        }
        summary.reviewed += 1;
        write_jsonl(output, &kept)?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Role};
    use tempfile::tempdir;

    fn conversation(text: &str) -> Conversation {
        Conversation {
            messages: vec![
                Message::new(Role::User, text),
                Message::new(Role::Assistant, "[]"),
            ],
        }
    }

    /// Keeps conversations whose preview is in `keep`, and records what it saw.
    struct Scripted {
        keep: Vec<&'static str>,
        seen: Vec<String>,
    }

    impl Reviewer for Scripted {
        fn keep(&mut self, _: usize, _: usize, conversation: &Conversation) -> anyhow::Result<bool> {
            self.seen.push(conversation.preview().to_string());
            Ok(self.keep.iter().any(|k| *k == conversation.preview()))
        }
    }

    #[test]
    fn test_parse_concatenated() {
        let text = r#"{"messages":[]}{"messages":[{"role":"user","content":"a"}]}
{"messages":[]}"#;
        let parsed: Vec<Conversation> = parse_concatenated(text).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].preview(), "a");
        assert!(parse_concatenated::<Conversation>("{\"messages\":").is_err());
    }

    #[test]
    fn test_resume_index() {
        let dataset = vec![conversation("a"), conversation("b"), conversation("c")];
        assert_eq!(resume_index(&dataset, &[]).unwrap(), 0);
        assert_eq!(resume_index(&dataset, &[conversation("b")]).unwrap(), 2);
        assert!(matches!(
            resume_index(&dataset, &[conversation("z")]),
            Err(CleanError::CheckpointMismatch)
        ));
    }

    #[test]
    fn test_clean_and_resume() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dataset.jsonl");
        let output = dir.path().join("clean.jsonl");
        let all = vec![
            conversation("a"),
            conversation("b"),
            conversation("c"),
            conversation("d"),
        ];
        write_jsonl(&input, &all).unwrap();

        // first session stops after "b"
        write_jsonl(&output, &[conversation("b")]).unwrap();

        let mut reviewer = Scripted {
            keep: vec!["d"],
            seen: Vec::new(),
        };
        let summary = clean_dataset(&input, &output, true, &mut reviewer).unwrap();
        assert_eq!(reviewer.seen, vec!["c", "d"]);
        assert_eq!(summary.checkpoint, 1);
        assert_eq!(summary.reviewed, 2);
        assert_eq!(summary.kept, 1);

        let saved = read_conversations(&output).unwrap();
        assert_eq!(saved, vec![conversation("b"), conversation("d")]);
    }

    #[test]
    fn test_clean_without_resume_starts_over() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dataset.jsonl");
        let output = dir.path().join("clean.jsonl");
        write_jsonl(&input, &[conversation("a"), conversation("b")]).unwrap();
        write_jsonl(&output, &[conversation("b")]).unwrap();

        let mut reviewer = Scripted {
            keep: vec!["a", "b"],
            seen: Vec::new(),
        };
        let summary = clean_dataset(&input, &output, false, &mut reviewer).unwrap();
        assert_eq!(summary.kept, 2);
        assert_eq!(read_conversations(&output).unwrap().len(), 2);
    }
}
