//! Dataset commands: convert, prompts and interactive clean.

use std::path::Path;

use console::{style, Term};

use crate::cli::icons::{dim_arrow, info, success};
use crate::models::Conversation;
use crate::services::dataset::{self, ConvertOptions, Reviewer};

pub fn cmd_convert(input: &Path, output: &Path, options: &ConvertOptions) -> anyhow::Result<()> {
    let summary = dataset::convert_file(input, output, options)?;

    println!(
        "{} Wrote {} conversations to {}",
        success(),
        summary.conversations,
        output.display()
    );
    println!(
        "  {} {} mixes read, {} built from the {} most common tracks",
        dim_arrow(),
        summary.mixes,
        summary.within_top_tracks,
        options.max_tracks
    );
    Ok(())
}

pub fn cmd_prompts(input: &Path, output_dir: &Path, chunk_size: usize) -> anyhow::Result<()> {
    let written = dataset::write_prompts(input, output_dir, chunk_size)?;
    println!(
        "{} Wrote {} prompt files to {}",
        success(),
        written.len(),
        output_dir.display()
    );
    Ok(())
}

pub fn cmd_clean(input: &Path, output: &Path, resume: bool) -> anyhow::Result<()> {
    let mut reviewer = TermReviewer::new();
    let summary = dataset::clean_dataset(input, output, resume, &mut reviewer)?;

    if summary.checkpoint > 0 {
        println!(
            "{} Resumed after {} conversations already kept",
            info(),
            summary.checkpoint
        );
    }
    println!(
        "{} Kept {} of {} reviewed conversations in {}",
        success(),
        summary.kept,
        summary.reviewed,
        output.display()
    );
    Ok(())
}

/// Asks on the terminal whether to keep each conversation.
struct TermReviewer {
    term: Term,
}

impl TermReviewer {
    fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

/// Empty input keeps; anything else must be a clear yes or no.
fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

impl Reviewer for TermReviewer {
    fn keep(
        &mut self,
        position: usize,
        total: usize,
        conversation: &Conversation,
    ) -> anyhow::Result<bool> {
        self.term.write_line("")?;
        self.term.write_line(&format!(
            "{} {}",
            style(format!("[{}/{}]", position, total)).dim(),
            conversation.preview()
        ))?;
        loop {
            self.term
                .write_str("Do you want to keep this conversation? [Y/n]: ")?;
            let answer = self.term.read_line()?;
            match parse_answer(&answer) {
                Some(keep) => return Ok(keep),
                None => self.term.write_line("Please answer y or n.")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(""), Some(true));
        assert_eq!(parse_answer(" Y "), Some(true));
        assert_eq!(parse_answer("yes"), Some(true));
        assert_eq!(parse_answer("n"), Some(false));
        assert_eq!(parse_answer("NO"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }
}
