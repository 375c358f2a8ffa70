//! Mixes to conversations.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use super::{load_mixes, write_jsonl};
use crate::models::{Conversation, Message, MixRecord, Role, Track};

const SYSTEM_PROMPT: &str = r#"Your task is to mix ambient sounds by composing a set of ambient audio tracks.
You can assign each track a <volume> between 0 and 1.
You can only use each track once.
Tracks will loop indefinitely unless <random> is set to true.
In this case, the track will repeat randomly every <random_unit> for <random_counter> times.
Your response should be a JSON object of the following format:
---
[
  {
    "name": "<track name>",
    "volume": "<the volume>",
    "random": "<true or false>",
    "random_counter": "<number of times to play the sound every random_unit if random = true>",
    "random_unit": "<1m|10m|1h>",
  },
  ...
]
---
"#;

const TRACK_LIST_HEADER: &str = "You have the following tracks available:\n---\n";

const SYSTEM_PROMPT_FOOTER: &str =
    "I will provide descriptions of the enviroment and mood I'd like to create an ambient mix for in my next prompt.\n";

/// Unit used for tracks that loop instead of playing randomly.
const LOOP_UNIT: &str = "1h";

/// Decimal digits in any script; fractions and numerals such as `½` or `Ⅻ` stay.
static DECIMAL_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Nd}").expect("static regex"));

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub system_prompt: bool,
    /// Append the available track names to the system prompt.
    pub list_tracks: bool,
    /// Keep only mixes built entirely from this many most common tracks.
    pub max_tracks: usize,
    pub min_title_words: usize,
    pub min_description_words: usize,
    pub remove_digits: bool,
    pub min_chars: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            system_prompt: true,
            list_tracks: false,
            max_tracks: 250,
            min_title_words: 2,
            min_description_words: 5,
            remove_digits: true,
            min_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConvertSummary {
    pub mixes: usize,
    /// Mixes left after the top-track filter.
    pub within_top_tracks: usize,
    pub conversations: usize,
}

/// Track as the model is asked to produce it.
#[derive(Debug, Serialize)]
struct AnswerTrack<'a> {
    name: &'a str,
    volume: f64,
    random: bool,
    random_counter: i64,
    random_unit: &'a str,
}

impl<'a> From<&'a Track> for AnswerTrack<'a> {
    fn from(track: &'a Track) -> Self {
        Self {
            name: &track.name,
            volume: track.volume as f64 / 100.0,
            random: track.random,
            random_counter: if track.random { track.random_counter } else { 0 },
            random_unit: if track.random {
                &track.random_unit
            } else {
                LOOP_UNIT
            },
        }
    }
}

/// The `max` most used track names, most used first. Ties keep the order in
/// which names first appear.
pub fn top_track_names(mixes: &[MixRecord], max: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for track in mixes.iter().flat_map(|m| m.tracks.tracks()) {
        let next = counts.len();
        counts.entry(track.name.as_str()).or_insert((0, next)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(name, (count, first))| (name, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(max)
        .map(|(name, _, _)| name.to_string())
        .collect()
}

/// Keep mixes whose every track is among `allowed`.
pub fn filter_mixes(mixes: Vec<MixRecord>, allowed: &HashSet<&str>) -> Vec<MixRecord> {
    mixes
        .into_iter()
        .filter(|m| m.tracks.tracks().all(|t| allowed.contains(t.name.as_str())))
        .collect()
}

/// User turn for a mix, or None when too little text is left.
pub fn user_prompt(mix: &MixRecord, options: &ConvertOptions) -> Option<String> {
    let mut content = String::new();
    if mix.title.split_whitespace().count() >= options.min_title_words {
        content.push_str(&mix.title);
        content.push_str(": ");
    }
    if mix.description.split_whitespace().count() >= options.min_description_words {
        content.push_str(&mix.description);
    }
    if options.remove_digits {
        content = DECIMAL_DIGITS.replace_all(&content, "").into_owned();
    }
    (content.chars().count() >= options.min_chars).then_some(content)
}

/// Assistant turn: the mix's tracks as a JSON array.
pub fn assistant_content(mix: &MixRecord) -> String {
    let tracks: Vec<AnswerTrack> = mix.tracks.tracks().map(AnswerTrack::from).collect();
    // A Vec of plain structs always serializes
    serde_json::to_string(&tracks).unwrap_or_else(|_| "[]".to_string())
}

pub fn system_prompt(track_names: Option<&[String]>) -> String {
    let mut prompt = SYSTEM_PROMPT.to_string();
    if let Some(names) = track_names {
        prompt.push_str(TRACK_LIST_HEADER);
        for name in names {
            prompt.push_str(name);
            prompt.push('\n');
        }
        prompt.push_str("---\n");
    }
    prompt.push_str(SYSTEM_PROMPT_FOOTER);
    prompt
}

/// Build the conversation dataset.
pub fn convert(mixes: Vec<MixRecord>, options: &ConvertOptions) -> (Vec<Conversation>, ConvertSummary) {
    let mut summary = ConvertSummary {
        mixes: mixes.len(),
        ..Default::default()
    };

    let top = top_track_names(&mixes, options.max_tracks);
    let allowed: HashSet<&str> = top.iter().map(String::as_str).collect();
    let kept = filter_mixes(mixes, &allowed);
    summary.within_top_tracks = kept.len();

    let system = options.system_prompt.then(|| {
        let names = options.list_tracks.then_some(top.as_slice());
        system_prompt(names)
    });

    let conversations: Vec<Conversation> = kept
        .iter()
        .filter_map(|mix| {
            let user = user_prompt(mix, options)?;
            let mut messages = Vec::with_capacity(3);
            if let Some(ref system) = system {
                messages.push(Message::new(Role::System, system.clone()));
            }
            messages.push(Message::new(Role::User, user));
            messages.push(Message::new(Role::Assistant, assistant_content(mix)));
            Some(Conversation { messages })
        })
        .collect();

    summary.conversations = conversations.len();
    (conversations, summary)
}

/// Convert a mixes file into a JSON Lines conversation file.
pub fn convert_file(input: &Path, output: &Path, options: &ConvertOptions) -> anyhow::Result<ConvertSummary> {
    let mixes = load_mixes(input)?;
    let (conversations, summary) = convert(mixes, options);
    write_jsonl(output, &conversations)?;
    info!(
        "Converted {} mixes into {} conversations ({} within top tracks)",
        summary.mixes, summary.conversations, summary.within_top_tracks
    );
    Ok(summary)
}
