//! Mix and track models.
//!
//! These mirror the JSON shape written by the scraper: every channel value is
//! a string on the wire (`"true"`, `"50"`), but the in-memory model is typed.
//! Coercion from raw string fields lives in [`Track::from_fields`] so the
//! manifest parser and the dataset reader apply exactly the same rules.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Track name meaning "no track assigned to this channel".
pub const EMPTY_CHANNEL: &str = "-";

/// Error coercing raw channel fields into a [`Track`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}' is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
}

/// One audio track assigned to a mixer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub url: String,
    pub mute: bool,
    pub volume: i64,
    pub balance: i64,
    pub random: bool,
    /// Plays per `random_unit`; only meaningful when `random` is set.
    pub random_counter: i64,
    pub random_unit: String,
    pub crossfade: bool,
}

/// Decode a manifest flag. Only the literal `"true"` is truthy.
pub fn parse_flag(value: &str) -> bool {
    value == "true"
}

/// Encode a flag the way the manifest does.
pub fn format_flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

impl Track {
    /// Build a track from raw `field -> text` pairs.
    ///
    /// Booleans never fail (anything but `"true"` is false). Integers must be
    /// base-10; there is no default for a bad value.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, FieldError> {
        let text = |name: &'static str| -> Result<&str, FieldError> {
            fields
                .get(name)
                .map(|s| s.as_str())
                .ok_or(FieldError::Missing(name))
        };
        let integer = |name: &'static str| -> Result<i64, FieldError> {
            let raw = text(name)?;
            raw.trim()
                .parse::<i64>()
                .map_err(|_| FieldError::InvalidInteger {
                    field: name,
                    value: raw.to_string(),
                })
        };

        Ok(Self {
            id: text("id_audio")?.to_string(),
            name: text("name_audio")?.to_string(),
            url: text("url_audio")?.to_string(),
            mute: parse_flag(text("mute")?),
            volume: integer("volume")?,
            balance: integer("balance")?,
            random: parse_flag(text("random")?),
            random_counter: integer("random_counter")?,
            random_unit: text("random_unit")?.to_string(),
            crossfade: parse_flag(text("crossfade")?),
        })
    }

    /// Whether this is the empty-channel placeholder.
    pub fn is_empty_channel(&self) -> bool {
        self.name == EMPTY_CHANNEL
    }
}

impl Serialize for Track {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Track", 10)?;
        s.serialize_field("id_audio", &self.id)?;
        s.serialize_field("name_audio", &self.name)?;
        s.serialize_field("url_audio", &self.url)?;
        s.serialize_field("mute", format_flag(self.mute))?;
        s.serialize_field("volume", &self.volume.to_string())?;
        s.serialize_field("balance", &self.balance.to_string())?;
        s.serialize_field("random", format_flag(self.random))?;
        s.serialize_field("random_counter", &self.random_counter.to_string())?;
        s.serialize_field("random_unit", &self.random_unit)?;
        s.serialize_field("crossfade", format_flag(self.crossfade))?;
        s.end()
    }
}

/// Channel-keyed tracks in manifest order.
///
/// Serialized as a JSON object whose key order is the manifest order.
/// Deserializing drops empty-channel entries before coercing the rest, so
/// files written by older scrapers (which kept placeholders) still load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mix {
    channels: Vec<(String, Track)>,
}

impl Mix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a channel. Empty-channel tracks are ignored.
    pub fn push(&mut self, channel: impl Into<String>, track: Track) {
        if !track.is_empty_channel() {
            self.channels.push((channel.into(), track));
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.channels.iter().map(|(_, t)| t)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &Track)> {
        self.channels.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn get(&self, channel: &str) -> Option<&Track> {
        self.channels
            .iter()
            .find(|(k, _)| k == channel)
            .map(|(_, t)| t)
    }
}

impl FromIterator<(String, Track)> for Mix {
    fn from_iter<I: IntoIterator<Item = (String, Track)>>(iter: I) -> Self {
        let mut mix = Mix::new();
        for (channel, track) in iter {
            mix.push(channel, track);
        }
        mix
    }
}

impl Serialize for Mix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.channels.len()))?;
        for (channel, track) in &self.channels {
            map.serialize_entry(channel, track)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Mix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MixVisitor;

        impl<'de> Visitor<'de> for MixVisitor {
            type Value = Mix;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of channel keys to track fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Mix, A::Error> {
                let mut mix = Mix::new();
                while let Some((channel, fields)) =
                    access.next_entry::<String, HashMap<String, String>>()?
                {
                    if fields.get("name_audio").map(String::as_str) == Some(EMPTY_CHANNEL) {
                        continue;
                    }
                    let track = Track::from_fields(&fields)
                        .map_err(|e| serde::de::Error::custom(format!("{}: {}", channel, e)))?;
                    mix.push(channel, track);
                }
                Ok(mix)
            }
        }

        deserializer.deserialize_map(MixVisitor)
    }
}

/// A fully merged scraped mix: detail-page metadata plus manifest tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixRecord {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(rename = "mix")]
    pub tracks: Mix,
}
