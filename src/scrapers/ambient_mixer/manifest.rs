//! Channel manifest (XML) parser.
//!
//! A manifest looks like:
//!
//! ```xml
//! <audio_template>
//!   <id>42</id>
//!   <channel1><id_audio>7</id_audio><name_audio>Owl</name_audio>...</channel1>
//!   <channel2>...</channel2>
//! </audio_template>
//! ```
//!
//! Only children whose name starts with `channel` describe tracks; the rest is
//! template metadata.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::ParseError;
use super::MixContext;
use crate::models::{Mix, MixRecord, Track, EMPTY_CHANNEL};

const ROOT: &str = "audio_template";
const CHANNEL_PREFIX: &str = "channel";

/// Raw `field -> text` pairs for one channel.
pub type ChannelFields = HashMap<String, String>;

/// Build the manifest URL for an audio template.
pub fn manifest_url(manifest_base: &str, audio_id: u64) -> String {
    format!("{}?player=html5&id_template={}", manifest_base, audio_id)
}

/// Read channel entries in document order, ignoring non-channel keys.
pub fn read_channels(xml: &str) -> Result<Vec<(String, ChannelFields)>, ParseError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut channels = Vec::new();
    let mut channel: Option<(String, ChannelFields)> = None;
    let mut field: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match depth {
                    1 if name == ROOT => saw_root = true,
                    1 => return Err(ParseError::MissingRoot),
                    2 if name.starts_with(CHANNEL_PREFIX) => channel = Some((name, HashMap::new())),
                    3 if channel.is_some() => {
                        field = Some(name);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match depth + 1 {
                    1 if name == ROOT => saw_root = true,
                    1 => return Err(ParseError::MissingRoot),
                    2 if name.starts_with(CHANNEL_PREFIX) => channels.push((name, HashMap::new())),
                    3 => {
                        if let Some((_, fields)) = channel.as_mut() {
                            fields.insert(name, String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                match depth {
                    3 => {
                        if let (Some(name), Some((_, fields))) = (field.take(), channel.as_mut()) {
                            fields.insert(name, std::mem::take(&mut text));
                        }
                    }
                    2 => {
                        if let Some(entry) = channel.take() {
                            channels.push(entry);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof if depth > 0 => {
                return Err(ParseError::Xml("unexpected end of document".to_string()))
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ParseError::MissingRoot);
    }
    Ok(channels)
}

/// Parse a manifest and merge it with the context carried on its request.
pub fn parse_manifest(xml: &str, context: MixContext) -> Result<MixRecord, ParseError> {
    let mut tracks = Mix::new();
    for (channel, fields) in read_channels(xml)? {
        if fields.get("name_audio").map(String::as_str) == Some(EMPTY_CHANNEL) {
            continue;
        }
        let track = Track::from_fields(&fields).map_err(|source| ParseError::Channel {
            channel: channel.clone(),
            source,
        })?;
        tracks.push(channel, track);
    }

    Ok(MixRecord {
        title: context.title,
        description: context.description,
        categories: context.categories,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldError;

    fn channel(key: &str, name: &str, volume: &str) -> String {
        format!(
            "<{key}><id_audio>{id}</id_audio><name_audio>{name}</name_audio>\
             <url_audio>https://xml.ambient-mixer.com/audio/{id}.mp3</url_audio>\
             <mute>false</mute><volume>{volume}</volume><balance>0</balance>\
             <random>true</random><random_counter>2</random_counter>\
             <random_unit>10m</random_unit><crossfade>TRUE</crossfade></{key}>",
            key = key,
            id = key.len() + name.len(),
            name = name,
            volume = volume,
        )
    }

    fn context() -> MixContext {
        MixContext {
            title: "Forest".to_string(),
            description: "Deep woods at night".to_string(),
            categories: vec!["Nature".to_string(), "Forest".to_string()],
            audio_id: 42,
        }
    }

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            manifest_url("https://xml.ambient-mixer.com/audio-template", 42),
            "https://xml.ambient-mixer.com/audio-template?player=html5&id_template=42"
        );
    }

    #[test]
    fn test_sentinel_channels_are_dropped() {
        let xml = format!(
            "<audio_template>{}{}</audio_template>",
            channel("channel1", "-", "x"),
            channel("channel2", "Rain", "50")
        );
        let record = parse_manifest(&xml, context()).unwrap();
        assert_eq!(record.tracks.len(), 1);
        let rain = record.tracks.get("channel2").unwrap();
        assert_eq!(rain.name, "Rain");
        assert_eq!(rain.volume, 50);
        assert!(rain.random);
        assert!(!rain.crossfade, "only the literal \"true\" is truthy");
        assert_eq!(record.title, "Forest");
        assert_eq!(record.categories, vec!["Nature", "Forest"]);
    }

    #[test]
    fn test_non_channel_keys_are_ignored() {
        let xml = format!(
            "<audio_template><id>42</id><name>Forest</name>\
             <channels_count>9</channels_count>{}<owner><name_audio>Owl</name_audio></owner>\
             </audio_template>",
            channel("channel1", "Wind", "10")
        );
        let channels = read_channels(&xml).unwrap();
        let keys: Vec<&str> = channels.iter().map(|(k, _)| k.as_str()).collect();
        // `channels_count` starts with the prefix but carries no track fields
        assert_eq!(keys, vec!["channels_count", "channel1"]);

        let xml = format!(
            "<audio_template><id>42</id>{}<owner><name_audio>Owl</name_audio></owner></audio_template>",
            channel("channel1", "Wind", "10")
        );
        let record = parse_manifest(&xml, context()).unwrap();
        let names: Vec<&str> = record.tracks.tracks().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Wind"]);
    }

    #[test]
    fn test_order_follows_manifest() {
        let xml = format!(
            "<audio_template>{}{}{}</audio_template>",
            channel("channel3", "C", "1"),
            channel("channel1", "A", "1"),
            channel("channel2", "B", "1")
        );
        let record = parse_manifest(&xml, context()).unwrap();
        let keys: Vec<&str> = record.tracks.channels().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["channel3", "channel1", "channel2"]);
    }

    #[test]
    fn test_bad_integer_fails_the_record() {
        let xml = format!(
            "<audio_template>{}</audio_template>",
            channel("channel1", "Rain", "loud")
        );
        let err = parse_manifest(&xml, context()).unwrap_err();
        match err {
            ParseError::Channel { channel, source } => {
                assert_eq!(channel, "channel1");
                assert!(matches!(
                    source,
                    FieldError::InvalidInteger { field: "volume", .. }
                ));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_entities_and_cdata() {
        let xml = "<audio_template><channel1><id_audio>1</id_audio>\
            <name_audio>Rain &amp; Thunder</name_audio><url_audio><![CDATA[https://x/1.mp3?a=1&b=2]]></url_audio>\
            <mute>true</mute><volume>5</volume><balance>-3</balance><random>false</random>\
            <random_counter>0</random_counter><random_unit/><crossfade>false</crossfade>\
            </channel1></audio_template>";
        let record = parse_manifest(xml, context()).unwrap();
        let track = record.tracks.get("channel1").unwrap();
        assert_eq!(track.name, "Rain & Thunder");
        assert_eq!(track.url, "https://x/1.mp3?a=1&b=2");
        assert_eq!(track.random_unit, "");
        assert_eq!(track.balance, -3);
        assert!(track.mute);
    }

    #[test]
    fn test_wrong_root_is_fatal() {
        assert!(matches!(
            parse_manifest("<error>not found</error>", context()),
            Err(ParseError::MissingRoot)
        ));
        assert!(matches!(
            parse_manifest("", context()),
            Err(ParseError::MissingRoot)
        ));
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let result = parse_manifest("<audio_template><channel1></audio_template>", context());
        assert!(matches!(result, Err(ParseError::Xml(_))));
    }

    #[test]
    fn test_truncated_manifest_is_fatal() {
        let xml = "<audio_template><id>42</id><channel1><id_audio>7</id_audio>\
                   <name_audio>Owl</name_audio>";
        assert!(matches!(read_channels(xml), Err(ParseError::Xml(_))));
        assert!(matches!(parse_manifest(xml, context()), Err(ParseError::Xml(_))));

        let unclosed_root = format!("<audio_template>{}", channel("channel1", "Owl", "10"));
        assert!(matches!(
            parse_manifest(&unclosed_root, context()),
            Err(ParseError::Xml(_))
        ));
    }
}
