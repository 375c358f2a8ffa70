//! Record sinks.
//!
//! Records arrive in completion order, not discovery order; sinks must not
//! assume anything about ordering.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Destination for crawled records.
pub trait RecordSink<T: ?Sized> {
    fn write(&mut self, record: &T) -> anyhow::Result<()>;
}

/// Streams records into a single JSON array.
///
/// Each record is flushed as soon as it is written, so an interrupted run
/// leaves a file that is only missing its closing bracket.
pub struct JsonArraySink<W: Write> {
    writer: W,
    count: u64,
}

impl<W: Write> JsonArraySink<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_all(b"[\n")?;
        Ok(Self { writer, count: 0 })
    }

    /// Records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Close the array and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.write_all(b"\n]\n")?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl JsonArraySink<BufWriter<File>> {
    /// Start a new output file, replacing any existing one.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file))?)
    }

    /// Reopen an output file from an interrupted run, keeping its records.
    ///
    /// The recovered records are staged in a sibling file that replaces the
    /// original only once complete, so the output is never left truncated.
    pub fn open_resumed(path: &Path) -> anyhow::Result<Self> {
        let existing = match std::fs::read_to_string(path) {
            Ok(text) => recover_records(&text)
                .with_context(|| format!("Cannot recover records from {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::create(path),
            Err(e) => return Err(e).context(format!("Failed to read {}", path.display())),
        };

        let staging = staging_path(path);
        {
            let mut staged = Self::create(&staging)?;
            for record in &existing {
                staged.write(record)?;
            }
            staged.writer.flush()?;
            staged
                .writer
                .get_ref()
                .sync_all()
                .with_context(|| format!("Failed to sync {}", staging.display()))?;
        }
        std::fs::rename(&staging, path).with_context(|| {
            format!("Failed to replace {} with {}", path.display(), staging.display())
        })?;

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to reopen {}", path.display()))?;
        if !existing.is_empty() {
            info!("Carried over {} records from {}", existing.len(), path.display());
        }
        Ok(Self {
            writer: BufWriter::new(file),
            count: existing.len() as u64,
        })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".resume");
    path.with_file_name(name)
}

impl<T, W> RecordSink<T> for JsonArraySink<W>
where
    T: Serialize + ?Sized,
    W: Write,
{
    fn write(&mut self, record: &T) -> anyhow::Result<()> {
        if self.count > 0 {
            self.writer.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.flush()?;
        self.count += 1;
        Ok(())
    }
}

/// Parse the records of a possibly unterminated JSON array.
///
/// A cleanly closed file parses directly. Otherwise the text is cut after
/// each `}` from the end until a prefix closes into a valid array; a record
/// that was only partly written is lost.
pub fn recover_records(text: &str) -> anyhow::Result<Vec<Value>> {
    let text = text.trim();
    if text.is_empty() || text == "[" {
        return Ok(Vec::new());
    }
    if let Ok(records) = serde_json::from_str::<Vec<Value>>(text) {
        return Ok(records);
    }

    let mut end = text.len();
    while let Some(pos) = text[..end].rfind('}') {
        let candidate = format!("{}]", &text[..=pos]);
        if let Ok(records) = serde_json::from_str::<Vec<Value>>(&candidate) {
            warn!("Output was not closed; recovered {} records", records.len());
            return Ok(records);
        }
        end = pos;
    }

    anyhow::bail!("not a JSON array of records")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_writes_json_array() {
        let mut sink = JsonArraySink::new(Vec::new()).unwrap();
        sink.write(&json!({"title": "a"})).unwrap();
        sink.write(&json!({"title": "b"})).unwrap();
        assert_eq!(sink.count(), 2);
        let out = sink.finish().unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, vec![json!({"title": "a"}), json!({"title": "b"})]);
    }

    #[test]
    fn test_empty_array() {
        let sink = JsonArraySink::new(Vec::new()).unwrap();
        let out = sink.finish().unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_recover_unterminated() {
        let text = "[\n{\"title\":\"a\",\"mix\":{}},\n{\"title\":\"b\",\"mix\":{\"c\":{}}}";
        let records = recover_records(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["title"], "b");
    }

    #[test]
    fn test_recover_drops_partial_record() {
        let text = "[\n{\"title\":\"a\",\"mix\":{}},\n{\"title\":\"b\",\"mix\":{\"c\":{\"x\":1}";
        let records = recover_records(text).unwrap();
        assert_eq!(records, vec![json!({"title": "a", "mix": {}})]);
    }

    #[test]
    fn test_recover_rejects_garbage() {
        assert!(recover_records("hello").is_err());
        assert!(recover_records("[").unwrap().is_empty());
    }

    #[test]
    fn test_open_resumed_carries_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixes.json");
        std::fs::write(&path, "[\n{\"title\":\"a\"},\n{\"title\":\"b\"}").unwrap();

        let mut sink = JsonArraySink::open_resumed(&path).unwrap();
        assert_eq!(sink.count(), 2);
        sink.write(&json!({"title": "c"})).unwrap();
        sink.finish().unwrap();

        let parsed: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let titles: Vec<&str> = parsed.iter().filter_map(|v| v["title"].as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_open_resumed_replaces_file_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixes.json");
        std::fs::write(&path, "[\n{\"title\":\"a\"},\n{\"tit").unwrap();
        // Left behind by an earlier crash mid-resume.
        std::fs::write(dir.path().join("mixes.json.resume"), "[\n{\"stale\"").unwrap();

        let sink = JsonArraySink::open_resumed(&path).unwrap();
        assert_eq!(sink.count(), 1);
        assert!(!dir.path().join("mixes.json.resume").exists());

        // Before finishing, the file already holds the carried records.
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(recover_records(&on_disk).unwrap(), vec![json!({"title": "a"})]);

        sink.finish().unwrap();
        let parsed: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec![json!({"title": "a"})]);
    }

    #[test]
    fn test_open_resumed_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("mixes.json");
        let sink = JsonArraySink::open_resumed(&path).unwrap();
        assert_eq!(sink.count(), 0);
    }
}
