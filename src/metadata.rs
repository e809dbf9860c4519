use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConverterError, Result};
use crate::media::{MediaCommandBuilder, ToolRunner};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Tags of one source file. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub track: String,
    pub year: String,
}

impl TrackMetadata {
    /// Map probe tags onto the record. Keys are matched case-insensitively and
    /// `date` wins over `year`.
    pub fn from_tags<'a, I>(tags: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let tags: BTreeMap<String, &str> = tags
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();

        let get = |key: &str, default: &str| {
            tags.get(key).copied().unwrap_or(default).to_string()
        };

        Self {
            artist: get("artist", UNKNOWN_ARTIST),
            title: get("title", UNKNOWN_TITLE),
            album: get("album", UNKNOWN_ALBUM),
            track: get("track", ""),
            year: tags
                .get("date")
                .or_else(|| tags.get("year"))
                .copied()
                .unwrap_or("")
                .to_string(),
        }
    }

    /// Record used when the probe fails: the title is the file stem.
    pub fn fallback<P: AsRef<Path>>(path: P) -> Self {
        let title = path
            .as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            artist: UNKNOWN_ARTIST.to_string(),
            title,
            album: UNKNOWN_ALBUM.to_string(),
            track: String::new(),
            year: String::new(),
        }
    }

    /// Look a field up by its template name
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "artist" => Some(&self.artist),
            "title" => Some(&self.title),
            "album" => Some(&self.album),
            "track" => Some(&self.track),
            "year" => Some(&self.year),
            _ => None,
        }
    }

    /// Copy with the track number zero-padded
    pub fn with_normalized_track(&self) -> Self {
        Self {
            track: normalize_track(&self.track),
            ..self.clone()
        }
    }
}

/// `"3"` and `"3/12"` become `"03"`; anything non-numeric is returned unchanged.
pub fn normalize_track(track: &str) -> String {
    let number = track.split_once('/').map_or(track, |(number, _total)| number);
    match number.trim().parse::<u32>() {
        Ok(n) => format!("{:02}", n),
        Err(_) => track.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: serde_json::Map<String, Value>,
}

/// Parse `ffprobe -print_format json -show_format` output
pub fn parse_probe_output(json: &str) -> Result<TrackMetadata> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let tags: Vec<(String, String)> = output
        .format
        .map(|format| format.tags)
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect();

    Ok(TrackMetadata::from_tags(
        tags.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ))
}

/// Result of [`MetadataExtractor::extract`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub metadata: TrackMetadata,
    /// Set when the probe failed and `metadata` is the fallback record
    pub warning: Option<String>,
}

/// Reads tags through the probe tool
pub struct MetadataExtractor {
    runner: Arc<dyn ToolRunner>,
    commands: MediaCommandBuilder,
}

impl MetadataExtractor {
    pub fn new(runner: Arc<dyn ToolRunner>, commands: MediaCommandBuilder) -> Self {
        Self { runner, commands }
    }

    /// Probe the file, falling back to a stem-derived record on any failure.
    pub async fn extract(&self, source: &Path) -> Extracted {
        match self.probe(source).await {
            Ok(metadata) => {
                debug!("Metadata for {}: {:?}", source.display(), metadata);
                Extracted { metadata, warning: None }
            }
            Err(e) => {
                let warning = format!("Error reading metadata from {}: {}", source.display(), e);
                debug!("{}", warning);
                Extracted {
                    metadata: TrackMetadata::fallback(source),
                    warning: Some(warning),
                }
            }
        }
    }

    async fn probe(&self, source: &Path) -> Result<TrackMetadata> {
        let command = self.commands.probe(source);
        let output = self
            .runner
            .run(&command)
            .await?
            .into_result(&command.description)?;

        parse_probe_output(&output.stdout)
            .map_err(|e| ConverterError::Probe(format!("unreadable probe output: {}", e)))
    }
}
