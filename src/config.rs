use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConverterError, Result};
use crate::media::Toolchain;

/// Settings file looked up in the working directory when `--config` is absent
pub const DEFAULT_SETTINGS_FILE: &str = "converter_config.json";

pub const DEFAULT_TEMPLATE: &str = "{artist} - {title}";

/// Subfolder of the source folder used in `create_mp3_folder` mode
pub const MP3_FOLDER_NAME: &str = "mp3";

/// Persisted, user-editable settings.
///
/// Every value is kept as the string the user typed; validation happens in
/// [`Settings::resolve`] when a batch starts. Keys missing from the file keep
/// their defaults, so a partial file merges over [`Settings::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder scanned for `.flac` files
    pub source_folder: String,
    /// Output folder, used when `destination_option` is `browse`
    pub destination_folder: String,
    /// `create_mp3_folder` or `browse`
    pub destination_option: String,
    /// Output name pattern, e.g. `{track} - {title}`
    pub filename_template: String,
    pub lame_path: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// MP3 bitrate in kbps
    pub quality: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_folder: String::new(),
            destination_folder: String::new(),
            destination_option: DestinationMode::CreateMp3Folder.as_str().to_string(),
            filename_template: DEFAULT_TEMPLATE.to_string(),
            lame_path: "lame".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            quality: Bitrate::Kbps320.as_str().to_string(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing or unreadable.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Read a settings file.
    ///
    /// Keys are taken one at a time over the defaults: numbers and booleans
    /// are kept as their text, and a key holding a list or table is skipped
    /// with a warning. Only an unparsable file or a non-table root is an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let value: Value = if is_toml(path) {
            serde_json::to_value(toml::from_str::<toml::Table>(&content)?)?
        } else {
            serde_json::from_str(&content)?
        };

        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(loaded) = value else {
            return Err(ConverterError::Config(
                "Settings file must contain a table of keys".to_string(),
            ));
        };

        let Value::Object(mut merged) = serde_json::to_value(Self::default())? else {
            return Err(ConverterError::Config("Settings are not a table".to_string()));
        };

        for (key, value) in loaded {
            if !merged.contains_key(&key) {
                debug!("Ignoring unknown setting '{}'", key);
                continue;
            }
            let text = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                other => {
                    warn!("Ignoring setting '{}': expected text, found {}", key, other);
                    continue;
                }
            };
            merged.insert(key, Value::String(text));
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        std::fs::write(path, content)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Tool paths only, for the self-test which needs no folders.
    pub fn toolchain(&self) -> Result<Toolchain> {
        Ok(Toolchain {
            ffmpeg: required("ffmpeg_path", &self.ffmpeg_path)?,
            ffprobe: required("ffprobe_path", &self.ffprobe_path)?,
            lame: required("lame_path", &self.lame_path)?,
        })
    }

    /// Validate the settings and freeze them into the configuration a batch runs with.
    pub fn resolve(&self) -> Result<BatchConfig> {
        let source = self.source_folder.trim();
        if source.is_empty() {
            return Err(ConverterError::Config("Source folder is not set".to_string()));
        }

        let source_dir = PathBuf::from(source);
        if !source_dir.is_dir() {
            return Err(ConverterError::Config(format!(
                "Source folder does not exist: {}",
                source_dir.display()
            )));
        }

        let destination_dir = match self.destination_option.parse::<DestinationMode>()? {
            DestinationMode::CreateMp3Folder => source_dir.join(MP3_FOLDER_NAME),
            DestinationMode::Browse => {
                let destination = self.destination_folder.trim();
                if destination.is_empty() {
                    return Err(ConverterError::Config(
                        "Please select a destination folder".to_string(),
                    ));
                }
                PathBuf::from(destination)
            }
        };

        if self.filename_template.trim().is_empty() {
            return Err(ConverterError::Config("Filename template is empty".to_string()));
        }

        Ok(BatchConfig {
            source_dir,
            destination_dir,
            template: self.filename_template.clone(),
            bitrate: self.quality.parse()?,
            tools: self.toolchain()?,
            timeouts: ToolTimeouts::default(),
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn required(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConverterError::Config(format!("{} is not set", key)));
    }
    Ok(value.to_string())
}

/// Where converted files are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationMode {
    /// An `mp3` folder inside the source folder
    CreateMp3Folder,
    /// The folder named by `destination_folder`
    Browse,
}

impl DestinationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationMode::CreateMp3Folder => "create_mp3_folder",
            DestinationMode::Browse => "browse",
        }
    }
}

impl FromStr for DestinationMode {
    type Err = ConverterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "create_mp3_folder" => Ok(DestinationMode::CreateMp3Folder),
            "browse" => Ok(DestinationMode::Browse),
            other => Err(ConverterError::Config(format!(
                "Invalid destination option '{}'. Valid options: create_mp3_folder, browse",
                other
            ))),
        }
    }
}

/// Constant bitrates offered for lame's `-b` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitrate {
    Kbps128,
    Kbps160,
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Bitrate {
    pub const ALL: [Bitrate; 5] = [
        Bitrate::Kbps128,
        Bitrate::Kbps160,
        Bitrate::Kbps192,
        Bitrate::Kbps256,
        Bitrate::Kbps320,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bitrate::Kbps128 => "128",
            Bitrate::Kbps160 => "160",
            Bitrate::Kbps192 => "192",
            Bitrate::Kbps256 => "256",
            Bitrate::Kbps320 => "320",
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.as_str())
    }
}

impl FromStr for Bitrate {
    type Err = ConverterError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Bitrate::ALL
            .iter()
            .copied()
            .find(|bitrate| bitrate.as_str() == s)
            .ok_or_else(|| {
                ConverterError::Config(format!(
                    "Invalid quality '{}'. Valid values: 128, 160, 192, 256, 320",
                    s
                ))
            })
    }
}

/// Bounded waits applied to each external tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    pub probe: Duration,
    pub decode: Duration,
    pub encode: Duration,
    pub self_test: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(30),
            decode: Duration::from_secs(120),
            encode: Duration::from_secs(120),
            self_test: Duration::from_secs(10),
        }
    }
}

/// Validated configuration handed by value to a batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub template: String,
    pub bitrate: Bitrate,
    pub tools: Toolchain,
    pub timeouts: ToolTimeouts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    fn settings_for(source: &Path) -> Settings {
        Settings {
            source_folder: source.display().to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(dir.path().join("absent.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.filename_template, "{artist} - {title}");
        assert_eq!(settings.quality, "320");
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("converter_config.json");
        file.write_str(r#"{"quality": "192", "lame_path": "/opt/lame/bin/lame", "unknown_key": "x"}"#)
            .unwrap();

        let settings = Settings::load(file.path());
        assert_eq!(settings.quality, "192");
        assert_eq!(settings.lame_path, "/opt/lame/bin/lame");
        assert_eq!(settings.ffmpeg_path, "ffmpeg");
        assert_eq!(settings.filename_template, DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("converter_config.json");
        file.write_str("{ this is not json").unwrap();

        assert!(Settings::from_file(file.path()).is_err());
        assert_eq!(Settings::load(file.path()), Settings::default());
    }

    #[test]
    fn test_wrongly_typed_values_keep_other_keys() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("converter_config.json");
        file.write_str(
            r#"{"quality": 192, "lame_path": "/opt/lame", "ffmpeg_path": ["x"], "source_folder": null}"#,
        )
        .unwrap();

        let settings = Settings::load(file.path());
        assert_eq!(settings.quality, "192");
        assert_eq!(settings.lame_path, "/opt/lame");
        assert_eq!(settings.ffmpeg_path, "ffmpeg");
        assert_eq!(settings.source_folder, "");

        let toml_file = dir.child("settings.toml");
        toml_file.write_str("quality = 256\nfilename_template = \"{track} - {title}\"\n").unwrap();
        let settings = Settings::load(toml_file.path());
        assert_eq!(settings.quality, "256");
        assert_eq!(settings.filename_template, "{track} - {title}");
    }

    #[test]
    fn test_non_table_root_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("converter_config.json");
        file.write_str(r#"["quality", "192"]"#).unwrap();

        assert!(matches!(Settings::from_file(file.path()), Err(ConverterError::Config(_))));
        assert_eq!(Settings::load(file.path()), Settings::default());
    }

    #[test]
    fn test_toml_settings_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("settings.toml");
        let settings = Settings {
            filename_template: "{track} - {title}".to_string(),
            quality: "256".to_string(),
            ..Settings::default()
        };

        settings.save_to_file(file.path()).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("quality = \"256\""));
        assert_eq!(Settings::load(file.path()), settings);
    }

    #[test]
    fn test_resolve_create_mp3_folder() {
        let dir = TempDir::new().unwrap();
        let config = settings_for(dir.path()).resolve().unwrap();

        assert_eq!(config.source_dir, dir.path());
        assert_eq!(config.destination_dir, dir.path().join("mp3"));
        assert_eq!(config.bitrate, Bitrate::Kbps320);
        assert_eq!(config.tools.lame, "lame");
        assert_eq!(config.timeouts.decode, Duration::from_secs(120));
    }

    #[test]
    fn test_resolve_browse_requires_destination() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_for(dir.path());
        settings.destination_option = "browse".to_string();

        let err = settings.resolve().unwrap_err();
        assert!(matches!(err, ConverterError::Config(msg) if msg.contains("destination")));

        settings.destination_folder = dir.path().join("out").display().to_string();
        let config = settings.resolve().unwrap();
        assert_eq!(config.destination_dir, dir.path().join("out"));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let dir = TempDir::new().unwrap();

        let missing = settings_for(&dir.path().join("nope"));
        assert!(matches!(missing.resolve(), Err(ConverterError::Config(_))));

        let mut bad_quality = settings_for(dir.path());
        bad_quality.quality = "999".to_string();
        assert!(matches!(bad_quality.resolve(), Err(ConverterError::Config(_))));

        let mut bad_mode = settings_for(dir.path());
        bad_mode.destination_option = "elsewhere".to_string();
        assert!(matches!(bad_mode.resolve(), Err(ConverterError::Config(_))));

        let mut no_template = settings_for(dir.path());
        no_template.filename_template = "  ".to_string();
        assert!(matches!(no_template.resolve(), Err(ConverterError::Config(_))));

        let mut no_lame = settings_for(dir.path());
        no_lame.lame_path = String::new();
        assert!(matches!(no_lame.resolve(), Err(ConverterError::Config(msg)) if msg.contains("lame_path")));
    }

    #[test]
    fn test_bitrate_parsing() {
        assert_eq!("128".parse::<Bitrate>().unwrap(), Bitrate::Kbps128);
        assert_eq!(" 192 ".parse::<Bitrate>().unwrap(), Bitrate::Kbps192);
        assert!("64".parse::<Bitrate>().is_err());
        assert_eq!(Bitrate::Kbps256.to_string(), "256 kbps");
    }
}
