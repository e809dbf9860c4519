use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DestinationMode, Settings};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Settings file path (JSON, or TOML when it ends in .toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert every FLAC file in the source folder to MP3
    Convert(ConvertArgs),

    /// Check that ffmpeg, ffprobe and lame can be run
    Check,

    /// Manage the saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides for one conversion run. Every flag is saved back to the settings file.
#[derive(clap::Args, Debug, Default)]
pub struct ConvertArgs {
    /// Folder containing the .flac files
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Output folder (switches the destination option to browse)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Where to write MP3s
    #[arg(long, value_parser = ["create_mp3_folder", "browse"])]
    pub destination_option: Option<String>,

    /// Output name template, e.g. "{track} - {title}"
    #[arg(short, long)]
    pub template: Option<String>,

    /// MP3 bitrate in kbps
    #[arg(short, long, value_parser = ["128", "160", "192", "256", "320"])]
    pub quality: Option<String>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// Path to the ffprobe executable
    #[arg(long)]
    pub ffprobe: Option<String>,

    /// Path to the lame executable
    #[arg(long)]
    pub lame: Option<String>,

    /// Print the batch summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ConvertArgs {
    /// Write the given flags over `settings`
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(source) = &self.source {
            settings.source_folder = source.display().to_string();
        }
        if let Some(destination) = &self.destination {
            settings.destination_folder = destination.display().to_string();
            if self.destination_option.is_none() {
                settings.destination_option = DestinationMode::Browse.as_str().to_string();
            }
        }
        if let Some(option) = &self.destination_option {
            settings.destination_option = option.clone();
        }
        if let Some(template) = &self.template {
            settings.filename_template = template.clone();
        }
        if let Some(quality) = &self.quality {
            settings.quality = quality.clone();
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings.ffmpeg_path = ffmpeg.clone();
        }
        if let Some(ffprobe) = &self.ffprobe {
            settings.ffprobe_path = ffprobe.clone();
        }
        if let Some(lame) = &self.lame {
            settings.lame_path = lame.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file location
    Path,
    /// Overwrite the settings file with defaults
    Reset,
}
