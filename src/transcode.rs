use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info};

use crate::config::Bitrate;
use crate::error::Result;
use crate::media::{MediaCommand, MediaCommandBuilder, ToolRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Allocating the intermediate file
    Prepare,
    Decode,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Prepare => "prepare",
            Stage::Decode => "decode",
            Stage::Encode => "encode",
        })
    }
}

/// Per-file conversion result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Succeeded,
    Failed { stage: Stage, diagnostic: String },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded)
    }
}

/// Outcome plus any non-fatal cleanup problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub outcome: ConversionOutcome,
    pub cleanup_warning: Option<String>,
}

/// Uniquely named `.wav` that lives for one conversion.
///
/// Dropping it deletes the file; [`IntermediateFile::close`] does the same
/// but reports failures.
#[derive(Debug)]
pub struct IntermediateFile {
    path: TempPath,
}

impl IntermediateFile {
    pub fn create_in<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("flac2mp3-")
            .suffix(".wav")
            .tempfile_in(dir)?;

        Ok(Self { path: file.into_temp_path() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) -> io::Result<()> {
        match self.path.close() {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Decodes with ffmpeg, then encodes with lame
pub struct Transcoder {
    runner: Arc<dyn ToolRunner>,
    commands: MediaCommandBuilder,
    bitrate: Bitrate,
    temp_dir: PathBuf,
}

impl Transcoder {
    pub fn new(runner: Arc<dyn ToolRunner>, commands: MediaCommandBuilder, bitrate: Bitrate) -> Self {
        Self {
            runner,
            commands,
            bitrate,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Place intermediates somewhere other than the system temp dir
    pub fn with_temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub async fn transcode(&self, source: &Path, destination: &Path) -> Transcoded {
        let intermediate = match IntermediateFile::create_in(&self.temp_dir) {
            Ok(file) => file,
            Err(e) => {
                return Transcoded {
                    outcome: ConversionOutcome::Failed {
                        stage: Stage::Prepare,
                        diagnostic: format!(
                            "Cannot create intermediate file in {}: {}",
                            self.temp_dir.display(),
                            e
                        ),
                    },
                    cleanup_warning: None,
                };
            }
        };

        let intermediate_path = intermediate.path().to_path_buf();
        debug!("Intermediate for {}: {}", source.display(), intermediate_path.display());

        let outcome = self.decode_and_encode(source, destination, &intermediate_path).await;

        let cleanup_warning = intermediate.close().err().map(|e| {
            let warning = format!(
                "Failed to remove intermediate file {}: {}",
                intermediate_path.display(),
                e
            );
            debug!("{}", warning);
            warning
        });

        Transcoded { outcome, cleanup_warning }
    }

    async fn decode_and_encode(
        &self,
        source: &Path,
        destination: &Path,
        intermediate: &Path,
    ) -> ConversionOutcome {
        let decode = self.commands.decode(source, intermediate);
        if let Err(e) = self.run_step(&decode).await {
            debug!("Decoding {} failed: {}", source.display(), e);
            return ConversionOutcome::Failed {
                stage: Stage::Decode,
                diagnostic: e.to_string(),
            };
        }

        let encode = self.commands.encode(intermediate, destination, self.bitrate);
        if let Err(e) = self.run_step(&encode).await {
            debug!("Encoding {} failed: {}", destination.display(), e);
            return ConversionOutcome::Failed {
                stage: Stage::Encode,
                diagnostic: e.to_string(),
            };
        }

        info!("Encoded {} at {}", destination.display(), self.bitrate);
        ConversionOutcome::Succeeded
    }

    async fn run_step(&self, command: &MediaCommand) -> Result<()> {
        self.runner
            .run(command)
            .await?
            .into_result(&command.description)?;
        Ok(())
    }
}
