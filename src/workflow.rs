use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::BatchConfig;
use crate::error::{ConverterError, Result};
use crate::media::{MediaCommandBuilder, ToolRunner};
use crate::metadata::{MetadataExtractor, TrackMetadata};
use crate::naming::{fallback_filename, sanitize_filename, try_format_filename, FALLBACK_TEMPLATE};
use crate::progress::{LogLevel, LogLine, ProgressReporter};
use crate::transcode::{ConversionOutcome, Transcoder};

pub const SOURCE_EXTENSION: &str = "flac";
pub const OUTPUT_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub outcome: ConversionOutcome,
}

/// Aggregate result of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub converted: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
    pub log: Vec<LogLine>,
}

/// Collects the visible log and mirrors it to tracing and the reporter
struct BatchLog<'a> {
    reporter: &'a dyn ProgressReporter,
    lines: Vec<LogLine>,
}

impl<'a> BatchLog<'a> {
    fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self { reporter, lines: Vec::new() }
    }

    fn info<S: Into<String>>(&mut self, message: S) {
        let line = LogLine::new(LogLevel::Info, message);
        info!("{}", line.message);
        self.push(line);
    }

    fn warn<S: Into<String>>(&mut self, message: S) {
        let line = LogLine::new(LogLevel::Warn, message);
        warn!("{}", line.message);
        self.push(line);
    }

    fn push(&mut self, line: LogLine) {
        self.reporter.on_log(&line);
        self.lines.push(line);
    }
}

/// Converts every FLAC file directly inside the source folder, one at a time
pub struct BatchWorkflow {
    config: BatchConfig,
    runner: Arc<dyn ToolRunner>,
    extractor: MetadataExtractor,
    transcoder: Transcoder,
}

impl BatchWorkflow {
    pub fn new(config: BatchConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let commands = MediaCommandBuilder::new(config.tools.clone(), config.timeouts);
        let extractor = MetadataExtractor::new(Arc::clone(&runner), commands.clone());
        let transcoder = Transcoder::new(Arc::clone(&runner), commands, config.bitrate);

        Self {
            config,
            runner,
            extractor,
            transcoder,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Self-test the tools and create the destination folder.
    ///
    /// Anything that fails here blocks the batch.
    pub async fn preflight(&self) -> Result<()> {
        self.config
            .tools
            .verify(self.runner.as_ref(), self.config.timeouts.self_test)
            .await?;

        fs::create_dir_all(&self.config.destination_dir).await?;
        info!("Writing MP3 files to {}", self.config.destination_dir.display());
        Ok(())
    }

    pub async fn run(&self, reporter: &dyn ProgressReporter) -> Result<BatchSummary> {
        let sources = find_flac_files(&self.config.source_dir)?;
        let mut log = BatchLog::new(reporter);

        if sources.is_empty() {
            log.info("No FLAC files found in source folder");
            reporter.on_status("No FLAC files found");
            let summary = BatchSummary { log: log.lines, ..BatchSummary::default() };
            reporter.on_done(&summary);
            return Ok(summary);
        }

        let total = sources.len();
        log.info(format!("Found {} FLAC files to convert", total));

        let mut summary = BatchSummary::default();
        let mut taken_names = HashSet::new();

        for (index, source) in sources.iter().enumerate() {
            reporter.on_progress(index as f64 / total as f64);
            let name = display_name(source);
            reporter.on_status(&format!("Converting {}...", name));

            let extracted = self.extractor.extract(source).await;
            if let Some(warning) = extracted.warning {
                log.warn(warning);
            }

            let stem = self.output_stem(&extracted.metadata, source, &mut log);
            let stem = claim_name(&mut taken_names, &stem);
            let output_name = format!("{}.{}", stem, OUTPUT_EXTENSION);
            let output = self.config.destination_dir.join(&output_name);

            log.info(format!("Converting: {} -> {}", name, output_name));
            let transcoded = self.transcoder.transcode(source, &output).await;
            if let Some(warning) = transcoded.cleanup_warning {
                log.warn(warning);
            }

            match &transcoded.outcome {
                ConversionOutcome::Succeeded => {
                    summary.converted += 1;
                    log.info(format!("✓ Converted: {}", output_name));
                }
                ConversionOutcome::Failed { stage, diagnostic } => {
                    summary.failed += 1;
                    log.warn(format!("✗ Failed: {} ({} step): {}", name, stage, diagnostic));
                }
            }

            summary.files.push(FileReport {
                source: source.clone(),
                output,
                outcome: transcoded.outcome,
            });
        }

        reporter.on_progress(1.0);
        reporter.on_status(&format!(
            "Complete: {} converted, {} failed",
            summary.converted, summary.failed
        ));
        log.info(format!(
            "Conversion complete: {} files converted, {} failed",
            summary.converted, summary.failed
        ));

        summary.log = log.lines;
        reporter.on_done(&summary);
        Ok(summary)
    }

    fn output_stem(&self, metadata: &TrackMetadata, source: &Path, log: &mut BatchLog<'_>) -> String {
        let stem = match try_format_filename(&self.config.template, metadata) {
            Ok(stem) => stem,
            Err(e) => {
                log.warn(format!(
                    "{} in template '{}', using '{}'",
                    e, self.config.template, FALLBACK_TEMPLATE
                ));
                fallback_filename(metadata)
            }
        };

        if !stem.is_empty() {
            return stem;
        }

        let from_source = source
            .file_stem()
            .map(|s| sanitize_filename(&s.to_string_lossy()))
            .unwrap_or_default();
        log.warn(format!(
            "Template produced an empty name for {}, using the source name",
            display_name(source)
        ));
        if from_source.is_empty() { "untitled".to_string() } else { from_source }
    }
}

/// Regular files directly inside `dir` with a `.flac` extension (any case), sorted.
pub fn find_flac_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ConverterError::Config(format!(
            "Source folder does not exist: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let path = entry.path();
        let is_flac = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));

        if is_flac && path.is_file() {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Reserve `stem` for this run, appending ` (2)`, ` (3)`, ... when taken.
/// Names compare case-insensitively.
fn claim_name(taken: &mut HashSet<String>, stem: &str) -> String {
    let mut candidate = stem.to_string();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{} ({})", stem, n);
        n += 1;
    }
    if candidate != stem {
        warn!("Output name '{}' already used in this run, writing '{}'", stem, candidate);
    }
    candidate
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
