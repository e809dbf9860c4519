use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

use crate::workflow::BatchSummary;

const BAR_LENGTH: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
}

/// One entry of the visible batch log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new<S: Into<String>>(level: LogLevel, message: S) -> Self {
        Self {
            at: Local::now(),
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Receives batch progress. Implementations must not block.
pub trait ProgressReporter: Send + Sync {
    /// Fraction of files started, `0.0..=1.0`
    fn on_progress(&self, fraction: f64);

    fn on_status(&self, _status: &str) {}

    fn on_log(&self, line: &LogLine);

    fn on_done(&self, summary: &BatchSummary);
}

/// Everything a batch reports, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(f64),
    Status(String),
    Log(LogLine),
    Done(BatchSummary),
}

/// Forwards events to another task over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_progress(&self, fraction: f64) {
        self.send(ProgressEvent::Progress(fraction));
    }

    fn on_status(&self, status: &str) {
        self.send(ProgressEvent::Status(status.to_string()));
    }

    fn on_log(&self, line: &LogLine) {
        self.send(ProgressEvent::Log(line.clone()));
    }

    fn on_done(&self, summary: &BatchSummary) {
        self.send(ProgressEvent::Done(summary.clone()));
    }
}

/// The progress bar currently on screen, shared with the console log writer
#[derive(Debug, Clone, Default)]
pub struct ActiveBar {
    bar: Arc<Mutex<Option<ProgressBar>>>,
}

impl ActiveBar {
    fn set(&self, bar: Option<ProgressBar>) {
        if let Ok(mut active) = self.bar.lock() {
            *active = bar;
        }
    }

    pub fn is_active(&self) -> bool {
        self.bar.lock().map(|active| active.is_some()).unwrap_or(false)
    }

    /// Run `f` with the bar cleared from the terminal, redrawing it afterwards
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        let bar = self.bar.lock().ok().and_then(|active| active.clone());
        match bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}

/// Stderr writer that never draws over the progress bar
pub struct SuspendingStderr {
    active: ActiveBar,
}

impl Write for SuspendingStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.active.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.active.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ActiveBar {
    type Writer = SuspendingStderr;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendingStderr { active: self.clone() }
    }
}

/// Terminal rendering of a batch: a progress bar with the log printed above it.
///
/// Warnings are left to the tracing console layer so they are not printed twice.
/// That layer writes through [`ActiveBar`], so pass the same handle to
/// [`ConsoleProgress::attach`].
pub struct ConsoleProgress {
    bar: ProgressBar,
    active: ActiveBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self {
            bar,
            active: ActiveBar::default(),
        }
    }

    /// Share the bar with a console log writer while draining
    pub fn attach(mut self, active: &ActiveBar) -> Self {
        self.active = active.clone();
        self
    }

    /// Render events until the sender side is dropped
    pub async fn drain(&self, mut events: UnboundedReceiver<ProgressEvent>) {
        self.active.set(Some(self.bar.clone()));
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
        self.active.set(None);
    }

    fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Progress(fraction) => {
                self.bar.set_position(bar_position(fraction));
            }
            ProgressEvent::Status(status) => self.bar.set_message(status),
            ProgressEvent::Log(line) => {
                if line.level == LogLevel::Info {
                    self.bar.println(line.to_string());
                }
            }
            ProgressEvent::Done(summary) => {
                self.bar.finish_with_message(format!(
                    "Complete: {} converted, {} failed",
                    summary.converted, summary.failed
                ));
            }
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_position_is_clamped() {
        assert_eq!(bar_position(0.0), 0);
        assert_eq!(bar_position(0.5), 500);
        assert_eq!(bar_position(1.0), 1000);
        assert_eq!(bar_position(1.7), 1000);
        assert_eq!(bar_position(-0.2), 0);
    }

    #[tokio::test]
    async fn test_channel_reporter_preserves_order() {
        let (reporter, mut events) = ChannelReporter::channel();
        reporter.on_progress(0.0);
        reporter.on_status("Converting a.flac...");
        reporter.on_log(&LogLine::new(LogLevel::Info, "Converting: a.flac -> A.mp3"));
        reporter.on_done(&BatchSummary::default());
        drop(reporter);

        assert_eq!(events.recv().await, Some(ProgressEvent::Progress(0.0)));
        assert_eq!(
            events.recv().await,
            Some(ProgressEvent::Status("Converting a.flac...".to_string()))
        );
        assert!(matches!(events.recv().await, Some(ProgressEvent::Log(line)) if line.message.ends_with("A.mp3")));
        assert!(matches!(events.recv().await, Some(ProgressEvent::Done(s)) if s.converted == 0));
        assert_eq!(events.recv().await, None);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_harmless() {
        let (reporter, events) = ChannelReporter::channel();
        drop(events);
        reporter.on_progress(0.5);
    }

    fn hidden_console() -> ConsoleProgress {
        ConsoleProgress {
            bar: ProgressBar::hidden(),
            active: ActiveBar::default(),
        }
    }

    #[tokio::test]
    async fn test_console_drains_hidden_bar() {
        let console = hidden_console();
        let (reporter, events) = ChannelReporter::channel();
        reporter.on_progress(0.5);
        reporter.on_done(&BatchSummary::default());
        drop(reporter);

        console.drain(events).await;
        assert!(console.bar.is_finished());
    }

    #[tokio::test]
    async fn test_log_writer_suspends_bar_only_while_draining() {
        let active = ActiveBar::default();
        let console = hidden_console().attach(&active);
        let (reporter, events) = ChannelReporter::channel();

        let draining = tokio::spawn(async move { console.drain(events).await });
        while !active.is_active() {
            tokio::task::yield_now().await;
        }
        assert_eq!(active.suspend(|| 7), 7);
        let mut writer = active.make_writer();
        assert!(writer.write_all(b"").is_ok());

        drop(reporter);
        draining.await.unwrap();
        assert!(!active.is_active());
        assert_eq!(active.suspend(|| "direct"), "direct");
    }
}
