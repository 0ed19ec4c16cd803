//! Append-only run log (`create_volatility_profile.log`).
//!
//! One line per event: `[<rfc3339 timestamp>]: <message>`. The file is opened
//! in append mode, so re-running the tool extends the history instead of
//! replacing it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat, TimeZone};

/// Timestamped line writer over any sink.
pub struct RunLog {
    sink: Box<dyn Write + Send>,
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog").finish_non_exhaustive()
    }
}

impl RunLog {
    /// Open (or create) the log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open run log {}", path.display()))?;
        Ok(Self {
            sink: Box::new(file),
        })
    }

    fn from_writer(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Discard everything.
    pub fn disabled() -> Self {
        Self::from_writer(io::sink())
    }

    /// Append one timestamped line. Embedded newlines are folded so each event
    /// stays on a single line.
    pub fn record(&mut self, message: &str) -> Result<()> {
        let line = format_line(&Local::now(), message);
        self.sink
            .write_all(line.as_bytes())
            .context("write run log")?;
        self.sink.flush().context("flush run log")
    }
}

/// Render a single log line, including the trailing newline.
pub fn format_line<Tz: TimeZone>(at: &DateTime<Tz>, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let folded = message
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    format!(
        "[{}]: {}\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, false),
        folded
    )
}
