//! JSON-lines Export
//!
//! Writes a reconciled window one event per line, using the flat record
//! layout of [`MarketEvent`]'s serializer (`bids_0_price`, ...).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::domain::event::MarketEvent;
use crate::domain::lookback::ReconciliationResult;

/// Export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Destination could not be created or written.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    /// Event could not be serialized.
    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),
}

/// Line-delimited JSON writer.
pub struct JsonLinesWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> JsonLinesWriter<W> {
    /// Wrap a writer.
    pub const fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Write one event followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying write fails.
    pub fn write_event(&mut self, event: &MarketEvent) -> Result<(), ExportError> {
        serde_json::to_writer(&mut self.inner, event)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Write every event of a result in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failed event.
    pub fn write_result(&mut self, result: &ReconciliationResult) -> Result<(), ExportError> {
        result
            .events
            .iter()
            .try_for_each(|event| self.write_event(event))
    }

    /// Lines written so far.
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the inner writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn finish(mut self) -> Result<W, ExportError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Write `result` to `path`, or to stdout when no path is given.
///
/// Returns the number of lines written.
///
/// # Errors
///
/// Returns an error if the file cannot be created or any write fails.
pub fn export_result(
    result: &ReconciliationResult,
    path: Option<&Path>,
) -> Result<usize, ExportError> {
    let written = if let Some(path) = path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = JsonLinesWriter::new(BufWriter::new(File::create(path)?));
        writer.write_result(result)?;
        let written = writer.written();
        writer.finish()?;
        written
    } else {
        let mut writer = JsonLinesWriter::new(BufWriter::new(io::stdout().lock()));
        writer.write_result(result)?;
        let written = writer.written();
        writer.finish()?;
        written
    };

    tracing::info!(
        lines = written,
        destination = %path.map_or_else(|| "stdout".to_string(), |p| p.display().to_string()),
        "Lookback window exported"
    );
    Ok(written)
}
