//! Persist search outcomes as JSON Lines, and load record batches.
//!
//! Two layers:
//! - `write_outcomes` / `read_outcomes`: one `SearchOutcome` per line (atomic write).
//! - `OutcomeWriter`: streaming accumulator that flushes numbered files when full.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use placer_mcts::Record;
use serde::de::DeserializeOwned;

use crate::search_pool::SearchOutcome;
use crate::DriverError;

// ---------------------------------------------------------------------------
// write_outcomes / read_outcomes
// ---------------------------------------------------------------------------

/// Write `outcomes` to `path`, one JSON object per line. Atomic (tmp → rename).
pub fn write_outcomes(outcomes: &[SearchOutcome], path: &Path) -> Result<(), DriverError> {
    let tmp_path = path.with_extension("jsonl.tmp");
    {
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        for outcome in outcomes {
            serde_json::to_writer(&mut out, outcome)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }

    fs::rename(&tmp_path, path)?;
    debug!("wrote {} outcomes to {}", outcomes.len(), path.display());
    Ok(())
}

/// Read outcomes written by `write_outcomes`.
pub fn read_outcomes(path: &Path) -> Result<Vec<SearchOutcome>, DriverError> {
    read_json_lines(path)
}

/// Read a batch of records, one JSON-encoded `Record` per line.
///
/// Records are validated when a search primes its state, not here.
pub fn read_records(path: &Path) -> Result<Vec<Arc<Record>>, DriverError> {
    let records: Vec<Record> = read_json_lines(path)?;
    Ok(records.into_iter().map(Arc::new).collect())
}

/// Blank lines are skipped; line numbers in errors are 1-based.
fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DriverError> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|source| DriverError::Json {
            line: i + 1,
            source,
        })?;
        items.push(item);
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// OutcomeWriter — streaming accumulator
// ---------------------------------------------------------------------------

/// Accumulates outcomes and flushes them to `outcomes_NNNN.jsonl` files in
/// `output_dir` when the buffer is full.
pub struct OutcomeWriter {
    output_dir: PathBuf,
    max_per_file: usize,
    buffer: Vec<SearchOutcome>,
    written_paths: Vec<PathBuf>,
}

impl OutcomeWriter {
    /// `max_per_file` 0 is treated as 1.
    pub fn new(output_dir: &Path, max_per_file: usize) -> Self {
        let max_per_file = max_per_file.max(1);
        Self {
            output_dir: output_dir.to_path_buf(),
            max_per_file,
            buffer: Vec::with_capacity(max_per_file),
            written_paths: Vec::new(),
        }
    }

    /// Add an outcome. Flushes to disk if the buffer reaches capacity.
    pub fn add(&mut self, outcome: SearchOutcome) -> Result<Option<PathBuf>, DriverError> {
        self.buffer.push(outcome);
        if self.buffer.len() >= self.max_per_file {
            return self.flush();
        }
        Ok(None)
    }

    /// Flush buffered outcomes. Returns the path if anything was written.
    pub fn flush(&mut self) -> Result<Option<PathBuf>, DriverError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let filename = format!("outcomes_{:04}.jsonl", self.written_paths.len());
        let path = self.output_dir.join(filename);
        write_outcomes(&self.buffer, &path)?;
        self.written_paths.push(path.clone());
        self.buffer.clear();
        Ok(Some(path))
    }

    /// Flush remaining outcomes and return all written paths.
    pub fn finish(mut self) -> Result<Vec<PathBuf>, DriverError> {
        self.flush()?;
        Ok(self.written_paths)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.written_paths
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
