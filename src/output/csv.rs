// CSV input and output for file mode.
//
// Inputs are read from a `text` column; every other column is ignored.
// Outputs are timestamped so repeated runs never overwrite each other:
//   opinions_<YYYYMMDD_HHMMSS>.csv     opinion,topic,type
//   conclusions_<YYYYMMDD_HHMMSS>.csv  topic,summary,effectiveness
// The two outputs are written independently; one failing never stops the
// other from being saved.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::models::{ClassifiedComment, Conclusion};

/// Column every input file must carry.
pub const TEXT_COLUMN: &str = "text";

/// Read the `text` column of a CSV file. Empty cells are kept; filtering is
/// the normalizer's job.
pub fn read_text_column(path: &Path) -> Result<Vec<String>, PipelineError> {
    let source_error = |reason: String| PipelineError::Source {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = ::csv::Reader::from_path(path).map_err(|e| source_error(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| source_error(e.to_string()))?
        .clone();
    let column = headers
        .iter()
        .position(|h| h.trim() == TEXT_COLUMN)
        .ok_or_else(|| source_error(format!("missing `{TEXT_COLUMN}` column")))?;

    let mut texts = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| source_error(format!("row {}: {e}", row + 1)))?;
        texts.push(record.get(column).unwrap_or_default().to_string());
    }

    info!(path = %path.display(), rows = texts.len(), "Loaded input");
    Ok(texts)
}

#[derive(Serialize)]
struct OpinionRow<'a> {
    opinion: &'a str,
    topic: &'a str,
    #[serde(rename = "type")]
    role: &'static str,
}

#[derive(Serialize)]
struct ConclusionRow<'a> {
    topic: &'a str,
    summary: &'a str,
    effectiveness: &'static str,
}

/// Output file names for one run.
pub fn output_paths(dir: &Path, at: DateTime<Local>) -> (PathBuf, PathBuf) {
    let stamp = at.format("%Y%m%d_%H%M%S");
    (
        dir.join(format!("opinions_{stamp}.csv")),
        dir.join(format!("conclusions_{stamp}.csv")),
    )
}

/// Files written by one run. `None` where there were no rows to write or the
/// write failed; failures are collected in `errors`.
#[derive(Debug, Default)]
pub struct WrittenFiles {
    pub opinions: Option<PathBuf>,
    pub conclusions: Option<PathBuf>,
    pub errors: Vec<anyhow::Error>,
}

/// Write both result files into `dir`, creating it if needed. Only a missing
/// output directory is an error here.
pub fn write_results(
    dir: &Path,
    comments: &[ClassifiedComment],
    conclusions: &[Conclusion],
) -> Result<WrittenFiles> {
    write_results_at(dir, Local::now(), comments, conclusions)
}

fn write_results_at(
    dir: &Path,
    at: DateTime<Local>,
    comments: &[ClassifiedComment],
    conclusions: &[Conclusion],
) -> Result<WrittenFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let (opinions_path, conclusions_path) = output_paths(dir, at);
    let mut written = WrittenFiles::default();

    match write_opinions(&opinions_path, comments) {
        Ok(path) => written.opinions = path,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Error saving opinions");
            written.errors.push(e);
        }
    }
    match write_conclusions(&conclusions_path, conclusions) {
        Ok(path) => written.conclusions = path,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Error saving conclusions");
            written.errors.push(e);
        }
    }

    Ok(written)
}

pub fn write_opinions(path: &Path, comments: &[ClassifiedComment]) -> Result<Option<PathBuf>> {
    let rows = comments.iter().map(|c| OpinionRow {
        opinion: &c.text,
        topic: &c.topic,
        role: c.role.as_str(),
    });
    write_rows(path, rows, "opinions")
}

pub fn write_conclusions(path: &Path, conclusions: &[Conclusion]) -> Result<Option<PathBuf>> {
    let rows = conclusions.iter().map(|c| ConclusionRow {
        topic: &c.topic,
        summary: &c.summary,
        effectiveness: c.effectiveness.as_str(),
    });
    write_rows(path, rows, "conclusions")
}

fn write_rows<T: Serialize>(
    path: &Path,
    rows: impl ExactSizeIterator<Item = T>,
    kind: &str,
) -> Result<Option<PathBuf>> {
    if rows.len() == 0 {
        warn!(kind, "No {} to save", kind);
        return Ok(None);
    }

    let count = rows.len();
    let mut writer = ::csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;

    info!(path = %path.display(), rows = count, "Saved {}", kind);
    Ok(Some(path.to_path_buf()))
}
