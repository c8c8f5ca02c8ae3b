use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use queue_dedupe_core::{ClassifiedFile, UploadAction};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            _ => bail!(
                "Unsupported report format for {}: use a .csv or .json file",
                path.display()
            ),
        }
    }
}

/// One CSV line per queued file.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    id: u64,
    batch: u64,
    name: &'a str,
    folder_path: &'a str,
    size: u64,
    modified: String,
    status: &'a str,
    action: &'a str,
    reference_id: Option<u64>,
    folder_path_reference: Option<&'a str>,
    content_hash: Option<&'a str>,
}

impl<'a> ReportRow<'a> {
    fn from_file(file: &'a ClassifiedFile) -> Self {
        Self {
            id: file.id.0,
            batch: file.batch_order,
            name: &file.name,
            folder_path: &file.folder_path,
            size: file.size,
            modified: format_millis(file.modified_at),
            status: file.status.map(|s| s.as_str()).unwrap_or("unclassified"),
            action: match file.action {
                UploadAction::Upload => "upload",
                UploadAction::RecordMetadata => "record-metadata",
                UploadAction::Skip => "skip",
            },
            reference_id: file.reference_id.map(|r| r.0),
            folder_path_reference: file.folder_path_reference.as_deref(),
            content_hash: file.content_hash.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    total_files: usize,
    files: &'a [ClassifiedFile],
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Write the queue snapshot to `path`, format chosen by extension.
pub fn write_report(path: &Path, files: &[ClassifiedFile]) -> Result<usize> {
    let format = ReportFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    match format {
        ReportFormat::Csv => write_csv(file, files)?,
        ReportFormat::Json => write_json(BufWriter::new(file), files)?,
    }
    Ok(files.len())
}

fn write_csv<W: Write>(writer: W, files: &[ClassifiedFile]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for file in files {
        csv_writer.serialize(ReportRow::from_file(file))?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn write_json<W: Write>(mut writer: W, files: &[ClassifiedFile]) -> Result<()> {
    let report = JsonReport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_files: files.len(),
        files,
    };
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writer.flush()?;
    Ok(())
}
