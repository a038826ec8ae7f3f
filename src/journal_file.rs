//! Serialization of journal batches and size-based rotation.

use crate::error::{Result, ShipperError};
use crate::journal::{JournalFormat, JournalItem, JournalOptions};
use chrono::Utc;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const CSV_HEADER: &str = "payload\n";

/// Per-file write state. Replaced wholesale when the configured path changes.
#[derive(Debug, Clone)]
pub(crate) struct JournalFile {
    /// File currently written to; differs from the configured path after a rotation.
    pub path: PathBuf,
    pub header_written: bool,
    pub epoch: u64,
}

impl JournalFile {
    pub fn new(path: PathBuf, epoch: u64) -> Self {
        Self {
            path,
            header_written: false,
            epoch,
        }
    }
}

pub(crate) async fn write_batch(
    file: &mut JournalFile,
    options: &JournalOptions,
    batch: &[JournalItem],
) -> Result<()> {
    match options.format {
        JournalFormat::Json => write_json(file, options, batch).await,
        JournalFormat::Csv => {
            let rows = batch.iter().map(csv_row).collect::<Result<Vec<_>>>()?;
            append_rows(file, options, &rows, Some(CSV_HEADER)).await
        }
        JournalFormat::Txt => {
            let rows = batch.iter().map(txt_line).collect::<Result<Vec<_>>>()?;
            append_rows(file, options, &rows, None).await
        }
    }
}

/// Append the batch to the JSON array in the current file, rewriting it.
async fn write_json(
    file: &mut JournalFile,
    options: &JournalOptions,
    batch: &[JournalItem],
) -> Result<()> {
    let max = options.max_file_bytes;
    let payloads: Vec<Value> = batch
        .iter()
        .map(|item| Value::Object(item.payload.clone()))
        .collect();
    for payload in &payloads {
        let size = serde_json::to_string_pretty(&[payload])?.len() as u64;
        if size > max {
            return Err(ShipperError::RecordTooLarge { size, max });
        }
    }

    ensure_parent(&file.path).await?;
    let mut existing = read_json_array(&file.path).await?;
    let mut remaining = payloads.as_slice();

    loop {
        let mut combined = existing.clone();
        combined.extend_from_slice(remaining);
        let serialized = serde_json::to_string_pretty(&combined)?;
        if serialized.len() as u64 <= max {
            return write_file(&file.path, serialized.as_bytes()).await;
        }

        if existing.is_empty() {
            // the batch alone overflows a fresh file: fill it and carry on
            let (taken, serialized) = largest_json_prefix(remaining, max)?;
            write_file(&file.path, serialized.as_bytes()).await?;
            remaining = &remaining[taken..];
        }
        rotate(file, options).await?;
        existing.clear();
    }
}

fn largest_json_prefix(payloads: &[Value], max: u64) -> Result<(usize, String)> {
    let mut best: Option<(usize, String)> = None;
    for end in 1..=payloads.len() {
        let serialized = serde_json::to_string_pretty(&payloads[..end])?;
        if serialized.len() as u64 > max {
            break;
        }
        best = Some((end, serialized));
    }
    best.ok_or_else(|| {
        let size = serde_json::to_string_pretty(&payloads[..1])
            .map(|s| s.len() as u64)
            .unwrap_or(u64::MAX);
        ShipperError::RecordTooLarge { size, max }
    })
}

/// Append rows to the current file, rotating first when the whole batch does
/// not fit next to what is already there.
async fn append_rows(
    file: &mut JournalFile,
    options: &JournalOptions,
    rows: &[String],
    header: Option<&str>,
) -> Result<()> {
    let max = options.max_file_bytes;
    let header_len = header.map_or(0, |h| h.len() as u64);
    for row in rows {
        let size = row.len() as u64 + header_len;
        if size > max {
            return Err(ShipperError::RecordTooLarge { size, max });
        }
    }

    ensure_parent(&file.path).await?;
    let mut start = 0;
    while start < rows.len() {
        let current = file_len(&file.path).await?;
        // a non-empty file we did not start ourselves already has its header
        file.header_written = current > 0 && (file.header_written || header.is_some());
        let header_cost = if file.header_written { 0 } else { header_len };

        let rest: u64 = rows[start..].iter().map(|r| r.len() as u64).sum();
        if current + header_cost + rest <= max {
            append_chunk(file, header, &rows[start..]).await?;
            return Ok(());
        }
        if current > 0 {
            rotate(file, options).await?;
            continue;
        }

        let mut used = header_cost;
        let mut end = start;
        while end < rows.len() && used + rows[end].len() as u64 <= max {
            used += rows[end].len() as u64;
            end += 1;
        }
        if end == start {
            let size = rows[start].len() as u64 + header_cost;
            return Err(ShipperError::RecordTooLarge { size, max });
        }
        append_chunk(file, header, &rows[start..end]).await?;
        start = end;
        if start < rows.len() {
            rotate(file, options).await?;
        }
    }
    Ok(())
}

async fn append_chunk(file: &mut JournalFile, header: Option<&str>, rows: &[String]) -> Result<()> {
    let mut content = String::new();
    if let Some(header) = header {
        if !file.header_written {
            content.push_str(header);
        }
    }
    for row in rows {
        content.push_str(row);
    }
    append_file(&file.path, content.as_bytes()).await?;
    if header.is_some() {
        file.header_written = true;
    }
    Ok(())
}

fn csv_row(item: &JournalItem) -> Result<String> {
    let json = serde_json::to_string(&item.payload)?;
    Ok(format!("\"{}\"\n", json.replace('"', "\"\"")))
}

fn txt_line(item: &JournalItem) -> Result<String> {
    let mut line = format!(
        "[{}] {}: {}",
        item.timestamp, item.level, item.record.message
    );
    if !item.record.tags.is_empty() {
        line.push_str(" | tags: ");
        line.push_str(&item.record.tags.join(", "));
    }
    if let Some(metadata) = item.record.metadata.as_ref().filter(|m| !m.is_empty()) {
        line.push_str(" | metadata: ");
        line.push_str(&serde_json::to_string(metadata)?);
    }
    line.push('\n');
    Ok(line)
}

/// Switch `file` to a fresh path next to the configured one.
async fn rotate(file: &mut JournalFile, options: &JournalOptions) -> Result<()> {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
    let next = rotation_path(&options.path, &stamp, &file.path).await?;

    debug!(from = %file.path.display(), to = %next.display(), "rotating journal file");
    file.path = next;
    file.header_written = false;
    Ok(())
}

/// `<stem>-<stamp>[-n]<.ext>` beside `base`, skipping `current` and any
/// path that already exists.
async fn rotation_path(base: &Path, stamp: &str, current: &Path) -> Result<PathBuf> {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "journal".to_string());
    let ext = base.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = base.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 0u32;
    loop {
        let mut name = format!("{}-{}", stem, stamp);
        if counter > 0 {
            name.push_str(&format!("-{}", counter));
        }
        if let Some(ext) = &ext {
            name.push('.');
            name.push_str(ext);
        }
        let candidate = parent.join(name);
        let taken = fs::try_exists(&candidate)
            .await
            .map_err(|e| ShipperError::io("checking", candidate.clone(), e))?;
        if candidate != current && !taken {
            return Ok(candidate);
        }
        counter += 1;
    }
}

pub(crate) async fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    match fs::read_to_string(path).await {
        Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Ok(raw) => match serde_json::from_str::<Value>(&raw)? {
            Value::Array(items) => Ok(items),
            _ => Err(ShipperError::CorruptJournal {
                path: path.to_path_buf(),
            }),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ShipperError::io("reading", path, e)),
    }
}

async fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(ShipperError::io("inspecting", path, e)),
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| ShipperError::io("creating directory", parent, e)),
        _ => Ok(()),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .await
        .map_err(|e| ShipperError::io("writing", path, e))
}

async fn append_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| ShipperError::io("opening", path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| ShipperError::io("appending to", path, e))?;
    file.flush()
        .await
        .map_err(|e| ShipperError::io("appending to", path, e))
}
