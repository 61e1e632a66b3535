//! The append-only, rotating, time-indexed per-project message log.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tether_core::{Clock, Direction, SystemClock, TimestampedMessage};
use thiserror::Error;

const FILE_PREFIX: &str = "messages_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LogError {
    pub fn code(&self) -> tether_core::ErrorCode {
        tether_core::ErrorCode::InternalError
    }
}

/// Rotation thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_entries: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self { max_bytes: 100 * 1024 * 1024, max_entries: 10_000 }
    }
}

struct OpenFile {
    path: PathBuf,
    file: File,
    size_bytes: u64,
    entry_count: u64,
    opened_date: NaiveDate,
}

/// One project's message log. Lazily creates its first file on the first `append`.
pub struct MessageLog<C: Clock = SystemClock> {
    dir: PathBuf,
    policy: RotationPolicy,
    clock: C,
    current: Mutex<Option<OpenFile>>,
}

impl MessageLog<SystemClock> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, RotationPolicy::default(), SystemClock)
    }
}

impl<C: Clock> MessageLog<C> {
    pub fn with_clock(dir: impl Into<PathBuf>, policy: RotationPolicy, clock: C) -> Self {
        Self { dir: dir.into(), policy, clock, current: Mutex::new(None) }
    }

    /// Append one message. Best-effort: callers log the error and continue —
    /// a failed append never aborts an in-flight execution.
    pub fn append(
        &self,
        direction: Direction,
        payload: serde_json::Value,
    ) -> Result<(), LogError> {
        let timestamp = self.clock.now();
        let message = TimestampedMessage::new(timestamp, direction, payload);
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');

        fs::create_dir_all(&self.dir)?;
        let mut guard = self.current.lock();

        let today = timestamp.date_naive();
        let needs_rotation = match guard.as_ref() {
            Some(open) => {
                open.entry_count > 0
                    && (open.size_bytes >= self.policy.max_bytes
                        || open.entry_count >= self.policy.max_entries
                        || open.opened_date != today)
            }
            None => false,
        };
        if guard.is_none() || needs_rotation {
            *guard = Some(self.open_new_file(timestamp)?);
        }

        if let Some(open) = guard.as_mut() {
            open.file.write_all(&line)?;
            open.file.flush()?;
            open.size_bytes += line.len() as u64;
            open.entry_count += 1;
        }
        Ok(())
    }

    fn open_new_file(&self, timestamp: DateTime<Utc>) -> Result<OpenFile, LogError> {
        let name = format!("{FILE_PREFIX}{}{FILE_SUFFIX}", timestamp.format("%Y-%m-%d_%H-%M-%S"));
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size_bytes = file.metadata()?.len();
        Ok(OpenFile {
            path,
            file,
            size_bytes,
            entry_count: 0,
            opened_date: timestamp.date_naive(),
        })
    }

    /// All messages with `timestamp >= since`, across file boundaries, chronological.
    pub fn messages_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TimestampedMessage>, LogError> {
        let (closed_files, current_snapshot) = {
            let guard = self.current.lock();
            let mut closed = list_closed_files(&self.dir)?;
            if let Some(open) = guard.as_ref() {
                closed.retain(|p| p != &open.path);
                (closed, Some((open.path.clone(), open.size_bytes)))
            } else {
                (closed, None)
            }
        };

        let mut all_files: Vec<(PathBuf, Option<u64>)> =
            closed_files.into_iter().map(|p| (p, None)).collect();
        all_files.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some((path, len)) = current_snapshot {
            all_files.push((path, Some(len)));
        }

        // Filenames are time-ordered; keep the last file whose name-encoded open time is
        // <= `since` (it may still hold trailing entries >= since) plus every later file.
        let start_idx = all_files
            .iter()
            .rposition(|(path, _)| file_open_time(path).map(|t| t <= since).unwrap_or(true))
            .unwrap_or(0);

        let mut out = Vec::new();
        for (path, cap) in &all_files[start_idx..] {
            scan_file(path, *cap, since, &mut out)?;
        }
        Ok(out)
    }
}

fn list_closed_files(dir: &Path) -> Result<Vec<PathBuf>, LogError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_log_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_log_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
        .unwrap_or(false)
}

fn file_open_time(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let naive = chrono::NaiveDateTime::parse_from_str(stem, "%Y-%m-%d_%H-%M-%S").ok()?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn scan_file(
    path: &Path,
    cap_bytes: Option<u64>,
    since: DateTime<Utc>,
    out: &mut Vec<TimestampedMessage>,
) -> Result<(), LogError> {
    let mut file = File::open(path)?;
    let mut buf = match cap_bytes {
        Some(cap) => {
            let mut buf = vec![0u8; cap as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            buf
        }
        None => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            buf
        }
    };
    // A concurrent append may have grown the file past our length snapshot but never
    // shrinks or rewrites it, so truncating to `cap_bytes` is always a valid prefix.
    if buf.last() != Some(&b'\n') {
        buf.push(b'\n');
    }
    for line in BufReader::new(buf.as_slice()).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let message: TimestampedMessage = serde_json::from_str(&line)?;
        if message.timestamp >= since {
            out.push(message);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
