//! # Session Log Storage
//!
//! Append-only persistence of closed sessions plus the student roster.
//!
//! ## Backends
//! - `FlatSessionLog`: every session in one `sessions.csv`
//! - `DailySessionLog`: one `YYYY-MM-DD.csv` per start date
//!
//! Both share the `students.csv` roster and the same failure rules:
//! a missing or unreadable log loads as empty history, while a failed
//! append is always reported to the caller.

mod daily;
mod flat;
mod roster;

pub use daily::DailySessionLog;
pub use flat::FlatSessionLog;
pub use roster::RosterFile;

use crate::error::StoreError;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// How session logs are laid out on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLayout {
    #[default]
    Flat,
    Daily,
}

pub trait SessionStore {
    /// Durably persist one closed session
    fn append(&self, session: &Session) -> Result<(), StoreError>;

    /// Every persisted session in insertion order; empty if nothing is readable
    fn load_all(&self) -> Vec<Session>;

    fn list_roster(&self) -> Vec<String>;

    fn save_roster(&self, names: &[String]) -> Result<(), StoreError>;
}

/// Open the configured backend under `data_dir`
pub fn open_store(layout: LogLayout, data_dir: &Path) -> Box<dyn SessionStore> {
    let roster = RosterFile::new(data_dir.join("students.csv"));
    match layout {
        LogLayout::Flat => Box::new(FlatSessionLog::new(data_dir.join("sessions.csv"), roster)),
        LogLayout::Daily => Box::new(DailySessionLog::new(data_dir.join("sessions"), roster)),
    }
}

/// Append one row to a CSV file, writing the header only for a new file.
///
/// Earlier rows are never rewritten. A row torn by a crash is terminated
/// first so the new row starts on its own line. The writer is flushed and
/// the file synced before returning; the handle is closed on every path by drop.
fn append_row(path: &Path, session: &Session) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    let is_new = len == 0;
    if !is_new && !ends_with_newline(&mut file, len)? {
        log::warn!("{} ends mid-row; starting a new line", path.display());
        file.write_all(b"\n")?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(session)?;

    let file = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    file.sync_data()?;
    Ok(())
}

fn ends_with_newline(file: &mut File, len: u64) -> Result<bool, StoreError> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Read every parseable session from one CSV file.
///
/// Missing file is normal startup state; corrupt rows are skipped.
fn read_rows(path: &Path) -> Vec<Session> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            if !is_not_found(&e) {
                log::warn!("Could not open session log {}: {}", path.display(), e);
            }
            return Vec::new();
        }
    };

    let mut sessions = Vec::new();
    for (row, result) in reader.deserialize::<Session>().enumerate() {
        match result {
            Ok(session) => sessions.push(session),
            Err(e) => log::warn!("Skipping row {} of {}: {}", row + 1, path.display(), e),
        }
    }
    sessions
}

fn is_not_found(e: &csv::Error) -> bool {
    matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound)
}
