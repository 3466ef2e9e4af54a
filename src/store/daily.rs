use super::{append_row, read_rows, RosterFile, SessionStore};
use crate::error::StoreError;
use crate::session::Session;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// One CSV per day, named after the date the session started.
///
/// ```text
/// sessions/
/// ├── 2024-05-01.csv
/// └── 2024-05-02.csv
/// ```
pub struct DailySessionLog {
    dir: PathBuf,
    roster: RosterFile,
}

impl DailySessionLog {
    pub fn new(dir: impl Into<PathBuf>, roster: RosterFile) -> Self {
        Self {
            dir: dir.into(),
            roster,
        }
    }

    fn day_file(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.csv", day.format(DAY_FORMAT)))
    }

    /// Day files in date order; anything not named like a date is ignored
    fn day_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Could not list {}: {}", self.dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut days: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter_map(|path| parse_day(&path).map(|day| (day, path)))
            .collect();
        days.sort_by_key(|(day, _)| *day);
        days.into_iter().map(|(_, path)| path).collect()
    }
}

fn parse_day(path: &Path) -> Option<NaiveDate> {
    if path.extension()? != "csv" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, DAY_FORMAT).ok()
}

impl SessionStore for DailySessionLog {
    fn append(&self, session: &Session) -> Result<(), StoreError> {
        append_row(&self.day_file(session.start.date()), session)
    }

    fn load_all(&self) -> Vec<Session> {
        self.day_files().iter().flat_map(|path| read_rows(path)).collect()
    }

    fn list_roster(&self) -> Vec<String> {
        self.roster.load()
    }

    fn save_roster(&self, names: &[String]) -> Result<(), StoreError> {
        self.roster.save(names)
    }
}
