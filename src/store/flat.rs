use super::{append_row, read_rows, RosterFile, SessionStore};
use crate::error::StoreError;
use crate::session::Session;
use std::path::PathBuf;

/// All sessions in a single CSV, one row appended per session
pub struct FlatSessionLog {
    path: PathBuf,
    roster: RosterFile,
}

impl FlatSessionLog {
    pub fn new(path: impl Into<PathBuf>, roster: RosterFile) -> Self {
        Self {
            path: path.into(),
            roster,
        }
    }
}

impl SessionStore for FlatSessionLog {
    fn append(&self, session: &Session) -> Result<(), StoreError> {
        append_row(&self.path, session)
    }

    fn load_all(&self) -> Vec<Session> {
        read_rows(&self.path)
    }

    fn list_roster(&self) -> Vec<String> {
        self.roster.load()
    }

    fn save_roster(&self, names: &[String]) -> Result<(), StoreError> {
        self.roster.save(names)
    }
}
