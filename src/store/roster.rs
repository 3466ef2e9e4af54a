use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct RosterRow {
    #[serde(rename = "Name")]
    name: String,
}

/// `students.csv`: one `Name` column, rewritten on every edit
#[derive(Debug, Clone)]
pub struct RosterFile {
    path: PathBuf,
}

impl RosterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Vec<String> {
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(e) => {
                if !super::is_not_found(&e) {
                    log::warn!("Could not open roster {}: {}", self.path.display(), e);
                }
                return Vec::new();
            }
        };

        reader
            .deserialize::<RosterRow>()
            .filter_map(|row| match row {
                Ok(row) => Some(row.name.trim().to_string()),
                Err(e) => {
                    log::warn!("Skipping roster row: {}", e);
                    None
                }
            })
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn save(&self, names: &[String]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Staged beside the roster, then renamed over it
        let staging = self.path.with_extension("csv.tmp");

        // Header written by hand so an empty roster still has one
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&staging)?;
        writer.write_record(["Name"])?;
        for name in names {
            writer.serialize(RosterRow { name: name.clone() })?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_data()?;
        drop(file);

        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
