//! # Session Records
//!
//! The unit of record: one student riding one cycle from `start` to `end`.
//! Closed sessions are immutable values; the tracker produces them and the
//! store persists them verbatim.
//!
//! ## CSV Layout
//! ```text
//! Student,Cycle,Start,End,Duration (s),Energy (kWh)
//! Ada,Cycle 3,2024-05-02 10:15:00,2024-05-02 10:20:30,330,1.25
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Local-time format used for every persisted timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A physical bicycle station, 1-indexed ("Cycle 1".."Cycle N")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CycleId(usize);

impl CycleId {
    pub fn new(number: usize) -> Self {
        Self(number)
    }

    /// Zero-based slot index for tracker lookup
    pub fn index(&self) -> Option<usize> {
        self.0.checked_sub(1)
    }

    /// Map a device channel name (`C<n>`) to its cycle
    pub fn from_channel(channel: &str) -> Option<Self> {
        let number = channel.strip_prefix('C')?.parse::<usize>().ok()?;
        (number > 0).then_some(Self(number))
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cycle {}", self.0)
    }
}

impl FromStr for CycleId {
    type Err = String;

    /// Accepts "Cycle 3", "C3" and "3", in any letter case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = strip_prefix_ignore_case(trimmed, "cycle")
            .or_else(|| strip_prefix_ignore_case(trimmed, "c"))
            .unwrap_or(trimmed)
            .trim();

        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Self(n)),
            _ => Err(format!("Not a cycle: {:?}", s)),
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

impl TryFrom<String> for CycleId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CycleId> for String {
    fn from(cycle: CycleId) -> Self {
        cycle.to_string()
    }
}

/// A closed session exactly as it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "Student")]
    pub student: String,
    #[serde(rename = "Cycle")]
    pub cycle: CycleId,
    #[serde(rename = "Start", with = "local_time")]
    pub start: NaiveDateTime,
    #[serde(rename = "End", with = "local_time")]
    pub end: NaiveDateTime,
    #[serde(rename = "Duration (s)")]
    pub duration_secs: i64,
    #[serde(rename = "Energy (kWh)")]
    pub energy_kwh: f64,
}

impl Session {
    /// Duration derived from the stored timestamps
    pub fn elapsed_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Serde adapter for `TIMESTAMP_FORMAT` strings
mod local_time {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_id_parsing() {
        assert_eq!("Cycle 3".parse::<CycleId>().unwrap(), CycleId::new(3));
        assert_eq!("C7".parse::<CycleId>().unwrap(), CycleId::new(7));
        assert_eq!(" 2 ".parse::<CycleId>().unwrap(), CycleId::new(2));
        assert_eq!("c3".parse::<CycleId>().unwrap(), CycleId::new(3));
        assert_eq!("CYCLE 4".parse::<CycleId>().unwrap(), CycleId::new(4));
        assert!("Cycle 0".parse::<CycleId>().is_err());
        assert!("bike".parse::<CycleId>().is_err());
    }

    #[test]
    fn test_channel_mapping() {
        assert_eq!(CycleId::from_channel("C1"), Some(CycleId::new(1)));
        assert_eq!(CycleId::from_channel("C12"), Some(CycleId::new(12)));
        assert_eq!(CycleId::from_channel("C0"), None);
        assert_eq!(CycleId::from_channel("V1"), None);
        assert_eq!(CycleId::new(1).index(), Some(0));
    }

    #[test]
    fn test_session_csv_header_and_format() {
        let start = NaiveDateTime::parse_from_str("2024-05-02 10:15:00", TIMESTAMP_FORMAT).unwrap();
        let end = NaiveDateTime::parse_from_str("2024-05-02 10:20:30", TIMESTAMP_FORMAT).unwrap();
        let session = Session {
            student: "Ada".to_string(),
            cycle: CycleId::new(3),
            start,
            end,
            duration_secs: 330,
            energy_kwh: 1.25,
        };

        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&session).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(
            text,
            "Student,Cycle,Start,End,Duration (s),Energy (kWh)\n\
             Ada,Cycle 3,2024-05-02 10:15:00,2024-05-02 10:20:30,330,1.25\n"
        );
        assert_eq!(session.elapsed_secs(), 330);
    }
}
