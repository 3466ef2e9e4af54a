//! # Device Readings
//!
//! Wire format of the voltage box and the batch type handed to the
//! foreground. The device answers `GET /` with:
//!
//! ```json
//! {"channels": [{"channel": "C1", "voltage": 11.8}, {"channel": "C2", "voltage": 0.0}]}
//! ```
//!
//! Channel `C<n>` belongs to cycle `n`.

use crate::error::PollError;
use crate::session::CycleId;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelReading {
    pub channel: String,
    pub voltage: f64,
}

impl ChannelReading {
    pub fn cycle(&self) -> Option<CycleId> {
        CycleId::from_channel(&self.channel)
    }
}

/// One poll's worth of readings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadingBatch {
    pub channels: Vec<ChannelReading>,
}

impl ReadingBatch {
    pub fn parse(body: &str) -> Result<Self, PollError> {
        serde_json::from_str(body).map_err(|e| PollError::Decode(e.to_string()))
    }

    /// Readings addressed to a known cycle, in payload order
    pub fn by_cycle(&self) -> impl Iterator<Item = (CycleId, f64)> + '_ {
        self.channels.iter().filter_map(|reading| match reading.cycle() {
            Some(cycle) => Some((cycle, reading.voltage)),
            None => {
                log::debug!("Ignoring reading for channel {:?}", reading.channel);
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_payload() {
        let batch = ReadingBatch::parse(
            r#"{"channels":[{"channel":"C1","voltage":11.8},{"channel":"C8","voltage":0}]}"#,
        )
        .unwrap();

        assert_eq!(batch.channels.len(), 2);
        let routed: Vec<_> = batch.by_cycle().collect();
        assert_eq!(routed, vec![(CycleId::new(1), 11.8), (CycleId::new(8), 0.0)]);
    }

    #[test]
    fn test_unknown_channels_are_skipped() {
        let batch = ReadingBatch::parse(
            r#"{"channels":[{"channel":"temp","voltage":21.0},{"channel":"C2","voltage":3.5}]}"#,
        )
        .unwrap();

        let routed: Vec<_> = batch.by_cycle().collect();
        assert_eq!(routed, vec![(CycleId::new(2), 3.5)]);
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(ReadingBatch::parse("<html>"), Err(PollError::Decode(_))));
        assert!(matches!(
            ReadingBatch::parse(r#"{"channels":[{"channel":"C1"}]}"#),
            Err(PollError::Decode(_))
        ));
    }
}
