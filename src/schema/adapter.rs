//! Adapter for turning surface.contact_event.v1 streams into frames
//!
//! Parses recordings and replays them through a [`SurfaceProcessor`] on a
//! simulated clock. For a fixed recording the items, their statuses and the
//! active effect repeat exactly; the session id and content loading flags
//! do not, since those come from a fresh uuid and fetch threads.

use crate::error::TrackingError;
use crate::pipeline::SurfaceProcessor;
use crate::projector::FrameSnapshot;
use crate::schema::contact_event::*;
use chrono::Duration;
use tracing::{debug, warn};

/// Adapter for parsing and replaying contact records
pub struct ContactRecordAdapter;

/// Replay clock settings
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Simulated time between ticks
    pub frame_interval: Duration,
    /// Extra simulated time after the last record, e.g. to let ghosts expire
    pub tail: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::milliseconds(16),
            tail: Duration::zero(),
        }
    }
}

impl ContactRecordAdapter {
    /// Parse a JSON string containing an array of ContactRecords
    pub fn parse_array(json: &str) -> Result<Vec<ContactRecord>, TrackingError> {
        let records: Vec<ContactRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing ContactRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<ContactRecord>, TrackingError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ContactRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(TrackingError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse either format, picking by the first non-blank character
    pub fn parse(input: &str) -> Result<Vec<ContactRecord>, TrackingError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Validate a batch of records, including timestamp order
    pub fn validate_records(records: &[ContactRecord]) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        let mut previous = None;

        for (index, record) in records.iter().enumerate() {
            let mut error = record.validate().err();
            if error.is_none() && previous.is_some_and(|p| record.timestamp < p) {
                error = Some(ValidationError::OutOfOrder {
                    timestamp: record.timestamp,
                });
            }
            previous = Some(record.timestamp);

            if let Some(error) = error {
                results.push(ValidationResult { index, error });
            }
        }
        results
    }

    /// Replay records through `processor`, returning every frame
    pub fn replay(
        records: &[ContactRecord],
        processor: &mut SurfaceProcessor,
        options: &ReplayOptions,
    ) -> Result<Vec<FrameSnapshot>, TrackingError> {
        let mut frames = Vec::new();
        Self::replay_with(records, processor, options, |frame| frames.push(frame))?;
        Ok(frames)
    }

    /// Replay records, handing each frame to `sink` as it is produced.
    ///
    /// Ticks start at the first record and advance by the frame interval up
    /// to the last record plus the tail; the final tick lands exactly on that
    /// end time. Records are applied before the first tick at or after their
    /// timestamp. Returns the number of frames produced.
    pub fn replay_with<F>(
        records: &[ContactRecord],
        processor: &mut SurfaceProcessor,
        options: &ReplayOptions,
        mut sink: F,
    ) -> Result<usize, TrackingError>
    where
        F: FnMut(FrameSnapshot),
    {
        if options.frame_interval <= Duration::zero() {
            return Err(TrackingError::InvalidConfig(
                "replay frame interval must be positive".to_string(),
            ));
        }
        if options.tail < Duration::zero() {
            return Err(TrackingError::InvalidConfig(
                "replay tail must not be negative".to_string(),
            ));
        }
        if let Some(invalid) = Self::validate_records(records).into_iter().next() {
            return Err(TrackingError::ParseError(format!(
                "Invalid record {}: {}",
                invalid.index, invalid.error
            )));
        }
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Ok(0);
        };

        let end = last
            .timestamp
            .checked_add_signed(options.tail)
            .ok_or_else(|| TrackingError::InvalidConfig("replay tail is out of range".to_string()))?;
        let mut now = first.timestamp;
        let mut pending = records.iter().peekable();
        let mut produced = 0;

        loop {
            while let Some(record) = pending.next_if(|r| r.timestamp <= now) {
                if let Err(e) = record.event.apply(processor) {
                    warn!(timestamp = %record.timestamp, error = %e, "replayed event rejected");
                }
            }
            sink(processor.tick(now));
            produced += 1;

            if now >= end {
                break;
            }
            now = now
                .checked_add_signed(options.frame_interval)
                .map_or(end, |next| next.min(end));
        }

        debug!(records = records.len(), frames = produced, "replay finished");
        Ok(produced)
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ObjectStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    /// Four contacts down at t=0, lifted at `lift_ms`
    fn four_point_session(lift_ms: i64) -> Vec<ContactRecord> {
        let corners = [(500.0, 500.0), (540.0, 500.0), (540.0, 540.0), (500.0, 540.0)];
        let mut records: Vec<ContactRecord> = corners
            .iter()
            .enumerate()
            .map(|(i, (x, y))| ContactRecord::start(at(0), i as u64, *x, *y))
            .collect();
        records.extend((0..4).map(|i| ContactRecord::end(at(lift_ms), i)));
        records
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let ndjson = r#"{"schema_version":"surface.contact_event.v1","timestamp":"2024-03-01T10:00:00Z","event":{"type":"start","contact_id":1,"x":10.0,"y":20.0}}

{"schema_version":"surface.contact_event.v1","timestamp":"2024-03-01T10:00:01Z","event":{"type":"end","contact_id":1}}
"#;
        let records = ContactRecordAdapter::parse_ndjson(ndjson).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event, ContactEvent::End { contact_id: 1 });
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"schema_version\":\"surface.contact_event.v1\",\"timestamp\":\"2024-03-01T10:00:00Z\",\"event\":{\"type\":\"reset\"}}\nnot json\n";
        let err = ContactRecordAdapter::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_detects_array() {
        let json = serde_json::to_string(&four_point_session(100)).unwrap();
        let records = ContactRecordAdapter::parse(&json).unwrap();
        assert_eq!(records.len(), 8);
    }

    #[test]
    fn test_validate_flags_out_of_order() {
        let mut records = four_point_session(100);
        records.push(ContactRecord::start(at(50), 9, 0.0, 0.0));

        let results = ContactRecordAdapter::validate_records(&records);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 8);
        assert!(matches!(results[0].error, ValidationError::OutOfOrder { .. }));
    }

    #[test]
    fn test_replay_place_and_remove() {
        let records = four_point_session(500);
        let mut processor = SurfaceProcessor::new();
        let options = ReplayOptions {
            frame_interval: Duration::milliseconds(100),
            tail: Duration::milliseconds(2100),
        };

        let frames = ContactRecordAdapter::replay(&records, &mut processor, &options).unwrap();

        // ticks at 0, 100, ..., 2600
        assert_eq!(frames.len(), 27);
        assert_eq!(frames[0].timestamp, at(0));
        assert_eq!(frames[26].timestamp, at(2600));

        let id = frames[0].items[0].instance_id.clone();
        assert_eq!(frames[0].items[0].type_id, "prod_a");
        // last match at 400; lifted at 500
        assert_eq!(frames[5].item(&id).unwrap().status, ObjectStatus::Ghost);
        assert!(frames[23].item(&id).is_some());
        assert!(frames[24].items.is_empty());
    }

    #[test]
    fn test_replay_applies_control_records() {
        let mut records = four_point_session(10_000);
        let id = format!("prod_a-{}", at(0).timestamp_millis());
        records.insert(
            4,
            ContactRecord::new(
                at(50),
                ContactEvent::Content {
                    instance_id: id.as_str().into(),
                    kind: crate::activation::ContentKind::Location,
                },
            ),
        );
        records.truncate(5);

        let mut processor = SurfaceProcessor::new();
        let options = ReplayOptions {
            frame_interval: Duration::milliseconds(16),
            tail: Duration::milliseconds(100),
        };
        let frames = ContactRecordAdapter::replay(&records, &mut processor, &options).unwrap();

        assert!(frames[0].active_effect.is_none());
        let effect = frames.last().unwrap().active_effect.clone().unwrap();
        assert_eq!(effect.effect_key, "karnataka");
        assert_eq!(effect.instance_id.as_str(), id);
    }

    #[test]
    fn test_replay_is_reproducible() {
        let records = four_point_session(300);
        let options = ReplayOptions::default();

        let run = |records: &[ContactRecord]| {
            let mut processor = SurfaceProcessor::new();
            ContactRecordAdapter::replay(records, &mut processor, &options)
                .unwrap()
                .into_iter()
                .map(|f| (f.frame, f.items))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(&records), run(&records));
    }

    #[test]
    fn test_replay_rejects_invalid_input() {
        let mut records = four_point_session(100);
        records[2].schema_version = "other".to_string();
        let mut processor = SurfaceProcessor::new();

        let result = ContactRecordAdapter::replay(&records, &mut processor, &ReplayOptions::default());
        assert!(matches!(result, Err(TrackingError::ParseError(_))));
    }

    #[test]
    fn test_replay_rejects_unbounded_tail() {
        let records = four_point_session(100);
        let mut processor = SurfaceProcessor::new();
        let options = ReplayOptions {
            frame_interval: Duration::milliseconds(16),
            tail: Duration::milliseconds(i64::MAX),
        };

        let result = ContactRecordAdapter::replay(&records, &mut processor, &options);
        assert!(matches!(result, Err(TrackingError::InvalidConfig(_))));
        assert_eq!(processor.frame(), 0);
    }

    #[test]
    fn test_replay_rejects_negative_tail() {
        let records = four_point_session(100);
        let mut processor = SurfaceProcessor::new();
        let options = ReplayOptions {
            frame_interval: Duration::milliseconds(16),
            tail: Duration::milliseconds(-1),
        };

        let result = ContactRecordAdapter::replay(&records, &mut processor, &options);
        assert!(matches!(result, Err(TrackingError::InvalidConfig(_))));
    }

    #[test]
    fn test_replay_empty() {
        let mut processor = SurfaceProcessor::new();
        let frames =
            ContactRecordAdapter::replay(&[], &mut processor, &ReplayOptions::default()).unwrap();
        assert!(frames.is_empty());
    }
}
