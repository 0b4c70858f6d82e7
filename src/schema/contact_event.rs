//! surface.contact_event.v1 schema definition
//!
//! One record per surface or control event, stamped with the wall-clock time
//! it happened. Recorded sessions are streams of these records.

use crate::activation::ContentKind;
use crate::contacts::ContactId;
use crate::error::TrackingError;
use crate::pipeline::SurfaceProcessor;
use crate::scheduler::EngineCommand;
use crate::tracker::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "surface.contact_event.v1";

/// A surface event or a presentation-side control event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContactEvent {
    /// A contact went down
    Start { contact_id: ContactId, x: f64, y: f64 },
    /// A live contact moved
    Move { contact_id: ContactId, x: f64, y: f64 },
    /// A contact lifted
    End { contact_id: ContactId },
    Reset,
    Activate {
        instance_id: InstanceId,
        effect_key: String,
    },
    Deactivate { instance_id: InstanceId },
    /// A panel switched content
    Content {
        instance_id: InstanceId,
        kind: ContentKind,
    },
}

impl ContactEvent {
    /// Control events as the command the frame thread would receive
    pub fn to_command(&self) -> Option<EngineCommand> {
        match self {
            ContactEvent::Start { .. } | ContactEvent::Move { .. } | ContactEvent::End { .. } => {
                None
            }
            ContactEvent::Reset => Some(EngineCommand::Reset),
            ContactEvent::Activate {
                instance_id,
                effect_key,
            } => Some(EngineCommand::Activate {
                instance_id: instance_id.clone(),
                effect_key: effect_key.clone(),
            }),
            ContactEvent::Deactivate { instance_id } => Some(EngineCommand::Deactivate {
                instance_id: instance_id.clone(),
            }),
            ContactEvent::Content { instance_id, kind } => Some(EngineCommand::ContentChanged {
                instance_id: instance_id.clone(),
                kind: *kind,
            }),
        }
    }

    /// Feed the event into a processor
    pub fn apply(&self, processor: &mut SurfaceProcessor) -> Result<(), TrackingError> {
        match self {
            ContactEvent::Start { contact_id, x, y } => {
                processor.contact_start(*contact_id, *x, *y);
                Ok(())
            }
            ContactEvent::Move { contact_id, x, y } => {
                processor.contact_move(*contact_id, *x, *y);
                Ok(())
            }
            ContactEvent::End { contact_id } => {
                processor.contact_end(*contact_id);
                Ok(())
            }
            _ => match self.to_command() {
                Some(command) => command.apply(processor),
                None => Ok(()),
            },
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ContactEvent::Start { .. } => "start",
            ContactEvent::Move { .. } => "move",
            ContactEvent::End { .. } => "end",
            ContactEvent::Reset => "reset",
            ContactEvent::Activate { .. } => "activate",
            ContactEvent::Deactivate { .. } => "deactivate",
            ContactEvent::Content { .. } => "content",
        }
    }
}

/// The main surface.contact_event.v1 record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Schema version identifier
    pub schema_version: String,
    /// Event timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    pub event: ContactEvent,
}

impl ContactRecord {
    pub fn new(timestamp: DateTime<Utc>, event: ContactEvent) -> Self {
        ContactRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            event,
        }
    }

    pub fn start(timestamp: DateTime<Utc>, contact_id: ContactId, x: f64, y: f64) -> Self {
        Self::new(timestamp, ContactEvent::Start { contact_id, x, y })
    }

    pub fn moved(timestamp: DateTime<Utc>, contact_id: ContactId, x: f64, y: f64) -> Self {
        Self::new(timestamp, ContactEvent::Move { contact_id, x, y })
    }

    pub fn end(timestamp: DateTime<Utc>, contact_id: ContactId) -> Self {
        Self::new(timestamp, ContactEvent::End { contact_id })
    }

    /// Validate the record schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        match &self.event {
            ContactEvent::Start { contact_id, x, y } | ContactEvent::Move { contact_id, x, y }
                if !(x.is_finite() && y.is_finite()) =>
            {
                Err(ValidationError::NonFiniteCoordinate {
                    event_type: self.event.type_name().to_string(),
                    contact_id: *contact_id,
                })
            }
            ContactEvent::Activate { instance_id, .. }
            | ContactEvent::Deactivate { instance_id }
            | ContactEvent::Content { instance_id, .. }
                if instance_id.as_str().is_empty() =>
            {
                Err(ValidationError::MissingInstanceId {
                    event_type: self.event.type_name().to_string(),
                })
            }
            ContactEvent::Activate { effect_key, .. } if effect_key.is_empty() => {
                Err(ValidationError::MissingEffectKey)
            }
            _ => Ok(()),
        }
    }
}

/// Validation errors for contact records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Non-finite coordinate in {event_type} event for contact {contact_id}")]
    NonFiniteCoordinate { event_type: String, contact_id: ContactId },

    #[error("{event_type} event has an empty instance_id")]
    MissingInstanceId { event_type: String },

    #[error("activate event has an empty effect_key")]
    MissingEffectKey,

    #[error("Timestamp {timestamp} is earlier than the previous record")]
    OutOfOrder { timestamp: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_serialize_start_record() {
        let record = ContactRecord::start(ts(), 7, 120.5, 80.0);
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("surface.contact_event.v1"));
        assert!(json.contains(r#""type":"start""#));
        assert!(json.contains(r#""contact_id":7"#));
    }

    #[test]
    fn test_deserialize_control_record() {
        let json = r#"{
            "schema_version": "surface.contact_event.v1",
            "timestamp": "2024-03-01T10:00:02Z",
            "event": {"type": "content", "instance_id": "prod_a-1", "kind": "location"}
        }"#;

        let record: ContactRecord = serde_json::from_str(json).unwrap();
        assert!(record.validate().is_ok());
        assert_eq!(
            record.event.to_command(),
            Some(EngineCommand::ContentChanged {
                instance_id: "prod_a-1".into(),
                kind: ContentKind::Location,
            })
        );
    }

    #[test]
    fn test_validation_rejects_wrong_version() {
        let mut record = ContactRecord::end(ts(), 1);
        record.schema_version = "surface.contact_event.v0".to_string();
        assert!(matches!(
            record.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_non_finite() {
        let record = ContactRecord::moved(ts(), 3, f64::NAN, 10.0);
        assert_eq!(
            record.validate(),
            Err(ValidationError::NonFiniteCoordinate {
                event_type: "move".to_string(),
                contact_id: 3,
            })
        );
    }

    #[test]
    fn test_validation_rejects_empty_instance() {
        let record = ContactRecord::new(
            ts(),
            ContactEvent::Deactivate {
                instance_id: "".into(),
            },
        );
        assert!(matches!(
            record.validate(),
            Err(ValidationError::MissingInstanceId { .. })
        ));
    }
}
