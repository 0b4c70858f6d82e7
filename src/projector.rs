//! Render-list projection
//!
//! Flattens tracker state into copies the presentation layer can keep
//! without any way back into the engine.

use crate::activation::ActiveEffect;
use crate::cluster::Cluster;
use crate::content::ContentEntry;
use crate::contacts::RawContact;
use crate::tracker::{InstanceId, ObjectStatus, TrackedObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Read-only snapshot of one tracked object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderItem {
    pub type_id: String,
    pub instance_id: InstanceId,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub contact_count: usize,
    pub status: ObjectStatus,
}

impl From<&TrackedObject> for RenderItem {
    fn from(obj: &TrackedObject) -> Self {
        Self {
            type_id: obj.type_id.clone(),
            instance_id: obj.instance_id.clone(),
            x: obj.x,
            y: obj.y,
            rotation: obj.rotation,
            contact_count: obj.contact_count,
            status: obj.status,
        }
    }
}

/// Calibration overlay data, only produced while debugging is on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSnapshot {
    pub contacts: Vec<RawContact>,
    pub clusters: Vec<Cluster>,
    /// Radius the overlay draws around each detected token
    pub token_radius_px: f64,
}

/// Everything the presentation layer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub session_id: Uuid,
    pub frame: u64,
    pub timestamp: DateTime<Utc>,
    pub items: Vec<RenderItem>,
    pub active_effect: Option<ActiveEffect>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, ContentEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugSnapshot>,
}

impl FrameSnapshot {
    pub fn item(&self, instance_id: &InstanceId) -> Option<&RenderItem> {
        self.items.iter().find(|i| &i.instance_id == instance_id)
    }
}

/// Tracked objects to render items, preserving tracker order
pub fn project(objects: &[TrackedObject]) -> Vec<RenderItem> {
    objects.iter().map(RenderItem::from).collect()
}
