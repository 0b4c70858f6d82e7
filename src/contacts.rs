//! Pending contact set
//!
//! Raw surface events may arrive from an input thread between ticks. The set
//! is guarded by a single mutex held only while an event is applied or while
//! a tick takes its snapshot, so one clustering pass never sees a torn set.

use crate::geometry::Point;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Session-scoped identifier of one physical touch
pub type ContactId = u64;

/// One touch point as seen by a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawContact {
    pub contact_id: ContactId,
    pub x: f64,
    pub y: f64,
}

impl RawContact {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Shared, cloneable handle to the live contact set.
///
/// Contacts are kept ordered by id so that a snapshot of the same physical
/// state always traverses in the same order.
#[derive(Debug, Clone, Default)]
pub struct ContactSurface {
    inner: Arc<Mutex<BTreeMap<ContactId, Point>>>,
}

impl ContactSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A contact went down. A repeated start for a live id just moves it.
    pub fn start(&self, contact_id: ContactId, x: f64, y: f64) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        self.inner.lock().insert(contact_id, Point::new(x, y));
    }

    /// A live contact moved. Returns false (and does nothing) for unknown ids.
    pub fn move_to(&self, contact_id: ContactId, x: f64, y: f64) -> bool {
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        match self.inner.lock().get_mut(&contact_id) {
            Some(point) => {
                *point = Point::new(x, y);
                true
            }
            None => false,
        }
    }

    /// A contact lifted. Returns false for ids that were not live.
    pub fn end(&self, contact_id: ContactId) -> bool {
        self.inner.lock().remove(&contact_id).is_some()
    }

    /// Consistent copy of every live contact, ordered by id
    pub fn snapshot(&self) -> Vec<RawContact> {
        self.inner
            .lock()
            .iter()
            .map(|(&contact_id, p)| RawContact {
                contact_id,
                x: p.x,
                y: p.y,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
