//! Content-activation bridge
//!
//! Some panel content has a side effect outside the panel (the location tab
//! lights up a map region). At most one instance may own that effect. A new
//! activation evicts the previous owner; only the current owner can clear it,
//! either by deactivating or by being retired from the tracker.

use crate::tracker::InstanceId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Content shown by an instance's panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Info,
    Images,
    /// Carries the external effect of the token type
    Location,
    /// Panel closed
    None,
}

impl ContentKind {
    pub fn has_external_effect(&self) -> bool {
        matches!(self, ContentKind::Location)
    }
}

/// The effect currently lit and the instance that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEffect {
    pub effect_key: String,
    pub instance_id: InstanceId,
}

#[derive(Debug, Clone, Default)]
pub struct ActivationBridge {
    active: Option<ActiveEffect>,
}

impl ActivationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `instance_id` as owner of `effect_key`, evicting any previous
    /// owner. Returns the evicted activation, if any.
    pub fn activate(
        &mut self,
        instance_id: InstanceId,
        effect_key: impl Into<String>,
    ) -> Option<ActiveEffect> {
        let effect = ActiveEffect {
            effect_key: effect_key.into(),
            instance_id,
        };
        debug!(
            instance_id = %effect.instance_id,
            effect_key = %effect.effect_key,
            "effect activated"
        );
        self.active.replace(effect)
    }

    /// Clear the activation if `instance_id` owns it. A superseded instance
    /// is a no-op. Returns true when something was cleared.
    pub fn release(&mut self, instance_id: &InstanceId) -> bool {
        match &self.active {
            Some(effect) if &effect.instance_id == instance_id => {
                debug!(instance_id = %instance_id, "effect released");
                self.active = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&ActiveEffect> {
        self.active.as_ref()
    }

    pub fn owner(&self) -> Option<&InstanceId> {
        self.active.as_ref().map(|e| &e.instance_id)
    }
}
