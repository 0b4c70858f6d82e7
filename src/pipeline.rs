//! Frame pipeline
//!
//! This module provides the stateful entry point of the engine. One
//! [`SurfaceProcessor`] owns all tracking state and turns the live contact set
//! into a [`FrameSnapshot`] once per tick:
//!
//! contacts → clusters → tracker update → effect/content bookkeeping → render list

use crate::activation::{ActivationBridge, ActiveEffect, ContentKind};
use crate::catalog::Catalog;
use crate::cluster::detect_clusters;
use crate::config::TrackerConfig;
use crate::contacts::{ContactId, ContactSurface};
use crate::content::{ContentFetcher, ContentLibrary};
use crate::error::TrackingError;
use crate::projector::{project, DebugSnapshot, FrameSnapshot};
use crate::tracker::{IdentityTracker, InstanceId, TrackedObject, TrackerUpdate};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Owns the tracking state of one table session.
///
/// Contact events may be fed through [`SurfaceProcessor::surface`] from any
/// thread; everything else is driven from the thread that calls `tick`.
#[derive(Debug)]
pub struct SurfaceProcessor {
    config: TrackerConfig,
    catalog: Catalog,
    surface: ContactSurface,
    tracker: IdentityTracker,
    bridge: ActivationBridge,
    content: ContentLibrary,
    session_id: Uuid,
    frame: u64,
    debug: bool,
    last_update: TrackerUpdate,
}

impl Default for SurfaceProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceProcessor {
    /// Create a processor with the default configuration and catalog
    pub fn new() -> Self {
        Self::build(TrackerConfig::default(), Catalog::default())
    }

    /// Create a processor after validating the configuration and catalog
    pub fn with_config(config: TrackerConfig, catalog: Catalog) -> Result<Self, TrackingError> {
        config.validate()?;
        catalog.validate(config.min_cluster_size)?;
        Ok(Self::build(config, catalog))
    }

    fn build(config: TrackerConfig, catalog: Catalog) -> Self {
        Self {
            tracker: IdentityTracker::new(config.clone()),
            config,
            catalog,
            surface: ContactSurface::new(),
            bridge: ActivationBridge::new(),
            content: ContentLibrary::default(),
            session_id: Uuid::new_v4(),
            frame: 0,
            debug: false,
            last_update: TrackerUpdate::default(),
        }
    }

    /// Replace the content source used for newly created token types
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.content = ContentLibrary::new(fetcher);
        self
    }

    /// Handle for feeding contact events, cloneable across threads
    pub fn surface(&self) -> ContactSurface {
        self.surface.clone()
    }

    pub fn contact_start(&self, contact_id: ContactId, x: f64, y: f64) {
        self.surface.start(contact_id, x, y);
    }

    pub fn contact_move(&self, contact_id: ContactId, x: f64, y: f64) {
        self.surface.move_to(contact_id, x, y);
    }

    pub fn contact_end(&self, contact_id: ContactId) {
        self.surface.end(contact_id);
    }

    /// Run one frame at time `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> FrameSnapshot {
        let contacts = self.surface.snapshot();
        let clusters = detect_clusters(&contacts, &self.config);
        let update = self.tracker.update(&clusters, &self.catalog, now);

        for retired in &update.retired {
            if self.bridge.release(retired) {
                debug!(instance_id = %retired, "effect cleared by retirement");
            }
        }
        for created in &update.created {
            if let Some(token) = self.catalog.get(&created.type_id) {
                self.content.request(token);
            }
        }
        self.content.poll();

        self.frame += 1;
        self.last_update = update;

        let token_radius_px = self.config.token_radius_px();
        FrameSnapshot {
            session_id: self.session_id,
            frame: self.frame,
            timestamp: now,
            items: project(self.tracker.objects()),
            active_effect: self.bridge.active().cloned(),
            content: self.content.snapshot(),
            debug: self.debug.then(|| DebugSnapshot {
                contacts,
                clusters,
                token_radius_px,
            }),
        }
    }

    /// Give `instance_id` the external effect `effect_key`
    pub fn request_activation(
        &mut self,
        instance_id: &InstanceId,
        effect_key: &str,
    ) -> Result<(), TrackingError> {
        if !self.tracker.contains(instance_id) {
            return Err(TrackingError::UnknownInstance(instance_id.to_string()));
        }
        self.bridge.activate(instance_id.clone(), effect_key);
        Ok(())
    }

    /// Clear the effect if `instance_id` owns it. Returns true when cleared.
    pub fn request_deactivation(&mut self, instance_id: &InstanceId) -> bool {
        self.bridge.release(instance_id)
    }

    /// React to a panel switching content.
    ///
    /// `Location` lights the token type's effect (if it has one); any other
    /// kind releases the effect when this instance owns it.
    pub fn content_changed(
        &mut self,
        instance_id: &InstanceId,
        kind: ContentKind,
    ) -> Result<(), TrackingError> {
        let obj = self
            .tracker
            .get(instance_id)
            .ok_or_else(|| TrackingError::UnknownInstance(instance_id.to_string()))?;

        if kind.has_external_effect() {
            let effect_key = self
                .catalog
                .get(&obj.type_id)
                .and_then(|t| t.effect_key.clone());
            if let Some(effect_key) = effect_key {
                self.bridge.activate(instance_id.clone(), effect_key);
            }
        } else {
            self.bridge.release(instance_id);
        }
        Ok(())
    }

    /// Drop all tracked objects and the active effect. Live contacts stay.
    pub fn reset(&mut self) {
        let cleared = self.tracker.clear();
        self.bridge.clear();
        self.last_update = TrackerUpdate::default();
        info!(objects = cleared.len(), "tracking state reset");
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub fn active_effect(&self) -> Option<&ActiveEffect> {
        self.bridge.active()
    }

    pub fn objects(&self) -> &[TrackedObject] {
        self.tracker.objects()
    }

    /// Lifecycle changes of the most recent tick
    pub fn last_update(&self) -> &TrackerUpdate {
        &self.last_update
    }

    pub fn content(&self) -> &ContentLibrary {
        &self.content
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}
