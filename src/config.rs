//! Tracker configuration
//!
//! Every tunable constant of the tracking pipeline lives in [`TrackerConfig`].
//! Distances are derived from the physical calibration of the table so that
//! one config file can be moved between screens by changing `px_per_mm`.

use crate::error::TrackingError;
use serde::{Deserialize, Serialize};

/// Default screen calibration (pixels per millimetre)
pub const DEFAULT_PX_PER_MM: f64 = 3.7;

/// Default physical token diameter (millimetres)
pub const DEFAULT_TOKEN_DIAMETER_MM: f64 = 65.0;

/// Default flicker buffer before an unmatched object is retired
pub const DEFAULT_GHOST_GRACE_MS: i64 = 2000;

/// Tunable parameters for clustering, matching and smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Screen calibration: horizontal resolution divided by physical width
    pub px_per_mm: f64,
    /// Physical diameter of a token base
    pub token_diameter_mm: f64,
    /// Cluster search radius as a multiple of the token radius
    pub cluster_search_multiplier: f64,
    /// Re-match search radius as a multiple of the token radius
    pub match_search_multiplier: f64,
    /// Allowed |cluster count - object count| when re-matching
    pub match_count_tolerance: u32,
    /// How long an unmatched object survives as a ghost
    pub ghost_grace_ms: i64,
    /// Position lerp factor per frame (lower is smoother)
    pub position_smoothing: f64,
    /// Rotation lerp factor per frame
    pub rotation_smoothing: f64,
    /// Smoothed moves at or below this distance are not committed
    pub position_jitter_px: f64,
    /// Smoothed rotations at or below this change are not committed
    pub rotation_jitter_deg: f64,
    /// Groups with fewer contacts are discarded as noise
    pub min_cluster_size: usize,
    /// Scheduler tick period
    pub frame_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            px_per_mm: DEFAULT_PX_PER_MM,
            token_diameter_mm: DEFAULT_TOKEN_DIAMETER_MM,
            cluster_search_multiplier: 2.2,
            match_search_multiplier: 2.0,
            match_count_tolerance: 2,
            ghost_grace_ms: DEFAULT_GHOST_GRACE_MS,
            position_smoothing: 0.15,
            rotation_smoothing: 0.2,
            position_jitter_px: 2.0,
            rotation_jitter_deg: 0.5,
            min_cluster_size: 3,
            frame_interval_ms: 16,
        }
    }
}

impl TrackerConfig {
    /// Physical token radius in pixels
    pub fn token_radius_px(&self) -> f64 {
        self.token_diameter_mm * self.px_per_mm / 2.0
    }

    /// Seed-centred radius used when grouping contacts
    pub fn cluster_radius_px(&self) -> f64 {
        self.token_radius_px() * self.cluster_search_multiplier
    }

    /// Radius within which a tracked object may claim a cluster
    pub fn match_radius_px(&self) -> f64 {
        self.token_radius_px() * self.match_search_multiplier
    }

    pub fn ghost_grace(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.ghost_grace_ms)
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_interval_ms)
    }

    /// Reject values that would make the tracker misbehave silently
    pub fn validate(&self) -> Result<(), TrackingError> {
        let positive = [
            ("px_per_mm", self.px_per_mm),
            ("token_diameter_mm", self.token_diameter_mm),
            ("cluster_search_multiplier", self.cluster_search_multiplier),
            ("match_search_multiplier", self.match_search_multiplier),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackingError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("position_smoothing", self.position_smoothing),
            ("rotation_smoothing", self.rotation_smoothing),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(TrackingError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }

        if self.position_jitter_px < 0.0 || self.rotation_jitter_deg < 0.0 {
            return Err(TrackingError::InvalidConfig(
                "jitter thresholds must not be negative".to_string(),
            ));
        }
        if self.ghost_grace_ms < 0 {
            return Err(TrackingError::InvalidConfig(
                "ghost_grace_ms must not be negative".to_string(),
            ));
        }
        if self.min_cluster_size == 0 {
            return Err(TrackingError::InvalidConfig(
                "min_cluster_size must be at least 1".to_string(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(TrackingError::InvalidConfig(
                "frame_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings that are valid but likely unintended
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let interval = i64::try_from(self.frame_interval_ms).unwrap_or(i64::MAX);
        if self.ghost_grace_ms < interval {
            warnings.push(format!(
                "ghost_grace_ms ({}) is shorter than frame_interval_ms ({}); a lifted token retires before the next tick can rematch it",
                self.ghost_grace_ms, self.frame_interval_ms
            ));
        }
        warnings
    }

    /// Load and validate a configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, TrackingError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
