//! Identity tracker
//!
//! Keeps a stable identity for every placed token while its contacts flicker.
//! Each frame runs three phases in a fixed order:
//!
//! 1. **Match**: every tracked object (in creation order) claims the nearest
//!    unused cluster within the match radius whose count is within the count
//!    tolerance, then smooths its pose toward it.
//! 2. **Ghost**: unmatched objects freeze in place while inside the grace
//!    window and are retired once it elapses.
//! 3. **Create**: clusters nobody claimed are classified against the catalog
//!    and become new objects.
//!
//! Contention for one cluster is settled by creation order, not by a global
//! optimal assignment. Creation order is stable, so the outcome is
//! reproducible for a fixed input sequence.

use crate::catalog::Catalog;
use crate::cluster::Cluster;
use crate::config::TrackerConfig;
use crate::geometry::{lerp, lerp_angle, normalize_angle, shortest_angle_delta, Point};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Identity of one physical placement of a token.
///
/// Derived from the token type and the creation timestamp. Putting the same
/// token down again later yields a new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Matched to a cluster this frame
    Active,
    /// Unmatched but inside the grace window; pose is frozen
    Ghost,
}

/// What happened to an object during one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Matched,
    Missed { within_grace: bool },
}

impl ObjectStatus {
    /// Transition table. `None` means the object is retired.
    ///
    /// | from   | Matched | Missed (in grace) | Missed (expired) |
    /// |--------|---------|-------------------|------------------|
    /// | Active | Active  | Ghost             | retired          |
    /// | Ghost  | Active  | Ghost             | retired          |
    pub fn next(self, observation: Observation) -> Option<ObjectStatus> {
        match observation {
            Observation::Matched => Some(ObjectStatus::Active),
            Observation::Missed { within_grace: true } => Some(ObjectStatus::Ghost),
            Observation::Missed { within_grace: false } => None,
        }
    }
}

/// The persistent representation of a placed token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub instance_id: InstanceId,
    /// Fixed at creation, never re-derived from later counts
    pub type_id: String,
    pub x: f64,
    pub y: f64,
    /// Degrees in [-180, 180)
    pub rotation: f64,
    /// Count of the most recently matched cluster
    pub contact_count: usize,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: ObjectStatus,
}

impl TrackedObject {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Smooth the pose toward a cluster.
    ///
    /// A coordinate is only committed while the object is further than the
    /// jitter threshold from its target, so sensor noise around a resting
    /// token does not make it vibrate, yet the pose still settles within the
    /// threshold of the true position.
    fn absorb(&mut self, cluster: &Cluster, config: &TrackerConfig, now: DateTime<Utc>) {
        let target = cluster.center();
        if self.position().distance(&target) > config.position_jitter_px {
            self.x = lerp(self.x, target.x, config.position_smoothing);
            self.y = lerp(self.y, target.y, config.position_smoothing);
        }

        if shortest_angle_delta(self.rotation, cluster.angle).abs() > config.rotation_jitter_deg {
            self.rotation = normalize_angle(lerp_angle(
                self.rotation,
                cluster.angle,
                config.rotation_smoothing,
            ));
        }

        self.contact_count = cluster.count;
        self.last_seen = now;
    }
}

/// An object created during a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedObject {
    pub instance_id: InstanceId,
    pub type_id: String,
}

/// Lifecycle changes produced by one [`IdentityTracker::update`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUpdate {
    pub created: Vec<CreatedObject>,
    /// Ghosts that matched again
    pub recovered: Vec<InstanceId>,
    /// Active objects that lost their match this frame
    pub ghosted: Vec<InstanceId>,
    /// Objects removed after the grace window
    pub retired: Vec<InstanceId>,
}

impl TrackerUpdate {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.recovered.is_empty()
            && self.ghosted.is_empty()
            && self.retired.is_empty()
    }
}

/// Owns every tracked object between frames
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    config: TrackerConfig,
    /// Creation order; also the match priority order
    objects: Vec<TrackedObject>,
    /// Ids issued per type in the current millisecond; survives `clear`
    issued: IssuedIds,
}

#[derive(Debug, Clone, Default)]
struct IssuedIds {
    ms: Option<i64>,
    per_type: HashMap<String, u32>,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            objects: Vec::new(),
            issued: IssuedIds::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Run one frame of matching, ghosting and creation
    pub fn update(
        &mut self,
        clusters: &[Cluster],
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> TrackerUpdate {
        let mut report = TrackerUpdate::default();
        let mut used = vec![false; clusters.len()];
        let grace = self.config.ghost_grace();
        let previous = std::mem::take(&mut self.objects);
        let mut next = Vec::with_capacity(previous.len() + clusters.len());

        // Match phase, then ghost/retire for whoever found nothing
        for mut obj in previous {
            let observation = match self.find_match(&obj, clusters, &used) {
                Some(idx) => {
                    used[idx] = true;
                    obj.absorb(&clusters[idx], &self.config, now);
                    Observation::Matched
                }
                None => Observation::Missed {
                    within_grace: now - obj.last_seen < grace,
                },
            };

            match obj.status.next(observation) {
                Some(status) => {
                    if status != obj.status {
                        match status {
                            ObjectStatus::Active => {
                                debug!(instance_id = %obj.instance_id, "object recovered");
                                report.recovered.push(obj.instance_id.clone());
                            }
                            ObjectStatus::Ghost => {
                                debug!(instance_id = %obj.instance_id, "object ghosted");
                                report.ghosted.push(obj.instance_id.clone());
                            }
                        }
                    }
                    obj.status = status;
                    next.push(obj);
                }
                None => {
                    debug!(
                        instance_id = %obj.instance_id,
                        type_id = %obj.type_id,
                        "object retired"
                    );
                    report.retired.push(obj.instance_id);
                }
            }
        }

        // Creation phase
        for (idx, cluster) in clusters.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let Some(token) = catalog.classify(cluster) else {
                continue;
            };

            let instance_id = self.issued.next_id(&token.type_id, now, &next);
            debug!(
                instance_id = %instance_id,
                type_id = %token.type_id,
                contacts = cluster.count,
                "object created"
            );
            report.created.push(CreatedObject {
                instance_id: instance_id.clone(),
                type_id: token.type_id.clone(),
            });
            next.push(TrackedObject {
                instance_id,
                type_id: token.type_id.clone(),
                x: cluster.x,
                y: cluster.y,
                rotation: normalize_angle(cluster.angle),
                contact_count: cluster.count,
                last_seen: now,
                created_at: now,
                status: ObjectStatus::Active,
            });
        }

        self.objects = next;
        report
    }

    /// Nearest unused cluster inside the match radius and count tolerance
    fn find_match(&self, obj: &TrackedObject, clusters: &[Cluster], used: &[bool]) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut min_dist = self.config.match_radius_px();
        let tolerance = self.config.match_count_tolerance as usize;

        for (idx, cluster) in clusters.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let d = obj.position().distance(&cluster.center());
            if d < min_dist && cluster.count.abs_diff(obj.contact_count) <= tolerance {
                min_dist = d;
                best = Some(idx);
            }
        }
        best
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn get(&self, instance_id: &InstanceId) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| &o.instance_id == instance_id)
    }

    pub fn contains(&self, instance_id: &InstanceId) -> bool {
        self.get(instance_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Drop every tracked object, returning the ids that were live
    pub fn clear(&mut self) -> Vec<InstanceId> {
        self.objects.drain(..).map(|o| o.instance_id).collect()
    }
}

impl IssuedIds {
    /// `<type>-<unix ms>`, then `-1`, `-2`, ... for later ids of the same
    /// type in the same millisecond, skipping any still held by `live`
    fn next_id(&mut self, type_id: &str, now: DateTime<Utc>, live: &[TrackedObject]) -> InstanceId {
        let ms = now.timestamp_millis();
        if self.ms != Some(ms) {
            self.ms = Some(ms);
            self.per_type.clear();
        }
        let seq = self.per_type.entry(type_id.to_string()).or_insert(0);
        let base = format!("{type_id}-{ms}");
        let taken = |candidate: &str| live.iter().any(|o| o.instance_id.as_str() == candidate);

        loop {
            let candidate = match *seq {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            *seq += 1;
            if !taken(&candidate) {
                return InstanceId(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::milliseconds(ms)
    }

    fn cluster(x: f64, y: f64, count: usize, angle: f64) -> Cluster {
        Cluster { x, y, count, angle }
    }

    fn tracker() -> IdentityTracker {
        IdentityTracker::new(TrackerConfig::default())
    }

    #[test]
    fn test_creates_object_for_known_count() {
        let mut tracker = tracker();
        let catalog = Catalog::default();

        let report = tracker.update(&[cluster(400.0, 300.0, 4, 45.0)], &catalog, t(0));

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].type_id, "prod_a");
        let obj = &tracker.objects()[0];
        assert_eq!(obj.status, ObjectStatus::Active);
        assert_eq!(obj.contact_count, 4);
        assert_eq!(obj.instance_id.as_str(), "prod_a-1700000000000");
        assert_eq!((obj.x, obj.y, obj.rotation), (400.0, 300.0, 45.0));
    }

    #[test]
    fn test_unknown_count_is_ignored() {
        let mut tracker = tracker();
        let report = tracker.update(&[cluster(400.0, 300.0, 8, 0.0)], &Catalog::default(), t(0));
        assert!(report.is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_transition_table() {
        use ObjectStatus::*;
        let missed_in = Observation::Missed { within_grace: true };
        let missed_out = Observation::Missed { within_grace: false };

        assert_eq!(Active.next(Observation::Matched), Some(Active));
        assert_eq!(Ghost.next(Observation::Matched), Some(Active));
        assert_eq!(Active.next(missed_in), Some(Ghost));
        assert_eq!(Ghost.next(missed_in), Some(Ghost));
        assert_eq!(Active.next(missed_out), None);
        assert_eq!(Ghost.next(missed_out), None);
    }

    #[test]
    fn test_brief_dropout_keeps_identity() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        let c = cluster(400.0, 300.0, 4, 0.0);

        tracker.update(&[c.clone()], &catalog, t(0));
        let id = tracker.objects()[0].instance_id.clone();

        let report = tracker.update(&[], &catalog, t(500));
        assert_eq!(report.ghosted, vec![id.clone()]);
        let ghost = tracker.get(&id).unwrap();
        assert_eq!(ghost.status, ObjectStatus::Ghost);
        assert_eq!((ghost.x, ghost.y), (400.0, 300.0));

        let report = tracker.update(&[c], &catalog, t(1500));
        assert_eq!(report.recovered, vec![id.clone()]);
        assert!(report.created.is_empty());
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get(&id).unwrap().status, ObjectStatus::Active);
    }

    #[test]
    fn test_expired_grace_retires_and_recreates() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        let c = cluster(400.0, 300.0, 4, 0.0);

        tracker.update(&[c.clone()], &catalog, t(0));
        let old_id = tracker.objects()[0].instance_id.clone();

        tracker.update(&[], &catalog, t(1000));
        let report = tracker.update(&[], &catalog, t(2000));
        assert_eq!(report.retired, vec![old_id.clone()]);
        assert!(tracker.is_empty());

        let report = tracker.update(&[c], &catalog, t(2100));
        assert_eq!(report.created.len(), 1);
        assert_ne!(report.created[0].instance_id, old_id);
    }

    #[test]
    fn test_grace_measured_from_last_match() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        let c = cluster(400.0, 300.0, 4, 0.0);

        tracker.update(&[c.clone()], &catalog, t(0));
        tracker.update(&[c], &catalog, t(1800));
        // 1999ms after the last match: still a ghost
        tracker.update(&[], &catalog, t(3799));
        assert_eq!(tracker.objects()[0].status, ObjectStatus::Ghost);
        tracker.update(&[], &catalog, t(3800));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_count_noise_keeps_single_instance() {
        let mut tracker = tracker();
        let catalog = Catalog::default();

        tracker.update(&[cluster(400.0, 300.0, 4, 0.0)], &catalog, t(0));
        let id = tracker.objects()[0].instance_id.clone();

        for (i, count) in [5, 4, 5, 4, 5, 4].into_iter().enumerate() {
            let report = tracker.update(
                &[cluster(400.0, 300.0, count, 0.0)],
                &catalog,
                t(16 * (i as i64 + 1)),
            );
            assert!(report.created.is_empty());
            assert_eq!(tracker.len(), 1);
            let obj = &tracker.objects()[0];
            assert_eq!(obj.instance_id, id);
            assert_eq!(obj.type_id, "prod_a");
            assert_eq!(obj.contact_count, count);
        }
    }

    #[test]
    fn test_count_beyond_tolerance_does_not_match() {
        let mut tracker = tracker();
        let catalog = Catalog::default();

        tracker.update(&[cluster(400.0, 300.0, 4, 0.0)], &catalog, t(0));
        let report = tracker.update(&[cluster(400.0, 300.0, 7, 0.0)], &catalog, t(16));

        // the 4-point object ghosts; the 7-point cluster becomes prod_d
        assert_eq!(report.ghosted.len(), 1);
        assert_eq!(report.created[0].type_id, "prod_d");
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_two_tokens_same_tick() {
        let mut tracker = tracker();
        let report = tracker.update(
            &[cluster(300.0, 300.0, 4, 0.0), cluster(1200.0, 300.0, 5, 0.0)],
            &Catalog::default(),
            t(0),
        );

        let types: Vec<&str> = report.created.iter().map(|c| c.type_id.as_str()).collect();
        assert_eq!(types, vec!["prod_a", "prod_b"]);
        assert_ne!(report.created[0].instance_id, report.created[1].instance_id);
    }

    #[test]
    fn test_same_type_same_tick_gets_distinct_ids() {
        let mut tracker = tracker();
        let report = tracker.update(
            &[cluster(300.0, 300.0, 4, 0.0), cluster(1200.0, 300.0, 4, 0.0)],
            &Catalog::default(),
            t(0),
        );

        let ids: Vec<&str> = report.created.iter().map(|c| c.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["prod_a-1700000000000", "prod_a-1700000000000-1"]);
    }

    #[test]
    fn test_smoothing_converges_monotonically() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        tracker.update(&[cluster(100.0, 100.0, 4, 0.0)], &catalog, t(0));

        let target = Point::new(160.0, 100.0);
        let mut last_error = f64::MAX;
        for i in 1..=100 {
            tracker.update(&[cluster(target.x, target.y, 4, 0.0)], &catalog, t(i * 16));
            let error = tracker.objects()[0].position().distance(&target);
            assert!(error <= last_error);
            last_error = error;
        }
        assert!(last_error <= tracker.config().position_jitter_px);
    }

    #[test]
    fn test_micro_jitter_is_suppressed() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        tracker.update(&[cluster(400.0, 300.0, 4, 10.0)], &catalog, t(0));

        tracker.update(&[cluster(401.0, 299.0, 4, 10.3)], &catalog, t(16));
        let obj = &tracker.objects()[0];
        assert_eq!((obj.x, obj.y, obj.rotation), (400.0, 300.0, 10.0));
    }

    #[test]
    fn test_rotation_wraps_through_180() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        tracker.update(&[cluster(400.0, 300.0, 4, 170.0)], &catalog, t(0));

        for i in 1..=60 {
            tracker.update(&[cluster(400.0, 300.0, 4, -170.0)], &catalog, t(i * 16));
            let rotation = tracker.objects()[0].rotation;
            // every intermediate pose lies on the 20° arc through 180
            assert!(shortest_angle_delta(rotation, 180.0).abs() <= 10.0 + 1e-9);
        }
        let rotation = tracker.objects()[0].rotation;
        assert!(shortest_angle_delta(rotation, -170.0).abs() <= 0.5 + 1e-9);
    }

    #[test]
    fn test_contention_goes_to_oldest_object() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        tracker.update(
            &[cluster(0.0, 0.0, 4, 0.0), cluster(300.0, 0.0, 4, 0.0)],
            &catalog,
            t(0),
        );
        let first = tracker.objects()[0].instance_id.clone();
        let second = tracker.objects()[1].instance_id.clone();

        // equidistant from both
        let report = tracker.update(&[cluster(150.0, 0.0, 4, 0.0)], &catalog, t(16));
        assert_eq!(report.ghosted, vec![second]);
        assert_eq!(tracker.get(&first).unwrap().status, ObjectStatus::Active);
    }

    #[test]
    fn test_far_cluster_is_not_claimed() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        tracker.update(&[cluster(0.0, 0.0, 4, 0.0)], &catalog, t(0));

        let report = tracker.update(&[cluster(1000.0, 0.0, 4, 0.0)], &catalog, t(16));
        assert_eq!(report.ghosted.len(), 1);
        assert_eq!(report.created.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut tracker = tracker();
        tracker.update(&[cluster(0.0, 0.0, 4, 0.0)], &Catalog::default(), t(0));
        let cleared = tracker.clear();
        assert_eq!(cleared.len(), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_recreate_after_clear_in_same_ms_gets_new_id() {
        let mut tracker = tracker();
        let catalog = Catalog::default();
        let first = tracker.update(&[cluster(300.0, 300.0, 4, 0.0)], &catalog, t(0));
        let cleared = tracker.clear();
        assert_eq!(cleared, vec![first.created[0].instance_id.clone()]);

        let second = tracker.update(&[cluster(300.0, 300.0, 4, 0.0)], &catalog, t(0));
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.created[0].instance_id.as_str(), "prod_a-1700000000000-1");
        assert!(!cleared.contains(&second.created[0].instance_id));

        // a later millisecond starts from the bare id again
        tracker.clear();
        let third = tracker.update(&[cluster(300.0, 300.0, 4, 0.0)], &catalog, t(5));
        assert_eq!(third.created[0].instance_id.as_str(), "prod_a-1700000000005");
    }
}
