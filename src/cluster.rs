//! Contact clustering
//!
//! Groups the raw contacts of one frame into candidate tokens. The strategy
//! is a greedy consume: take a seed, absorb every remaining contact closer to
//! the seed than the cluster radius, repeat. Absorption is measured from the
//! seed only (no chaining through absorbed members), so a cluster never
//! extends further than one radius from its seed. A stretched patch larger
//! than that is split into several clusters; this is accepted.

use crate::config::TrackerConfig;
use crate::contacts::RawContact;
use crate::geometry::{centroid, Point};
use serde::{Deserialize, Serialize};

/// A per-frame group of contacts believed to belong to one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Centroid x
    pub x: f64,
    /// Centroid y
    pub y: f64,
    /// Number of member contacts
    pub count: usize,
    /// Bearing from the centroid to the seed contact, in degrees
    pub angle: f64,
}

impl Cluster {
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Cluster the contacts of one frame.
///
/// Seeds are taken from the back of `contacts` and candidates are scanned
/// back to front, so the output is reproducible for a fixed input order.
/// Groups smaller than `config.min_cluster_size` are dropped as noise.
pub fn detect_clusters(contacts: &[RawContact], config: &TrackerConfig) -> Vec<Cluster> {
    let radius = config.cluster_radius_px();
    let mut pool: Vec<Point> = contacts.iter().map(RawContact::point).collect();
    let mut clusters = Vec::new();

    while let Some(seed) = pool.pop() {
        let mut group = vec![seed];

        for i in (0..pool.len()).rev() {
            if seed.distance(&pool[i]) < radius {
                group.push(pool.remove(i));
            }
        }

        if group.len() < config.min_cluster_size {
            continue;
        }

        // group is non-empty, it holds at least the seed
        if let Some(center) = centroid(&group) {
            clusters.push(Cluster {
                x: center.x,
                y: center.y,
                count: group.len(),
                angle: center.bearing_to(&seed),
            });
        }
    }

    clusters
}
