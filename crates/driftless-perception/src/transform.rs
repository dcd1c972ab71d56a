//! Transform Frame (TF) Engine.
//!
//! Maintains a graph of named reference frames and the rigid-body transforms
//! (`Isometry3<f64>`) that relate them.  Given any two frame names the engine
//! composes a chain of transforms via BFS, walking child → parent edges
//! through their inverse, to produce the combined transform.
//!
//! # Example
//!
//! ```rust
//! use driftless_perception::transform::TfEngine;
//! use nalgebra::Isometry3;
//!
//! let mut tf = TfEngine::new();
//!
//! // robot is 1 m forward of the map origin, same orientation.
//! tf.set_transform("/map", "/robot", Isometry3::translation(1.0, 0.0, 0.0));
//!
//! // laser is 0.5 m forward of the robot, same orientation.
//! tf.set_transform("/robot", "/laser", Isometry3::translation(0.5, 0.0, 0.0));
//!
//! let t = tf.lookup("/map", "/laser").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-12);
//!
//! // Reverse lookups invert the chain.
//! let back = tf.lookup("/laser", "/map").unwrap();
//! assert!((back.translation.x + 1.5).abs() < 1e-12);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use driftless_types::TransformStamped;
use nalgebra::Isometry3;

#[derive(Debug, Clone, Copy)]
struct Edge {
    transform: Isometry3<f64>,
    stamp: Option<DateTime<Utc>>,
}

/// A graph of named reference frames and the [`Isometry3`]s that relate
/// them.
///
/// Frames are identified by arbitrary string names (e.g. `"/map"`,
/// `"/robot"`).  Each edge is stored once, parent → child; lookups may
/// traverse it in either direction.
///
/// [`TfEngine::lookup`] performs BFS to find the shortest path from source
/// to target and returns the composed transform.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child] = Edge`
    edges: HashMap<String, HashMap<String, Edge>>,
    /// `parents[child] = {parent, ...}`, used for reverse traversal.
    parents: HashMap<String, HashSet<String>>,
}

impl TfEngine {
    /// Create an empty TF engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Isometry3<f64>,
    ) {
        self.insert(parent_frame, child_frame, Edge { transform, stamp: None });
    }

    /// Register or update an announced transform, keeping its stamp.
    pub fn apply(&mut self, announcement: &TransformStamped) {
        self.insert(
            &announcement.parent_frame_id,
            &announcement.child_frame_id,
            Edge {
                transform: announcement.transform,
                stamp: Some(announcement.stamp),
            },
        );
    }

    fn insert(&mut self, parent_frame: &str, child_frame: &str, edge: Edge) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), edge);
        self.parents
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string());
    }

    /// Stamp of the most recent announcement on the direct edge
    /// `parent_frame` → `child_frame`.
    ///
    /// Returns `None` for unknown edges and for edges set without a stamp.
    pub fn stamp(&self, parent_frame: &str, child_frame: &str) -> Option<DateTime<Utc>> {
        self.edges.get(parent_frame)?.get(child_frame)?.stamp
    }

    /// Whether `frame` appears anywhere in the graph.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.parents.contains_key(frame)
    }

    /// Compute the composed [`Isometry3`] that maps points expressed in
    /// `target_frame` into `source_frame` (the pose of `target_frame` as seen
    /// from `source_frame`).
    ///
    /// Returns `None` if no path exists between the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Isometry3<f64>> {
        if source_frame == target_frame {
            return Some(Isometry3::identity());
        }

        // BFS; each queue item carries the composed transform accumulated
        // from source_frame to the current node.
        let mut queue: VecDeque<(&str, Isometry3<f64>)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();

        queue.push_back((source_frame, Isometry3::identity()));
        visited.insert(source_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            for (next, step) in self.neighbours(current) {
                if !visited.insert(next) {
                    continue;
                }
                let composed = accumulated * step;
                if next == target_frame {
                    return Some(composed);
                }
                queue.push_back((next, composed));
            }
        }

        None
    }

    /// Frames adjacent to `frame` with the transform of each step: forward
    /// edges as stored, reverse edges inverted.
    fn neighbours<'a>(
        &'a self,
        frame: &str,
    ) -> impl Iterator<Item = (&'a str, Isometry3<f64>)> + 'a {
        let children = self
            .edges
            .get(frame)
            .into_iter()
            .flat_map(|m| m.iter().map(|(child, edge)| (child.as_str(), edge.transform)));
        let frame = frame.to_string();
        let parents = self.parents.get(&frame).into_iter().flat_map(move |set| {
            let frame = frame.clone();
            set.iter().filter_map(move |parent| {
                let edge = self.edges.get(parent)?.get(&frame)?;
                Some((parent.as_str(), edge.transform.inverse()))
            })
        });
        children.chain(parents)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
