//! Broad-phase spatial indexes
//!
//! Both structures answer "which ids might overlap this box" and may return false positives,
//! never false negatives. The collision system only talks to them through [`BroadPhase`].

mod grid;
mod quad_tree;

use std::collections::BTreeSet;

use crate::config::{BroadPhaseKind, WorldConfig};
use crate::ecs::EntityId;
use crate::math::{Coord2D, Dimension2D};

pub use grid::Grid;
pub use quad_tree::QuadTree;

/// An axis-aligned box tagged with the entity it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxedEntry {
    pub id: EntityId,
    pub center: Coord2D,
    pub dimension: Dimension2D,
}

impl BoxedEntry {
    pub fn new(id: EntityId, center: Coord2D, dimension: Dimension2D) -> Self {
        Self {
            id,
            center,
            dimension,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.center.x - self.dimension.width / 2.0
    }

    pub fn max_x(&self) -> f64 {
        self.center.x + self.dimension.width / 2.0
    }

    pub fn min_y(&self) -> f64 {
        self.center.y - self.dimension.height / 2.0
    }

    pub fn max_y(&self) -> f64 {
        self.center.y + self.dimension.height / 2.0
    }
}

/// Rebuilt from scratch every tick: `clear`, resize, then `insert` every candidate.
pub trait BroadPhase: Send {
    fn clear(&mut self);
    fn insert(&mut self, entry: &BoxedEntry);
    /// Ids sharing a region with `entry`, excluding `entry.id` itself.
    fn neighbor_ids(&self, entry: &BoxedEntry) -> BTreeSet<EntityId>;
    fn set_top_left(&mut self, top_left: Coord2D);
    fn set_dimension(&mut self, dimension: Dimension2D);
}

/// Builds the configured broad phase over the configured world bounds.
pub fn from_config(world: &WorldConfig) -> Box<dyn BroadPhase> {
    match world.broad_phase {
        BroadPhaseKind::Grid => Box::new(Grid::new(
            world.dimension(),
            world.cell_dimension(),
            Coord2D::default(),
        )),
        BroadPhaseKind::QuadTree => Box::new(QuadTree::new(
            Coord2D::default(),
            world.dimension(),
            world.quad_tree_max_levels,
            world.quad_tree_split_threshold,
        )),
    }
}
