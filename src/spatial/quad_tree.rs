use std::collections::BTreeSet;

use super::{BoxedEntry, BroadPhase};
use crate::ecs::EntityId;
use crate::math::{Coord2D, Dimension2D};

/// Quadrant order: top-right, top-left, bottom-left, bottom-right.
const QUADRANTS: usize = 4;

/// Region quad tree. A leaf splits once it holds more than `split_threshold` entries
/// and is shallower than `max_levels`; entries overlapping several quadrants go into each.
#[derive(Debug, Clone)]
pub struct QuadTree {
    max_levels: usize,
    split_threshold: usize,
    level: usize,
    top_left: Coord2D,
    dimension: Dimension2D,
    children: Option<Box<[QuadTree; QUADRANTS]>>,
    objects: Vec<BoxedEntry>,
}

impl QuadTree {
    pub fn new(
        top_left: Coord2D,
        dimension: Dimension2D,
        max_levels: usize,
        split_threshold: usize,
    ) -> Self {
        Self::with_level(top_left, dimension, max_levels, split_threshold, 0)
    }

    fn with_level(
        top_left: Coord2D,
        dimension: Dimension2D,
        max_levels: usize,
        split_threshold: usize,
        level: usize,
    ) -> Self {
        Self {
            max_levels,
            split_threshold,
            level,
            top_left,
            dimension,
            children: None,
            objects: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        match &self.children {
            Some(children) => 1 + children.iter().map(QuadTree::depth).max().unwrap_or(0),
            None => 0,
        }
    }

    fn center(&self) -> Coord2D {
        Coord2D::new(
            self.top_left.x + self.dimension.width / 2.0,
            self.top_left.y + self.dimension.height / 2.0,
        )
    }

    /// Every quadrant the entry's bounds overlap.
    fn quadrants(&self, entry: &BoxedEntry) -> Vec<usize> {
        let center = self.center();
        let left = entry.min_x() < center.x;
        let right = entry.max_x() >= center.x;
        let top = entry.min_y() < center.y;
        let bottom = entry.max_y() >= center.y;

        [
            (0, right && top),
            (1, left && top),
            (2, left && bottom),
            (3, right && bottom),
        ]
        .into_iter()
        .filter_map(|(quadrant, hit)| hit.then_some(quadrant))
        .collect()
    }

    fn split(&mut self) {
        let half = Dimension2D::new(self.dimension.width / 2.0, self.dimension.height / 2.0);
        let Coord2D { x, y } = self.top_left;
        let (max_levels, split_threshold, level) =
            (self.max_levels, self.split_threshold, self.level + 1);
        let child = |top_left: Coord2D| {
            QuadTree::with_level(top_left, half, max_levels, split_threshold, level)
        };
        self.children = Some(Box::new([
            child(Coord2D::new(x + half.width, y)),
            child(Coord2D::new(x, y)),
            child(Coord2D::new(x, y + half.height)),
            child(Coord2D::new(x + half.width, y + half.height)),
        ]));

        for entry in std::mem::take(&mut self.objects) {
            self.insert_into_children(&entry);
        }
    }

    fn insert_into_children(&mut self, entry: &BoxedEntry) {
        let quadrants = self.quadrants(entry);
        if let Some(children) = self.children.as_mut() {
            for quadrant in quadrants {
                children[quadrant].insert(entry);
            }
        }
    }

    fn collect_neighbors(&self, entry: &BoxedEntry, out: &mut BTreeSet<EntityId>) {
        out.extend(self.objects.iter().map(|object| object.id.clone()));
        if let Some(children) = &self.children {
            for quadrant in self.quadrants(entry) {
                children[quadrant].collect_neighbors(entry, out);
            }
        }
    }
}

impl BroadPhase for QuadTree {
    fn clear(&mut self) {
        self.objects.clear();
        self.children = None;
    }

    fn insert(&mut self, entry: &BoxedEntry) {
        if self.children.is_some() {
            self.insert_into_children(entry);
            return;
        }

        self.objects.push(entry.clone());
        if self.objects.len() > self.split_threshold && self.level < self.max_levels {
            self.split();
        }
    }

    fn neighbor_ids(&self, entry: &BoxedEntry) -> BTreeSet<EntityId> {
        let mut neighbors = BTreeSet::new();
        self.collect_neighbors(entry, &mut neighbors);
        neighbors.remove(&entry.id);
        neighbors
    }

    fn set_top_left(&mut self, top_left: Coord2D) {
        self.top_left = top_left;
        self.children = None;
    }

    fn set_dimension(&mut self, dimension: Dimension2D) {
        self.dimension = dimension;
        self.children = None;
    }
}
