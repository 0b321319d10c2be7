use std::collections::{BTreeSet, HashMap};

use super::{BoxedEntry, BroadPhase};
use crate::ecs::EntityId;
use crate::math::{Coord2D, Dimension2D};

/// Uniform grid. Cells are allocated lazily, so entries outside the declared bounds still work.
#[derive(Debug, Clone)]
pub struct Grid {
    cells: HashMap<i64, Vec<EntityId>>,
    dimension: Dimension2D,
    cell_dimension: Dimension2D,
    top_left: Coord2D,
}

impl Grid {
    pub fn new(dimension: Dimension2D, cell_dimension: Dimension2D, top_left: Coord2D) -> Self {
        Self {
            cells: HashMap::new(),
            dimension,
            cell_dimension,
            top_left,
        }
    }

    fn columns(&self) -> i64 {
        ((self.dimension.width / self.cell_dimension.width).ceil() as i64).max(1)
    }

    /// Cell indexes `row * columns + column` overlapped by the entry's bounds.
    fn overlapping_cells(&self, entry: &BoxedEntry) -> Vec<i64> {
        let translated_x = entry.center.x - self.top_left.x;
        let translated_y = entry.center.y - self.top_left.y;
        let half_w = entry.dimension.width / 2.0;
        let half_h = entry.dimension.height / 2.0;

        let first_col = ((translated_x - half_w) / self.cell_dimension.width).floor() as i64;
        let last_col = ((translated_x + half_w) / self.cell_dimension.width).floor() as i64;
        let first_row = ((translated_y - half_h) / self.cell_dimension.height).floor() as i64;
        let last_row = ((translated_y + half_h) / self.cell_dimension.height).floor() as i64;

        let columns = self.columns();
        let mut cells = Vec::new();
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                cells.push(row * columns + col);
            }
        }
        cells
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(
            Dimension2D::new(600.0, 800.0),
            Dimension2D::new(30.0, 30.0),
            Coord2D::default(),
        )
    }
}

impl BroadPhase for Grid {
    fn clear(&mut self) {
        self.cells.clear();
    }

    fn insert(&mut self, entry: &BoxedEntry) {
        for cell in self.overlapping_cells(entry) {
            self.cells.entry(cell).or_default().push(entry.id.clone());
        }
    }

    fn neighbor_ids(&self, entry: &BoxedEntry) -> BTreeSet<EntityId> {
        self.overlapping_cells(entry)
            .into_iter()
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .filter(|id| **id != entry.id)
            .cloned()
            .collect()
    }

    fn set_top_left(&mut self, top_left: Coord2D) {
        self.top_left = top_left;
    }

    fn set_dimension(&mut self, dimension: Dimension2D) {
        self.dimension = dimension;
    }
}
