//! Optional toroidal grid hosting at most one entity per cell.

use crate::{error::ConfigError, rng::SimRng, types::EntityId};
use serde::{Deserialize, Serialize};

pub const MIN_GRID_DIM: usize = 10;
pub const MAX_GRID_DIM: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];
}

#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Option<EntityId>>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Result<Self, ConfigError> {
        let valid = |d: usize| (MIN_GRID_DIM..=MAX_GRID_DIM).contains(&d);
        if !valid(rows) || !valid(cols) {
            return Err(ConfigError::InvalidGrid {
                rows,
                cols,
                min: MIN_GRID_DIM,
                max: MAX_GRID_DIM,
            });
        }
        Ok(Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn index(&self, at: Coord) -> usize {
        at.row * self.cols + at.col
    }

    pub fn occupant(&self, at: Coord) -> Option<EntityId> {
        self.cells[self.index(at)]
    }

    /// Put `id` on a uniformly chosen free cell. `None` when the grid is full.
    pub fn place_random(&mut self, id: EntityId, rng: &mut SimRng) -> Option<Coord> {
        let free: Vec<usize> = self
            .cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.is_none().then_some(i))
            .collect();
        if free.is_empty() {
            return None;
        }
        let i = free[rng.index_below(free.len())];
        self.cells[i] = Some(id);
        Some(Coord {
            row: i / self.cols,
            col: i % self.cols,
        })
    }

    pub fn vacate(&mut self, at: Coord) {
        let i = self.index(at);
        self.cells[i] = None;
    }

    /// Neighbouring cell in `dir`, wrapping at the edges.
    pub fn neighbour(&self, at: Coord, dir: Direction) -> Coord {
        match dir {
            Direction::Up => Coord {
                row: (at.row + self.rows - 1) % self.rows,
                col: at.col,
            },
            Direction::Down => Coord {
                row: (at.row + 1) % self.rows,
                col: at.col,
            },
            Direction::Left => Coord {
                row: at.row,
                col: (at.col + self.cols - 1) % self.cols,
            },
            Direction::Right => Coord {
                row: at.row,
                col: (at.col + 1) % self.cols,
            },
        }
    }

    /// Every occupant attempts one random orthogonal step, trying the other
    /// directions when the first choice is taken. Boxed-in occupants stay.
    /// Returns the entities that moved with their new cells.
    pub fn step_all(&mut self, rng: &mut SimRng) -> Vec<(EntityId, Coord)> {
        let starting: Vec<(EntityId, Coord)> = self
            .cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                c.map(|id| {
                    (
                        id,
                        Coord {
                            row: i / self.cols,
                            col: i % self.cols,
                        },
                    )
                })
            })
            .collect();

        let mut moved = Vec::new();
        for (id, from) in starting {
            let mut dirs = Direction::ALL;
            rng.shuffle(&mut dirs);
            let target = dirs
                .iter()
                .map(|d| self.neighbour(from, *d))
                .find(|to| self.occupant(*to).is_none());
            if let Some(to) = target {
                self.vacate(from);
                let i = self.index(to);
                self.cells[i] = Some(id);
                moved.push((id, to));
            }
        }
        moved
    }

    /// Chebyshev distance on the torus.
    pub fn distance(&self, a: Coord, b: Coord) -> usize {
        let dr = a.row.abs_diff(b.row);
        let dc = a.col.abs_diff(b.col);
        dr.min(self.rows - dr).max(dc.min(self.cols - dc))
    }

    /// Occupants within `depth` cells of `at`, excluding `at` itself.
    pub fn within(&self, at: Coord, depth: usize) -> Vec<EntityId> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let coord = Coord {
                    row: i / self.cols,
                    col: i % self.cols,
                };
                match c {
                    Some(id) if coord != at && self.distance(at, coord) <= depth => Some(*id),
                    _ => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, RngSlot};

    #[test]
    fn dimensions_are_bounded() {
        assert!(Grid::new(9, 50).is_err());
        assert!(Grid::new(50, 101).is_err());
        assert!(Grid::new(10, 100).is_ok());
    }

    #[test]
    fn neighbours_wrap_at_edges() {
        let g = Grid::new(10, 12).unwrap();
        let corner = Coord { row: 0, col: 0 };
        assert_eq!(g.neighbour(corner, Direction::Up), Coord { row: 9, col: 0 });
        assert_eq!(g.neighbour(corner, Direction::Left), Coord { row: 0, col: 11 });
        let far = Coord { row: 9, col: 11 };
        assert_eq!(g.neighbour(far, Direction::Down), Coord { row: 0, col: 11 });
        assert_eq!(g.neighbour(far, Direction::Right), Coord { row: 9, col: 0 });
    }

    #[test]
    fn distance_uses_wraparound() {
        let g = Grid::new(10, 10).unwrap();
        let a = Coord { row: 0, col: 0 };
        assert_eq!(g.distance(a, Coord { row: 9, col: 9 }), 1);
        assert_eq!(g.distance(a, Coord { row: 3, col: 1 }), 3);
    }

    #[test]
    fn boxed_in_entities_stay_put() {
        let mut g = Grid::new(10, 10).unwrap();
        let mut rng = RngBank::new(5).stream(RngSlot::Movement);
        for id in 0..100 {
            g.place_random(id, &mut rng).unwrap();
        }
        let before: Vec<Option<EntityId>> = g.cells.clone();
        assert!(g.step_all(&mut rng).is_empty());
        assert_eq!(g.cells, before);
    }

    #[test]
    fn lone_entity_moves_one_orthogonal_step() {
        let mut g = Grid::new(10, 10).unwrap();
        let mut rng = RngBank::new(6).stream(RngSlot::Movement);
        let from = Coord { row: 0, col: 0 };
        g.cells[0] = Some(7);
        let moved = g.step_all(&mut rng);
        assert_eq!(moved.len(), 1);
        let (id, to) = moved[0];
        assert_eq!(id, 7);
        assert_eq!(g.distance(from, to), 1);
        assert!(to.row == from.row || to.col == from.col, "diagonal move");
        assert_eq!(g.occupant(to), Some(7));
        assert_eq!(g.occupant(from), None);
    }

    #[test]
    fn place_random_fills_until_full() {
        let mut g = Grid::new(10, 10).unwrap();
        let mut rng = RngBank::new(8).stream(RngSlot::Generation);
        for id in 0..100 {
            assert!(g.place_random(id, &mut rng).is_some());
        }
        assert_eq!(g.place_random(100, &mut rng), None);
    }
}
