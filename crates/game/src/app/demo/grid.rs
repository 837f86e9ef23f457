use std::sync::Arc;

use thiserror::Error;
use waymark_engine::{EntityId, MotionResolver, NavigationQuery, Vec3};

const BLOCKED_CELL: char = '#';
const OPEN_CELL: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TileCoord {
    x: u32,
    y: u32,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum GridError {
    #[error("grid has no rows")]
    Empty,
    #[error("grid row {row} has width {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("grid row {row} has unknown cell '{cell}' at column {column}")]
    UnknownCell { row: usize, column: usize, cell: char },
    #[error("grid cell size must be positive, got {0}")]
    CellSize(f32),
}

/// Walkability grid on the ground plane. Row 0 of the source text is the
/// lowest `y`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NavGrid {
    width: u32,
    height: u32,
    origin: Vec3,
    cell_size: f32,
    walkable: Vec<bool>,
}

impl NavGrid {
    pub(crate) fn from_rows(
        origin: Vec3,
        cell_size: f32,
        rows: &[String],
    ) -> Result<Self, GridError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(GridError::CellSize(cell_size));
        }
        let Some(first) = rows.first() else {
            return Err(GridError::Empty);
        };
        let width = first.chars().count();
        if width == 0 {
            return Err(GridError::Empty);
        }

        let mut walkable = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(GridError::RaggedRow {
                    row,
                    expected: width,
                    found,
                });
            }
            for (column, cell) in line.chars().enumerate() {
                match cell {
                    OPEN_CELL => walkable.push(true),
                    BLOCKED_CELL => walkable.push(false),
                    other => {
                        return Err(GridError::UnknownCell {
                            row,
                            column,
                            cell: other,
                        })
                    }
                }
            }
        }

        Ok(Self {
            width: width as u32,
            height: rows.len() as u32,
            origin,
            cell_size,
            walkable,
        })
    }

    pub(crate) fn is_walkable_at(&self, world: Vec3) -> bool {
        self.world_to_tile(world)
            .is_some_and(|tile| self.is_walkable(tile))
    }

    fn world_to_tile(&self, world: Vec3) -> Option<TileCoord> {
        let tile_x = ((world.x - self.origin.x) / self.cell_size).floor();
        let tile_y = ((world.y - self.origin.y) / self.cell_size).floor();
        if tile_x < 0.0 || tile_y < 0.0 {
            return None;
        }
        let tile_x = tile_x as u32;
        let tile_y = tile_y as u32;
        if tile_x >= self.width || tile_y >= self.height {
            return None;
        }
        Some(TileCoord {
            x: tile_x,
            y: tile_y,
        })
    }

    fn tile_center_world(&self, tile: TileCoord) -> Vec3 {
        Vec3::new(
            self.origin.x + (tile.x as f32 + 0.5) * self.cell_size,
            self.origin.y + (tile.y as f32 + 0.5) * self.cell_size,
            self.origin.z,
        )
    }

    fn is_walkable(&self, tile: TileCoord) -> bool {
        self.index_of(tile)
            .and_then(|index| self.walkable.get(index))
            .copied()
            .unwrap_or(false)
    }

    fn index_of(&self, tile: TileCoord) -> Option<usize> {
        if tile.x >= self.width || tile.y >= self.height {
            return None;
        }
        Some(tile.y as usize * self.width as usize + tile.x as usize)
    }

    fn find_path_tiles(&self, start: TileCoord, goal: TileCoord) -> Option<Vec<TileCoord>> {
        let start_index = self.index_of(start)?;
        let goal_index = self.index_of(goal)?;
        if !self.is_walkable(start) || !self.is_walkable(goal) {
            return None;
        }

        if start == goal {
            return Some(vec![start]);
        }

        let node_count = (self.width * self.height) as usize;
        let mut closed = vec![false; node_count];
        let mut best_g = vec![u32::MAX; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = Vec::new();
        let mut next_insertion = 0u64;

        let start_h = manhattan_distance(start, goal);
        open.push(OpenNode {
            coord: start,
            h_cost: start_h,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion = next_insertion.saturating_add(1);
        best_g[start_index] = 0;

        while !open.is_empty() {
            let best_index = pick_best_open_node_index(&open);
            let current = open.swap_remove(best_index);
            let Some(current_index) = self.index_of(current.coord) else {
                continue;
            };
            if closed[current_index] {
                continue;
            }
            closed[current_index] = true;

            if current.coord == goal {
                return reconstruct_tile_path(&parent, self.width, start_index, goal_index);
            }

            let current_g = best_g[current_index];
            for neighbor in self.neighbors(current.coord).into_iter().flatten() {
                let Some(neighbor_index) = self.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !self.is_walkable(neighbor) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(1);
                if tentative_g >= best_g[neighbor_index] {
                    continue;
                }

                best_g[neighbor_index] = tentative_g;
                parent[neighbor_index] = Some(current_index);
                let h_cost = manhattan_distance(neighbor, goal);
                open.push(OpenNode {
                    coord: neighbor,
                    h_cost,
                    f_cost: tentative_g.saturating_add(h_cost),
                    insertion_order: next_insertion,
                });
                next_insertion = next_insertion.saturating_add(1);
            }
        }

        None
    }

    fn neighbors(&self, coord: TileCoord) -> [Option<TileCoord>; 4] {
        let north = (coord.y < self.height.saturating_sub(1)).then(|| TileCoord {
            x: coord.x,
            y: coord.y + 1,
        });
        let east = (coord.x < self.width.saturating_sub(1)).then(|| TileCoord {
            x: coord.x + 1,
            y: coord.y,
        });
        let south = (coord.y > 0).then(|| TileCoord {
            x: coord.x,
            y: coord.y - 1,
        });
        let west = (coord.x > 0).then(|| TileCoord {
            x: coord.x - 1,
            y: coord.y,
        });
        [north, east, south, west]
    }
}

impl NavigationQuery for NavGrid {
    /// Tile centers from the tile after `origin` up to the goal tile. Empty
    /// when either end is off the grid or no route exists.
    fn find_path(&self, origin: Vec3, destination: Vec3) -> Vec<Vec3> {
        let (Some(start_tile), Some(goal_tile)) =
            (self.world_to_tile(origin), self.world_to_tile(destination))
        else {
            return Vec::new();
        };
        let Some(tile_path) = self.find_path_tiles(start_tile, goal_tile) else {
            return Vec::new();
        };

        if tile_path.len() == 1 {
            return vec![destination];
        }
        tile_path
            .iter()
            .skip(1)
            .map(|tile| self.tile_center_world(*tile))
            .collect()
    }
}

/// Rejects steps that would end on a blocked or off-grid cell.
pub(crate) struct GridMotion {
    grid: Arc<NavGrid>,
}

impl GridMotion {
    pub(crate) fn new(grid: Arc<NavGrid>) -> Self {
        Self { grid }
    }
}

impl MotionResolver for GridMotion {
    fn resolve_step(&self, _mover: EntityId, _from: Vec3, to: Vec3) -> Option<Vec3> {
        self.grid.is_walkable_at(to).then_some(to)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    coord: TileCoord,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, u32, u32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.coord.y,
        node.coord.x,
        node.insertion_order,
    )
}

fn reconstruct_tile_path(
    parent: &[Option<usize>],
    width: u32,
    start_index: usize,
    goal_index: usize,
) -> Option<Vec<TileCoord>> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        let next = parent.get(cursor).and_then(|value| *value)?;
        cursor = next;
        indices.push(cursor);
    }
    indices.reverse();
    Some(
        indices
            .into_iter()
            .map(|index| TileCoord {
                x: (index as u32) % width,
                y: (index as u32) / width,
            })
            .collect(),
    )
}

fn manhattan_distance(a: TileCoord, b: TileCoord) -> u32 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}

#[cfg(test)]
mod nav_tests {
    use super::*;

    fn grid(rows: &[&str]) -> NavGrid {
        let rows = rows.iter().map(|row| row.to_string()).collect::<Vec<_>>();
        NavGrid::from_rows(Vec3::planar(0.0, 0.0), 1.0, &rows).expect("grid")
    }

    fn wall_with_gap() -> NavGrid {
        grid(&[
            "...#...", //
            "...#...",
            "...#...",
            "...#...",
            ".......",
        ])
    }

    #[test]
    fn astar_path_never_steps_onto_blocked_cell() {
        let grid = wall_with_gap();
        let start = grid.tile_center_world(TileCoord { x: 1, y: 2 });
        let goal = grid.tile_center_world(TileCoord { x: 5, y: 2 });

        let path = grid.find_path(start, goal);

        assert!(!path.is_empty());
        for waypoint in &path {
            assert!(grid.is_walkable_at(*waypoint), "waypoint on blocked cell");
        }
        assert!(path.iter().any(|waypoint| waypoint.y > 4.0));
        assert_eq!(path.last(), Some(&goal));
    }

    #[test]
    fn astar_tie_break_is_deterministic_on_symmetric_map() {
        let grid = grid(&[".....", ".....", "..#..", ".....", "....."]);
        let start = grid.tile_center_world(TileCoord { x: 0, y: 2 });
        let goal = grid.tile_center_world(TileCoord { x: 4, y: 2 });

        assert_eq!(grid.find_path(start, goal), grid.find_path(start, goal));
    }

    #[test]
    fn same_tile_returns_destination_only() {
        let grid = wall_with_gap();
        let destination = Vec3::planar(0.9, 0.2);
        assert_eq!(
            grid.find_path(Vec3::planar(0.1, 0.1), destination),
            vec![destination]
        );
    }

    #[test]
    fn unreachable_or_off_grid_returns_empty() {
        let grid = grid(&["..#..", "..#..", "..#.."]);
        assert!(grid
            .find_path(Vec3::planar(0.5, 0.5), Vec3::planar(4.5, 0.5))
            .is_empty());
        assert!(grid
            .find_path(Vec3::planar(0.5, 0.5), Vec3::planar(40.0, 0.5))
            .is_empty());
        assert!(grid
            .find_path(Vec3::planar(0.5, 0.5), Vec3::planar(2.5, 0.5))
            .is_empty());
    }

    #[test]
    fn cell_size_scales_tile_centers() {
        let rows = vec!["...".to_string()];
        let grid = NavGrid::from_rows(Vec3::planar(10.0, 0.0), 2.0, &rows).expect("grid");
        assert_eq!(
            grid.find_path(Vec3::planar(10.5, 0.5), Vec3::planar(15.0, 1.0)),
            vec![Vec3::planar(13.0, 1.0), Vec3::planar(15.0, 1.0)]
        );
    }

    #[test]
    fn from_rows_rejects_malformed_input() {
        let origin = Vec3::planar(0.0, 0.0);
        assert_eq!(
            NavGrid::from_rows(origin, 1.0, &[]).expect_err("empty"),
            GridError::Empty
        );
        assert_eq!(
            NavGrid::from_rows(origin, 1.0, &["..".to_string(), ".".to_string()])
                .expect_err("ragged"),
            GridError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            NavGrid::from_rows(origin, 1.0, &[".x".to_string()]).expect_err("cell"),
            GridError::UnknownCell {
                row: 0,
                column: 1,
                cell: 'x'
            }
        );
        assert!(matches!(
            NavGrid::from_rows(origin, 0.0, &[".".to_string()]),
            Err(GridError::CellSize(_))
        ));
    }

    #[test]
    fn grid_motion_blocks_steps_into_walls() {
        let motion = GridMotion::new(Arc::new(wall_with_gap()));
        let from = Vec3::planar(2.5, 1.5);
        assert_eq!(
            motion.resolve_step(EntityId(1), from, Vec3::planar(2.9, 1.5)),
            Some(Vec3::planar(2.9, 1.5))
        );
        assert_eq!(
            motion.resolve_step(EntityId(1), from, Vec3::planar(3.1, 1.5)),
            None
        );
    }
}
