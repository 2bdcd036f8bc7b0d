// A* pathfinding over the grid's cost matrix.
//
// Implements standard A* using a `BinaryHeap` (min-heap via reversed
// ordering). Node scores and came-from data are stored in `Vec`s indexed
// by flat cell index for O(1) access and deterministic behavior (no
// `HashMap`).
//
// Movement is 8-connected; diagonals are always allowed. The cost of a
// step is the cost of the cell being entered: empty ground is 1, trees
// and most construction sites are 10, farms 5 (3 under construction), and
// cost 0 marks impassable cells (finished home/barn/mine). The heuristic
// is Chebyshev distance times the minimum cell cost (1), which never
// overestimates and is consistent under diagonal movement.
//
// See also: `grid.rs` whose `path_cost_matrix()` builds the `CostGrid`,
// `mover.rs` which recomputes a path every step.
//
// **Critical constraint: determinism.** Ties in the open set are broken by
// flat cell index, and neighbors are expanded in a fixed order, so the
// same matrix and endpoints always produce the same path.

use crate::types::Location;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Dense integer cost matrix derived from the grid's cells.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostGrid {
    width: i32,
    height: i32,
    /// Row-major: index = x + y * width.
    costs: Vec<u32>,
}

impl CostGrid {
    pub fn new(width: i32, height: i32, costs: Vec<u32>) -> Self {
        debug_assert_eq!(costs.len(), (width * height) as usize);
        Self {
            width,
            height,
            costs,
        }
    }

    pub fn in_bounds(&self, loc: Location) -> bool {
        loc.x >= 0 && loc.y >= 0 && loc.x < self.width && loc.y < self.height
    }

    /// Cost of entering a cell. 0 for impassable and out-of-bounds cells.
    pub fn cost(&self, loc: Location) -> u32 {
        if self.in_bounds(loc) {
            self.costs[self.index(loc)]
        } else {
            0
        }
    }

    fn index(&self, loc: Location) -> usize {
        (loc.x + loc.y * self.width) as usize
    }

    fn location(&self, index: usize) -> Location {
        Location::new(index as i32 % self.width, index as i32 / self.width)
    }

    fn len(&self) -> usize {
        self.costs.len()
    }
}

/// Entry in the A* open set (min-heap via reversed ordering).
#[derive(PartialEq, Eq)]
struct OpenEntry {
    index: usize,
    f_score: u32,
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap; ties broken by cell index for determinism.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Find the cheapest path from `start` to `goal`.
///
/// Returns the node sequence including both endpoints, or `None` when no
/// path exists. The start cell's own cost is not charged; every entered
/// cell must have nonzero cost.
pub fn astar(costs: &CostGrid, start: Location, goal: Location) -> Option<Vec<Location>> {
    if !costs.in_bounds(start) || !costs.in_bounds(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }
    if costs.cost(goal) == 0 {
        return None;
    }

    let n = costs.len();
    let start_idx = costs.index(start);
    let goal_idx = costs.index(goal);

    // g_score[cell] = cost of cheapest known path from start to cell.
    let mut g_score = vec![u32::MAX; n];
    let mut came_from: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];

    g_score[start_idx] = 0;

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        index: start_idx,
        f_score: heuristic(start, goal),
    });

    while let Some(current) = open.pop() {
        let ci = current.index;
        if ci == goal_idx {
            return Some(reconstruct(costs, &came_from, start_idx, goal_idx));
        }
        if closed[ci] {
            continue;
        }
        closed[ci] = true;

        let current_loc = costs.location(ci);
        let current_g = g_score[ci];

        for neighbor in current_loc.neighbors() {
            let step_cost = costs.cost(neighbor);
            if step_cost == 0 {
                continue; // blocked or out of bounds
            }
            let ni = costs.index(neighbor);
            if closed[ni] {
                continue;
            }
            let tentative_g = current_g + step_cost;
            if tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(ci);
                open.push(OpenEntry {
                    index: ni,
                    f_score: tentative_g + heuristic(neighbor, goal),
                });
            }
        }
    }

    None // No path found.
}

/// True when a path from `start` to `goal` exists.
pub fn reachable(costs: &CostGrid, start: Location, goal: Location) -> bool {
    astar(costs, start, goal).is_some()
}

/// Admissible heuristic: Chebyshev distance times the minimum cell cost.
fn heuristic(from: Location, to: Location) -> u32 {
    from.chebyshev_distance(to)
}

fn reconstruct(
    costs: &CostGrid,
    came_from: &[Option<usize>],
    start_idx: usize,
    goal_idx: usize,
) -> Vec<Location> {
    let mut indices = vec![goal_idx];
    let mut current = goal_idx;
    while current != start_idx {
        match came_from[current] {
            Some(prev) => {
                indices.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    indices.reverse();
    indices.iter().map(|&i| costs.location(i)).collect()
}
