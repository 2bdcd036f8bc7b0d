// Field-of-view scan.
//
// `look_around()` returns a fresh `Memories` containing everything visible
// from an origin within a Chebyshev radius. The scan is a bounded
// breadth-first expansion through the 8 neighbor directions:
//
// - Empty cells are recorded and expanded through.
// - Opaque cells (trees, buildings, construction sites) are recorded but
//   not expanded, and when reached along a cardinal direction they cast a
//   shadow: the axis-aligned cells beyond them are added to the blocked
//   set. Diagonal approaches do not extend the shadow.
//
// Every observation is stamped with the current simulation tick, so the
// freshly scanned memory merges cleanly into the agent's long-term one.
//
// The blocked and seen sets are `FxHashSet`s: pure membership tests whose
// iteration order is never observed, so determinism is unaffected.

use crate::grid::Grid;
use crate::memory::Memories;
use crate::types::Location;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

const OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Scan outward from `origin` and return everything visible within
/// `radius`, stamped with tick `now`.
pub fn look_around(grid: &Grid, origin: Location, radius: u32, now: u64) -> Memories {
    let mut seen_around = Memories::new();
    let mut seen: FxHashSet<Location> = FxHashSet::default();
    let mut blocked: FxHashSet<Location> = FxHashSet::default();
    let mut queue: VecDeque<(Location, u32)> = VecDeque::new();

    seen.insert(origin);
    queue.push_back((origin, 0));

    while let Some((loc, depth)) = queue.pop_front() {
        if depth >= radius {
            continue;
        }
        for (dx, dy) in OFFSETS {
            let next = Location::new(loc.x + dx, loc.y + dy);
            if !grid.in_bounds(next) || blocked.contains(&next) || !seen.insert(next) {
                continue;
            }
            let Some(cell) = grid.cell(next) else {
                continue;
            };
            seen_around.add(cell, next, now, grid);
            if cell.is_opaque() {
                blocked.insert(next);
                // Opaque cells on a cardinal ray from the origin shadow
                // the axis-aligned cells beyond them; off-axis opaque
                // cells do not extend the shadow.
                if next.x == origin.x || next.y == origin.y {
                    let direction = ((next.x - origin.x).signum(), (next.y - origin.y).signum());
                    cast_shadow(origin, next, direction, radius, &mut blocked);
                }
                continue;
            }
            queue.push_back((next, depth + 1));
        }
    }

    seen_around
}

/// Mark every cell strictly behind `from` along `(dx, dy)` as blocked, out
/// to the edge of the vision square.
fn cast_shadow(
    origin: Location,
    from: Location,
    (dx, dy): (i32, i32),
    radius: u32,
    blocked: &mut FxHashSet<Location>,
) {
    let mut shadowed = Location::new(from.x + dx, from.y + dy);
    while origin.chebyshev_distance(shadowed) <= radius {
        blocked.insert(shadowed);
        shadowed = Location::new(shadowed.x + dx, shadowed.y + dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::types::Cell;
    use homestead_prng::SimRng;

    fn grid_from(rows: &[&str]) -> Grid {
        let mut rng = SimRng::new(42);
        Grid::from_rows(rows, &SimConfig::default(), &mut rng).unwrap()
    }

    #[test]
    fn open_ground_is_fully_visible() {
        let grid = grid_from(&["     ", "     ", "     ", "     ", "     "]);
        let mem = look_around(&grid, Location::new(2, 2), 2, 7);
        // Everything except the origin itself: 24 cells.
        assert_eq!(mem.len(), 24);
        for (_, m) in mem.iter() {
            assert_eq!(m.what, Cell::Empty);
            assert_eq!(m.when, 7);
        }
    }

    #[test]
    fn radius_bounds_the_scan() {
        let grid = grid_from(&["       "; 7]);
        let mut mem = look_around(&grid, Location::new(3, 3), 2, 1);
        let locs = mem.locations_of(Cell::Empty, 1, 50);
        assert!(locs
            .iter()
            .all(|l| Location::new(3, 3).chebyshev_distance(*l) <= 2));
        assert!(!locs.contains(&Location::new(0, 3)));
    }

    #[test]
    fn tree_is_recorded_but_casts_a_cardinal_shadow() {
        let grid = grid_from(&["       ", "       ", "  *    ", "       ", "       "]);
        let mut mem = look_around(&grid, Location::new(0, 2), 6, 3);
        // The tree itself is seen.
        assert_eq!(mem.locations_of(Cell::Tree, 3, 50), vec![Location::new(2, 2)]);
        // The cells directly behind it on the same row are shadowed.
        let empties = mem.locations_of(Cell::Empty, 3, 50);
        assert!(!empties.contains(&Location::new(3, 2)));
        assert!(!empties.contains(&Location::new(4, 2)));
        // Off-axis cells behind the tree stay visible via other rays.
        assert!(empties.contains(&Location::new(3, 1)));
        assert!(empties.contains(&Location::new(3, 3)));
    }

    #[test]
    fn building_is_observed_at_its_top_left() {
        let grid = grid_from(&[
            "     ",
            " BBB ",
            " BBB ",
            " BBB ",
            "     ",
        ]);
        let mut mem = look_around(&grid, Location::new(0, 0), 5, 2);
        // All visible barn cells normalize to one memory entry.
        assert_eq!(mem.locations_of(Cell::Barn, 2, 50), vec![Location::new(1, 1)]);
    }

    #[test]
    fn empty_cells_do_not_occlude() {
        let grid = grid_from(&["      ", "      ", "      "]);
        let mut mem = look_around(&grid, Location::new(0, 1), 5, 1);
        // The far edge of the row is visible across open ground.
        assert!(mem
            .locations_of(Cell::Empty, 1, 50)
            .contains(&Location::new(5, 1)));
    }

    #[test]
    fn scan_is_deterministic() {
        let grid = grid_from(&["  *  ", "     ", "*    ", "     ", "  *  "]);
        let a = look_around(&grid, Location::new(2, 2), 4, 9);
        let b = look_around(&grid, Location::new(2, 2), 4, 9);
        let av: Vec<_> = a.iter().map(|(&l, &m)| (l, m)).collect();
        let bv: Vec<_> = b.iter().map(|(&l, &m)| (l, m)).collect();
        assert_eq!(av, bv);
    }
}
