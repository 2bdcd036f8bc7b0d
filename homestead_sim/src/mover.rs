// Stepping an agent through the world.
//
// `towards()` advances a person up to `speed` steps toward a target:
// each step merges the current field of view into the person's memories,
// recomputes the A* path from the current position (the grid may have
// changed since the last tick), and advances one node. A step that is not
// Chebyshev-adjacent, out of bounds, or onto a blocked cell is an
// `IllegalStep` — a pathfinder bug, fatal to the run.
//
// Targets inside impassable buildings (home, barn, mine) are replaced by
// the first reachable walkable 8-neighbor; a target nobody can stand next
// to is silently dropped, like any other no-path outcome.
//
// `explore()` walks toward a uniformly random reachable open cell.
//
// See also: `pathfinding.rs` for the search itself, `vision.rs` for the
// per-step scan, `navigator.rs` which decides where to go.

use crate::error::{SimError, SimResult};
use crate::grid::Grid;
use crate::pathfinding;
use crate::person::Person;
use crate::types::Location;
use crate::vision;
use homestead_prng::SimRng;

/// Attempts before `explore()` gives up looking for a reachable cell.
const EXPLORE_ATTEMPTS: u32 = 100;

/// Move up to `speed` steps toward `target`, merging vision into memory at
/// every step. Out-of-bounds and unreachable targets are no-ops.
pub fn towards(
    person: &mut Person,
    grid: &Grid,
    speed: u32,
    visibility: u32,
    tick: u64,
    target: Location,
) -> SimResult<()> {
    if !grid.in_bounds(target) {
        return Ok(());
    }

    let costs = grid.path_cost_matrix();
    let target = if grid.is_inside_building(target) {
        // Head for the first walkable, reachable neighbor instead.
        let adjusted = target.neighbors().into_iter().find(|&n| {
            !grid.is_inside_building(n)
                && grid.in_bounds(n)
                && pathfinding::reachable(&costs, person.location, n)
        });
        match adjusted {
            Some(n) => n,
            None => return Ok(()), // nowhere to stand next to it
        }
    } else {
        target
    };

    for _ in 0..speed {
        person
            .memories
            .combine(&vision::look_around(grid, person.location, visibility, tick));

        let Some(path) = pathfinding::astar(&costs, person.location, target) else {
            break;
        };
        if path.len() < 2 {
            break; // already there
        }
        step_to(person, grid, path[1])?;
    }
    Ok(())
}

/// Walk toward a uniformly random in-bounds, walkable, reachable cell.
/// Gives up silently when no candidate is found.
pub fn explore(
    person: &mut Person,
    grid: &Grid,
    speed: u32,
    visibility: u32,
    tick: u64,
    rng: &mut SimRng,
) -> SimResult<()> {
    let costs = grid.path_cost_matrix();
    for _ in 0..EXPLORE_ATTEMPTS {
        let candidate = Location::new(
            rng.range_i32(0, grid.width()),
            rng.range_i32(0, grid.height()),
        );
        if grid.is_walkable(candidate)
            && pathfinding::reachable(&costs, person.location, candidate)
        {
            return towards(person, grid, speed, visibility, tick, candidate);
        }
    }
    Ok(())
}

/// True when a path from the person to `target` exists.
pub fn can_reach(person: &Person, grid: &Grid, target: Location) -> bool {
    pathfinding::reachable(&grid.path_cost_matrix(), person.location, target)
}

/// The closest of `locations` to `from` by Euclidean distance, ties broken
/// by location order.
pub fn closest(from: Location, locations: &[Location]) -> Option<Location> {
    locations.iter().copied().min_by(|a, b| {
        from.distance_to(*a)
            .total_cmp(&from.distance_to(*b))
            .then_with(|| a.cmp(b))
    })
}

/// Rough ticks to reach `target`: straight-line distance over speed.
pub fn move_time_estimate(person: &Person, target: Location, speed: u32) -> u64 {
    (person.location.distance_to(target) / speed.max(1) as f64) as u64
}

/// Advance one validated step.
fn step_to(person: &mut Person, grid: &Grid, next: Location) -> SimResult<()> {
    let from = person.location;
    if !from.is_one_away(next)
        || !grid.in_bounds(next)
        || grid.cell(next).is_none_or(|c| c.path_cost() == 0)
    {
        return Err(SimError::IllegalStep { from, to: next });
    }
    person.location = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::types::Cell;

    fn cfg() -> SimConfig {
        SimConfig::default()
    }

    fn grid_from(rows: &[&str]) -> Grid {
        let mut rng = SimRng::new(42);
        Grid::from_rows(rows, &cfg(), &mut rng).unwrap()
    }

    fn person_at(loc: Location) -> Person {
        let mut rng = SimRng::new(1);
        Person::new(crate::types::PersonId(1), "Tova".into(), 25, loc, &cfg(), &mut rng)
    }

    #[test]
    fn towards_reaches_target_within_speed() {
        let grid = grid_from(&["     ", "     ", "     ", "     ", "     "]);
        let mut person = person_at(Location::new(0, 0));
        towards(&mut person, &grid, 10, 15, 1, Location::new(4, 4)).unwrap();
        assert_eq!(person.location, Location::new(4, 4));
    }

    #[test]
    fn towards_respects_speed_limit() {
        let grid = grid_from(&["          ", "          ", "          "]);
        let mut person = person_at(Location::new(0, 0));
        towards(&mut person, &grid, 3, 15, 1, Location::new(9, 0)).unwrap();
        assert_eq!(person.location, Location::new(3, 0));
    }

    #[test]
    fn towards_out_of_bounds_is_a_noop() {
        let grid = grid_from(&["   ", "   ", "   "]);
        let mut person = person_at(Location::new(1, 1));
        towards(&mut person, &grid, 10, 15, 1, Location::new(50, 50)).unwrap();
        assert_eq!(person.location, Location::new(1, 1));
    }

    #[test]
    fn towards_building_interior_redirects_to_neighbor() {
        let grid = grid_from(&[
            " HH  ",
            " HH  ",
            "     ",
            "     ",
            "     ",
        ]);
        let mut person = person_at(Location::new(4, 4));
        towards(&mut person, &grid, 10, 15, 1, Location::new(1, 0)).unwrap();
        // Ends on a walkable cell adjacent to the home, never inside it.
        assert!(grid.is_walkable(person.location));
        assert!(person
            .location
            .neighbors()
            .iter()
            .any(|&n| grid.cell(n) == Some(Cell::Home)));
    }

    #[test]
    fn towards_merges_vision_into_memory() {
        let grid = grid_from(&["    *", "     ", "     ", "     ", "     "]);
        let mut person = person_at(Location::new(0, 4));
        assert!(person.memories.is_empty());
        towards(&mut person, &grid, 2, 15, 3, Location::new(2, 4)).unwrap();
        assert!(!person.memories.is_empty());
        assert_eq!(
            person.memories.locations_of(Cell::Tree, 3, 50),
            vec![Location::new(4, 0)]
        );
    }

    #[test]
    fn towards_walks_around_impassable_buildings() {
        let grid = grid_from(&[
            "     ",
            "HHHH ",
            "HHHH ",
            "     ",
            "     ",
        ]);
        let mut person = person_at(Location::new(0, 0));
        assert!(can_reach(&person, &grid, Location::new(0, 4)));
        towards(&mut person, &grid, 20, 15, 1, Location::new(0, 4)).unwrap();
        // The wall of homes forces the detour through the open column.
        assert_eq!(person.location, Location::new(0, 4));
    }

    #[test]
    fn closest_breaks_ties_deterministically() {
        let from = Location::new(0, 0);
        let locs = [Location::new(2, 0), Location::new(0, 2), Location::new(5, 5)];
        // (2,0) and (0,2) are equidistant; location order prefers (2,0)
        // (row-major: y first).
        assert_eq!(closest(from, &locs), Some(Location::new(2, 0)));
        assert_eq!(closest(from, &[]), None);
    }

    #[test]
    fn explore_moves_to_a_walkable_cell() {
        let grid = grid_from(&["     ", "     ", "     ", "     ", "     "]);
        let mut person = person_at(Location::new(2, 2));
        let mut rng = SimRng::new(5);
        explore(&mut person, &grid, 10, 15, 1, &mut rng).unwrap();
        assert!(grid.is_walkable(person.location));
    }

    #[test]
    fn move_time_estimate_scales_with_distance() {
        let person = person_at(Location::new(0, 0));
        assert_eq!(move_time_estimate(&person, Location::new(30, 0), 10), 3);
        assert_eq!(move_time_estimate(&person, Location::new(3, 0), 10), 0);
    }
}
