// Structure selection: which farm, mine, tree, barn, or home an agent
// pursues, and when it gives up and escalates to construction.
//
// Workplace kinds (farm, mine, tree) are chosen by an ε-greedy
// multi-armed bandit over known locations. ε decays logarithmically with
// the total number of selections — `max(0.1, 1 / (1 + 0.5·ln(n + 1)))` —
// so a fresh agent explores everything and a seasoned one exploits its
// best-known spot. A long idle gap (more ticks than the per-agent
// `epsilon_reset`, drawn once from U[50, actions_per_year)) resets ε to
// 1.0 and clears the selection counts: stale learning is abandoned.
//
// Store kinds (barn, home) are picked by plain distance instead — there is
// nothing to learn about a barn.
//
// When an agent has searched at least 37% of the locations it knows for a
// kind and found none workable, it stops looking and enqueues a
// construction task: a build task if a matching site is already known, a
// start-construction task otherwise. Trees are exempt — nobody builds a
// tree.
//
// Rewards arrive from the work task after a yield `y`:
// `reward[kind][loc] += (y − 2·turns) / selections[kind][loc]`, where
// `turns` is how many selection rounds the trip took. The linear travel
// penalty makes distant-but-rich spots lose to near-but-adequate ones.
//
// **Critical constraint: determinism.** All tables are `BTreeMap`; the
// argmax tie-breaks by location order; random draws come from the sim
// PRNG.

use crate::config::SimConfig;
use crate::error::SimResult;
use crate::grid::Grid;
use crate::mover;
use crate::person::Person;
use crate::types::{BuildingKind, Location, Resource, StructureKind};
use homestead_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of one `move_to_workable_structure` round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Standing next to a workable structure at `at`, after `turns`
    /// selection rounds of travel (the reward update needs both).
    Arrived { at: Location, turns: u32 },
    /// Still traveling or still looking; try again next tick.
    Searching,
    /// Gave up and enqueued a construction task instead.
    Abandoned,
}

/// What the navigator asked the scheduler to do on escalation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    StartConstruction(BuildingKind),
    Build(BuildingKind),
}

/// The navigator's per-person learning and search state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavState {
    /// The structure kind currently being pursued.
    moving_to: Option<StructureKind>,
    /// Locations tried and found full/empty during this search.
    visited: BTreeSet<Location>,
    /// The location currently headed for.
    chosen: Option<Location>,
    /// Selection rounds spent on the current search.
    turn_count: u32,
    /// Last computed ε per kind (kept for inspection/snapshots).
    epsilon: BTreeMap<StructureKind, f64>,
    /// Learned reward per kind and location.
    rewards: BTreeMap<StructureKind, BTreeMap<Location, f64>>,
    /// Selection counts per kind and location.
    selections: BTreeMap<StructureKind, BTreeMap<Location, u32>>,
    /// Idle ticks after which learning is abandoned; drawn per agent.
    epsilon_reset: u64,
}

impl NavState {
    pub fn new(cfg: &SimConfig, rng: &mut SimRng) -> Self {
        let upper = cfg.actions_per_year().max(51);
        Self {
            moving_to: None,
            visited: BTreeSet::new(),
            chosen: None,
            turn_count: 0,
            epsilon: BTreeMap::new(),
            rewards: BTreeMap::new(),
            selections: BTreeMap::new(),
            epsilon_reset: rng.range_u64(50, upper),
        }
    }

    /// Current ε for a kind (1.0 before the first selection).
    pub fn epsilon(&self, kind: StructureKind) -> f64 {
        self.epsilon.get(&kind).copied().unwrap_or(1.0)
    }

    fn reset_moving_state(&mut self, kind: Option<StructureKind>) {
        self.moving_to = kind;
        self.visited.clear();
        self.chosen = None;
        self.turn_count = 0;
    }

    /// Ensure reward/selection entries exist for every known location.
    fn seed_tables(&mut self, kind: StructureKind, locations: &[Location]) {
        let rewards = self.rewards.entry(kind).or_default();
        let selections = self.selections.entry(kind).or_default();
        for &loc in locations {
            rewards.entry(loc).or_insert(0.0);
            selections.entry(loc).or_insert(0);
        }
    }

    /// Logarithmic ε decay, plus the long-idle reset.
    fn refresh_epsilon(&mut self, kind: StructureKind, tick: u64) {
        let selections = self.selections.entry(kind).or_default();
        let total: u64 = selections.values().map(|&c| c as u64).sum();
        let mut eps = logarithmic_decay(total);
        if tick.saturating_sub(total) > self.epsilon_reset {
            eps = 1.0;
            selections.clear();
        }
        self.epsilon.insert(kind, eps);
    }

    /// ε-greedy pick among `candidates`; increments the selection count.
    fn select(
        &mut self,
        kind: StructureKind,
        candidates: &[Location],
        tick: u64,
        rng: &mut SimRng,
    ) -> Option<Location> {
        if candidates.is_empty() {
            return None;
        }
        self.refresh_epsilon(kind, tick);
        let eps = self.epsilon(kind);

        let rewards = self.rewards.entry(kind).or_default();
        let chosen = if rng.next_f64() < eps {
            candidates[rng.choose_index(candidates.len())] // explore
        } else {
            // Exploit: argmax reward, ties to the first in location order.
            let mut best = candidates[0];
            for &loc in &candidates[1..] {
                if rewards.get(&loc).copied().unwrap_or(0.0)
                    > rewards.get(&best).copied().unwrap_or(0.0)
                {
                    best = loc;
                }
            }
            best
        };

        *self
            .selections
            .entry(kind)
            .or_default()
            .entry(chosen)
            .or_insert(0) += 1;
        Some(chosen)
    }

    /// Learned reward for one location (tests and inspection).
    pub fn reward(&self, kind: StructureKind, loc: Location) -> f64 {
        self.rewards
            .get(&kind)
            .and_then(|table| table.get(&loc))
            .copied()
            .unwrap_or(0.0)
    }
}

/// `max(0.1, 1 / (1 + 0.5·ln(n + 1)))`.
fn logarithmic_decay(n: u64) -> f64 {
    (1.0 / (1.0 + 0.5 * ((n + 1) as f64).ln())).max(0.1)
}

/// Head for a workable structure of `kind`, learning as we go.
///
/// With `resource` set and the target being a store, "workable" means the
/// store holds more than zero of that resource; otherwise it means the
/// structure has capacity. Full or empty structures are marked visited and
/// the search continues next tick. Searching past the escalation threshold
/// enqueues a construction task and abandons the search.
pub fn move_to_workable_structure(
    person: &mut Person,
    grid: &Grid,
    cfg: &SimConfig,
    tick: u64,
    rng: &mut SimRng,
    kind: StructureKind,
    resource: Option<Resource>,
) -> SimResult<MoveOutcome> {
    if person.navigator.moving_to != Some(kind) {
        person.navigator.reset_moving_state(Some(kind));
    }
    person.navigator.turn_count += 1;

    if person.navigator.chosen.is_none() {
        let known = person
            .memories
            .locations_of(kind.cell(), tick, cfg.memory_expire);
        let candidates: Vec<Location> = known
            .iter()
            .copied()
            .filter(|loc| !person.navigator.visited.contains(loc))
            .collect();

        // Escalate once enough of the known world has been tried in vain.
        let threshold = known.len() as f64 * cfg.search_escalation_ratio;
        let searched_out = candidates.is_empty()
            || person.navigator.visited.len() as f64 >= threshold;
        if kind != StructureKind::Tree && searched_out {
            if let Some(escalation) = escalate(person, grid, cfg, tick, kind) {
                person.navigator.reset_moving_state(None);
                enqueue_escalation(person, escalation);
                return Ok(MoveOutcome::Abandoned);
            }
        }
        if candidates.is_empty() {
            return Ok(MoveOutcome::Searching);
        }

        let next = if kind.is_workplace() {
            person.navigator.seed_tables(kind, &known);
            person.navigator.select(kind, &candidates, tick, rng)
        } else {
            mover::closest(person.location, &candidates)
        };
        person.navigator.chosen = next;
    }

    let Some(chosen) = person.navigator.chosen else {
        return Ok(MoveOutcome::Searching);
    };

    if !person.location.is_one_away(chosen) {
        mover::towards(person, grid, cfg.speed, cfg.visibility, tick, chosen)?;
    }

    if person.location.is_one_away(chosen) {
        return Ok(check_arrival(person, grid, cfg, kind, chosen, resource));
    }
    Ok(MoveOutcome::Searching)
}

/// Standing next to the chosen structure: is it actually workable?
fn check_arrival(
    person: &mut Person,
    grid: &Grid,
    cfg: &SimConfig,
    kind: StructureKind,
    chosen: Location,
    resource: Option<Resource>,
) -> MoveOutcome {
    let Some(structure) = grid.structure(chosen).filter(|s| s.kind() == kind) else {
        // Gone or replaced since it was memorized; forget and keep looking.
        person.memories.remove(chosen);
        person.navigator.visited.insert(chosen);
        person.navigator.chosen = None;
        return MoveOutcome::Searching;
    };

    let workable = match resource {
        Some(res) if structure.is_store() => structure.resource(res) > 0,
        _ => structure.has_capacity(cfg),
    };

    if workable {
        let turns = person.navigator.turn_count;
        person.navigator.reset_moving_state(None);
        MoveOutcome::Arrived { at: chosen, turns }
    } else {
        person.navigator.visited.insert(chosen);
        person.navigator.chosen = None;
        MoveOutcome::Searching
    }
}

/// Decide what to enqueue when a search is abandoned. `None` for kinds
/// that cannot be built (trees).
fn escalate(
    person: &mut Person,
    _grid: &Grid,
    cfg: &SimConfig,
    tick: u64,
    kind: StructureKind,
) -> Option<Escalation> {
    let building = match kind {
        StructureKind::Home => BuildingKind::Home,
        StructureKind::Barn => BuildingKind::Barn,
        StructureKind::Farm => BuildingKind::Farm,
        StructureKind::Mine => BuildingKind::Mine,
        StructureKind::Site(kind) => kind,
        StructureKind::Tree => return None,
    };
    let known_sites = person.memories.locations_of(
        building.site_cell(),
        tick,
        cfg.memory_expire,
    );
    if known_sites.is_empty() {
        Some(Escalation::StartConstruction(building))
    } else {
        Some(Escalation::Build(building))
    }
}

fn enqueue_escalation(person: &mut Person, escalation: Escalation) {
    use crate::task::TaskKind;
    match escalation {
        Escalation::StartConstruction(kind) => {
            person.scheduler.add(TaskKind::StartConstruction(kind));
        }
        Escalation::Build(kind) => {
            person.scheduler.add(TaskKind::Build(kind));
        }
    }
}

/// Record a yield against the workplace the agent traveled to:
/// `reward += (y − 2·turns) / selections`.
pub fn update_reward(person: &mut Person, kind: StructureKind, loc: Location, turns: u32, y: f64) {
    if !kind.is_workplace() {
        return;
    }
    let count = person
        .navigator
        .selections
        .entry(kind)
        .or_default()
        .get(&loc)
        .copied()
        .unwrap_or(0)
        .max(1);
    *person
        .navigator
        .rewards
        .entry(kind)
        .or_default()
        .entry(loc)
        .or_insert(0.0) += (y - 2.0 * turns as f64) / count as f64;
}

/// Move toward home; returns the home location once adjacent to it.
pub fn move_to_home(
    person: &mut Person,
    grid: &Grid,
    cfg: &SimConfig,
    tick: u64,
) -> SimResult<Option<Location>> {
    let Some(home) = person.home else {
        return Ok(None);
    };
    if !person.location.is_one_away(home) {
        mover::towards(person, grid, cfg.speed, cfg.visibility, tick, home)?;
    }
    Ok(person.location.is_one_away(home).then_some(home))
}

/// Wander toward a random reachable cell, dropping any current search.
pub fn explore(
    person: &mut Person,
    grid: &Grid,
    cfg: &SimConfig,
    tick: u64,
    rng: &mut SimRng,
) -> SimResult<()> {
    person.navigator.reset_moving_state(None);
    mover::explore(person, grid, cfg.speed, cfg.visibility, tick, rng)
}

/// An agent is stuck when no open cell next to town exists or none is
/// reachable from where it stands. The driver culls stuck agents at the
/// end of the day.
pub fn is_stuck(person: &Person, grid: &Grid) -> bool {
    match grid.open_spot_next_to_town() {
        Some(spot) => !mover::can_reach(person, grid, spot),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use crate::types::{Cell, PersonId};

    fn cfg() -> SimConfig {
        SimConfig::default()
    }

    fn grid_from(rows: &[&str]) -> Grid {
        let mut rng = SimRng::new(42);
        Grid::from_rows(rows, &cfg(), &mut rng).unwrap()
    }

    fn person_at(loc: Location) -> Person {
        let mut rng = SimRng::new(1);
        Person::new(PersonId(1), "Imra".into(), 25, loc, &cfg(), &mut rng)
    }

    #[test]
    fn decay_follows_the_documented_curve() {
        assert_eq!(logarithmic_decay(0), 1.0);
        let e10 = logarithmic_decay(10);
        assert!((0.4..0.5).contains(&e10), "ε(10) = {e10}");
        // Floors at 0.1 for very large counts.
        assert_eq!(logarithmic_decay(10_000_000_000), 0.1);
        // Monotone non-increasing.
        assert!(logarithmic_decay(5) >= logarithmic_decay(50));
    }

    #[test]
    fn epsilon_reset_drawn_in_range() {
        let config = cfg();
        let mut rng = SimRng::new(3);
        for _ in 0..50 {
            let nav = NavState::new(&config, &mut rng);
            assert!((50..config.actions_per_year()).contains(&nav.epsilon_reset));
        }
    }

    #[test]
    fn moves_toward_known_tree_and_arrives() {
        let grid = grid_from(&[
            "*    ",
            "     ",
            "     ",
            "     ",
            "     ",
        ]);
        let mut person = person_at(Location::new(4, 4));
        person
            .memories
            .add(Cell::Tree, Location::new(0, 0), 1, &grid);
        let mut rng = SimRng::new(2);

        let mut outcome = MoveOutcome::Searching;
        for _ in 0..10 {
            outcome = move_to_workable_structure(
                &mut person,
                &grid,
                &cfg(),
                1,
                &mut rng,
                StructureKind::Tree,
                None,
            )
            .unwrap();
            if outcome != MoveOutcome::Searching {
                break;
            }
        }
        assert!(matches!(
            outcome,
            MoveOutcome::Arrived { at, .. } if at == Location::new(0, 0)
        ));
        assert!(person.location.is_one_away(Location::new(0, 0)));
    }

    #[test]
    fn barn_chosen_by_distance_not_learning() {
        let grid = grid_from(&[
            "BBB       BBB",
            "BBB       BBB",
            "BBB       BBB",
            "             ",
            "             ",
        ]);
        let mut person = person_at(Location::new(12, 4));
        person.memories.add(Cell::Barn, Location::new(0, 0), 1, &grid);
        person.memories.add(Cell::Barn, Location::new(10, 0), 1, &grid);
        let mut rng = SimRng::new(2);

        let mut arrived = None;
        for tick in 1..20 {
            match move_to_workable_structure(
                &mut person,
                &grid,
                &cfg(),
                tick,
                &mut rng,
                StructureKind::Barn,
                None,
            )
            .unwrap()
            {
                MoveOutcome::Arrived { at, .. } => {
                    arrived = Some(at);
                    break;
                }
                MoveOutcome::Searching => continue,
                MoveOutcome::Abandoned => panic!("should not escalate"),
            }
        }
        assert_eq!(arrived, Some(Location::new(10, 0)), "nearer barn wins");
    }

    #[test]
    fn all_full_farms_escalate_to_construction() {
        // S3: the agent knows farm locations but every one is full; after
        // searching ceil(n · 0.37) of them a start-construction task is
        // enqueued.
        let grid = grid_from(&[
            "FFF FFF FFF ",
            "FFF FFF FFF ",
            "FFF FFF FFF ",
            "            ",
            "            ",
        ]);
        let config = cfg();
        let mut person = person_at(Location::new(4, 4));
        let mut grid = grid;
        // Fill every farm to capacity with other workers.
        for farm_loc in [Location::new(0, 0), Location::new(4, 0), Location::new(8, 0)] {
            let farm = grid.structure_mut(farm_loc).unwrap();
            for w in 100..100 + farm.max_worker_count {
                assert!(farm.add_worker(PersonId(w)));
            }
            person.memories.add(Cell::Farm, farm_loc, 1, &grid);
        }
        let mut rng = SimRng::new(2);

        let mut outcome = MoveOutcome::Searching;
        for tick in 1..200 {
            outcome = move_to_workable_structure(
                &mut person,
                &grid,
                &config,
                tick,
                &mut rng,
                StructureKind::Farm,
                None,
            )
            .unwrap();
            if outcome == MoveOutcome::Abandoned {
                break;
            }
        }
        assert_eq!(outcome, MoveOutcome::Abandoned);
        assert!(person.scheduler.contains_kind(TaskKind::StartConstruction(
            BuildingKind::Farm
        )));
        // Two of the three farms were actually tried before giving up.
        assert!(person.navigator.visited.is_empty(), "state reset after escalation");
    }

    #[test]
    fn no_known_locations_escalates_immediately() {
        let grid = grid_from(&["     ", "     ", "     ", "     ", "     "]);
        let mut person = person_at(Location::new(2, 2));
        let mut rng = SimRng::new(2);
        let outcome = move_to_workable_structure(
            &mut person,
            &grid,
            &cfg(),
            1,
            &mut rng,
            StructureKind::Mine,
            None,
        )
        .unwrap();
        assert_eq!(outcome, MoveOutcome::Abandoned);
        assert!(person
            .scheduler
            .contains_kind(TaskKind::StartConstruction(BuildingKind::Mine)));
    }

    #[test]
    fn known_site_escalates_to_build_instead() {
        let grid = grid_from(&[
            "mmm  ",
            "mmm  ",
            "mmm  ",
            "     ",
            "     ",
        ]);
        let mut person = person_at(Location::new(4, 4));
        person
            .memories
            .add(Cell::MineSite, Location::new(0, 0), 1, &grid);
        let mut rng = SimRng::new(2);
        let outcome = move_to_workable_structure(
            &mut person,
            &grid,
            &cfg(),
            1,
            &mut rng,
            StructureKind::Mine,
            None,
        )
        .unwrap();
        assert_eq!(outcome, MoveOutcome::Abandoned);
        assert!(person
            .scheduler
            .contains_kind(TaskKind::Build(BuildingKind::Mine)));
    }

    #[test]
    fn trees_never_escalate() {
        let grid = grid_from(&["     ", "     ", "     ", "     ", "     "]);
        let mut person = person_at(Location::new(2, 2));
        let mut rng = SimRng::new(2);
        let outcome = move_to_workable_structure(
            &mut person,
            &grid,
            &cfg(),
            1,
            &mut rng,
            StructureKind::Tree,
            None,
        )
        .unwrap();
        assert_eq!(outcome, MoveOutcome::Searching);
        assert_eq!(person.scheduler.len(), 0);
    }

    #[test]
    fn reward_update_divides_by_selection_count() {
        let mut person = person_at(Location::new(0, 0));
        let loc = Location::new(3, 3);
        person.navigator.seed_tables(StructureKind::Farm, &[loc]);
        person
            .navigator
            .selections
            .get_mut(&StructureKind::Farm)
            .unwrap()
            .insert(loc, 4);

        update_reward(&mut person, StructureKind::Farm, loc, 3, 30.0);
        // (30 − 2·3) / 4 = 6.
        assert_eq!(person.navigator.reward(StructureKind::Farm, loc), 6.0);

        // A second yield accumulates.
        update_reward(&mut person, StructureKind::Farm, loc, 3, 30.0);
        assert_eq!(person.navigator.reward(StructureKind::Farm, loc), 12.0);
    }

    #[test]
    fn travel_penalty_punishes_distant_yields() {
        let mut person = person_at(Location::new(0, 0));
        let near = Location::new(1, 1);
        let far = Location::new(9, 9);
        person
            .navigator
            .seed_tables(StructureKind::Mine, &[near, far]);
        for (loc, turns) in [(near, 1u32), (far, 20u32)] {
            person
                .navigator
                .selections
                .get_mut(&StructureKind::Mine)
                .unwrap()
                .insert(loc, 1);
            update_reward(&mut person, StructureKind::Mine, loc, turns, 10.0);
        }
        assert!(
            person.navigator.reward(StructureKind::Mine, near)
                > person.navigator.reward(StructureKind::Mine, far)
        );
        assert!(person.navigator.reward(StructureKind::Mine, far) < 0.0);
    }

    #[test]
    fn long_idle_resets_epsilon_and_counts() {
        let mut person = person_at(Location::new(0, 0));
        let loc = Location::new(2, 2);
        person.navigator.seed_tables(StructureKind::Farm, &[loc]);
        // Plenty of selections: ε would normally have decayed.
        person
            .navigator
            .selections
            .get_mut(&StructureKind::Farm)
            .unwrap()
            .insert(loc, 40);
        let long_idle_tick = person.navigator.epsilon_reset + 100;
        person
            .navigator
            .refresh_epsilon(StructureKind::Farm, long_idle_tick);
        assert_eq!(person.navigator.epsilon(StructureKind::Farm), 1.0);
        assert_eq!(
            person
                .navigator
                .selections
                .get(&StructureKind::Farm)
                .unwrap()
                .get(&loc),
            None,
            "counts cleared on reset"
        );
    }

    #[test]
    fn stuck_when_town_spot_unreachable() {
        // The home's open neighbors are on the left; the person is walled
        // off on the right by a column of homes.
        let grid = grid_from(&[
            "    HH  ",
            "    HH  ",
            "    HH  ",
            "    HH  ",
        ]);
        let left = person_at(Location::new(0, 0));
        assert!(!is_stuck(&left, &grid));
        let right = person_at(Location::new(7, 0));
        assert!(is_stuck(&right, &grid));
    }

    #[test]
    fn nav_state_serialization_roundtrip() {
        let config = cfg();
        let mut rng = SimRng::new(8);
        let mut nav = NavState::new(&config, &mut rng);
        nav.seed_tables(StructureKind::Tree, &[Location::new(1, 1)]);
        let json = serde_json::to_string(&nav).unwrap();
        let restored: NavState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.epsilon_reset, nav.epsilon_reset);
        assert_eq!(restored.reward(StructureKind::Tree, Location::new(1, 1)), 0.0);
    }
}
