// Task variants and their behavior scripts.
//
// A `Task` is a `TaskKind` plus the little state it accumulates while
// running: the structure it is engaged with (so `cleanup()` can
// deregister the worker) and, for the Eat resupply leg, the food being
// carried home. `execute()` dispatches on the kind and performs one
// tick's worth of behavior, returning `Finished` or `Pending`.
//
// The scripts:
// - `Eat` — eat at home if there is food; otherwise fetch food from a
//   barn and carry it home first; without a home, eat at a barn directly.
// - `FindHome` — claim the nearest known vacant home for self and spouse.
// - `FindSpouse` — pair with the first spouseless person; share a home.
// - `Transport` — haul the dominant backpack resource to a barn.
// - `Work(kind)` — let the navigator pick a workplace, labor until it
//   yields, stow the yield, update both reward tables. Chopped trees are
//   felled.
// - `StartConstruction(kind)` — claim an empty plot next to town.
// - `Build(kind)` — travel to a site, deposit wood/stone, advance its
//   completion, and enqueue gathering work for what is still missing.
// - `Explore` — wander somewhere reachable.
//
// Failures follow the error design: no path and no candidate are ordinary
// `Pending` outcomes retried next tick; `CapacityViolation` and
// `StructureMissing` kill the task (the scheduler cleans it up) but not
// the run.

use crate::error::{SimError, SimResult};
use crate::event::{SimEvent, SimEventKind};
use crate::grid::Grid;
use crate::mover;
use crate::navigator::{self, MoveOutcome};
use crate::person::Person;
use crate::sim::TickCtx;
use crate::types::{BuildingKind, Location, PersonId, Resource, StructureKind, WorkKind};
use serde::{Deserialize, Serialize};

/// The kinds of task an agent can schedule. Doubles as the key of the
/// priority table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Eat,
    FindHome,
    FindSpouse,
    Transport,
    Explore,
    Work(WorkKind),
    StartConstruction(BuildingKind),
    Build(BuildingKind),
}

// Custom serde: TaskKind keys the priority table, so it serializes as a
// plain string (serde_json requires string map keys).
impl Serialize for TaskKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = match self {
            TaskKind::Eat => "eat",
            TaskKind::FindHome => "find_home",
            TaskKind::FindSpouse => "find_spouse",
            TaskKind::Transport => "transport",
            TaskKind::Explore => "explore",
            TaskKind::Work(WorkKind::Farm) => "work_farm",
            TaskKind::Work(WorkKind::Mine) => "work_mine",
            TaskKind::Work(WorkKind::ChopTree) => "chop_tree",
            TaskKind::StartConstruction(BuildingKind::Home) => "start_home_construction",
            TaskKind::StartConstruction(BuildingKind::Barn) => "start_barn_construction",
            TaskKind::StartConstruction(BuildingKind::Farm) => "start_farm_construction",
            TaskKind::StartConstruction(BuildingKind::Mine) => "start_mine_construction",
            TaskKind::Build(BuildingKind::Home) => "build_home",
            TaskKind::Build(BuildingKind::Barn) => "build_barn",
            TaskKind::Build(BuildingKind::Farm) => "build_farm",
            TaskKind::Build(BuildingKind::Mine) => "build_mine",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for TaskKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let kind = match s.as_str() {
            "eat" => TaskKind::Eat,
            "find_home" => TaskKind::FindHome,
            "find_spouse" => TaskKind::FindSpouse,
            "transport" => TaskKind::Transport,
            "explore" => TaskKind::Explore,
            "work_farm" => TaskKind::Work(WorkKind::Farm),
            "work_mine" => TaskKind::Work(WorkKind::Mine),
            "chop_tree" => TaskKind::Work(WorkKind::ChopTree),
            "start_home_construction" => TaskKind::StartConstruction(BuildingKind::Home),
            "start_barn_construction" => TaskKind::StartConstruction(BuildingKind::Barn),
            "start_farm_construction" => TaskKind::StartConstruction(BuildingKind::Farm),
            "start_mine_construction" => TaskKind::StartConstruction(BuildingKind::Mine),
            "build_home" => TaskKind::Build(BuildingKind::Home),
            "build_barn" => TaskKind::Build(BuildingKind::Barn),
            "build_farm" => TaskKind::Build(BuildingKind::Farm),
            "build_mine" => TaskKind::Build(BuildingKind::Mine),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown task kind {other:?}"
                )));
            }
        };
        Ok(kind)
    }
}

/// What one `execute()` round concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Finished,
    Pending,
}

/// A scheduled task and its running state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    /// Insertion order, the scheduler's tie-breaker.
    pub seq: u64,
    /// The structure this task is engaged with, for worker cleanup.
    work_structure: Option<Location>,
    /// Selection rounds the trip to the workplace took (reward penalty).
    arrival_turns: u32,
    /// Food withdrawn from a barn, en route to the pantry.
    carried_food: u32,
}

impl Task {
    pub fn new(kind: TaskKind, seq: u64) -> Self {
        Self {
            kind,
            seq,
            work_structure: None,
            arrival_turns: 0,
            carried_food: 0,
        }
    }

    /// The structure this task is working on, if any.
    pub fn work_structure(&self) -> Option<Location> {
        self.work_structure
    }

    /// True when the engaged structure no longer exists in the expected
    /// shape (destroyed, felled, or promoted out from under the task).
    pub fn structure_vanished(&self, grid: &Grid) -> bool {
        let Some(loc) = self.work_structure else {
            return false;
        };
        let expected = match self.kind {
            TaskKind::Work(kind) => kind.structure_kind(),
            TaskKind::Build(kind) => StructureKind::Site(kind),
            _ => return false,
        };
        grid.structure(loc).is_none_or(|s| s.kind() != expected)
    }

    /// Deregister from the engaged structure.
    pub fn cleanup(&self, grid: &mut Grid, pk: PersonId) {
        if let Some(loc) = self.work_structure {
            if let Some(structure) = grid.structure_mut(loc) {
                structure.remove_worker(pk);
            }
        }
    }

    /// Rough ticks until this task completes, for introspection.
    pub fn remaining_time(&self, person: &Person, grid: &Grid, speed: u32) -> u64 {
        match (self.kind, self.work_structure) {
            (TaskKind::Work(_) | TaskKind::Build(_), Some(loc)) => {
                let on_site = grid
                    .structure(loc)
                    .map_or(1, |s| s.work_time_estimate());
                mover::move_time_estimate(person, loc, speed) + on_site
            }
            (TaskKind::Work(_) | TaskKind::Build(_), None) => 3,
            (TaskKind::Eat, _) => 5,
            _ => 1,
        }
    }
}

/// Run one tick of a task.
pub fn execute(task: &mut Task, person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<TaskStatus> {
    match task.kind {
        TaskKind::Eat => execute_eat(task, person, ctx),
        TaskKind::FindHome => execute_find_home(person, ctx),
        TaskKind::FindSpouse => execute_find_spouse(person, ctx),
        TaskKind::Transport => execute_transport(person, ctx),
        TaskKind::Explore => {
            navigator::explore(person, ctx.grid, ctx.config, ctx.tick, ctx.rng)?;
            Ok(TaskStatus::Finished)
        }
        TaskKind::Work(kind) => execute_work(task, kind, person, ctx),
        TaskKind::StartConstruction(kind) => execute_start_construction(kind, person, ctx),
        TaskKind::Build(kind) => execute_build(task, kind, person, ctx),
    }
}

// ---------------------------------------------------------------------------
// Eat
// ---------------------------------------------------------------------------

fn execute_eat(task: &mut Task, person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<TaskStatus> {
    // A home that no longer stands makes the person homeless again.
    if let Some(home_loc) = person.home {
        if ctx
            .grid
            .structure(home_loc)
            .is_none_or(|s| s.kind() != StructureKind::Home)
        {
            person.home = None;
        }
    }

    let Some(home_loc) = person.home else {
        return eat_at_barn(person, ctx);
    };

    // Resupply leg: bring withdrawn food to the pantry first.
    if task.carried_food > 0 {
        let Some(home) = navigator::move_to_home(person, ctx.grid, ctx.config, ctx.tick)? else {
            return Ok(TaskStatus::Pending);
        };
        let cfg = ctx.config;
        if let Some(structure) = ctx.grid.structure_mut(home) {
            let deposit = task
                .carried_food
                .min(structure.remaining_capacity(Resource::Food, cfg));
            structure.add_resource(Resource::Food, deposit, cfg)?;
            task.carried_food -= deposit;
            // Whatever does not fit goes back into the pack, if it can.
            if task.carried_food > 0 {
                let leftover = task.carried_food;
                task.carried_food = 0;
                let _ = person.backpack.add(Resource::Food, leftover, cfg);
            }
        }
        return Ok(TaskStatus::Pending);
    }

    let pantry_food = ctx
        .grid
        .structure(home_loc)
        .map_or(0, |s| s.resource(Resource::Food));

    if pantry_food > 0 {
        // Walk home and eat.
        let Some(home) = navigator::move_to_home(person, ctx.grid, ctx.config, ctx.tick)? else {
            return Ok(TaskStatus::Pending);
        };
        let cfg = ctx.config;
        if let Some(structure) = ctx.grid.structure_mut(home) {
            structure.remove_resource(Resource::Food, cfg.eat_food_cost);
            person.adjust_hunger(cfg.home_eat_satiate, cfg);
        }
        return Ok(TaskStatus::Finished);
    }

    // Pantry is empty: fetch a refill from a barn.
    match navigator::move_to_workable_structure(
        person,
        ctx.grid,
        ctx.config,
        ctx.tick,
        ctx.rng,
        StructureKind::Barn,
        Some(Resource::Food),
    )? {
        MoveOutcome::Arrived { at: barn_loc, .. } => {
            let want = ctx.config.home_food_store;
            if let Some(barn) = ctx.grid.structure_mut(barn_loc) {
                task.carried_food = barn.remove_resource(Resource::Food, want);
            }
            Ok(TaskStatus::Pending)
        }
        MoveOutcome::Abandoned => Ok(TaskStatus::Finished),
        MoveOutcome::Searching => Ok(TaskStatus::Pending),
    }
}

/// The homeless variant: walk to a barn with food and eat there.
fn eat_at_barn(person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<TaskStatus> {
    match navigator::move_to_workable_structure(
        person,
        ctx.grid,
        ctx.config,
        ctx.tick,
        ctx.rng,
        StructureKind::Barn,
        Some(Resource::Food),
    )? {
        MoveOutcome::Arrived { at: barn_loc, .. } => {
            let cfg = ctx.config;
            if let Some(barn) = ctx.grid.structure_mut(barn_loc) {
                barn.remove_resource(Resource::Food, cfg.eat_food_cost);
                person.adjust_hunger(cfg.barn_eat_satiate, cfg);
            }
            Ok(TaskStatus::Finished)
        }
        MoveOutcome::Abandoned => Ok(TaskStatus::Finished),
        MoveOutcome::Searching => Ok(TaskStatus::Pending),
    }
}

// ---------------------------------------------------------------------------
// FindHome / FindSpouse
// ---------------------------------------------------------------------------

fn execute_find_home(person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<TaskStatus> {
    if person.has_home() {
        return Ok(TaskStatus::Finished);
    }

    let known = person
        .memories
        .locations_of(crate::types::Cell::Home, ctx.tick, ctx.config.memory_expire);
    let vacant: Vec<Location> = known
        .into_iter()
        .filter(|&loc| {
            ctx.grid
                .structure(loc)
                .is_some_and(|s| s.kind() == StructureKind::Home && s.has_capacity(ctx.config))
        })
        .collect();

    let Some(choice) = mover::closest(person.location, &vacant) else {
        return Ok(TaskStatus::Pending); // keep looking as memories grow
    };

    if let Some(home) = ctx.grid.structure_mut(choice) {
        if let crate::structure::StructureState::Home { owner, .. } = &mut home.state {
            *owner = Some(person.pk);
        }
    }
    person.home = Some(choice);
    if let Some(spouse_pk) = person.spouse {
        if let Some(spouse) = ctx.people.get_mut(spouse_pk) {
            spouse.home = Some(choice);
        }
    }
    ctx.events.push(SimEvent {
        tick: ctx.tick,
        kind: SimEventKind::MovedIntoHome {
            pk: person.pk,
            at: choice,
        },
    });
    Ok(TaskStatus::Finished)
}

fn execute_find_spouse(person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<TaskStatus> {
    if person.has_spouse() {
        return Ok(TaskStatus::Finished);
    }

    // The acting person is detached from the registry, so everyone listed
    // is a candidate other.
    let candidate = ctx
        .people
        .ids()
        .into_iter()
        .find(|&pk| pk != person.pk && ctx.people.get(pk).is_some_and(|p| !p.has_spouse()));

    let Some(other_pk) = candidate else {
        return Ok(TaskStatus::Pending);
    };

    let other = ctx.people.get_mut(other_pk).expect("candidate just found");
    other.spouse = Some(person.pk);
    person.spouse = Some(other_pk);

    // A couple shares one home, whichever side brought it.
    if person.has_home() {
        other.home = person.home;
    } else if other.has_home() {
        person.home = other.home;
    }

    ctx.events.push(SimEvent {
        tick: ctx.tick,
        kind: SimEventKind::Married {
            a: person.pk.min(other_pk),
            b: person.pk.max(other_pk),
        },
    });
    Ok(TaskStatus::Finished)
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

fn execute_transport(person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<TaskStatus> {
    let Some(resource) = person.backpack.dominant_resource() else {
        return Ok(TaskStatus::Finished); // nothing to haul
    };

    match navigator::move_to_workable_structure(
        person,
        ctx.grid,
        ctx.config,
        ctx.tick,
        ctx.rng,
        StructureKind::Barn,
        None,
    )? {
        MoveOutcome::Arrived { at: barn_loc, .. } => {
            let cfg = ctx.config;
            let carried = person.backpack.resource(resource);
            if let Some(barn) = ctx.grid.structure_mut(barn_loc) {
                let deposit = carried.min(barn.remaining_capacity(resource, cfg));
                barn.add_resource(resource, deposit, cfg)?;
                person.backpack.remove(resource, deposit);
            }
            Ok(TaskStatus::Finished)
        }
        MoveOutcome::Abandoned => Ok(TaskStatus::Finished),
        MoveOutcome::Searching => Ok(TaskStatus::Pending),
    }
}

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

fn execute_work(
    task: &mut Task,
    kind: WorkKind,
    person: &mut Person,
    ctx: &mut TickCtx<'_>,
) -> SimResult<TaskStatus> {
    if let Some(loc) = task.work_structure {
        let expected = kind.structure_kind();
        let Some(structure) = ctx
            .grid
            .structure_mut(loc)
            .filter(|s| s.kind() == expected)
        else {
            return Err(SimError::StructureMissing(loc));
        };

        let Some(yielded) = structure.work(person.pk, ctx.rng) else {
            return Ok(TaskStatus::Pending); // labor continues
        };
        structure.remove_worker(person.pk);

        person
            .backpack
            .add(kind.resource(), yielded, ctx.config)?;
        navigator::update_reward(
            person,
            kind.structure_kind(),
            loc,
            task.arrival_turns,
            yielded as f64,
        );
        person.add_work_reward(kind, yielded as f64);

        if kind == WorkKind::ChopTree {
            ctx.grid.remove_tree(loc);
            ctx.events.push(SimEvent {
                tick: ctx.tick,
                kind: SimEventKind::TreeFelled { at: loc },
            });
        }
        task.work_structure = None;
        return Ok(TaskStatus::Finished);
    }

    match navigator::move_to_workable_structure(
        person,
        ctx.grid,
        ctx.config,
        ctx.tick,
        ctx.rng,
        kind.structure_kind(),
        None,
    )? {
        MoveOutcome::Arrived { at, turns } => {
            task.work_structure = Some(at);
            task.arrival_turns = turns;
            Ok(TaskStatus::Pending)
        }
        MoveOutcome::Abandoned => Ok(TaskStatus::Finished),
        MoveOutcome::Searching => Ok(TaskStatus::Pending),
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

fn execute_start_construction(
    kind: BuildingKind,
    person: &mut Person,
    ctx: &mut TickCtx<'_>,
) -> SimResult<TaskStatus> {
    let spots = ctx.grid.empty_spots_near_town();
    for spot in spots {
        match ctx.grid.start_construction(kind, spot, ctx.config) {
            Ok(()) => {
                person.memories.add(kind.site_cell(), spot, ctx.tick, ctx.grid);
                ctx.events.push(SimEvent {
                    tick: ctx.tick,
                    kind: SimEventKind::ConstructionStarted { kind, at: spot },
                });
                return Ok(TaskStatus::Finished);
            }
            Err(SimError::CellOccupied(_)) => continue, // footprint did not fit
            Err(e) => return Err(e),
        }
    }
    Ok(TaskStatus::Finished) // no plot fits anywhere; give up
}

fn execute_build(
    task: &mut Task,
    kind: BuildingKind,
    person: &mut Person,
    ctx: &mut TickCtx<'_>,
) -> SimResult<TaskStatus> {
    let Some(site_loc) = task.work_structure else {
        return match navigator::move_to_workable_structure(
            person,
            ctx.grid,
            ctx.config,
            ctx.tick,
            ctx.rng,
            StructureKind::Site(kind),
            None,
        )? {
            MoveOutcome::Arrived { at, .. } => {
                task.work_structure = Some(at);
                Ok(TaskStatus::Pending)
            }
            MoveOutcome::Abandoned => Ok(TaskStatus::Finished),
            MoveOutcome::Searching => Ok(TaskStatus::Pending),
        };
    };

    let expected = StructureKind::Site(kind);
    let tick = ctx.tick;
    let Some(site) = ctx
        .grid
        .structure_mut(site_loc)
        .filter(|s| s.kind() == expected)
    else {
        return Err(SimError::StructureMissing(site_loc));
    };

    let (wood_deficit, stone_deficit, still_needed) = match &site.state {
        crate::structure::StructureState::Site(s) => {
            (s.wood_deficit(), s.stone_deficit(), s.needs_more())
        }
        _ => return Err(SimError::StructureMissing(site_loc)),
    };
    if !still_needed {
        // Finished site awaiting promotion; nothing left to do here.
        task.work_structure = None;
        return Ok(TaskStatus::Finished);
    }

    let wood = person.backpack.resource(Resource::Wood).min(wood_deficit);
    let stone = person.backpack.resource(Resource::Stone).min(stone_deficit);
    if site.build(person.pk, wood, stone, tick) {
        person.backpack.remove(Resource::Wood, wood);
        person.backpack.remove(Resource::Stone, stone);
    }

    // Line up gathering for whatever the site is still short of.
    let (wood_left, stone_left) = match &site.state {
        crate::structure::StructureState::Site(s) => (s.wood_deficit(), s.stone_deficit()),
        _ => (0, 0),
    };
    site.remove_worker(person.pk);
    if wood_left > 0 {
        person.scheduler.add(TaskKind::Work(WorkKind::ChopTree));
    }
    if stone_left > 0 {
        person.scheduler.add(TaskKind::Work(WorkKind::Mine));
    }
    task.work_structure = None;
    Ok(TaskStatus::Finished) // one deposit per invocation
}
