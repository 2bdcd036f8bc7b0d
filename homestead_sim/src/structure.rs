// Structure entities — buildings, trees, and construction sites.
//
// A `Structure` is a footprint on the grid (top-left location + square
// size) plus a `StructureState` variant carrying kind-specific data:
//
// - `Home` — 0..1 owner and a small food store.
// - `Barn` — the shared store with per-resource capacities.
// - `Workplace` — farm, mine, or tree. Holds a `(mu, sigma)` yield
//   distribution plus a per-structure variance offset, and tracks each
//   worker's invested labor until it pays out.
// - `Site` — a construction site accumulating wood, stone, and completion
//   work until the grid promotes it to a finished building.
//
// Deep class hierarchies are avoided on purpose: one struct, one tagged
// sum, and the capability methods (`has_capacity`, `work`, store access)
// dispatch on the variant. Yield distributions are stored as `(mu, sigma)`
// pairs rather than closures so snapshots stay serializable.
//
// Workers are referenced by `PersonId`, never by pointer; the people
// registry owns the persons. See `grid.rs` for the registry that owns the
// structures and keeps footprint cells in sync.
//
// **Critical constraint: determinism.** Worker sets are `BTreeSet` so
// workplace memory mixing iterates in id order.

use crate::config::{BuildSpec, SimConfig, WorkSpec};
use crate::error::{SimError, SimResult};
use crate::types::{BuildingKind, Cell, Location, PersonId, Resource, StructureKind};
use homestead_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A farm, mine, or tree — anything that yields resources when worked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workplace {
    /// Mean of the yield distribution. For trees this is the grove mean.
    pub yield_mu: f64,
    /// Standard deviation of the yield distribution.
    pub yield_sigma: f64,
    /// Per-structure offset added to every sample. Zero for trees, whose
    /// whole grove shares one distribution instead.
    pub variance: f64,
    /// Work actions one yield costs.
    pub max_work_count: u32,
    /// Labor already invested, per worker.
    progress: BTreeMap<PersonId, u32>,
}

impl Workplace {
    fn new(mu: f64, sigma: f64, variance: f64, max_work_count: u32) -> Self {
        Self {
            yield_mu: mu,
            yield_sigma: sigma,
            variance,
            max_work_count,
            progress: BTreeMap::new(),
        }
    }

    /// Invest one work action as `pk`. Returns the yield once the worker
    /// has put in `max_work_count` actions, `None` while labor continues.
    ///
    /// The yield is `round(N(mu, sigma) + variance)` clamped to zero.
    fn work(&mut self, pk: PersonId, rng: &mut SimRng) -> Option<u32> {
        let invested = self.progress.entry(pk).or_insert(0);
        *invested += 1;
        if *invested < self.max_work_count {
            return None;
        }
        self.progress.remove(&pk);
        let sample = rng.normal(self.yield_mu, self.yield_sigma) + self.variance;
        Some(sample.round().max(0.0) as u32)
    }

    fn clear_progress(&mut self, pk: PersonId) {
        self.progress.remove(&pk);
    }
}

/// A construction site accumulating resources and completion work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Site {
    pub kind: BuildingKind,
    pub required_wood: u32,
    pub required_stone: u32,
    pub wood: u32,
    pub stone: u32,
    /// Build actions performed so far.
    pub completion: u32,
    pub finished_completion_level: u32,
    /// Build actions the site accepts within one tick.
    pub max_work_count: u32,
    work_tick: u64,
    work_count_this_tick: u32,
}

impl Site {
    fn new(kind: BuildingKind, spec: &BuildSpec) -> Self {
        Self {
            kind,
            required_wood: spec.req_wood,
            required_stone: spec.req_stone,
            wood: 0,
            stone: 0,
            completion: 0,
            finished_completion_level: spec.finished_completion_level,
            max_work_count: spec.max_work_count,
            work_tick: 0,
            work_count_this_tick: 0,
        }
    }

    /// Wood still missing before the site can finish.
    pub fn wood_deficit(&self) -> u32 {
        self.required_wood.saturating_sub(self.wood)
    }

    /// Stone still missing before the site can finish.
    pub fn stone_deficit(&self) -> u32 {
        self.required_stone.saturating_sub(self.stone)
    }

    /// True while the site still needs resources or completion work.
    pub fn needs_more(&self) -> bool {
        self.wood < self.required_wood
            || self.stone < self.required_stone
            || self.completion < self.finished_completion_level
    }

    /// One build action: deposit resources from the given amounts (clamped
    /// to the deficits) and advance the completion counter. Returns false
    /// when the per-tick ration is exhausted and nothing happened.
    fn build(&mut self, wood: u32, stone: u32, tick: u64) -> bool {
        if self.work_tick != tick {
            self.work_tick = tick;
            self.work_count_this_tick = 0;
        }
        if self.work_count_this_tick >= self.max_work_count {
            return false;
        }
        self.work_count_this_tick += 1;
        self.wood += wood.min(self.wood_deficit());
        self.stone += stone.min(self.stone_deficit());
        self.completion += 1;
        true
    }
}

/// Kind-specific state of a structure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StructureState {
    Home {
        owner: Option<PersonId>,
        food: u32,
    },
    Barn {
        food: u32,
        wood: u32,
        stone: u32,
    },
    Farm(Workplace),
    Mine(Workplace),
    Tree(Workplace),
    Site(Site),
}

/// A structure registered on the grid: footprint plus kind-specific state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Structure {
    /// Top-left corner — the structure's identity in the registry.
    pub location: Location,
    /// Footprint edge length (structures are square; trees are 1).
    pub size: i32,
    pub state: StructureState,
    /// People currently working here, in id order.
    pub workers: BTreeSet<PersonId>,
    /// Workers the structure accepts at once.
    pub max_worker_count: u32,
}

impl Structure {
    pub fn home(location: Location, cfg: &SimConfig) -> Self {
        Self {
            location,
            size: cfg.home_build.size,
            state: StructureState::Home {
                owner: None,
                food: 0,
            },
            workers: BTreeSet::new(),
            max_worker_count: 2,
        }
    }

    pub fn barn(location: Location, cfg: &SimConfig) -> Self {
        Self {
            location,
            size: cfg.barn_build.size,
            state: StructureState::Barn {
                food: 0,
                wood: 0,
                stone: 0,
            },
            workers: BTreeSet::new(),
            max_worker_count: 4,
        }
    }

    /// A farm or mine, with a fresh variance offset drawn from N(3, 0.9).
    fn worked_building(
        location: Location,
        size: i32,
        spec: &WorkSpec,
        rng: &mut SimRng,
        make: fn(Workplace) -> StructureState,
    ) -> Self {
        let variance = rng.normal(3.0, 0.9);
        Self {
            location,
            size,
            state: make(Workplace::new(
                spec.yield_mu,
                spec.yield_sigma,
                variance,
                spec.max_work_count,
            )),
            workers: BTreeSet::new(),
            max_worker_count: spec.max_worker_count,
        }
    }

    pub fn farm(location: Location, cfg: &SimConfig, rng: &mut SimRng) -> Self {
        Self::worked_building(
            location,
            cfg.farm_build.size,
            &cfg.farm_work,
            rng,
            StructureState::Farm,
        )
    }

    pub fn mine(location: Location, cfg: &SimConfig, rng: &mut SimRng) -> Self {
        Self::worked_building(
            location,
            cfg.mine_build.size,
            &cfg.mine_work,
            rng,
            StructureState::Mine,
        )
    }

    /// A tree with its grove's shared yield distribution.
    pub fn tree(location: Location, grove_mu: f64, grove_sigma: f64, cfg: &SimConfig) -> Self {
        Self {
            location,
            size: 1,
            state: StructureState::Tree(Workplace::new(
                grove_mu,
                grove_sigma,
                0.0,
                cfg.tree_work.max_work_count,
            )),
            workers: BTreeSet::new(),
            max_worker_count: cfg.tree_work.max_worker_count,
        }
    }

    pub fn construction_site(location: Location, kind: BuildingKind, cfg: &SimConfig) -> Self {
        let spec = cfg.build_spec(kind);
        Self {
            location,
            size: spec.size,
            state: StructureState::Site(Site::new(kind, spec)),
            workers: BTreeSet::new(),
            max_worker_count: spec.max_worker_count,
        }
    }

    // -- classification ----------------------------------------------------

    pub fn kind(&self) -> StructureKind {
        match &self.state {
            StructureState::Home { .. } => StructureKind::Home,
            StructureState::Barn { .. } => StructureKind::Barn,
            StructureState::Farm(_) => StructureKind::Farm,
            StructureState::Mine(_) => StructureKind::Mine,
            StructureState::Tree(_) => StructureKind::Tree,
            StructureState::Site(site) => StructureKind::Site(site.kind),
        }
    }

    /// The character every footprint cell of this structure carries.
    pub fn cell(&self) -> Cell {
        self.kind().cell()
    }

    /// All grid cells covered by the footprint.
    pub fn footprint(&self) -> Vec<Location> {
        let mut cells = Vec::with_capacity((self.size * self.size) as usize);
        for dy in 0..self.size {
            for dx in 0..self.size {
                cells.push(Location::new(self.location.x + dx, self.location.y + dy));
            }
        }
        cells
    }

    /// True when this structure holds resources (barn, or home's pantry).
    pub fn is_store(&self) -> bool {
        matches!(
            self.state,
            StructureState::Barn { .. } | StructureState::Home { .. }
        )
    }

    // -- capacity ----------------------------------------------------------

    /// Whether the structure can take more of whatever it takes: a vacant
    /// home takes an owner, a barn takes resources, a workplace takes
    /// workers, a site takes deposits and work.
    pub fn has_capacity(&self, cfg: &SimConfig) -> bool {
        match &self.state {
            StructureState::Home { owner, .. } => owner.is_none(),
            StructureState::Barn { food, wood, stone } => {
                food + wood + stone
                    < cfg.barn_food_store + cfg.barn_wood_store + cfg.barn_stone_store
            }
            StructureState::Farm(_) | StructureState::Mine(_) | StructureState::Tree(_) => {
                (self.workers.len() as u32) < self.max_worker_count
            }
            StructureState::Site(site) => site.needs_more(),
        }
    }

    // -- stores ------------------------------------------------------------

    /// Amount of a resource currently stored. Zero for non-stores and for
    /// resources the store does not carry.
    pub fn resource(&self, resource: Resource) -> u32 {
        match (&self.state, resource) {
            (StructureState::Home { food, .. }, Resource::Food) => *food,
            (StructureState::Barn { food, .. }, Resource::Food) => *food,
            (StructureState::Barn { wood, .. }, Resource::Wood) => *wood,
            (StructureState::Barn { stone, .. }, Resource::Stone) => *stone,
            _ => 0,
        }
    }

    /// Capacity of this store for one resource. Zero for non-stores.
    pub fn resource_capacity(&self, resource: Resource, cfg: &SimConfig) -> u32 {
        match (&self.state, resource) {
            (StructureState::Home { .. }, Resource::Food) => cfg.home_food_store,
            (StructureState::Barn { .. }, Resource::Food) => cfg.barn_food_store,
            (StructureState::Barn { .. }, Resource::Wood) => cfg.barn_wood_store,
            (StructureState::Barn { .. }, Resource::Stone) => cfg.barn_stone_store,
            _ => 0,
        }
    }

    /// Space left for one resource in this store.
    pub fn remaining_capacity(&self, resource: Resource, cfg: &SimConfig) -> u32 {
        self.resource_capacity(resource, cfg)
            .saturating_sub(self.resource(resource))
    }

    /// Deposit a resource. Errors with `CapacityViolation` when the amount
    /// exceeds the remaining capacity (callers clamp first).
    pub fn add_resource(
        &mut self,
        resource: Resource,
        amount: u32,
        cfg: &SimConfig,
    ) -> SimResult<()> {
        if amount > self.remaining_capacity(resource, cfg) {
            return Err(SimError::CapacityViolation {
                location: self.location,
                amount,
            });
        }
        match (&mut self.state, resource) {
            (StructureState::Home { food, .. }, Resource::Food) => *food += amount,
            (StructureState::Barn { food, .. }, Resource::Food) => *food += amount,
            (StructureState::Barn { wood, .. }, Resource::Wood) => *wood += amount,
            (StructureState::Barn { stone, .. }, Resource::Stone) => *stone += amount,
            _ => {
                return Err(SimError::CapacityViolation {
                    location: self.location,
                    amount,
                });
            }
        }
        Ok(())
    }

    /// Withdraw up to `amount` of a resource; returns what was actually
    /// removed.
    pub fn remove_resource(&mut self, resource: Resource, amount: u32) -> u32 {
        let stored = match (&mut self.state, resource) {
            (StructureState::Home { food, .. }, Resource::Food) => food,
            (StructureState::Barn { food, .. }, Resource::Food) => food,
            (StructureState::Barn { wood, .. }, Resource::Wood) => wood,
            (StructureState::Barn { stone, .. }, Resource::Stone) => stone,
            _ => return 0,
        };
        let removed = amount.min(*stored);
        *stored -= removed;
        removed
    }

    // -- workers -----------------------------------------------------------

    /// Register a worker. Returns false when the structure is full.
    pub fn add_worker(&mut self, pk: PersonId) -> bool {
        if self.workers.contains(&pk) {
            return true;
        }
        if (self.workers.len() as u32) >= self.max_worker_count {
            return false;
        }
        self.workers.insert(pk);
        true
    }

    pub fn remove_worker(&mut self, pk: PersonId) {
        self.workers.remove(&pk);
        if let StructureState::Farm(w) | StructureState::Mine(w) | StructureState::Tree(w) =
            &mut self.state
        {
            w.clear_progress(pk);
        }
    }

    // -- work --------------------------------------------------------------

    /// Invest one work action as `pk`. Returns the stochastic yield when
    /// the worker's invested labor reaches `max_work_count`; `None` while
    /// labor continues, or when the structure is not a workplace or is
    /// already fully crewed.
    pub fn work(&mut self, pk: PersonId, rng: &mut SimRng) -> Option<u32> {
        if !self.add_worker(pk) {
            return None;
        }
        match &mut self.state {
            StructureState::Farm(w) | StructureState::Mine(w) | StructureState::Tree(w) => {
                w.work(pk, rng)
            }
            _ => None,
        }
    }

    /// Rough ticks of on-site work before a yield, for task ETAs.
    pub fn work_time_estimate(&self) -> u64 {
        match &self.state {
            StructureState::Farm(w) | StructureState::Mine(w) | StructureState::Tree(w) => {
                w.max_work_count as u64
            }
            StructureState::Site(site) => site.finished_completion_level as u64,
            _ => 1,
        }
    }

    /// One build action on a construction site: deposit the given amounts
    /// (clamped to the deficits) and advance completion. Returns false for
    /// non-sites or when the per-tick ration is spent.
    pub fn build(&mut self, pk: PersonId, wood: u32, stone: u32, tick: u64) -> bool {
        if !self.add_worker(pk) {
            return false;
        }
        match &mut self.state {
            StructureState::Site(site) => site.build(wood, stone, tick),
            _ => false,
        }
    }
}
