// Person entities — the simulation's autonomous agents.
//
// A `Person` owns its stats (health, hunger, age), a `Backpack`, its
// `Memories`, the navigator's learning state, and its task scheduler.
// Relations to other entities are plain identifiers resolved through the
// owning registries: `spouse` is a `PersonId` looked up in `People`,
// `home` is the top-left `Location` of a Home looked up in the grid. A
// recorded home whose structure has vanished simply resolves to nothing —
// the person is homeless again on the next lookup.
//
// Metabolism runs once per tick: hunger falls by one; low hunger drains
// health, high hunger restores it. Death is health 0 or old age, checked
// by the people registry at reap time.
//
// See also: `thinker.rs` for how tasks get enqueued and priorities set,
// `people.rs` for the registry and lifecycle events.

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::memory::Memories;
use crate::navigator::NavState;
use crate::scheduler::Scheduler;
use crate::task::TaskKind;
use crate::types::{BuildingKind, Location, PersonId, Resource, WorkKind};
use homestead_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Backpack
// ---------------------------------------------------------------------------

/// What a person carries. Per-resource caps come from the config; the
/// aggregate capacity is their sum.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Backpack {
    food: u32,
    wood: u32,
    stone: u32,
}

impl Backpack {
    pub fn resource(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Food => self.food,
            Resource::Wood => self.wood,
            Resource::Stone => self.stone,
        }
    }

    pub fn total(&self) -> u32 {
        self.food + self.wood + self.stone
    }

    /// True while the total load is below the aggregate capacity.
    pub fn has_capacity(&self, cfg: &SimConfig) -> bool {
        self.total() < cfg.backpack_capacity()
    }

    pub fn has_items(&self) -> bool {
        self.total() > 0
    }

    fn cap(resource: Resource, cfg: &SimConfig) -> u32 {
        match resource {
            Resource::Food => cfg.backpack_food_store,
            Resource::Wood => cfg.backpack_wood_store,
            Resource::Stone => cfg.backpack_stone_store,
        }
    }

    /// Stow a resource. Exceeding the per-resource cap is a
    /// `CapacityViolation` — fatal to the task that tried.
    pub fn add(&mut self, resource: Resource, amount: u32, cfg: &SimConfig) -> SimResult<()> {
        let stored = self.resource(resource);
        if stored + amount > Self::cap(resource, cfg) {
            // A backpack has no grid location; (-1,-1) marks "carried".
            return Err(SimError::CapacityViolation {
                location: Location::new(-1, -1),
                amount,
            });
        }
        match resource {
            Resource::Food => self.food += amount,
            Resource::Wood => self.wood += amount,
            Resource::Stone => self.stone += amount,
        }
        Ok(())
    }

    /// Take up to `amount` of a resource out; returns what was removed.
    pub fn remove(&mut self, resource: Resource, amount: u32) -> u32 {
        let stored = match resource {
            Resource::Food => &mut self.food,
            Resource::Wood => &mut self.wood,
            Resource::Stone => &mut self.stone,
        };
        let removed = amount.min(*stored);
        *stored -= removed;
        removed
    }

    /// The resource with the largest stored quantity, if anything is
    /// carried. Ties go to the earlier resource in declaration order.
    pub fn dominant_resource(&self) -> Option<Resource> {
        if !self.has_items() {
            return None;
        }
        Resource::ALL
            .into_iter()
            .max_by_key(|&r| self.resource(r))
    }

    /// How full the pack is, in [0, 1].
    pub fn fullness(&self, cfg: &SimConfig) -> f64 {
        self.total() as f64 / cfg.backpack_capacity() as f64
    }
}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Person {
    pub pk: PersonId,
    pub name: String,
    pub age: u32,
    pub location: Location,
    pub health: i32,
    pub hunger: i32,
    /// Spouse by id; the relation is kept symmetric by the people registry.
    pub spouse: Option<PersonId>,
    /// Top-left of the owned Home, resolved through the grid at use time.
    pub home: Option<Location>,
    pub backpack: Backpack,
    pub memories: Memories,
    pub navigator: NavState,
    pub scheduler: Scheduler,
    /// Hunger level below which this person bothers to eat.
    pub hunger_preference: i32,
    /// Running reward per gathering occupation, for work-type selection.
    pub work_rewards: BTreeMap<WorkKind, f64>,
    /// Current task priorities, recomputed each tick by the thinker.
    pub priorities: BTreeMap<TaskKind, i32>,
}

impl Person {
    pub fn new(
        pk: PersonId,
        name: String,
        age: u32,
        location: Location,
        cfg: &SimConfig,
        rng: &mut SimRng,
    ) -> Self {
        let hunger_preference =
            rng.range_i32(cfg.hunger_pref_min, cfg.hunger_pref_max + 1);
        let work_rewards = WorkKind::ALL.into_iter().map(|k| (k, 0.0)).collect();
        Self {
            pk,
            name,
            age,
            location,
            health: cfg.person_health_cap,
            hunger: cfg.person_hunger_cap,
            spouse: None,
            home: None,
            backpack: Backpack::default(),
            memories: Memories::new(),
            navigator: NavState::new(cfg, rng),
            scheduler: Scheduler::new(),
            hunger_preference,
            work_rewards,
            priorities: default_priorities(),
        }
    }

    /// Per-tick metabolism: hunger drops, health follows.
    pub fn metabolize(&mut self, cfg: &SimConfig) {
        self.adjust_hunger(-1, cfg);
        if self.hunger < cfg.hunger_damage_threshold {
            self.adjust_health(-1, cfg);
        } else if self.hunger > cfg.hunger_regen_threshold {
            self.adjust_health(1, cfg);
        }
    }

    pub fn adjust_hunger(&mut self, delta: i32, cfg: &SimConfig) {
        self.hunger = (self.hunger + delta).clamp(0, cfg.person_hunger_cap);
    }

    pub fn adjust_health(&mut self, delta: i32, cfg: &SimConfig) {
        self.health = (self.health + delta).clamp(0, cfg.person_health_cap);
    }

    pub fn kill(&mut self) {
        self.health = 0;
    }

    pub fn is_dead(&self, cfg: &SimConfig) -> bool {
        self.health <= 0 || self.age >= cfg.person_age_max
    }

    pub fn has_spouse(&self) -> bool {
        self.spouse.is_some()
    }

    pub fn has_home(&self) -> bool {
        self.home.is_some()
    }

    /// Priority of a task kind; unknown kinds rank lowest.
    pub fn priority(&self, kind: TaskKind) -> i32 {
        self.priorities.get(&kind).copied().unwrap_or(1)
    }

    /// Fold a work yield into the occupation's running reward.
    pub fn add_work_reward(&mut self, kind: WorkKind, reward: f64) {
        *self.work_rewards.entry(kind).or_insert(0.0) += reward;
    }
}

/// The starting priority table; the thinker rewrites most of it each tick.
fn default_priorities() -> BTreeMap<TaskKind, i32> {
    let mut table = BTreeMap::new();
    table.insert(TaskKind::Eat, 10);
    table.insert(TaskKind::FindHome, 6);
    table.insert(TaskKind::Explore, 1);
    table.insert(TaskKind::FindSpouse, 1);
    table.insert(TaskKind::Transport, 5);
    table.insert(TaskKind::Work(WorkKind::ChopTree), 2);
    table.insert(TaskKind::Work(WorkKind::Farm), 4);
    table.insert(TaskKind::Work(WorkKind::Mine), 2);
    for kind in BuildingKind::ALL {
        table.insert(TaskKind::Build(kind), 3);
        table.insert(TaskKind::StartConstruction(kind), 1);
    }
    table
}
