// The simulation driver: tick/day/year clock and global steps.
//
// `Simulation` owns the grid, the people, the PRNG, the config, and the
// outputs (events and yearly snapshots). One *tick* is one action round:
// every live person takes one action, then workplaces mix their workers'
// memories and the dead are reaped. `actions_per_day` ticks make a day;
// at the end of a day finished construction sites are promoted, spouses
// exchange memories, and stuck agents are culled. At the end of a year
// everyone ages, couples make babies, trees grow, disasters run, a deep
// snapshot is pushed, and every scheduler is flushed.
//
// `TickCtx` is the bundle of disjoint borrows a person's action runs
// against. The acting person is detached from the registry for the
// duration of the action, so tasks can mutate the actor, the grid, and
// other people without aliasing.
//
// **Critical constraint: determinism.** The simulation is a pure function
// of `(seed, config, initial grid)`. People iterate in id order,
// structures in top-left order, and all randomness flows from the single
// seeded PRNG.

use crate::config::SimConfig;
use crate::error::SimResult;
use crate::event::{SimEvent, SimEventKind};
use crate::grid::Grid;
use crate::memory::Memories;
use crate::navigator;
use crate::people::People;
use crate::temperature::temperature_for_day;
use crate::thinker;
use crate::types::{PersonId, StructureKind};
use homestead_prng::SimRng;
use serde::{Deserialize, Serialize};

/// The disjoint borrows one person's action runs against. The actor
/// itself is detached from `people` while the context is alive.
pub struct TickCtx<'a> {
    pub grid: &'a mut Grid,
    pub people: &'a mut People,
    pub rng: &'a mut SimRng,
    pub config: &'a SimConfig,
    pub tick: u64,
    pub events: &'a mut Vec<SimEvent>,
}

/// A deep copy of the world, taken once per simulated year.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub year: u32,
    pub grid: Grid,
    pub people: People,
    pub temperature: f64,
}

/// The whole simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Simulation {
    pub tick: u64,
    pub day: u32,
    pub rng: SimRng,
    pub config: SimConfig,
    pub grid: Grid,
    pub people: People,
    /// Narrative events, in emission order.
    pub events: Vec<SimEvent>,
    /// One snapshot per completed simulated year.
    pub snapshots: Vec<Snapshot>,
}

impl Simulation {
    /// Build a simulation from an initial character grid and spawn the
    /// starting population.
    pub fn new(seed: u64, config: SimConfig, rows: &[&str], population: u32) -> SimResult<Self> {
        let mut rng = SimRng::new(seed);
        let grid = Grid::from_rows(rows, &config, &mut rng)?;
        let people = People::generate(population, &grid, &config, &mut rng);
        Ok(Self {
            tick: 0,
            day: 0,
            rng,
            config,
            grid,
            people,
            events: Vec::new(),
            snapshots: Vec::new(),
        })
    }

    /// Run the simulation for a number of years.
    pub fn run(&mut self, years: u32) -> SimResult<()> {
        let days = years * self.config.days_per_year;
        for _ in 0..days {
            self.run_day()?;
        }
        Ok(())
    }

    /// One simulated day.
    pub fn run_day(&mut self) -> SimResult<()> {
        self.day += 1;
        let day_of_year = (self.day - 1) % self.config.days_per_year;
        self.grid.temperature = temperature_for_day(day_of_year, self.config.days_per_year);

        for _ in 0..self.config.actions_per_day {
            self.run_tick()?;
        }
        self.end_of_day();

        if self.day % self.config.days_per_year == 0 {
            self.end_of_year(self.day / self.config.days_per_year);
        }
        Ok(())
    }

    /// One action round: every live person acts once, then workplaces mix
    /// memories and the dead are reaped.
    fn run_tick(&mut self) -> SimResult<()> {
        self.tick += 1;
        for pk in self.people.ids() {
            let Some(mut person) = self.people.take(pk) else {
                continue;
            };
            if person.is_dead(&self.config) {
                self.people.put(person);
                continue;
            }
            let mut ctx = TickCtx {
                grid: &mut self.grid,
                people: &mut self.people,
                rng: &mut self.rng,
                config: &self.config,
                tick: self.tick,
                events: &mut self.events,
            };
            let result = thinker::take_action(&mut person, &mut ctx);
            self.people.put(person);
            result?;
        }
        self.mix_workplace_memories();
        self.reap_dead();
        Ok(())
    }

    /// Everyone working the same structure ends the round with the union
    /// of the crew's memories.
    fn mix_workplace_memories(&mut self) {
        let grid = &self.grid;
        let people = &mut self.people;
        for structure in grid.structures() {
            if structure.workers.len() < 2 {
                continue;
            }
            let crew: Vec<PersonId> = structure.workers.iter().copied().collect();
            let mut combined = Memories::new();
            for &pk in &crew {
                if let Some(p) = people.get(pk) {
                    combined.combine(&p.memories);
                }
            }
            for &pk in &crew {
                if let Some(p) = people.get_mut(pk) {
                    p.memories.combine(&combined);
                }
            }
        }
    }

    fn reap_dead(&mut self) {
        for pk in self.people.reap_dead(&mut self.grid, &self.config) {
            self.events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::PersonDied { pk },
            });
        }
    }

    fn end_of_day(&mut self) {
        let promoted = self
            .grid
            .turn_completed_constructions_to_buildings(&self.config, &mut self.rng);
        for (at, kind) in promoted {
            self.events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::ConstructionCompleted { kind, at },
            });
        }

        self.people.spouses_exchange_memories();
        self.cull_stuck();
        self.reap_dead();
    }

    /// Agents with no reachable open spot next to town are deadlocked;
    /// they are killed and reaped at the end of the day.
    fn cull_stuck(&mut self) {
        let grid = &self.grid;
        let stuck: Vec<PersonId> = self
            .people
            .iter()
            .filter(|p| navigator::is_stuck(p, grid))
            .map(|p| p.pk)
            .collect();
        for pk in stuck {
            if let Some(person) = self.people.get_mut(pk) {
                person.kill();
            }
            self.events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::PersonCulled { pk },
            });
        }
    }

    fn end_of_year(&mut self, year: u32) {
        self.people.age_everyone();

        let born = self
            .people
            .make_babies(&self.grid, &self.config, &mut self.rng);
        for (pk, at) in born {
            self.events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::PersonBorn { pk, at },
            });
        }

        self.grid
            .grow_trees(self.config.tree_growth_chance, &self.config, &mut self.rng);
        self.run_disasters();
        self.reap_dead();

        self.snapshots.push(Snapshot {
            year,
            grid: self.grid.clone(),
            people: self.people.clone(),
            temperature: self.grid.temperature,
        });

        self.flush_schedulers();
    }

    /// Yearly disasters: possibly hurt one person, possibly knock one
    /// finished building back into a construction site.
    fn run_disasters(&mut self) {
        if self.rng.random_bool(self.config.disaster_chance) {
            let ids = self.people.ids();
            if !ids.is_empty() {
                let pk = ids[self.rng.choose_index(ids.len())];
                if let Some(person) = self.people.get_mut(pk) {
                    person.adjust_health(-self.config.disaster_health_damage, &self.config);
                }
                self.events.push(SimEvent {
                    tick: self.tick,
                    kind: SimEventKind::DisasterStruckPerson { pk },
                });
            }
        }

        if self.rng.random_bool(self.config.disaster_chance) {
            let mut buildings: Vec<_> = Vec::new();
            for kind in [
                StructureKind::Home,
                StructureKind::Barn,
                StructureKind::Farm,
                StructureKind::Mine,
            ] {
                buildings.extend(self.grid.structure_locations(kind));
            }
            buildings.sort();
            if !buildings.is_empty() {
                let at = buildings[self.rng.choose_index(buildings.len())];
                self.grid.deconstruct(at, &self.config);
                self.events.push(SimEvent {
                    tick: self.tick,
                    kind: SimEventKind::DisasterStruckStructure { at },
                });
            }
        }
    }

    /// Stale plans do not survive the snapshot boundary.
    fn flush_schedulers(&mut self) {
        for pk in self.people.ids() {
            let Some(mut person) = self.people.take(pk) else {
                continue;
            };
            for task in person.scheduler.drain() {
                task.cleanup(&mut self.grid, pk);
            }
            self.people.put(person);
        }
    }
}
