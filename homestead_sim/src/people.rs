// The person registry and population lifecycle.
//
// `People` owns every `Person`, keyed by `PersonId` in a `BTreeMap` so
// the driver iterates agents in ascending id order every tick. The acting
// person is taken out of the registry for the duration of its action
// (`take`/`put`), which is what lets tasks mutate both the actor and
// other people without aliasing.
//
// Population events live here: spawning the initial settlers, yearly
// aging, babies for married couples, and reaping the dead (which vacates
// their home, widows their spouse, and cleans up their pending tasks).
//
// **Critical constraint: determinism.** Iteration is id order; names and
// spawn locations draw from the sim PRNG.

use crate::config::SimConfig;
use crate::grid::Grid;
use crate::person::Person;
use crate::structure::StructureState;
use crate::types::{Location, PersonId};
use homestead_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Settler names, cycled through with a random draw at spawn.
const NAMES: [&str; 24] = [
    "Alrik", "Bera", "Corin", "Dagny", "Edda", "Falk", "Greta", "Halvar", "Inga", "Jorun",
    "Kettil", "Liv", "Magnus", "Nessa", "Oddny", "Pell", "Runa", "Sigur", "Tova", "Ulf",
    "Vigdis", "Wren", "Ylva", "Zorn",
];

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct People {
    persons: BTreeMap<PersonId, Person>,
    next_pk: u32,
}

impl People {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `count` settlers on random walkable cells.
    pub fn generate(count: u32, grid: &Grid, cfg: &SimConfig, rng: &mut SimRng) -> Self {
        let mut people = Self::new();
        for _ in 0..count {
            let Some(spot) = random_walkable_spot(grid, rng) else {
                break; // world too crowded to place anyone else
            };
            let pk = people.allocate_pk();
            let name = NAMES[rng.choose_index(NAMES.len())].to_string();
            let age = rng.range_u64(18, 46) as u32;
            people.insert(Person::new(pk, name, age, spot, cfg, rng));
        }
        people
    }

    fn allocate_pk(&mut self) -> PersonId {
        let pk = PersonId(self.next_pk);
        self.next_pk += 1;
        pk
    }

    pub fn insert(&mut self, person: Person) {
        self.next_pk = self.next_pk.max(person.pk.0 + 1);
        self.persons.insert(person.pk, person);
    }

    /// Detach a person for the duration of their action.
    pub fn take(&mut self, pk: PersonId) -> Option<Person> {
        self.persons.remove(&pk)
    }

    /// Reattach after the action.
    pub fn put(&mut self, person: Person) {
        self.persons.insert(person.pk, person);
    }

    pub fn get(&self, pk: PersonId) -> Option<&Person> {
        self.persons.get(&pk)
    }

    pub fn get_mut(&mut self, pk: PersonId) -> Option<&mut Person> {
        self.persons.get_mut(&pk)
    }

    pub fn ids(&self) -> Vec<PersonId> {
        self.persons.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.values()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn average_health(&self) -> f64 {
        if self.persons.is_empty() {
            return 0.0;
        }
        self.persons.values().map(|p| p.health as f64).sum::<f64>() / self.persons.len() as f64
    }

    pub fn average_hunger(&self) -> f64 {
        if self.persons.is_empty() {
            return 0.0;
        }
        self.persons.values().map(|p| p.hunger as f64).sum::<f64>() / self.persons.len() as f64
    }

    /// Married couples as (lower id, higher id), each counted once.
    pub fn married_pairs(&self) -> Vec<(PersonId, PersonId)> {
        self.persons
            .values()
            .filter_map(|p| {
                let spouse = p.spouse?;
                (p.pk < spouse).then_some((p.pk, spouse))
            })
            .filter(|&(_, b)| self.persons.contains_key(&b))
            .collect()
    }

    pub fn age_everyone(&mut self) {
        for person in self.persons.values_mut() {
            person.age += 1;
        }
    }

    /// Married couples both aged 20..=50 with a shared home get a baby,
    /// placed on the first walkable cell next to the home. Returns the new
    /// ids and where they appeared.
    pub fn make_babies(
        &mut self,
        grid: &Grid,
        cfg: &SimConfig,
        rng: &mut SimRng,
    ) -> Vec<(PersonId, Location)> {
        let fertile = |age: u32| (20..=50).contains(&age);
        let couples = self.married_pairs();
        let mut born = Vec::new();

        for (a, b) in couples {
            let (Some(pa), Some(pb)) = (self.get(a), self.get(b)) else {
                continue;
            };
            if !fertile(pa.age) || !fertile(pb.age) {
                continue;
            }
            let Some(home) = pa.home.or(pb.home) else {
                continue;
            };
            let Some(crib) = home.neighbors().into_iter().find(|&n| grid.is_walkable(n))
            else {
                continue; // the home is walled in this year
            };
            let pk = self.allocate_pk();
            let name = NAMES[rng.choose_index(NAMES.len())].to_string();
            self.insert(Person::new(pk, name, 0, crib, cfg, rng));
            born.push((pk, crib));
        }
        born
    }

    /// Remove everyone dead, vacating their home, widowing their spouse,
    /// and cleaning up their pending tasks. Returns the reaped ids.
    pub fn reap_dead(&mut self, grid: &mut Grid, cfg: &SimConfig) -> Vec<PersonId> {
        let dead: Vec<PersonId> = self
            .persons
            .values()
            .filter(|p| p.is_dead(cfg))
            .map(|p| p.pk)
            .collect();

        for &pk in &dead {
            let Some(mut person) = self.persons.remove(&pk) else {
                continue;
            };
            for task in person.scheduler.drain() {
                task.cleanup(grid, pk);
            }
            if let Some(home_loc) = person.home {
                if let Some(StructureState::Home { owner, .. }) =
                    grid.structure_mut(home_loc).map(|s| &mut s.state)
                {
                    if *owner == Some(pk) {
                        *owner = None;
                    }
                }
            }
            if let Some(spouse_pk) = person.spouse {
                if let Some(spouse) = self.persons.get_mut(&spouse_pk) {
                    spouse.spouse = None;
                }
            }
        }
        dead
    }

    /// Both spouses end the day with the union of their memories.
    pub fn spouses_exchange_memories(&mut self) {
        for (a, b) in self.married_pairs() {
            let Some(mut pa) = self.persons.remove(&a) else {
                continue;
            };
            if let Some(pb) = self.persons.get_mut(&b) {
                pa.memories.combine(&pb.memories);
                pb.memories.combine(&pa.memories);
            }
            self.persons.insert(a, pa);
        }
    }
}

/// A random walkable cell, or `None` after too many failed draws.
fn random_walkable_spot(grid: &Grid, rng: &mut SimRng) -> Option<Location> {
    for _ in 0..1000 {
        let loc = Location::new(
            rng.range_i32(0, grid.width()),
            rng.range_i32(0, grid.height()),
        );
        if grid.is_walkable(loc) {
            return Some(loc);
        }
    }
    None
}
