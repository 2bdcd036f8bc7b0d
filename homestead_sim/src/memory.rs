// Agent memory: time-stamped observations keyed by location.
//
// A `Memories` holds at most one entry per location — the most recent
// observation of what stands there. Entries expire `memory_expire` ticks
// after they were made; expired entries are evicted lazily whenever the
// memory is queried.
//
// `add()` normalizes the observed cell to the top-left corner of its
// structure, so multi-cell buildings occupy a single memory slot and the
// navigator's per-location reward tables stay keyed by structure identity.
//
// `combine()` merges two memories pointwise, keeping the newer entry for
// each location — the primitive behind workplace gossip and married
// couples' end-of-day exchange.
//
// **Critical constraint: determinism.** Entries live in a `BTreeMap`, so
// `locations_of()` returns locations in row-major order.

use crate::grid::Grid;
use crate::types::{Cell, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One remembered observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// What was seen.
    pub what: Cell,
    /// The tick the observation was made.
    pub when: u64,
}

/// A person's (or a vision scan's) set of observations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Memories {
    entries: BTreeMap<Location, Memory>,
}

impl Memories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Location, &Memory)> {
        self.entries.iter()
    }

    /// Record an observation made at tick `now`. The location is
    /// normalized to the top-left of the structure covering it; any prior
    /// entry at that location is replaced.
    pub fn add(&mut self, what: Cell, loc: Location, now: u64, grid: &Grid) {
        let key = grid.top_left_of(loc).unwrap_or(loc);
        self.entries.insert(key, Memory { what, when: now });
    }

    /// Forget whatever was recorded at a location.
    pub fn remove(&mut self, loc: Location) {
        self.entries.remove(&loc);
    }

    /// Locations of all non-expired observations of `what`. Evicts expired
    /// entries as a side effect.
    pub fn locations_of(&mut self, what: Cell, now: u64, memory_expire: u64) -> Vec<Location> {
        self.evict_expired(now, memory_expire);
        self.entries
            .iter()
            .filter(|(_, m)| m.what == what)
            .map(|(&loc, _)| loc)
            .collect()
    }

    /// Locations of all known finished buildings (barn, home, farm, mine).
    pub fn building_locations(&mut self, now: u64, memory_expire: u64) -> Vec<Location> {
        self.evict_expired(now, memory_expire);
        self.entries
            .iter()
            .filter(|(_, m)| {
                matches!(m.what, Cell::Barn | Cell::Home | Cell::Farm | Cell::Mine)
            })
            .map(|(&loc, _)| loc)
            .collect()
    }

    fn evict_expired(&mut self, now: u64, memory_expire: u64) {
        self.entries
            .retain(|_, m| now.saturating_sub(m.when) <= memory_expire);
    }

    /// Merge another memory into this one: for each location present in
    /// either, keep the entry with the larger `when`.
    pub fn combine(&mut self, other: &Memories) {
        for (&loc, &incoming) in &other.entries {
            match self.entries.get(&loc) {
                Some(existing) if existing.when >= incoming.when => {}
                _ => {
                    self.entries.insert(loc, incoming);
                }
            }
        }
    }
}
