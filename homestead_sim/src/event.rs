// Narrative simulation events.
//
// The sim does not log; it emits `SimEvent` records instead. The driver
// collects them per tick and surfaces them alongside snapshots, which
// keeps observability deterministic and serializable — two runs with the
// same seed emit the same event stream.

use crate::types::{BuildingKind, Location, PersonId};
use serde::{Deserialize, Serialize};

/// An event emitted by the simulation, stamped with the tick it happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

/// Everything worth telling the outside world about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEventKind {
    PersonBorn { pk: PersonId, at: Location },
    PersonDied { pk: PersonId },
    /// A stuck agent was culled at the end of the day.
    PersonCulled { pk: PersonId },
    Married { a: PersonId, b: PersonId },
    MovedIntoHome { pk: PersonId, at: Location },
    ConstructionStarted { kind: BuildingKind, at: Location },
    ConstructionCompleted { kind: BuildingKind, at: Location },
    TreeFelled { at: Location },
    DisasterStruckPerson { pk: PersonId },
    DisasterStruckStructure { at: Location },
}
