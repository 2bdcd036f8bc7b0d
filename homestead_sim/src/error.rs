// Simulation error kinds.
//
// Only genuinely exceptional conditions become errors. Out-of-bounds
// lookups return `false`/`None`, and a failed path search is an ordinary
// outcome the caller retries — neither goes through this module.
//
// `CapacityViolation` and `StructureMissing` are fatal to the task that
// raised them: the scheduler cleans the task up and the simulation
// continues. `InvalidCell` and `IllegalStep` are fatal to the run.

use crate::types::Location;
use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    /// The initial grid contained a character outside the cell alphabet.
    #[error("invalid cell character {character:?} at {location}")]
    InvalidCell { character: char, location: Location },

    /// A cell that was expected to be empty is already occupied.
    #[error("cell at {0} is already occupied")]
    CellOccupied(Location),

    /// A resource was added beyond a store's capacity.
    #[error("capacity violated adding {amount} to store at {location}")]
    CapacityViolation { location: Location, amount: u32 },

    /// The mover was asked to step to a non-adjacent or blocked cell.
    /// Indicates a pathfinder bug.
    #[error("illegal step from {from} to {to}")]
    IllegalStep { from: Location, to: Location },

    /// A task's target structure no longer exists.
    #[error("structure at {0} is gone")]
    StructureMissing(Location),
}

impl SimError {
    /// True for errors that kill the offending task but not the run.
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            SimError::CapacityViolation { .. } | SimError::StructureMissing(_)
        )
    }
}
