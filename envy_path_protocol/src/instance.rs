// The allocation instance: one puzzle to be solved inside a room.
//
// An `Instance` is `size` actors on a line and, for each actor, a row of
// `size` object values. `values[a][j]` is the value actor `a` assigns to the
// object in slot `j`; which object sits in a slot is fixed by the layout, so
// a selection only ever records slot indices.
//
// The server sends instances whole and the client never edits them. The only
// change an instance ever undergoes is `solved_by`/`solution` going from
// absent to present, and that arrives as a fresh `Instance` too. On the wire
// `solution` is a list indexed by actor; `solution_selection` converts it to
// the `Selection` map the client works with.
//
// `validate` checks the shape before an inbound instance replaces local
// state, so indexing in the envy evaluator can rely on a square matrix.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ActorIndex, ObjectValue, PlayerToken, Selection, SlotIndex};

/// One puzzle: `size` actors, each with a row of `size` object values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub size: usize,
    pub values: Vec<Vec<ObjectValue>>,
    #[serde(default)]
    pub solution: Option<Vec<SlotIndex>>,
    #[serde(default)]
    pub solved_by: Option<PlayerToken>,
}

/// Shape problems found by `Instance::validate`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("instance size must be at least 1")]
    Empty,
    #[error("expected {expected} value rows, got {actual}")]
    RowCount { expected: usize, actual: usize },
    #[error("row {actor} has {actual} values, expected {expected}")]
    RowLength {
        actor: ActorIndex,
        expected: usize,
        actual: usize,
    },
    #[error("solution has {actual} entries, expected {expected}")]
    SolutionLength { expected: usize, actual: usize },
    #[error("solution assigns slot {slot} to actor {actor}, outside 0..{size}")]
    SolutionSlot {
        actor: ActorIndex,
        slot: SlotIndex,
        size: usize,
    },
}

impl Instance {
    /// Build an unsolved instance from its value rows.
    pub fn new(values: Vec<Vec<ObjectValue>>) -> Self {
        Self {
            size: values.len(),
            values,
            solution: None,
            solved_by: None,
        }
    }

    /// Check that the value matrix is `size × size` and that any solution
    /// names one in-range slot per actor.
    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.size == 0 {
            return Err(InstanceError::Empty);
        }
        if self.values.len() != self.size {
            return Err(InstanceError::RowCount {
                expected: self.size,
                actual: self.values.len(),
            });
        }
        for (actor, row) in self.values.iter().enumerate() {
            if row.len() != self.size {
                return Err(InstanceError::RowLength {
                    actor,
                    expected: self.size,
                    actual: row.len(),
                });
            }
        }
        if let Some(solution) = &self.solution {
            if solution.len() != self.size {
                return Err(InstanceError::SolutionLength {
                    expected: self.size,
                    actual: solution.len(),
                });
            }
            if let Some((actor, &slot)) = solution.iter().enumerate().find(|(_, s)| **s >= self.size)
            {
                return Err(InstanceError::SolutionSlot {
                    actor,
                    slot,
                    size: self.size,
                });
            }
        }
        Ok(())
    }

    /// True once the server has recorded a winning player.
    pub fn is_solved(&self) -> bool {
        self.solved_by.is_some()
    }

    /// Value actor `actor` assigns to the object in `slot`.
    pub fn value(&self, actor: ActorIndex, slot: SlotIndex) -> Option<ObjectValue> {
        self.values.get(actor)?.get(slot).copied()
    }

    /// First slot in `actor`'s row holding `value`, if any.
    pub fn slot_of_value(&self, actor: ActorIndex, value: ObjectValue) -> Option<SlotIndex> {
        self.values.get(actor)?.iter().position(|v| *v == value)
    }

    /// The canonical solution as an actor → slot map.
    pub fn solution_selection(&self) -> Option<Selection> {
        self.solution
            .as_ref()
            .map(|slots| slots.iter().copied().enumerate().collect())
    }

    /// Same puzzle, ignoring solved state.
    pub fn same_puzzle(&self, other: &Instance) -> bool {
        self.size == other.size && self.values == other.values
    }
}
