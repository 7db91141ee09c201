// Envy evaluation over a (possibly partial) selection.
//
// Actors sit on a line; each one only compares itself against its immediate
// neighbours (`a - 1` and `a + 1`, clipped at the ends). Actor `a` envies
// neighbour `b` when the value `b` picked appears in `a`'s own row at a
// smaller slot index than the slot `a` picked, or does not appear in `a`'s
// row at all. Envy is the OR over the examined neighbours.
//
// Everything here is pure and recomputed from scratch per call; the room
// controller calls `evaluate` after every edit. The cost is O(N) lookups per
// actor-row scan, so O(N^2) worst case for a full pass, which is nothing at
// puzzle sizes.
//
// A submission is only offered when every actor has picked, the picked
// values are pairwise distinct *by value*, and nobody is envious. Distinctness
// is tallied by value, not by slot, matching the server's acceptance rule.

use std::collections::BTreeMap;

use envy_path_protocol::{ActorIndex, Instance, ObjectValue, Selection};

/// Per-actor envy, defined only for actors that have a selection.
pub type EnvyFlags = BTreeMap<ActorIndex, bool>;

/// Result of evaluating a selection against an instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub envy: EnvyFlags,
    pub envious_count: usize,
    /// How many selected actors picked each value.
    pub value_counts: BTreeMap<ObjectValue, usize>,
    /// Actors with a selection.
    pub selected: usize,
    pub size: usize,
}

impl Evaluation {
    pub fn distinct_values(&self) -> usize {
        self.value_counts.len()
    }

    pub fn is_complete(&self) -> bool {
        self.selected == self.size
    }

    /// Complete, value-distinct and envy-free.
    pub fn is_valid_submission(&self) -> bool {
        self.is_complete() && self.distinct_values() == self.size && self.envious_count == 0
    }
}

/// Line-graph neighbours of `actor` among `size` actors.
pub fn neighbors(actor: ActorIndex, size: usize) -> impl Iterator<Item = ActorIndex> {
    let left = actor.checked_sub(1);
    let right = Some(actor + 1).filter(|r| *r < size);
    left.into_iter().chain(right)
}

fn selected_value(instance: &Instance, selection: &Selection, actor: ActorIndex) -> Option<ObjectValue> {
    instance.value(actor, *selection.get(&actor)?)
}

/// Whether `actor` envies either neighbour. False for an actor with no
/// selection.
pub fn actor_envies(instance: &Instance, selection: &Selection, actor: ActorIndex) -> bool {
    let Some(&own_slot) = selection.get(&actor) else {
        return false;
    };
    neighbors(actor, instance.size).any(|other| {
        match selected_value(instance, selection, other) {
            Some(value) => match instance.slot_of_value(actor, value) {
                Some(pos) => pos < own_slot,
                None => true,
            },
            None => false,
        }
    })
}

/// Evaluate every selected actor. Selections outside the instance are
/// ignored.
pub fn evaluate(instance: &Instance, selection: &Selection) -> Evaluation {
    let mut eval = Evaluation {
        size: instance.size,
        ..Evaluation::default()
    };
    for (&actor, &slot) in selection {
        let Some(value) = instance.value(actor, slot) else {
            continue;
        };
        eval.selected += 1;
        *eval.value_counts.entry(value).or_insert(0) += 1;
        let envious = actor_envies(instance, selection, actor);
        if envious {
            eval.envious_count += 1;
        }
        eval.envy.insert(actor, envious);
    }
    eval
}
