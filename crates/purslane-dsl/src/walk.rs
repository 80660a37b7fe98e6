//! Random walks over a state-transition table.
//!
//! Protocol scenarios register every transition an action performs
//! (`src → dst`) and then ask for a random, valid transition sequence that
//! starts in an initial state and ends in a required one.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::DslError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, T> {
    pub src: S,
    pub dst: S,
    pub label: T,
}

/// Transitions indexed by destination state.
#[derive(Debug, Clone)]
pub struct TransitionTable<S, T> {
    transitions: Vec<Transition<S, T>>,
    into: HashMap<S, Vec<usize>>,
}

impl<S, T> Default for TransitionTable<S, T> {
    fn default() -> Self {
        TransitionTable {
            transitions: Vec::new(),
            into: HashMap::new(),
        }
    }
}

impl<S, T> TransitionTable<S, T>
where
    S: Clone + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, src: S, dst: S, label: T) {
        self.into
            .entry(dst.clone())
            .or_default()
            .push(self.transitions.len());
        self.transitions.push(Transition { src, dst, label });
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Returns a forward-ordered transition sequence from `init` to `dest`.
    ///
    /// Walks `steps` random transitions backwards from `dest`, then, unless
    /// the walk already ended in `init`, searches depth-first for a way back
    /// to `init`.
    pub fn infer<R: Rng + ?Sized>(
        &self,
        dest: &S,
        steps: usize,
        init: &S,
        rng: &mut R,
    ) -> Result<Vec<&Transition<S, T>>, DslError> {
        let mut path: Vec<usize> = Vec::with_capacity(steps);
        let mut cur = dest.clone();
        for _ in 0..steps {
            let Some(&pick) = self.into.get(&cur).and_then(|ids| ids.choose(rng)) else {
                return Err(unreachable_state(init, dest));
            };
            path.push(pick);
            cur = self.transitions[pick].src.clone();
        }

        if cur != *init {
            path.extend(self.path_back(&cur, init)?);
        }

        path.reverse();
        Ok(path.into_iter().map(|i| &self.transitions[i]).collect())
    }

    /// Depth-first search, walking transitions backwards from `from` until
    /// one leaves `init`. Each transition is tried at most once.
    fn path_back(&self, from: &S, init: &S) -> Result<Vec<usize>, DslError> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut path: Vec<usize> = Vec::new();
        let mut states: Vec<S> = vec![from.clone()];

        while let Some(state) = states.last() {
            let next = self
                .into
                .get(state)
                .into_iter()
                .flatten()
                .copied()
                .find(|i| !visited.contains(i));

            match next {
                Some(i) => {
                    visited.insert(i);
                    path.push(i);
                    let src = &self.transitions[i].src;
                    if src == init {
                        return Ok(path);
                    }
                    states.push(src.clone());
                }
                None => {
                    states.pop();
                    path.pop();
                }
            }
        }
        Err(unreachable_state(init, from))
    }
}

fn unreachable_state<S: Debug>(from: &S, to: &S) -> DslError {
    DslError::UnreachableState {
        from: format!("{from:?}"),
        to: format!("{to:?}"),
    }
}
