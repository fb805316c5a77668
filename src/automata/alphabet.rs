//! Alphabet partitioning for determinization.
//!
//! The working alphabet is the partition of the codepoint space induced by
//! the interval boundaries of every set appearing on an NFA transition
//! (sweep line over interval endpoints). Every transition set is then an
//! exact union of partition classes, so the DFA only needs one column per
//! class. Each class is represented by its smallest codepoint.

use crate::automata::nfa::Nfa;
use crate::automata::symbol::{CharRange, MAX_CODEPOINT};
use crate::core::errors::Error;
use std::collections::BTreeSet;

/// The partition of `[0, MAX_CODEPOINT)` induced by a set of boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Alphabet {
    classes: Vec<CharRange>,
}

impl Alphabet {
    /// Build the partition for an NFA, capped at `limit` classes.
    pub fn from_nfa(nfa: &Nfa, limit: usize) -> Result<Alphabet, Error> {
        Self::from_nfas(std::iter::once(nfa), limit)
    }

    /// Build a common partition for several NFAs (solver product walks
    /// compare transition classes across machines).
    pub fn from_nfas<'a>(
        nfas: impl Iterator<Item = &'a Nfa>,
        limit: usize,
    ) -> Result<Alphabet, Error> {
        let mut offsets = BTreeSet::new();
        offsets.insert(0u32);
        offsets.insert(MAX_CODEPOINT);
        for nfa in nfas {
            for set in nfa.symbol_sets() {
                for r in set.ranges() {
                    offsets.insert(r.start);
                    offsets.insert(r.end);
                }
            }
        }

        let mut classes = Vec::with_capacity(offsets.len());
        let mut iter = offsets.into_iter();
        let mut prev = iter.next().expect("zero boundary");
        for next in iter {
            classes.push(CharRange {
                start: prev,
                end: next,
            });
            prev = next;
        }

        if classes.len() > limit {
            return Err(Error::ResourceLimit {
                limit: "alphabet_classes".to_string(),
                observed: classes.len() as u64,
                max: limit as u64,
            });
        }
        Ok(Alphabet { classes })
    }

    /// Partition classes in codepoint order.
    pub fn classes(&self) -> &[CharRange] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Representative (smallest) codepoint of each class.
    pub fn representatives(&self) -> impl Iterator<Item = u32> + '_ {
        self.classes.iter().map(|c| c.start)
    }
}
