//! Subset construction: ε-NFA → DFA.
//!
//! DFA states are sets of NFA state indices; transitions are total over
//! the alphabet partition, with the empty set acting as the absorbing trap
//! state. Construction is guarded by a configurable state-count ceiling
//! and checks its deadline once per popped state.

use crate::automata::alphabet::Alphabet;
use crate::automata::nfa::{Nfa, StateId};
use crate::automata::symbol::CharRange;
use crate::core::errors::Error;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::debug;

/// A deterministic automaton, total over its partition classes.
///
/// Serializable so the cache can memoize determinization outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dfa {
    /// Partition classes, in codepoint order
    pub classes: Vec<CharRange>,
    pub state_count: usize,
    pub start: usize,
    /// Row-major `state * classes.len() + class` successor table
    pub transitions: Vec<usize>,
    pub accepting: Vec<bool>,
    /// The absorbing non-accepting state
    pub trap: usize,
}

impl Dfa {
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn next(&self, state: usize, class: usize) -> usize {
        self.transitions[state * self.classes.len() + class]
    }

    /// Locate the partition class of a codepoint.
    pub fn class_of(&self, cp: u32) -> Option<usize> {
        self.classes
            .binary_search_by(|r| {
                if cp < r.start {
                    std::cmp::Ordering::Greater
                } else if cp >= r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
    }

    /// Run the DFA over an input string.
    pub fn accepts(&self, input: &str) -> bool {
        let mut state = self.start;
        for c in input.chars() {
            match self.class_of(c as u32) {
                Some(class) => state = self.next(state, class),
                None => return false,
            }
        }
        self.accepting[state]
    }

    /// Flip accepting states; the DFA is total, so this complements the
    /// recognized language.
    pub fn complement(&self) -> Dfa {
        let mut out = self.clone();
        for a in &mut out.accepting {
            *a = !*a;
        }
        out
    }
}

/// Budget for a single determinization.
#[derive(Debug, Clone, Copy)]
pub struct DfaBudget {
    pub state_limit: usize,
    pub deadline: Option<Instant>,
}

/// Determinize `nfa` over the given partition.
pub fn build(nfa: &Nfa, alphabet: &Alphabet, budget: &DfaBudget) -> Result<Dfa, Error> {
    let class_count = alphabet.len();

    // ε-closure of the NFA start
    let eps = EpsilonTable::new(nfa);
    let initial = eps.closure(vec![nfa.start]);

    let mut sets: Vec<Vec<StateId>> = Vec::new();
    let mut index: HashMap<Vec<StateId>, usize> = HashMap::new();
    let mut transitions: Vec<usize> = Vec::new();
    let mut accepting: Vec<bool> = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    let mut intern = |set: Vec<StateId>,
                      sets: &mut Vec<Vec<StateId>>,
                      accepting: &mut Vec<bool>,
                      queue: &mut VecDeque<usize>,
                      index: &mut HashMap<Vec<StateId>, usize>|
     -> usize {
        if let Some(&id) = index.get(&set) {
            return id;
        }
        let id = sets.len();
        accepting.push(set.binary_search(&nfa.accept).is_ok());
        index.insert(set.clone(), id);
        sets.push(set);
        queue.push_back(id);
        id
    };

    // The trap (empty set) is interned first so it always exists.
    let trap = intern(Vec::new(), &mut sets, &mut accepting, &mut queue, &mut index);
    let start = intern(initial, &mut sets, &mut accepting, &mut queue, &mut index);

    while let Some(current) = queue.pop_front() {
        if let Some(deadline) = budget.deadline {
            if Instant::now() > deadline {
                return Err(Error::DeadlineExceeded {
                    phase: "determinization".to_string(),
                });
            }
        }

        let current_set = sets[current].clone();
        let mut row = Vec::with_capacity(class_count);
        for class in alphabet.classes() {
            // The partition guarantees each transition set either contains
            // the whole class or none of it, so the representative decides.
            let rep = class.start;
            let mut next: Vec<StateId> = Vec::new();
            for t in &nfa.transitions {
                if let Some(set) = &t.on {
                    if set.contains(rep) && current_set.binary_search(&t.from).is_ok() {
                        next.push(t.to);
                    }
                }
            }
            next.sort_unstable();
            next.dedup();
            let next = eps.closure(next);
            let id = intern(next, &mut sets, &mut accepting, &mut queue, &mut index);
            row.push(id);

            if sets.len() > budget.state_limit {
                return Err(Error::ResourceLimit {
                    limit: "dfa_states".to_string(),
                    observed: sets.len() as u64,
                    max: budget.state_limit as u64,
                });
            }
        }
        // Rows are produced in interning order; fill gaps for states
        // interned ahead of their row.
        if transitions.len() < (current + 1) * class_count {
            transitions.resize((current + 1) * class_count, trap);
        }
        transitions[current * class_count..(current + 1) * class_count].copy_from_slice(&row);
    }

    transitions.resize(sets.len() * class_count, trap);

    debug!(
        nfa_states = nfa.state_count,
        dfa_states = sets.len(),
        classes = class_count,
        "determinized"
    );

    Ok(Dfa {
        classes: alphabet.classes().to_vec(),
        state_count: sets.len(),
        start,
        transitions,
        accepting,
        trap,
    })
}

/// Precomputed ε-closure helper.
struct EpsilonTable {
    edges: Vec<Vec<StateId>>,
}

impl EpsilonTable {
    fn new(nfa: &Nfa) -> Self {
        let mut edges = vec![Vec::new(); nfa.state_count];
        for t in &nfa.transitions {
            if t.on.is_none() {
                edges[t.from].push(t.to);
            }
        }
        EpsilonTable { edges }
    }

    /// Sorted ε-closure of a set of states.
    fn closure(&self, seed: Vec<StateId>) -> Vec<StateId> {
        let mut seen: Vec<bool> = vec![false; self.edges.len()];
        let mut stack = seed;
        let mut out = Vec::new();
        while let Some(s) = stack.pop() {
            if seen[s] {
                continue;
            }
            seen[s] = true;
            out.push(s);
            for &next in &self.edges[s] {
                if !seen[next] {
                    stack.push(next);
                }
            }
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::nfa;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn dfa_for(body: &str) -> Dfa {
        let p = split(&format!("/{}/", body), TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        let n = nfa::build(&out.root, p.flags).unwrap();
        let alphabet = Alphabet::from_nfa(&n, 1000).unwrap();
        build(
            &n,
            &alphabet,
            &DfaBudget {
                state_limit: 10_000,
                deadline: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_accepts_matches_language() {
        let dfa = dfa_for("(a|b)+c");
        assert!(dfa.accepts("ac"));
        assert!(dfa.accepts("abbac"));
        assert!(!dfa.accepts("c"));
        assert!(!dfa.accepts("abc d"));
        assert!(!dfa.accepts(""));
    }

    #[test]
    fn test_transitions_are_total() {
        let dfa = dfa_for("ab");
        for state in 0..dfa.state_count {
            for class in 0..dfa.class_count() {
                assert!(dfa.next(state, class) < dfa.state_count);
            }
        }
    }

    #[test]
    fn test_trap_absorbs() {
        let dfa = dfa_for("a");
        assert!(!dfa.accepting[dfa.trap]);
        for class in 0..dfa.class_count() {
            assert_eq!(dfa.next(dfa.trap, class), dfa.trap);
        }
        assert!(!dfa.accepts("zz"));
    }

    #[test]
    fn test_complement() {
        let dfa = dfa_for("a+");
        let comp = dfa.complement();
        assert!(dfa.accepts("aa") && !comp.accepts("aa"));
        assert!(!dfa.accepts("b") && comp.accepts("b"));
        assert!(!dfa.accepts("") && comp.accepts(""));
    }

    #[test]
    fn test_state_limit_enforced() {
        let p = split("/[ab]*a[ab]{8}/", TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        let n = nfa::build(&out.root, p.flags).unwrap();
        let alphabet = Alphabet::from_nfa(&n, 1000).unwrap();
        let err = build(
            &n,
            &alphabet,
            &DfaBudget {
                state_limit: 16,
                deadline: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::ResourceLimit { ref limit, .. } if limit == "dfa_states"));
    }

    #[test]
    fn test_empty_pattern_accepts_empty_only() {
        let dfa = dfa_for("");
        assert!(dfa.accepts(""));
        assert!(!dfa.accepts("a"));
    }
}
