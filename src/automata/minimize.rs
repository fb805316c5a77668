//! DFA minimization.
//!
//! Hopcroft (default) refines a partition from a worklist of (block,
//! input-class) splitters in O(n·k·log n); Moore iterates successor
//! signatures to a fixpoint. Both yield the unique minimal DFA for the
//! language. Inputs are the total DFAs produced by subset construction,
//! so no reachability pruning is needed here.

use crate::automata::dfa::Dfa;
use crate::core::errors::Error;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MinimizationAlgorithm {
    #[default]
    Hopcroft,
    Moore,
}

/// Minimize a DFA with the chosen algorithm.
pub fn minimize(
    dfa: &Dfa,
    algorithm: MinimizationAlgorithm,
    deadline: Option<Instant>,
) -> Result<Dfa, Error> {
    let block_of = match algorithm {
        MinimizationAlgorithm::Hopcroft => hopcroft(dfa, deadline)?,
        MinimizationAlgorithm::Moore => moore(dfa, deadline)?,
    };
    Ok(rebuild(dfa, &block_of))
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), Error> {
    if let Some(d) = deadline {
        if Instant::now() > d {
            return Err(Error::DeadlineExceeded {
                phase: "minimization".to_string(),
            });
        }
    }
    Ok(())
}

/// Worklist partition refinement. Returns the block id of every state.
fn hopcroft(dfa: &Dfa, deadline: Option<Instant>) -> Result<Vec<usize>, Error> {
    let n = dfa.state_count;
    let k = dfa.class_count();

    // Inverse transition lists per input class
    let mut preimage: Vec<Vec<Vec<usize>>> = vec![vec![Vec::new(); n]; k];
    for state in 0..n {
        for class in 0..k {
            let to = dfa.next(state, class);
            preimage[class][to].push(state);
        }
    }

    let accepting: HashSet<usize> = (0..n).filter(|&s| dfa.accepting[s]).collect();
    let rejecting: HashSet<usize> = (0..n).filter(|&s| !dfa.accepting[s]).collect();

    let mut blocks: Vec<HashSet<usize>> = Vec::new();
    for b in [accepting, rejecting] {
        if !b.is_empty() {
            blocks.push(b);
        }
    }
    let mut block_of: Vec<usize> = vec![0; n];
    for (id, b) in blocks.iter().enumerate() {
        for &s in b {
            block_of[s] = id;
        }
    }

    let mut worklist: VecDeque<(usize, usize)> = VecDeque::new();
    for id in 0..blocks.len() {
        for class in 0..k {
            worklist.push_back((id, class));
        }
    }

    while let Some((splitter, class)) = worklist.pop_front() {
        check_deadline(deadline)?;

        // States with a transition into the splitter block on this class
        let mut incoming: HashSet<usize> = HashSet::new();
        for &target in blocks[splitter].iter() {
            incoming.extend(preimage[class][target].iter().copied());
        }
        if incoming.is_empty() {
            continue;
        }

        // Split every block crossed by the incoming set
        let affected: HashSet<usize> = incoming.iter().map(|&s| block_of[s]).collect();
        for block_id in affected {
            let inside: HashSet<usize> = blocks[block_id]
                .iter()
                .copied()
                .filter(|s| incoming.contains(s))
                .collect();
            if inside.len() == blocks[block_id].len() || inside.is_empty() {
                continue;
            }
            let outside: HashSet<usize> = blocks[block_id]
                .difference(&inside)
                .copied()
                .collect();

            // Keep the larger half in place, enqueue the smaller
            let (stay, moved) = if inside.len() <= outside.len() {
                (outside, inside)
            } else {
                (inside, outside)
            };
            let new_id = blocks.len();
            for &s in &moved {
                block_of[s] = new_id;
            }
            blocks[block_id] = stay;
            blocks.push(moved);
            for c in 0..k {
                worklist.push_back((new_id, c));
            }
        }
    }

    debug!(states = n, blocks = blocks.len(), "hopcroft refinement done");
    Ok(block_of)
}

/// Fixpoint refinement by successor signature. Slower but straightforward.
///
/// Block ids are always renumbered by first occurrence, so the assignment
/// vectors of consecutive rounds compare directly.
fn moore(dfa: &Dfa, deadline: Option<Instant>) -> Result<Vec<usize>, Error> {
    let n = dfa.state_count;
    let k = dfa.class_count();

    let initial: Vec<usize> = dfa
        .accepting
        .iter()
        .map(|&a| if a { 0 } else { 1 })
        .collect();
    let mut block_of = canonicalize(&initial);

    loop {
        check_deadline(deadline)?;

        let mut signatures: HashMap<(usize, Vec<usize>), usize> = HashMap::new();
        let mut next: Vec<usize> = vec![0; n];
        for state in 0..n {
            let succ: Vec<usize> = (0..k).map(|c| block_of[dfa.next(state, c)]).collect();
            let key = (block_of[state], succ);
            let fresh = signatures.len();
            next[state] = *signatures.entry(key).or_insert(fresh);
        }
        if next == block_of {
            return Ok(block_of);
        }
        block_of = next;
    }
}

/// Renumber a block assignment by first occurrence.
fn canonicalize(assignment: &[usize]) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    assignment
        .iter()
        .map(|&b| {
            let fresh = mapping.len();
            *mapping.entry(b).or_insert(fresh)
        })
        .collect()
}

/// Quotient the DFA by a block assignment.
fn rebuild(dfa: &Dfa, block_of: &[usize]) -> Dfa {
    let k = dfa.class_count();
    let block_count = block_of.iter().copied().max().map(|m| m + 1).unwrap_or(0);

    // Representative state per block
    let mut representative: Vec<Option<usize>> = vec![None; block_count];
    for (state, &b) in block_of.iter().enumerate() {
        representative[b].get_or_insert(state);
    }

    let mut transitions = vec![0usize; block_count * k];
    let mut accepting = vec![false; block_count];
    for (b, rep) in representative.iter().enumerate() {
        let rep = rep.expect("non-empty block");
        accepting[b] = dfa.accepting[rep];
        for class in 0..k {
            transitions[b * k + class] = block_of[dfa.next(rep, class)];
        }
    }

    Dfa {
        classes: dfa.classes.clone(),
        state_count: block_count,
        start: block_of[dfa.start],
        transitions,
        accepting,
        trap: block_of[dfa.trap],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::alphabet::Alphabet;
    use crate::automata::dfa::{build, DfaBudget};
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

    fn check_same_language(a: &Dfa, b: &Dfa, inputs: &[&str]) {
        for input in inputs {
            assert_eq!(a.accepts(input), b.accepts(input), "differ on {:?}", input);
        }
    }

    const SAMPLES: &[&str] = &[
        "", "a", "b", "c", "aa", "ab", "ac", "ba", "bc", "abc", "abab", "aabc", "zzz", "abcabc",
    ];

    #[test]
    fn test_hopcroft_preserves_language() {
        for body in ["(a|b)+c", "a*b", "a{2,4}", "(ab)*"] {
            let dfa = dfa_for(body);
            let min = minimize(&dfa, MinimizationAlgorithm::Hopcroft, None).unwrap();
            assert!(min.state_count <= dfa.state_count);
            check_same_language(&dfa, &min, SAMPLES);
        }
    }

    #[test]
    fn test_moore_preserves_language() {
        for body in ["(a|b)+c", "a*b", "a{2,4}", "(ab)*"] {
            let dfa = dfa_for(body);
            let min = minimize(&dfa, MinimizationAlgorithm::Moore, None).unwrap();
            assert!(min.state_count <= dfa.state_count);
            check_same_language(&dfa, &min, SAMPLES);
        }
    }

    #[test]
    fn test_both_algorithms_agree_on_size() {
        for body in ["(a|b)+c", "a?a?a?", "(ab|ac)"] {
            let dfa = dfa_for(body);
            let h = minimize(&dfa, MinimizationAlgorithm::Hopcroft, None).unwrap();
            let m = minimize(&dfa, MinimizationAlgorithm::Moore, None).unwrap();
            assert_eq!(h.state_count, m.state_count, "minimal size differs for {}", body);
        }
    }

    #[test]
    fn test_redundant_states_collapse() {
        // a|a determinizes with duplicated paths; minimal DFA for "a" has
        // 3 states (start, accept, trap)
        let dfa = dfa_for("a|a|a");
        let min = minimize(&dfa, MinimizationAlgorithm::Hopcroft, None).unwrap();
        assert_eq!(min.state_count, 3);
        assert!(min.accepts("a"));
        assert!(!min.accepts(""));
        assert!(!min.accepts("aa"));
    }
}
