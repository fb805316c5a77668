//! Language solver: emptiness of intersection, subset and equivalence.
//!
//! Patterns are gated (regular subset only), desugared (edge anchors
//! erased, partial mode wrapped with `.*`), compiled to DFAs and compared
//! with a product-automaton BFS. The BFS uses a FIFO queue and expands
//! successor classes in codepoint order, so witnesses are shortest and
//! reproducible; the character chosen on each edge is the smallest
//! codepoint in the intersection of the two partition classes.

use crate::automata::alphabet::Alphabet;
use crate::automata::dfa::{self, Dfa, DfaBudget};
use crate::automata::minimize::{minimize, MinimizationAlgorithm};
use crate::automata::nfa::{self, Nfa};
use crate::automata::regular::{ensure_regular, RegularityOptions};
use crate::core::errors::Error;
use crate::core::nodes::*;
use crate::core::pattern::Flags;
use crate::core::tokens::{AnchorKind, Greediness};
use crate::core::Span;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

/// Whether a pattern must cover the whole input or any substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    #[default]
    Full,
    Partial,
}

/// Per-operation options and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    #[serde(rename = "matchMode")]
    pub match_mode: MatchMode,
    #[serde(rename = "minimizeDfa")]
    pub minimize_dfa: bool,
    #[serde(rename = "minimizationAlgorithm")]
    pub minimization_algorithm: MinimizationAlgorithm,
    /// Wall-clock budget for the whole operation
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    /// Admit always-decidable lookarounds (positive with nullable body,
    /// which are vacuously true, and their never-true negative duals)
    #[serde(rename = "allowTrivialLookaround", default)]
    pub allow_trivial_lookaround: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            match_mode: MatchMode::Full,
            minimize_dfa: true,
            minimization_algorithm: MinimizationAlgorithm::default(),
            timeout_ms: Some(5_000),
            allow_trivial_lookaround: false,
        }
    }
}

impl SolverOptions {
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms))
    }
}

/// Outcome of a two-pattern decision; `witness` is present exactly when
/// the decided property fails to be trivial (an intersection example or a
/// subset counterexample).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub holds: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,
}

/// Outcome of an equivalence check with one witness per side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceOutcome {
    #[serde(rename = "isEquivalent")]
    pub equivalent: bool,
    #[serde(rename = "leftOnlyExample", skip_serializing_if = "Option::is_none")]
    pub left_only: Option<String>,
    #[serde(rename = "rightOnlyExample", skip_serializing_if = "Option::is_none")]
    pub right_only: Option<String>,
}

// ---- Desugaring ----

/// Aggregate anchoring over alternation branches.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Anchoring {
    All,
    None_,
    Mixed,
}

impl Anchoring {
    fn combine(self, other: Anchoring) -> Anchoring {
        if self == other {
            self
        } else {
            Anchoring::Mixed
        }
    }
}

/// Erase edge anchors and apply the match mode.
///
/// Full mode: edge anchors are no-ops, interior anchors make the pattern
/// non-regular here. Partial mode: sides without an anchor are wrapped
/// with an any-char star; mixed per-branch anchoring is refused.
pub fn desugar(root: &Node, flags: Flags, mode: MatchMode) -> Result<Node, Error> {
    let body = match root {
        Node::Regex(r) => &*r.body,
        other => other,
    };

    if flags.multiline && has_line_anchor(body) {
        return Err(Error::Complexity {
            reason: "multiline anchors are not supported".to_string(),
            span: Some(body.span()),
        });
    }

    let (stripped, start, end) = strip_edges(body, true, true)?;
    if mode == MatchMode::Partial && (start == Anchoring::Mixed || end == Anchoring::Mixed) {
        return Err(Error::Complexity {
            reason: "mixed per-branch anchoring is not supported in partial mode".to_string(),
            span: Some(body.span()),
        });
    }

    let node = match mode {
        MatchMode::Full => stripped,
        MatchMode::Partial => {
            let mut parts = Vec::new();
            if start != Anchoring::All {
                parts.push(any_star(stripped.span()));
            }
            parts.push(stripped);
            if end != Anchoring::All {
                parts.push(any_star(Span::default()));
            }
            if parts.len() == 1 {
                parts.pop().expect("one part")
            } else {
                let span = parts
                    .iter()
                    .map(|p| p.span())
                    .reduce(|a, b| a.cover(b))
                    .unwrap_or_default();
                Node::Sequence(Sequence { parts, span })
            }
        }
    };
    Ok(node)
}

fn has_line_anchor(node: &Node) -> bool {
    let mut found = false;
    node.walk(&mut |n| {
        if let Node::Anchor(a) = n {
            if matches!(a.kind, AnchorKind::Start | AnchorKind::End) {
                found = true;
            }
        }
    });
    found
}

/// `(?s:.)*` as a tree: an unbounded quantifier over the full class.
fn any_star(span: Span) -> Node {
    Node::Quantifier(Quantifier {
        child: Box::new(Node::CharClass(CharClass {
            negated: true,
            items: Vec::new(),
            span,
        })),
        min: 0,
        max: None,
        greediness: Greediness::Greedy,
        span,
    })
}

fn is_start_anchor(kind: AnchorKind) -> bool {
    matches!(
        kind,
        AnchorKind::Start | AnchorKind::StartOfString | AnchorKind::MatchStart
    )
}

fn is_end_anchor(kind: AnchorKind) -> bool {
    matches!(
        kind,
        AnchorKind::End | AnchorKind::EndOfString | AnchorKind::EndBeforeNewline
    )
}

/// Replace anchors in edge position with ε and report what was seen;
/// anchors anywhere else are refused.
fn strip_edges(
    node: &Node,
    at_start: bool,
    at_end: bool,
) -> Result<(Node, Anchoring, Anchoring), Error> {
    match node {
        Node::Anchor(a) if is_start_anchor(a.kind) => {
            if at_start {
                Ok((Node::empty(a.span), Anchoring::All, Anchoring::None_))
            } else {
                Err(interior(a.span))
            }
        }
        Node::Anchor(a) if is_end_anchor(a.kind) => {
            if at_end {
                Ok((Node::empty(a.span), Anchoring::None_, Anchoring::All))
            } else {
                Err(interior(a.span))
            }
        }
        Node::Alternation(alt) => {
            let mut branches = Vec::with_capacity(alt.branches.len());
            let mut start: Option<Anchoring> = None;
            let mut end: Option<Anchoring> = None;
            for b in &alt.branches {
                let (stripped, s, e) = strip_edges(b, at_start, at_end)?;
                start = Some(start.map(|a| a.combine(s)).unwrap_or(s));
                end = Some(end.map(|a| a.combine(e)).unwrap_or(e));
                branches.push(stripped);
            }
            Ok((
                Node::Alternation(Alternation {
                    branches,
                    span: alt.span,
                }),
                start.unwrap_or(Anchoring::None_),
                end.unwrap_or(Anchoring::None_),
            ))
        }
        Node::Sequence(seq) => {
            let n = seq.parts.len();
            // A part sits at the start edge while everything before it is
            // certainly zero-width, and at the end edge while everything
            // after it is.
            let mut prefix_wide = vec![false; n];
            let mut wide = false;
            for (i, p) in seq.parts.iter().enumerate() {
                prefix_wide[i] = wide;
                wide = wide || can_consume(p);
            }
            let mut suffix_wide = vec![false; n];
            let mut wide = false;
            for (i, p) in seq.parts.iter().enumerate().rev() {
                suffix_wide[i] = wide;
                wide = wide || can_consume(p);
            }

            let mut parts = Vec::with_capacity(n);
            let mut reports = Vec::with_capacity(n);
            for (i, p) in seq.parts.iter().enumerate() {
                let (stripped, s, e) =
                    strip_edges(p, at_start && !prefix_wide[i], at_end && !suffix_wide[i])?;
                reports.push((s, e));
                parts.push(stripped);
            }

            // The leftmost decisive edge part fixes the start anchoring;
            // symmetrically the rightmost fixes the end.
            let mut start = Anchoring::None_;
            for (i, (s, _)) in reports.iter().enumerate() {
                if prefix_wide[i] {
                    break;
                }
                if *s != Anchoring::None_ {
                    start = *s;
                    break;
                }
            }
            let mut end = Anchoring::None_;
            for (i, (_, e)) in reports.iter().enumerate().rev() {
                if suffix_wide[i] {
                    break;
                }
                if *e != Anchoring::None_ {
                    end = *e;
                    break;
                }
            }

            Ok((
                Node::Sequence(Sequence {
                    parts,
                    span: seq.span,
                }),
                start,
                end,
            ))
        }
        Node::Group(g)
            if matches!(
                g.kind,
                GroupKind::Capturing
                    | GroupKind::NonCapturing
                    | GroupKind::Named
                    | GroupKind::BranchReset
                    | GroupKind::InlineFlags
            ) =>
        {
            let (body, s, e) = strip_edges(&g.body, at_start, at_end)?;
            Ok((
                Node::Group(Group {
                    kind: g.kind,
                    name: g.name.clone(),
                    number: g.number,
                    flags_on: g.flags_on,
                    flags_off: g.flags_off,
                    body: Box::new(body),
                    span: g.span,
                }),
                s,
                e,
            ))
        }
        // Lookaround bodies are erased by the NFA builder (only the
        // trivial subset reaches it); anchors inside them never surface.
        Node::Group(g) if g.kind.is_lookaround() => {
            Ok((node.clone(), Anchoring::None_, Anchoring::None_))
        }
        Node::Anchor(a) => Err(interior(a.span)),
        other => {
            // No anchors below: leave the subtree alone, but refuse any
            // that hide inside.
            let mut hidden = None;
            other.walk(&mut |n| {
                if hidden.is_none() {
                    if let Node::Anchor(an) = n {
                        hidden = Some(an.span);
                    }
                }
            });
            match hidden {
                Some(span) => Err(interior(span)),
                None => Ok((other.clone(), Anchoring::None_, Anchoring::None_)),
            }
        }
    }
}

/// A part that may consume characters pushes later parts off the edge.
fn can_consume(node: &Node) -> bool {
    crate::core::analysis::max_len(node) != Some(0)
}

fn interior(span: Span) -> Error {
    Error::Complexity {
        reason: "anchor in interior position is not supported".to_string(),
        span: Some(span),
    }
}

// ---- Compilation ----

/// Budget handed down from the facade configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompileBudget {
    pub dfa_state_limit: usize,
    pub alphabet_limit: usize,
}

/// Gate, desugar and translate a parsed pattern to an NFA.
pub fn compile_nfa(
    root: &Node,
    flags: Flags,
    mode: MatchMode,
    regularity: &RegularityOptions,
) -> Result<Nfa, Error> {
    ensure_regular(root, regularity)?;
    let desugared = desugar(root, flags, mode)?;
    nfa::build(&desugared, flags)
}

/// Determinize (and optionally minimize) an NFA over a shared partition.
pub fn compile_dfa(
    nfa: &Nfa,
    alphabet: &Alphabet,
    budget: &CompileBudget,
    options: &SolverOptions,
    deadline: Option<Instant>,
) -> Result<Dfa, Error> {
    let dfa = dfa::build(
        nfa,
        alphabet,
        &DfaBudget {
            state_limit: budget.dfa_state_limit,
            deadline,
        },
    )?;
    if options.minimize_dfa {
        minimize(&dfa, options.minimization_algorithm, deadline)
    } else {
        Ok(dfa)
    }
}

/// Compile both sides over a common partition.
pub fn compile_pair(
    left: (&Node, Flags),
    right: (&Node, Flags),
    budget: &CompileBudget,
    options: &SolverOptions,
) -> Result<(Dfa, Dfa), Error> {
    let deadline = options.deadline();
    let regularity = RegularityOptions {
        allow_trivial_lookaround: options.allow_trivial_lookaround,
        ..Default::default()
    };
    let a = compile_nfa(left.0, left.1, options.match_mode, &regularity)?;
    let b = compile_nfa(right.0, right.1, options.match_mode, &regularity)?;
    let alphabet = Alphabet::from_nfas([&a, &b].into_iter(), budget.alphabet_limit)?;
    let da = compile_dfa(&a, &alphabet, budget, options, deadline)?;
    let db = compile_dfa(&b, &alphabet, budget, options, deadline)?;
    Ok((da, db))
}

// ---- Product walks ----

/// Is L(a) ∩ L(b) empty? Returns a minimal witness when it is not.
pub fn intersection_empty(
    a: &Dfa,
    b: &Dfa,
    deadline: Option<Instant>,
) -> Result<SolverOutcome, Error> {
    let witness = product_search(a, b, |sa, sb| a.accepting[sa] && b.accepting[sb], deadline)?;
    Ok(SolverOutcome {
        holds: witness.is_none(),
        witness,
    })
}

/// Is L(a) ⊆ L(b)? Returns a minimal counterexample when it is not.
pub fn subset_of(a: &Dfa, b: &Dfa, deadline: Option<Instant>) -> Result<SolverOutcome, Error> {
    let witness = product_search(a, b, |sa, sb| a.accepting[sa] && !b.accepting[sb], deadline)?;
    Ok(SolverOutcome {
        holds: witness.is_none(),
        witness,
    })
}

/// Two subset checks in opposite directions.
pub fn equivalent(a: &Dfa, b: &Dfa, deadline: Option<Instant>) -> Result<EquivalenceOutcome, Error> {
    let left = subset_of(a, b, deadline)?;
    let right = subset_of(b, a, deadline)?;
    Ok(EquivalenceOutcome {
        equivalent: left.holds && right.holds,
        left_only: left.witness,
        right_only: right.witness,
    })
}

/// BFS over the product automaton for a state satisfying `goal`.
///
/// Both DFAs share the same partition (built by [`compile_pair`]), so
/// successor expansion walks one class list. FIFO order plus in-order
/// class expansion makes the found witness shortest, with the smallest
/// representative codepoint chosen on every edge.
fn product_search(
    a: &Dfa,
    b: &Dfa,
    goal: impl Fn(usize, usize) -> bool,
    deadline: Option<Instant>,
) -> Result<Option<String>, Error> {
    debug_assert_eq!(a.classes, b.classes, "product over differing partitions");

    let mut parent: HashMap<(usize, usize), ((usize, usize), u32)> = HashMap::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    let start = (a.start, b.start);
    parent.insert(start, (start, 0));
    queue.push_back(start);

    let mut checked = 0usize;
    while let Some((sa, sb)) = queue.pop_front() {
        checked += 1;
        if checked % 256 == 0 {
            if let Some(d) = deadline {
                if Instant::now() > d {
                    return Err(Error::DeadlineExceeded {
                        phase: "product search".to_string(),
                    });
                }
            }
        }

        if goal(sa, sb) {
            return Ok(Some(reconstruct(&parent, start, (sa, sb))));
        }

        for (class, range) in a.classes.iter().enumerate() {
            let next = (a.next(sa, class), b.next(sb, class));
            if let std::collections::hash_map::Entry::Vacant(e) = parent.entry(next) {
                e.insert(((sa, sb), range.start));
                queue.push_back(next);
            }
        }
    }

    debug!(states_checked = checked, "product search exhausted");
    Ok(None)
}

fn reconstruct(
    parent: &HashMap<(usize, usize), ((usize, usize), u32)>,
    start: (usize, usize),
    goal: (usize, usize),
) -> String {
    let mut chars: Vec<char> = Vec::new();
    let mut current = goal;
    while current != start {
        let (prev, cp) = parent[&current];
        chars.push(char::from_u32(cp).unwrap_or('\u{FFFD}'));
        current = prev;
    }
    chars.reverse();
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn compile_two(a: &str, b: &str, options: &SolverOptions) -> (Dfa, Dfa) {
        let budget = CompileBudget {
            dfa_state_limit: 10_000,
            alphabet_limit: 2_000,
        };
        let pa = split(a, TargetVersion::default()).unwrap();
        let pb = split(b, TargetVersion::default()).unwrap();
        let oa = parse(&pa, 1024).unwrap();
        let ob = parse(&pb, 1024).unwrap();
        compile_pair(
            (&oa.root, pa.flags),
            (&ob.root, pb.flags),
            &budget,
            options,
        )
        .unwrap()
    }

    fn opts() -> SolverOptions {
        SolverOptions::default()
    }

    #[test]
    fn test_disjoint_languages() {
        let (a, b) = compile_two("/^[0-9]+$/", "/^[a-z]+$/", &opts());
        let r = intersection_empty(&a, &b, None).unwrap();
        assert!(r.holds);
        assert!(r.witness.is_none());
    }

    #[test]
    fn test_overlapping_languages_yield_witness() {
        let (a, b) = compile_two("/^[0-9a-f]+$/", "/^[a-z]+$/", &opts());
        let r = intersection_empty(&a, &b, None).unwrap();
        assert!(!r.holds);
        let w = r.witness.unwrap();
        assert!(a.accepts(&w), "witness accepted by left");
        assert!(b.accepts(&w), "witness accepted by right");
        // Shortest witness over [a-f] is the single smallest letter
        assert_eq!(w, "a");
    }

    #[test]
    fn test_subset() {
        let (a, b) = compile_two("/^a+$/", "/^[a-c]+$/", &opts());
        assert!(subset_of(&a, &b, None).unwrap().holds);
        let r = subset_of(&b, &a, None).unwrap();
        assert!(!r.holds);
        let w = r.witness.unwrap();
        assert!(b.accepts(&w) && !a.accepts(&w));
    }

    #[test]
    fn test_subset_reflexive() {
        let (a, _) = compile_two("/^(x|y)+z$/", "/x/", &opts());
        let r = subset_of(&a, &a, None).unwrap();
        assert!(r.holds);
        assert!(r.witness.is_none());
    }

    #[test]
    fn test_equivalence() {
        let (a, b) = compile_two("/^a+$/", "/^aa*$/", &opts());
        let r = equivalent(&a, &b, None).unwrap();
        assert!(r.equivalent);

        let (a, b) = compile_two("/^a+$/", "/^a*$/", &opts());
        let r = equivalent(&a, &b, None).unwrap();
        assert!(!r.equivalent);
        // a* accepts the empty string, a+ does not
        assert_eq!(r.right_only.as_deref(), Some(""));
        assert!(r.left_only.is_none());
    }

    #[test]
    fn test_witnesses_are_deterministic() {
        for _ in 0..3 {
            let (a, b) = compile_two("/^[b-z]+$/", "/^[a-y]+$/", &opts());
            let r = intersection_empty(&a, &b, None).unwrap();
            assert_eq!(r.witness.as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_partial_mode_wraps() {
        let mut options = opts();
        options.match_mode = MatchMode::Partial;
        // "abc" as a substring pattern intersects "xabcx" style strings;
        // compare against a full-anchored sibling
        let (a, b) = compile_two("/abc/", "/^zabcz$/", &options);
        let r = intersection_empty(&a, &b, None).unwrap();
        assert!(!r.holds);
        assert_eq!(r.witness.as_deref(), Some("zabcz"));
    }

    #[test]
    fn test_full_mode_edge_anchors_are_noops() {
        let (a, b) = compile_two("/^abc$/", "/abc/", &opts());
        assert!(equivalent(&a, &b, None).unwrap().equivalent);
    }

    #[test]
    fn test_empty_pattern_subset() {
        let (a, b) = compile_two("//", "/a*/", &opts());
        let r = subset_of(&a, &b, None).unwrap();
        assert!(r.holds);
    }

    #[test]
    fn test_interior_anchor_refused() {
        let budget = CompileBudget {
            dfa_state_limit: 10_000,
            alphabet_limit: 2_000,
        };
        let p = split("/a$b/", TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        let err = compile_pair(
            (&out.root, p.flags),
            (&out.root, p.flags),
            &budget,
            &opts(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Complexity { .. }));
    }

    #[test]
    fn test_non_regular_refused() {
        let budget = CompileBudget {
            dfa_state_limit: 10_000,
            alphabet_limit: 2_000,
        };
        let p = split(r"/(a)\1/", TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        let err = compile_pair(
            (&out.root, p.flags),
            (&out.root, p.flags),
            &budget,
            &opts(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Complexity { .. }));
    }
}
