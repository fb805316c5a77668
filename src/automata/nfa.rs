//! Thompson construction: AST → NFA with ε-transitions.
//!
//! States are integer indices into a single arena; transitions are a flat
//! `(from, label, to)` array where the label is either ε or a codepoint
//! interval set. Every fragment has exactly one start and one accept
//! state, and composition glues fragments with ε-transitions.
//!
//! Greediness is irrelevant to the recognized language and is erased here.
//! Anchors never reach this layer: the solver erases edge anchors and the
//! regular-subset gate refuses the rest.

use crate::automata::symbol::{char_type_set, class_set, dot_set, newline_set, CharSet};
use crate::core::errors::Error;
use crate::core::nodes::*;
use crate::core::pattern::Flags;
use serde::{Deserialize, Serialize};

pub type StateId = usize;

/// A single NFA transition; `on: None` is an ε-transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: StateId,
    pub on: Option<CharSet>,
    pub to: StateId,
}

/// An ε-NFA with a single start and a single accept state.
///
/// Serializable so the cache can memoize construction outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nfa {
    pub state_count: usize,
    pub start: StateId,
    pub accept: StateId,
    pub transitions: Vec<Transition>,
}

impl Nfa {
    /// All non-ε label sets, for alphabet partitioning.
    pub fn symbol_sets(&self) -> impl Iterator<Item = &CharSet> {
        self.transitions.iter().filter_map(|t| t.on.as_ref())
    }
}

/// Build the NFA for a gated, anchor-free AST.
pub fn build(node: &Node, flags: Flags) -> Result<Nfa, Error> {
    let mut b = Builder::default();
    let (start, accept) = b.fragment(node, flags)?;
    Ok(Nfa {
        state_count: b.state_count,
        start,
        accept,
        transitions: b.transitions,
    })
}

#[derive(Default)]
struct Builder {
    state_count: usize,
    transitions: Vec<Transition>,
}

impl Builder {
    fn add_state(&mut self) -> StateId {
        let id = self.state_count;
        self.state_count += 1;
        id
    }

    fn eps(&mut self, from: StateId, to: StateId) {
        self.transitions.push(Transition { from, on: None, to });
    }

    fn sym(&mut self, from: StateId, set: CharSet, to: StateId) {
        self.transitions.push(Transition {
            from,
            on: Some(set),
            to,
        });
    }

    fn unsupported(&self, node: &Node, what: &str) -> Error {
        Error::Complexity {
            reason: format!("{} cannot be translated to an automaton", what),
            span: Some(node.span()),
        }
    }

    /// Single-set fragment: s -set-> f.
    fn one_transition(&mut self, set: CharSet) -> (StateId, StateId) {
        let s = self.add_state();
        let f = self.add_state();
        self.sym(s, set, f);
        (s, f)
    }

    /// Empty fragment accepting ε.
    fn zero(&mut self) -> (StateId, StateId) {
        let s = self.add_state();
        (s, s)
    }

    fn fold_case(set: CharSet, flags: Flags) -> CharSet {
        if flags.ignore_case {
            set.case_fold_ascii()
        } else {
            set
        }
    }

    fn fragment(&mut self, node: &Node, flags: Flags) -> Result<(StateId, StateId), Error> {
        match node {
            Node::Regex(r) => self.fragment(&r.body, r.flags),
            Node::Literal(l) => {
                let mut s = self.add_state();
                let start = s;
                for c in l.value.chars() {
                    let f = self.add_state();
                    let set = Self::fold_case(CharSet::single(c), flags);
                    self.sym(s, set, f);
                    s = f;
                }
                Ok((start, s))
            }
            Node::CharLiteral(c) => {
                let set = Self::fold_case(CharSet::single(c.codepoint), flags);
                Ok(self.one_transition(set))
            }
            Node::Dot(_) => Ok(self.one_transition(dot_set(flags.dot_all))),
            Node::CharType(t) if t.letter == 'R' => {
                // \R is the newline class plus the two-character \r\n pair
                let s = self.add_state();
                let f = self.add_state();
                self.sym(s, newline_set(), f);
                let mid = self.add_state();
                self.sym(s, CharSet::single('\r'), mid);
                self.sym(mid, CharSet::single('\n'), f);
                Ok((s, f))
            }
            Node::CharType(t) => {
                let set = char_type_set(t.letter)
                    .ok_or_else(|| self.unsupported(node, "character type"))?;
                Ok(self.one_transition(Self::fold_case(set, flags)))
            }
            Node::CharClass(cc) => {
                let set = class_set(cc).ok_or_else(|| self.unsupported(node, "class contents"))?;
                Ok(self.one_transition(Self::fold_case(set, flags)))
            }
            Node::Sequence(seq) => {
                let mut frag = self.zero();
                for part in &seq.parts {
                    let next = self.fragment(part, flags)?;
                    self.eps(frag.1, next.0);
                    frag = (frag.0, next.1);
                }
                Ok(frag)
            }
            Node::Alternation(alt) => {
                let s = self.add_state();
                let f = self.add_state();
                for branch in &alt.branches {
                    let (bs, bf) = self.fragment(branch, flags)?;
                    self.eps(s, bs);
                    self.eps(bf, f);
                }
                Ok((s, f))
            }
            Node::Quantifier(q) => self.quantified(q, flags),
            Node::Group(g) => {
                let inner_flags = match (&g.flags_on, &g.flags_off) {
                    (Some(on), Some(off)) => flags.apply_inline(on, off),
                    _ => flags,
                };
                match g.kind {
                    GroupKind::Capturing
                    | GroupKind::NonCapturing
                    | GroupKind::Named
                    | GroupKind::BranchReset
                    | GroupKind::InlineFlags => self.fragment(&g.body, inner_flags),
                    // Admitted only via the trivial-lookaround opt-in: a
                    // positive assertion with a nullable body always holds
                    // (ε); its negative dual never does (dead fragment).
                    GroupKind::LookaheadPos | GroupKind::LookbehindPos => Ok(self.zero()),
                    GroupKind::LookaheadNeg | GroupKind::LookbehindNeg => {
                        let s = self.add_state();
                        let f = self.add_state();
                        Ok((s, f))
                    }
                    _ => Err(self.unsupported(node, "group variant")),
                }
            }
            Node::Anchor(_) => Err(self.unsupported(node, "interior anchor")),
            Node::Backreference(_) => Err(self.unsupported(node, "backreference")),
            Node::Subroutine(_) => Err(self.unsupported(node, "subroutine call")),
            Node::Conditional(_) => Err(self.unsupported(node, "conditional group")),
            Node::Define(_) => Err(self.unsupported(node, "definition group")),
            Node::Error(_) => Err(self.unsupported(node, "unparsable span")),
        }
    }

    /// `A{m,n}`: m chained copies, then n−m optional copies, or a star
    /// tail when unbounded.
    fn quantified(&mut self, q: &Quantifier, flags: Flags) -> Result<(StateId, StateId), Error> {
        let mut frag = self.zero();

        for _ in 0..q.min {
            let copy = self.fragment(&q.child, flags)?;
            self.eps(frag.1, copy.0);
            frag = (frag.0, copy.1);
        }

        match q.max {
            None => {
                // A* tail: s →ε→ inner, s →ε→ f, inner.accept →ε→ inner.start,
                // inner.accept →ε→ f
                let s = self.add_state();
                let f = self.add_state();
                let (is, ia) = self.fragment(&q.child, flags)?;
                self.eps(s, is);
                self.eps(s, f);
                self.eps(ia, is);
                self.eps(ia, f);
                self.eps(frag.1, s);
                Ok((frag.0, f))
            }
            Some(max) => {
                let f = self.add_state();
                self.eps(frag.1, f);
                let mut tail = frag.1;
                for _ in q.min..max {
                    let copy = self.fragment(&q.child, flags)?;
                    self.eps(tail, copy.0);
                    self.eps(copy.1, f);
                    tail = copy.1;
                }
                Ok((frag.0, f))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;
    use std::collections::HashSet;

    fn nfa_for(body: &str) -> Nfa {
        nfa_with_flags(body, "")
    }

    fn nfa_with_flags(body: &str, flags: &str) -> Nfa {
        let p = split(&format!("/{}/{}", body, flags), TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        build(&out.root, p.flags).unwrap()
    }

    /// Naive ε-closure simulation for the tests.
    fn accepts(nfa: &Nfa, input: &str) -> bool {
        let mut current: HashSet<StateId> = HashSet::new();
        current.insert(nfa.start);
        close(nfa, &mut current);
        for c in input.chars() {
            let mut next = HashSet::new();
            for t in &nfa.transitions {
                if current.contains(&t.from) {
                    if let Some(set) = &t.on {
                        if set.contains(c as u32) {
                            next.insert(t.to);
                        }
                    }
                }
            }
            close(nfa, &mut next);
            current = next;
        }
        current.contains(&nfa.accept)
    }

    fn close(nfa: &Nfa, states: &mut HashSet<StateId>) {
        loop {
            let mut added = Vec::new();
            for t in &nfa.transitions {
                if t.on.is_none() && states.contains(&t.from) && !states.contains(&t.to) {
                    added.push(t.to);
                }
            }
            if added.is_empty() {
                break;
            }
            states.extend(added);
        }
    }

    #[test]
    fn test_literal_chain() {
        let nfa = nfa_for("abc");
        assert!(accepts(&nfa, "abc"));
        assert!(!accepts(&nfa, "ab"));
        assert!(!accepts(&nfa, "abcd"));
    }

    #[test]
    fn test_alternation() {
        let nfa = nfa_for("foo|bar");
        assert!(accepts(&nfa, "foo"));
        assert!(accepts(&nfa, "bar"));
        assert!(!accepts(&nfa, "baz"));
    }

    #[test]
    fn test_star_and_plus() {
        let star = nfa_for("a*");
        assert!(accepts(&star, ""));
        assert!(accepts(&star, "aaaa"));

        let plus = nfa_for("a+");
        assert!(!accepts(&plus, ""));
        assert!(accepts(&plus, "a"));
        assert!(accepts(&plus, "aaa"));
    }

    #[test]
    fn test_bounded_repeat_unrolls() {
        let nfa = nfa_for("a{2,4}");
        assert!(!accepts(&nfa, "a"));
        assert!(accepts(&nfa, "aa"));
        assert!(accepts(&nfa, "aaaa"));
        assert!(!accepts(&nfa, "aaaaa"));
    }

    #[test]
    fn test_class_and_dot() {
        let nfa = nfa_for("[a-c].");
        assert!(accepts(&nfa, "bx"));
        assert!(!accepts(&nfa, "dx"));
        assert!(!accepts(&nfa, "b\n"));
    }

    #[test]
    fn test_dotall_flag() {
        let nfa = nfa_with_flags("a.", "s");
        assert!(accepts(&nfa, "a\n"));
    }

    #[test]
    fn test_case_insensitive_flag() {
        let nfa = nfa_with_flags("ab", "i");
        assert!(accepts(&nfa, "AB"));
        assert!(accepts(&nfa, "aB"));
        assert!(!accepts(&nfa, "ac"));
    }

    #[test]
    fn test_newline_sequence() {
        let nfa = nfa_for(r"\R");
        assert!(accepts(&nfa, "\n"));
        assert!(accepts(&nfa, "\r"));
        assert!(accepts(&nfa, "\r\n"));
        assert!(!accepts(&nfa, "ab"));
    }

    #[test]
    fn test_groups_are_transparent() {
        let nfa = nfa_for("(?:a|b)(c)");
        assert!(accepts(&nfa, "ac"));
        assert!(accepts(&nfa, "bc"));
        assert!(!accepts(&nfa, "c"));
    }

    #[test]
    fn test_greediness_is_erased() {
        let greedy = nfa_for("a+");
        let lazy = nfa_for("a+?");
        for input in ["", "a", "aa", "aaa"] {
            assert_eq!(accepts(&greedy, input), accepts(&lazy, input));
        }
    }

    #[test]
    fn test_interior_anchor_is_refused() {
        let p = split("/a^b/", TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        let err = build(&out.root, p.flags).unwrap_err();
        assert!(matches!(err, Error::Complexity { .. }));
    }
}
