//! Static analysis helpers over the AST.
//!
//! Shared by the validator (length bounds for lookbehind), the optimizer
//! (first/last sets for safe possessivization) and the ReDoS analyzer
//! (overlap tests). Character sets are over-approximated where the exact
//! set has no interval denotation (properties, backreferences), which errs
//! on the side of reporting overlap.

use crate::automata::symbol::{char_type_set, class_set, dot_set, newline_set, CharSet};
use crate::core::nodes::*;

/// True when the node can match the empty string.
pub fn is_nullable(node: &Node) -> bool {
    match node {
        Node::Regex(r) => is_nullable(&r.body),
        Node::Alternation(a) => a.branches.iter().any(is_nullable),
        Node::Sequence(s) => s.parts.iter().all(is_nullable),
        Node::Literal(l) => l.value.is_empty(),
        Node::CharLiteral(_) | Node::Dot(_) | Node::CharClass(_) | Node::CharType(_) => false,
        Node::Anchor(_) | Node::Define(_) | Node::Error(_) => true,
        Node::Quantifier(q) => q.min == 0 || is_nullable(&q.child),
        Node::Group(g) => g.kind.is_lookaround() || is_nullable(&g.body),
        Node::Conditional(c) => {
            is_nullable(&c.then_branch)
                || c.else_branch.as_deref().map(is_nullable).unwrap_or(true)
        }
        // A backreference matches empty when its group did
        Node::Backreference(_) => true,
        Node::Subroutine(_) => false,
    }
}

/// Minimum number of characters the node consumes.
pub fn min_len(node: &Node) -> u64 {
    match node {
        Node::Regex(r) => min_len(&r.body),
        Node::Alternation(a) => a.branches.iter().map(min_len).min().unwrap_or(0),
        Node::Sequence(s) => s.parts.iter().map(min_len).sum(),
        Node::Literal(l) => l.value.chars().count() as u64,
        Node::CharLiteral(_) | Node::Dot(_) | Node::CharClass(_) | Node::CharType(_) => 1,
        Node::Anchor(_) | Node::Define(_) | Node::Error(_) | Node::Backreference(_) => 0,
        Node::Quantifier(q) => q.min as u64 * min_len(&q.child),
        Node::Group(g) => {
            if g.kind.is_lookaround() {
                0
            } else {
                min_len(&g.body)
            }
        }
        Node::Conditional(c) => {
            let t = min_len(&c.then_branch);
            let e = c.else_branch.as_deref().map(min_len).unwrap_or(0);
            t.min(e)
        }
        Node::Subroutine(_) => 1,
    }
}

/// Maximum number of characters the node consumes; `None` means unbounded.
pub fn max_len(node: &Node) -> Option<u64> {
    match node {
        Node::Regex(r) => max_len(&r.body),
        Node::Alternation(a) => {
            let mut best = 0;
            for b in &a.branches {
                best = best.max(max_len(b)?);
            }
            Some(best)
        }
        Node::Sequence(s) => {
            let mut total: u64 = 0;
            for p in &s.parts {
                total = total.checked_add(max_len(p)?)?;
            }
            Some(total)
        }
        Node::Literal(l) => Some(l.value.chars().count() as u64),
        Node::CharLiteral(_) | Node::Dot(_) | Node::CharClass(_) | Node::CharType(_) => Some(1),
        Node::Anchor(_) | Node::Define(_) | Node::Error(_) => Some(0),
        Node::Quantifier(q) => {
            let child = max_len(&q.child)?;
            match q.max {
                Some(m) => child.checked_mul(m as u64),
                None => {
                    if child == 0 {
                        Some(0)
                    } else {
                        None
                    }
                }
            }
        }
        Node::Group(g) => {
            if g.kind.is_lookaround() {
                Some(0)
            } else {
                max_len(&g.body)
            }
        }
        Node::Conditional(c) => {
            let t = max_len(&c.then_branch)?;
            let e = c.else_branch.as_deref().map(max_len).unwrap_or(Some(0))?;
            Some(t.max(e))
        }
        // References repeat the captured text; subroutines may recurse
        Node::Backreference(_) | Node::Subroutine(_) => None,
    }
}

/// Over-approximate set of characters that can start a match of the node.
pub fn first_set(node: &Node) -> CharSet {
    match node {
        Node::Regex(r) => first_set(&r.body),
        Node::Alternation(a) => a
            .branches
            .iter()
            .fold(CharSet::empty(), |acc, b| acc.union(&first_set(b))),
        Node::Sequence(s) => {
            let mut acc = CharSet::empty();
            for p in &s.parts {
                acc = acc.union(&first_set(p));
                if !is_nullable(p) {
                    break;
                }
            }
            acc
        }
        Node::Literal(l) => match l.value.chars().next() {
            Some(c) => CharSet::single(c),
            None => CharSet::empty(),
        },
        Node::CharLiteral(c) => CharSet::single(c.codepoint),
        Node::Dot(_) => dot_set(false),
        Node::CharClass(cc) => class_set(cc).unwrap_or_else(CharSet::full),
        Node::CharType(t) => type_set(t.letter),
        Node::Anchor(_) | Node::Define(_) | Node::Error(_) => CharSet::empty(),
        Node::Quantifier(q) => first_set(&q.child),
        Node::Group(g) => {
            if g.kind.is_lookaround() {
                CharSet::empty()
            } else {
                first_set(&g.body)
            }
        }
        Node::Conditional(c) => {
            let t = first_set(&c.then_branch);
            match &c.else_branch {
                Some(e) => t.union(&first_set(e)),
                None => t,
            }
        }
        Node::Backreference(_) | Node::Subroutine(_) => CharSet::full(),
    }
}

/// Over-approximate set of characters that can end a match of the node.
pub fn last_set(node: &Node) -> CharSet {
    match node {
        Node::Regex(r) => last_set(&r.body),
        Node::Alternation(a) => a
            .branches
            .iter()
            .fold(CharSet::empty(), |acc, b| acc.union(&last_set(b))),
        Node::Sequence(s) => {
            let mut acc = CharSet::empty();
            for p in s.parts.iter().rev() {
                acc = acc.union(&last_set(p));
                if !is_nullable(p) {
                    break;
                }
            }
            acc
        }
        Node::Literal(l) => match l.value.chars().last() {
            Some(c) => CharSet::single(c),
            None => CharSet::empty(),
        },
        Node::Quantifier(q) => last_set(&q.child),
        Node::Group(g) => {
            if g.kind.is_lookaround() {
                CharSet::empty()
            } else {
                last_set(&g.body)
            }
        }
        Node::Conditional(c) => {
            let t = last_set(&c.then_branch);
            match &c.else_branch {
                Some(e) => t.union(&last_set(e)),
                None => t,
            }
        }
        other => first_set(other),
    }
}

fn type_set(letter: char) -> CharSet {
    match letter {
        'R' => newline_set(),
        other => char_type_set(other).unwrap_or_else(CharSet::full),
    }
}

/// Structural complexity score used in validation results.
///
/// Counts nodes, weights repetition, and penalizes nested quantifiers,
/// which dominate both matching cost and analysis cost.
pub fn complexity_score(node: &Node) -> u32 {
    fn walk(node: &Node, quant_depth: u32, score: &mut u32) {
        let weight = match node {
            Node::Quantifier(q) => {
                let unbounded = q.max.is_none();
                2 + quant_depth * if unbounded { 5 } else { 2 }
            }
            Node::Alternation(a) => a.branches.len() as u32,
            Node::CharClass(cc) => 1 + cc.items.len() as u32 / 4,
            Node::Backreference(_) | Node::Subroutine(_) => 3,
            Node::Group(g) if g.kind.is_lookaround() => 3,
            _ => 1,
        };
        *score = score.saturating_add(weight);
        let next_depth = if matches!(node, Node::Quantifier(_)) {
            quant_depth + 1
        } else {
            quant_depth
        };
        node.for_each_child(&mut |c| walk(c, next_depth, score));
    }
    let mut score = 0;
    walk(node, 0, &mut score);
    score
}
