//! Bounded literal prefix/suffix extraction.
//!
//! Derives the sets of literal strings a pattern can start and end with,
//! bounded by count and length limits. Collaborators use these for
//! prefiltering; the `complete` flag records whether the prefix set
//! enumerates the language exactly.

use crate::core::nodes::*;
use crate::automata::symbol::{char_type_set, class_set, dot_set};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Limits for literal extraction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiteralOptions {
    /// Maximum number of distinct literals tracked
    #[serde(rename = "maxCount")]
    pub max_count: usize,
    /// Maximum length of each literal in characters
    #[serde(rename = "maxLength")]
    pub max_length: usize,
}

impl Default for LiteralOptions {
    fn default() -> Self {
        LiteralOptions {
            max_count: 64,
            max_length: 16,
        }
    }
}

/// Bounded prefix/suffix sample of a pattern's language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralSet {
    pub prefixes: BTreeSet<String>,
    pub suffixes: BTreeSet<String>,
    /// True when `prefixes` contains exactly the complete match strings
    pub complete: bool,
}

/// Extract the literal set of a parsed pattern.
pub fn literals(root: &Node, options: LiteralOptions) -> LiteralSet {
    let (prefixes, prefix_exact) = extract(root, Direction::Forward, &options);
    let (suffixes, _) = extract(root, Direction::Backward, &options);
    LiteralSet {
        prefixes: prefixes.into_iter().collect(),
        suffixes: suffixes
            .into_iter()
            .map(|s| s.chars().rev().collect())
            .collect(),
        complete: prefix_exact,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Forward,
    /// Strings are built reversed and flipped at the end
    Backward,
}

/// Returns literal strings (in traversal direction) plus whether they are
/// exact complete matches rather than truncated prefixes.
fn extract(node: &Node, dir: Direction, opts: &LiteralOptions) -> (Vec<String>, bool) {
    match node {
        Node::Regex(r) => extract(&r.body, dir, opts),
        Node::Literal(l) => {
            let value: String = match dir {
                Direction::Forward => l.value.clone(),
                Direction::Backward => l.value.chars().rev().collect(),
            };
            truncate_one(value, opts)
        }
        Node::CharLiteral(c) => truncate_one(c.codepoint.to_string(), opts),
        Node::CharClass(cc) => set_literals(class_set(cc), opts),
        Node::CharType(t) => set_literals(char_type_set(t.letter), opts),
        Node::Dot(_) => set_literals(Some(dot_set(true)), opts),
        Node::Anchor(_) | Node::Define(_) => (vec![String::new()], true),
        Node::Error(_) | Node::Backreference(_) | Node::Subroutine(_) => {
            (vec![String::new()], false)
        }
        Node::Group(g) => {
            if g.kind.is_lookaround() {
                // Zero-width constraint: contributes nothing but makes the
                // sample inexact.
                (vec![String::new()], false)
            } else {
                extract(&g.body, dir, opts)
            }
        }
        Node::Alternation(a) => {
            let mut acc = Vec::new();
            let mut exact = true;
            for b in &a.branches {
                let (mut lits, e) = extract(b, dir, opts);
                exact &= e;
                acc.append(&mut lits);
                if acc.len() > opts.max_count {
                    acc.truncate(opts.max_count);
                    return (acc, false);
                }
            }
            acc.sort();
            acc.dedup();
            (acc, exact)
        }
        Node::Sequence(s) => {
            let mut acc = vec![String::new()];
            let mut exact = true;
            let parts: Vec<&Node> = match dir {
                Direction::Forward => s.parts.iter().collect(),
                Direction::Backward => s.parts.iter().rev().collect(),
            };
            for p in parts {
                if !exact {
                    break;
                }
                let (lits, e) = extract(p, dir, opts);
                let (crossed, ok) = cross(&acc, &lits, opts);
                acc = crossed;
                exact = e && ok;
            }
            (acc, exact)
        }
        Node::Quantifier(q) => {
            let (lits, child_exact) = extract(&q.child, dir, opts);
            let mut acc = vec![String::new()];
            let mut exact = child_exact;
            for _ in 0..q.min {
                let (crossed, ok) = cross(&acc, &lits, opts);
                acc = crossed;
                if !ok {
                    exact = false;
                    break;
                }
            }
            // Optional tail copies are only enumerated for tiny bounds.
            match q.max {
                Some(max) if exact && max > q.min && (max - q.min) <= 2 => {
                    let mut all = acc.clone();
                    let mut tail = acc.clone();
                    for _ in q.min..max {
                        let (crossed, ok) = cross(&tail, &lits, opts);
                        if !ok {
                            return (all, false);
                        }
                        tail = crossed;
                        all.extend(tail.iter().cloned());
                        if all.len() > opts.max_count {
                            all.truncate(opts.max_count);
                            return (all, false);
                        }
                    }
                    all.sort();
                    all.dedup();
                    (all, true)
                }
                Some(max) if max == q.min => (acc, exact),
                _ => (acc, false),
            }
        }
        Node::Conditional(c) => {
            let (mut t, te) = extract(&c.then_branch, dir, opts);
            let (mut e, ee) = match &c.else_branch {
                Some(e) => extract(e, dir, opts),
                None => (vec![String::new()], true),
            };
            t.append(&mut e);
            t.sort();
            t.dedup();
            let exact = te && ee;
            if t.len() > opts.max_count {
                t.truncate(opts.max_count);
                return (t, false);
            }
            (t, exact)
        }
    }
}

fn truncate_one(value: String, opts: &LiteralOptions) -> (Vec<String>, bool) {
    if value.chars().count() > opts.max_length {
        let cut: String = value.chars().take(opts.max_length).collect();
        (vec![cut], false)
    } else {
        (vec![value], true)
    }
}

fn set_literals(
    set: Option<crate::automata::symbol::CharSet>,
    opts: &LiteralOptions,
) -> (Vec<String>, bool) {
    let Some(set) = set else {
        return (vec![String::new()], false);
    };
    if set.len() as usize > opts.max_count || set.is_empty() {
        return (vec![String::new()], false);
    }
    let mut out = Vec::new();
    for r in set.ranges() {
        for cp in r.start..r.end {
            if let Some(c) = char::from_u32(cp) {
                out.push(c.to_string());
            }
        }
    }
    (out, true)
}

/// Cross product of two literal sets, bounded; the bool reports whether the
/// product stayed within bounds (false means results were cut short).
fn cross(left: &[String], right: &[String], opts: &LiteralOptions) -> (Vec<String>, bool) {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            let mut joined = l.clone();
            joined.push_str(r);
            if joined.chars().count() > opts.max_length {
                joined = joined.chars().take(opts.max_length).collect();
                out.push(joined);
                out.sort();
                out.dedup();
                return (out, false);
            }
            out.push(joined);
            if out.len() > opts.max_count {
                out.truncate(opts.max_count);
                return (out, false);
            }
        }
    }
    out.sort();
    out.dedup();
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn lits(body: &str) -> LiteralSet {
        let p = split(&format!("/{}/", body), TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        literals(&out.root, LiteralOptions::default())
    }

    #[test]
    fn test_plain_literal() {
        let l = lits("abc");
        assert!(l.complete);
        assert_eq!(l.prefixes.iter().collect::<Vec<_>>(), vec!["abc"]);
        assert_eq!(l.suffixes.iter().collect::<Vec<_>>(), vec!["abc"]);
    }

    #[test]
    fn test_alternation() {
        let l = lits("foo|bar");
        assert!(l.complete);
        assert_eq!(l.prefixes.len(), 2);
        assert!(l.prefixes.contains("foo"));
        assert!(l.prefixes.contains("bar"));
    }

    #[test]
    fn test_unbounded_quantifier_is_incomplete() {
        let l = lits("ab*");
        assert!(!l.complete);
        assert!(l.prefixes.contains("a"));
    }

    #[test]
    fn test_small_class_enumerates() {
        let l = lits("[ab]c");
        assert!(l.complete);
        assert!(l.prefixes.contains("ac"));
        assert!(l.prefixes.contains("bc"));
    }

    #[test]
    fn test_wide_class_truncates() {
        let l = lits(r"\w+x");
        assert!(!l.complete);
    }

    #[test]
    fn test_suffixes_oriented_correctly() {
        let l = lits("(foo|bar)baz");
        assert!(l.suffixes.contains("foobaz"));
        assert!(l.suffixes.contains("barbaz"));
    }

    #[test]
    fn test_anchors_ignored() {
        let l = lits("^abc$");
        assert!(l.prefixes.contains("abc"));
        assert!(l.complete);
    }

    #[test]
    fn test_bounded_repeat_enumerates() {
        let l = lits("a{1,2}");
        assert!(l.complete);
        assert!(l.prefixes.contains("a"));
        assert!(l.prefixes.contains("aa"));
    }
}
