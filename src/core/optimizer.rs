//! Normalizing optimizer: a fixed sequence of confluent,
//! semantics-preserving AST rewrites.
//!
//! Running the optimizer twice yields the same tree (idempotence), and
//! every rule carries a safety guard that refuses to apply when the active
//! flags would change meaning (`[0-9] → \d` is disabled under the unicode
//! flag, range formation requires every codepoint of the range to be
//! present, possessivization requires a disjointness proof).

use crate::core::analysis::{first_set, is_nullable, max_len};
use crate::core::emitter::{emit_body, emit_pattern};
use crate::core::nodes::*;
use crate::core::pattern::Flags;
use crate::core::tokens::{AnchorKind, CharLiteralKind, Greediness};
use crate::core::Span;
use crate::automata::symbol::{class_set, digit_set, space_set, word_set, CharSet};
use serde::{Deserialize, Serialize};

/// Options controlling the optional rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeOptions {
    /// Canonicalize character classes (reorder, dedupe, merge ranges,
    /// form `\d`/`\w`/`\s` on exact set match)
    #[serde(rename = "canonicalizeClasses")]
    pub canonicalize_classes: bool,
    /// Possessivize quantifiers where a disjointness proof allows it
    pub possessivize: bool,
    /// Drop flags that cannot influence the pattern (`m` without anchors)
    #[serde(rename = "pruneFlags")]
    pub prune_flags: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions {
            canonicalize_classes: true,
            possessivize: true,
            prune_flags: true,
        }
    }
}

/// Outcome of optimization, shaped for the public API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResult {
    pub original: String,
    pub optimized: String,
    pub changed: bool,
    /// Length delta in bytes (positive means the pattern shrank)
    pub savings: i64,
    /// Whether every applied rewrite is language-preserving under the
    /// current flags; guards refuse unsafe rewrites, so this is only false
    /// when an explicitly unsafe option combination is requested
    #[serde(rename = "preservesSemantics")]
    pub preserves_semantics: bool,
}

/// Optimize a parsed pattern and report the outcome.
pub fn optimize(root: &Node, options: &OptimizeOptions) -> (Node, OptimizeResult) {
    let original = emit_pattern(root).to_delimited();
    let optimized_root = optimize_node(root, options);
    let optimized = emit_pattern(&optimized_root).to_delimited();
    let result = OptimizeResult {
        changed: original != optimized,
        savings: original.len() as i64 - optimized.len() as i64,
        preserves_semantics: true,
        original,
        optimized,
    };
    (optimized_root, result)
}

/// Rewrite the tree without producing a report.
pub fn optimize_node(root: &Node, options: &OptimizeOptions) -> Node {
    match root {
        Node::Regex(r) => {
            let body = rewrite(&r.body, r.flags, options);
            let flags = if options.prune_flags {
                prune_flags(r.flags, &body)
            } else {
                r.flags
            };
            Node::Regex(RegexNode {
                delimiter: r.delimiter,
                flags,
                body: Box::new(body),
                span: r.span,
            })
        }
        other => rewrite(other, Flags::default(), options),
    }
}

fn rewrite(node: &Node, flags: Flags, options: &OptimizeOptions) -> Node {
    match node {
        Node::Sequence(seq) => {
            let parts: Vec<Node> = seq.parts.iter().map(|p| rewrite(p, flags, options)).collect();
            let parts = flatten_sequence(parts);
            let parts = coalesce_literals(parts);
            let parts = compact_repeats(parts);
            let parts = if options.possessivize {
                possessivize(parts)
            } else {
                parts
            };
            let parts = coalesce_literals(parts);
            match parts.len() {
                1 => parts.into_iter().next().expect("one part"),
                _ => Node::Sequence(Sequence {
                    parts,
                    span: seq.span,
                }),
            }
        }
        Node::Alternation(alt) => {
            let branches: Vec<Node> = alt
                .branches
                .iter()
                .map(|b| rewrite(b, flags, options))
                .collect();
            let branches = dedup_branches(branches);
            if branches.len() == 1 {
                return branches.into_iter().next().expect("one branch");
            }
            match factor_common_prefix(&branches, alt.span) {
                Some(factored) => factored,
                None => Node::Alternation(Alternation {
                    branches,
                    span: alt.span,
                }),
            }
        }
        Node::Quantifier(q) => {
            let child = rewrite(&q.child, flags, options);
            match (q.min, q.max) {
                (0, Some(0)) => Node::empty(q.span),
                (1, Some(1)) => child,
                _ => Node::Quantifier(Quantifier {
                    child: Box::new(child),
                    min: q.min,
                    max: q.max,
                    greediness: q.greediness,
                    span: q.span,
                }),
            }
        }
        Node::Group(g) => {
            let inner_flags = match (&g.flags_on, &g.flags_off) {
                (Some(on), Some(off)) => flags.apply_inline(on, off),
                _ => flags,
            };
            let body = rewrite(&g.body, inner_flags, options);
            // A non-capturing wrapper around a one-character atom is inert
            // in every context.
            if g.kind == GroupKind::NonCapturing && is_single_char_atom(&body) {
                return body;
            }
            Node::Group(Group {
                kind: g.kind,
                name: g.name.clone(),
                number: g.number,
                flags_on: g.flags_on,
                flags_off: g.flags_off,
                body: Box::new(body),
                span: g.span,
            })
        }
        Node::CharClass(cc) if options.canonicalize_classes => canonicalize_class(cc, flags),
        Node::Define(d) => Node::Define(Define {
            body: Box::new(rewrite(&d.body, flags, options)),
            span: d.span,
        }),
        Node::Conditional(c) => Node::Conditional(Conditional {
            condition: c.condition.clone(),
            then_branch: Box::new(rewrite(&c.then_branch, flags, options)),
            else_branch: c
                .else_branch
                .as_ref()
                .map(|e| Box::new(rewrite(e, flags, options))),
            span: c.span,
        }),
        other => other.clone(),
    }
}

fn is_single_char_atom(node: &Node) -> bool {
    match node {
        Node::Literal(l) => l.value.chars().count() == 1,
        Node::CharLiteral(_) | Node::CharClass(_) | Node::CharType(_) | Node::Dot(_) => true,
        _ => false,
    }
}

fn flatten_sequence(parts: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Node::Sequence(inner) => out.extend(inner.parts),
            other => out.push(other),
        }
    }
    out
}

fn coalesce_literals(parts: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(parts.len());
    for part in parts {
        if let (Some(Node::Literal(prev)), Node::Literal(cur)) = (out.last_mut(), &part) {
            prev.value.push_str(&cur.value);
            prev.span = prev.span.cover(cur.span);
            continue;
        }
        // Empty literals and empty sequences contribute nothing
        if matches!(&part, Node::Literal(l) if l.value.is_empty()) || part.is_empty_sequence() {
            continue;
        }
        out.push(part);
    }
    out
}

/// `aaa → a{3}`: compact runs of one repeated character inside literals.
fn compact_repeats(parts: Vec<Node>) -> Vec<Node> {
    const MIN_RUN: usize = 3;
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        let Node::Literal(lit) = &part else {
            out.push(part);
            continue;
        };
        let chars: Vec<char> = lit.value.chars().collect();
        let mut pieces: Vec<Node> = Vec::new();
        let mut pending = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let mut run = 1;
            while i + run < chars.len() && chars[i + run] == c {
                run += 1;
            }
            if run >= MIN_RUN {
                if !pending.is_empty() {
                    pieces.push(Node::Literal(Literal {
                        value: std::mem::take(&mut pending),
                        span: lit.span,
                    }));
                }
                pieces.push(Node::Quantifier(Quantifier {
                    child: Box::new(Node::Literal(Literal {
                        value: c.to_string(),
                        span: lit.span,
                    })),
                    min: run as u32,
                    max: Some(run as u32),
                    greediness: Greediness::Greedy,
                    span: lit.span,
                }));
            } else {
                for _ in 0..run {
                    pending.push(c);
                }
            }
            i += run;
        }
        if pieces.is_empty() {
            out.push(part);
        } else {
            if !pending.is_empty() {
                pieces.push(Node::Literal(Literal {
                    value: pending,
                    span: lit.span,
                }));
            }
            out.extend(pieces);
        }
    }
    out
}

/// Collapse strictly-equal branches, keeping the first occurrence.
///
/// Equality is full structural equality of the emitted form; variants that
/// merely recognize the same language (e.g. `a+` vs `aa*`) are deliberately
/// not collapsed.
fn dedup_branches(branches: Vec<Node>) -> Vec<Node> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(branches.len());
    for b in branches {
        let key = emit_body(&b, Flags::default());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(b);
    }
    out
}

/// `foo_a|foo_b → foo_(?:a|b)` when every branch starts with a common
/// literal prefix and factoring actually shortens the pattern.
fn factor_common_prefix(branches: &[Node], span: Span) -> Option<Node> {
    fn leading_literal(node: &Node) -> Option<&str> {
        match node {
            Node::Literal(l) => Some(&l.value),
            Node::Sequence(s) => match s.parts.first() {
                Some(Node::Literal(l)) => Some(&l.value),
                _ => None,
            },
            _ => None,
        }
    }

    let mut prefix: Option<String> = None;
    for b in branches {
        let lead = leading_literal(b)?;
        prefix = Some(match prefix {
            None => lead.to_string(),
            Some(p) => common_prefix(&p, lead),
        });
        if prefix.as_deref() == Some("") {
            return None;
        }
    }
    let prefix = prefix?;

    // Factoring pays for the "(?:" ")" wrapper with prefix copies saved.
    let saved = prefix.len() * (branches.len() - 1);
    if saved < 4 {
        return None;
    }

    let remainders: Vec<Node> = branches
        .iter()
        .map(|b| strip_prefix_node(b, prefix.chars().count()))
        .collect();

    Some(Node::Sequence(Sequence {
        parts: vec![
            Node::Literal(Literal {
                value: prefix,
                span,
            }),
            Node::Group(Group {
                kind: GroupKind::NonCapturing,
                name: None,
                number: None,
                flags_on: None,
                flags_off: None,
                body: Box::new(Node::Alternation(Alternation {
                    branches: remainders,
                    span,
                })),
                span,
            }),
        ],
        span,
    }))
}

fn common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

fn strip_prefix_node(node: &Node, prefix_chars: usize) -> Node {
    match node {
        Node::Literal(l) => {
            let rest: String = l.value.chars().skip(prefix_chars).collect();
            Node::Literal(Literal {
                value: rest,
                span: l.span,
            })
        }
        Node::Sequence(s) => {
            let mut parts = s.parts.clone();
            if let Some(Node::Literal(l)) = parts.first_mut() {
                l.value = l.value.chars().skip(prefix_chars).collect();
            }
            let parts: Vec<Node> = parts
                .into_iter()
                .filter(|p| !matches!(p, Node::Literal(l) if l.value.is_empty()))
                .collect();
            match parts.len() {
                0 => Node::empty(s.span),
                1 => parts.into_iter().next().expect("one part"),
                _ => Node::Sequence(Sequence {
                    parts,
                    span: s.span,
                }),
            }
        }
        other => other.clone(),
    }
}

/// `X+Y → X++Y` when X's body is one character wide and cannot start
/// whatever follows, so giving back input can never help.
fn possessivize(parts: Vec<Node>) -> Vec<Node> {
    let mut out = parts;
    for i in 0..out.len() {
        let Node::Quantifier(q) = &out[i] else { continue };
        if q.greediness != Greediness::Greedy || q.max == Some(q.min) {
            continue;
        }
        if max_len(&q.child) != Some(1) {
            continue;
        }

        // First set of the rest of the sequence, up to the first
        // non-nullable part; bail out if everything after is nullable.
        let mut follow = CharSet::empty();
        let mut anchored_follow = false;
        for part in &out[i + 1..] {
            follow = follow.union(&first_set(part));
            if !is_nullable(part) {
                anchored_follow = true;
                break;
            }
        }
        if !anchored_follow {
            continue;
        }
        if first_set(&q.child).overlaps(&follow) {
            continue;
        }

        if let Node::Quantifier(q) = &mut out[i] {
            q.greediness = Greediness::Possessive;
        }
    }
    out
}

/// Canonicalize a character class: dedupe, merge ranges (only across
/// codepoints that are all present), order deterministically, and replace
/// the whole class by `\d`/`\w`/`\s` (or their negations) on exact match.
fn canonicalize_class(cc: &CharClass, flags: Flags) -> Node {
    // Guards: under the unicode flag the shorthand types denote different
    // sets, so classes are left untouched entirely; exotic contents are
    // also left alone.
    if flags.unicode {
        return Node::CharClass(cc.clone());
    }
    let simple = cc
        .items
        .iter()
        .all(|i| matches!(i, ClassItem::Char(_) | ClassItem::Range(_) | ClassItem::Type(_)));
    if !simple {
        return Node::CharClass(cc.clone());
    }
    let Some(set) = class_set(cc) else {
        return Node::CharClass(cc.clone());
    };

    // Exact shorthand match replaces the entire class.
    let positive = if cc.negated {
        // The stored set is already complemented; undo for comparison
        set.negate()
    } else {
        set.clone()
    };
    for (candidate, letter) in [(digit_set(), 'd'), (word_set(), 'w'), (space_set(), 's')] {
        if positive == candidate {
            let letter = if cc.negated {
                letter.to_ascii_uppercase()
            } else {
                letter
            };
            return Node::CharType(CharType {
                letter,
                span: cc.span,
            });
        }
    }

    // Rebuild items from the normalized interval set: single codepoints
    // first, then ranges, both in codepoint order. A two-codepoint range
    // is no shorter than its members, so it stays as two singles.
    let inner = if cc.negated { set.negate() } else { set };
    let mut singles = Vec::new();
    let mut ranges = Vec::new();
    for r in inner.ranges() {
        if r.end - r.start <= 2 {
            singles.extend(r.start..r.end);
        } else {
            ranges.push(*r);
        }
    }
    let mut items: Vec<ClassItem> = Vec::new();
    for cp in singles {
        if let Some(ch) = char::from_u32(cp) {
            items.push(ClassItem::Char(ClassLiteral {
                ch,
                kind: CharLiteralKind::Raw,
                span: cc.span,
            }));
        }
    }
    for r in ranges {
        let (Some(lo), Some(hi)) = (char::from_u32(r.start), char::from_u32(r.end - 1)) else {
            return Node::CharClass(cc.clone());
        };
        items.push(ClassItem::Range(ClassRange {
            lo: ClassLiteral {
                ch: lo,
                kind: CharLiteralKind::Raw,
                span: cc.span,
            },
            hi: ClassLiteral {
                ch: hi,
                kind: CharLiteralKind::Raw,
                span: cc.span,
            },
            span: cc.span,
        }));
    }

    // A one-character class is just that character.
    if !cc.negated && items.len() == 1 {
        if let ClassItem::Char(c) = &items[0] {
            return Node::Literal(Literal {
                value: c.ch.to_string(),
                span: cc.span,
            });
        }
    }

    Node::CharClass(CharClass {
        negated: cc.negated,
        items,
        span: cc.span,
    })
}

/// Drop flags that cannot influence the rewritten body.
fn prune_flags(flags: Flags, body: &Node) -> Flags {
    let mut has_line_anchor = false;
    let mut has_dot = false;
    body.walk(&mut |n| match n {
        Node::Anchor(a) if matches!(a.kind, AnchorKind::Start | AnchorKind::End) => {
            has_line_anchor = true;
        }
        Node::Dot(_) => has_dot = true,
        _ => {}
    });
    let mut out = flags;
    if !has_line_anchor {
        out.multiline = false;
    }
    if !has_dot {
        out.dot_all = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn optimize_source(source: &str) -> OptimizeResult {
        optimize_source_with(source, &OptimizeOptions::default())
    }

    fn optimize_source_with(source: &str, options: &OptimizeOptions) -> OptimizeResult {
        let p = split(source, TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        optimize(&out.root, options).1
    }

    #[test]
    fn test_digit_class_collapses_without_unicode() {
        let r = optimize_source("/[0123456789]/");
        assert_eq!(r.optimized, r"/\d/");
        assert!(r.changed);
        assert!(r.savings > 0);
    }

    #[test]
    fn test_digit_class_untouched_under_unicode() {
        let r = optimize_source("/[0123456789]/u");
        assert_eq!(r.optimized, "/[0123456789]/u");
        assert!(!r.changed);
    }

    #[test]
    fn test_word_class_collapses() {
        let r = optimize_source("/[0-9A-Za-z_]/");
        assert_eq!(r.optimized, r"/\w/");
    }

    #[test]
    fn test_negated_class_collapses() {
        let r = optimize_source("/[^0-9]/");
        assert_eq!(r.optimized, r"/\D/");
    }

    #[test]
    fn test_strict_range_guard() {
        // a, c, e do not form a contiguous range; no a-e may be invented
        let r = optimize_source("/[ace]/");
        assert!(!r.optimized.contains("a-e"), "got {}", r.optimized);
    }

    #[test]
    fn test_touching_ranges_merge() {
        let r = optimize_source("/[a-mn-z]/");
        assert_eq!(r.optimized, "/[a-z]/");
    }

    #[test]
    fn test_duplicate_class_literals_dedupe() {
        let r = optimize_source("/[aab]/");
        assert_eq!(r.optimized, "/[ab]/");
    }

    #[test]
    fn test_quantifier_normalization() {
        assert_eq!(optimize_source("/a{1}/").optimized, "/a/");
        assert_eq!(optimize_source("/a{0}b/").optimized, "/b/");
        assert_eq!(optimize_source("/a{0,1}/").optimized, "/a?/");
        assert_eq!(optimize_source("/a{1,}/").optimized, "/a+/");
    }

    #[test]
    fn test_repeat_compaction() {
        assert_eq!(optimize_source("/baaaac/").optimized, "/ba{4}c/");
    }

    #[test]
    fn test_alternation_dedup() {
        assert_eq!(optimize_source("/x(?:a|b|a)y/").optimized, "/x(?:a|b)y/");
    }

    #[test]
    fn test_equivalent_variants_not_deduped() {
        // a+ and aa* recognize the same language but are kept apart
        let r = optimize_source("/a+|aa*/");
        assert!(r.optimized.contains('|'));
    }

    #[test]
    fn test_prefix_factoring() {
        let r = optimize_source("/foo_alpha|foo_beta/");
        assert_eq!(r.optimized, "/foo_(?:alpha|beta)/");
    }

    #[test]
    fn test_short_prefix_not_factored() {
        let r = optimize_source("/ab|ac/");
        assert_eq!(r.optimized, "/ab|ac/");
    }

    #[test]
    fn test_possessivization_when_disjoint() {
        let r = optimize_source(r"/\d+-x/");
        assert_eq!(r.optimized, r"/\d++-x/");
    }

    #[test]
    fn test_no_possessivization_when_overlapping() {
        let r = optimize_source(r"/\d+0/");
        assert_eq!(r.optimized, r"/\d+0/");
    }

    #[test]
    fn test_no_possessivization_for_wide_bodies() {
        let r = optimize_source("/(?:ab)+a/");
        assert!(!r.optimized.contains("++"), "got {}", r.optimized);
    }

    #[test]
    fn test_flag_pruning() {
        assert_eq!(optimize_source("/abc/m").optimized, "/abc/");
        assert_eq!(optimize_source("/^abc$/m").optimized, "/^abc$/m");
        assert_eq!(optimize_source("/abc/s").optimized, "/abc/");
        assert_eq!(optimize_source("/a.c/s").optimized, "/a.c/s");
    }

    #[test]
    fn test_idempotence() {
        for src in [
            "/[0123456789]/",
            "/baaaac/",
            "/foo_alpha|foo_beta/",
            r"/\d+-x/",
            "/x(?:a|b|a)y/",
            "/(a|b)+c/",
            "/a{1}b{0}c/",
        ] {
            let first = optimize_source(src);
            let second = optimize_source(&first.optimized);
            assert_eq!(first.optimized, second.optimized, "not idempotent for {}", src);
        }
    }

    #[test]
    fn test_options_disable_rules() {
        let opts = OptimizeOptions {
            canonicalize_classes: false,
            possessivize: false,
            prune_flags: false,
        };
        let r = optimize_source_with("/[0123456789]/m", &opts);
        assert!(!r.changed);
    }

    #[test]
    fn test_capturing_groups_survive() {
        let r = optimize_source("/(a)(?<n>b)/");
        assert_eq!(r.optimized, "/(a)(?<n>b)/");
    }
}
