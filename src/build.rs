//! Fluent helpers for constructing AST `Node`s.
//!
//! A tiny set of convenience constructors that make tests and demos
//! concise: literals, character classes, anchors, quantifiers, groups and
//! sequences, all with default spans.

use crate::core::nodes::*;
use crate::core::tokens::{AnchorKind, CharLiteralKind, Greediness};
use crate::core::Span;

/// Anchor at the start of the line.
pub fn start() -> Node {
    Node::Anchor(Anchor {
        kind: AnchorKind::Start,
        span: Span::default(),
    })
}

/// Anchor at the end of the line.
pub fn end() -> Node {
    Node::Anchor(Anchor {
        kind: AnchorKind::End,
        span: Span::default(),
    })
}

/// A literal string.
pub fn literal(s: &str) -> Node {
    Node::Literal(Literal {
        value: s.to_string(),
        span: Span::default(),
    })
}

/// The `\d` character type repeated exactly `count` times.
pub fn digit(count: u32) -> Node {
    exactly(
        count,
        Node::CharType(CharType {
            letter: 'd',
            span: Span::default(),
        }),
    )
}

/// A character class from individual characters.
pub fn any_of(chars: &[char]) -> Node {
    let items = chars
        .iter()
        .map(|&ch| {
            ClassItem::Char(ClassLiteral {
                ch,
                kind: CharLiteralKind::Raw,
                span: Span::default(),
            })
        })
        .collect();
    Node::CharClass(CharClass {
        negated: false,
        items,
        span: Span::default(),
    })
}

/// Concatenate nodes into a sequence.
pub fn merge(parts: Vec<Node>) -> Node {
    Node::Sequence(Sequence {
        parts,
        span: Span::default(),
    })
}

/// Alternation over branches.
pub fn either(branches: Vec<Node>) -> Node {
    Node::Alternation(Alternation {
        branches,
        span: Span::default(),
    })
}

/// A capturing group.
pub fn capture(node: Node) -> Node {
    group(GroupKind::Capturing, None, node)
}

/// A named capturing group.
pub fn named(name: &str, node: Node) -> Node {
    group(GroupKind::Named, Some(name.to_string()), node)
}

fn group(kind: GroupKind, name: Option<String>, body: Node) -> Node {
    Node::Group(Group {
        kind,
        name,
        number: None,
        flags_on: None,
        flags_off: None,
        body: Box::new(body),
        span: Span::default(),
    })
}

/// Zero-or-one repetition.
pub fn optional(node: Node) -> Node {
    repeat(node, 0, Some(1))
}

/// Exactly `count` repetitions.
pub fn exactly(count: u32, node: Node) -> Node {
    repeat(node, count, Some(count))
}

/// One-or-more repetitions.
pub fn some(node: Node) -> Node {
    repeat(node, 1, None)
}

/// General repetition.
pub fn repeat(node: Node, min: u32, max: Option<u32>) -> Node {
    Node::Quantifier(Quantifier {
        child: Box::new(node),
        min,
        max,
        greediness: Greediness::Greedy,
        span: Span::default(),
    })
}
