//! AST node definitions.
//!
//! This module defines the complete set of AST node types produced by the
//! parser. The AST closely mirrors the source pattern syntax, carries a
//! source span on every node, and serializes to a tagged JSON
//! representation for debugging, caching and tooling.
//!
//! The tree is strictly a tree: no shared subnodes. The optimizer returns
//! fresh trees rather than mutating in place.

use crate::core::pattern::Flags;
use crate::core::tokens::{AnchorKind, CharLiteralKind, ClassOpKind, CondRef, Greediness, SubroutineTarget};
use crate::core::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Enum representing all possible AST node types.
///
/// This enum encompasses all AST node variants, allowing for type-safe
/// pattern matching and easy traversal of the AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    Regex(RegexNode),
    Alternation(Alternation),
    Sequence(Sequence),
    Literal(Literal),
    CharLiteral(CharLiteral),
    Dot(Dot),
    CharClass(CharClass),
    CharType(CharType),
    Anchor(Anchor),
    Quantifier(Quantifier),
    Group(Group),
    Define(Define),
    Conditional(Conditional),
    Backreference(Backreference),
    Subroutine(Subroutine),
    /// Placeholder emitted by tolerant parsing for an unparsable span
    Error(ErrorNode),
}

/// Root node: the parsed pattern with its delimiter and flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexNode {
    pub delimiter: char,
    pub flags: Flags,
    pub body: Box<Node>,
    pub span: Span,
}

/// Alternation node (`|`-separated branches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternation {
    pub branches: Vec<Node>,
    pub span: Span,
}

/// Concatenation of parts, matched in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub parts: Vec<Node>,
    pub span: Span,
}

/// A literal string; contiguous raw characters are coalesced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    pub span: Span,
}

/// A single codepoint written as an escape (`\x41`, `\n`, `\cM`, ...).
///
/// Kept separate from [`Literal`] so the writer can re-emit the original
/// escape form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharLiteral {
    pub codepoint: char,
    pub kind: CharLiteralKind,
    pub span: Span,
}

/// The `.` metacharacter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dot {
    pub span: Span,
}

/// A shorthand character type: one of `d D w W s S h H v V R N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharType {
    pub letter: char,
    pub span: Span,
}

/// Position assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub kind: AnchorKind,
    pub span: Span,
}

/// Repetition with min/max bounds; `max: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantifier {
    pub child: Box<Node>,
    pub min: u32,
    pub max: Option<u32>,
    pub greediness: Greediness,
    pub span: Span,
}

/// Group variants, as in the pattern syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Capturing,
    NonCapturing,
    Named,
    Atomic,
    LookaheadPos,
    LookaheadNeg,
    LookbehindPos,
    LookbehindNeg,
    InlineFlags,
    BranchReset,
}

impl GroupKind {
    pub fn is_capturing(&self) -> bool {
        matches!(self, GroupKind::Capturing | GroupKind::Named)
    }

    pub fn is_lookaround(&self) -> bool {
        matches!(
            self,
            GroupKind::LookaheadPos
                | GroupKind::LookaheadNeg
                | GroupKind::LookbehindPos
                | GroupKind::LookbehindNeg
        )
    }

    pub fn is_lookbehind(&self) -> bool {
        matches!(self, GroupKind::LookbehindPos | GroupKind::LookbehindNeg)
    }
}

/// A group of any kind. `number` is assigned by the numbering walk for
/// capturing and named groups; `flags_on`/`flags_off` are set for
/// inline-flag groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub kind: GroupKind,
    pub name: Option<String>,
    pub number: Option<u32>,
    #[serde(rename = "flagsOn", skip_serializing_if = "Option::is_none")]
    pub flags_on: Option<Flags>,
    #[serde(rename = "flagsOff", skip_serializing_if = "Option::is_none")]
    pub flags_off: Option<Flags>,
    pub body: Box<Node>,
    pub span: Span,
}

/// `(?(DEFINE)...)` container; its body is never matched directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Define {
    pub body: Box<Node>,
    pub span: Span,
}

/// `(?(cond)then|else)` conditional group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    pub condition: CondRef,
    pub then_branch: Box<Node>,
    pub else_branch: Option<Box<Node>>,
    pub span: Span,
}

/// Backreference to a capturing group, by resolved number or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backreference {
    #[serde(rename = "byNumber")]
    pub by_number: Option<u32>,
    #[serde(rename = "byName")]
    pub by_name: Option<String>,
    pub span: Span,
}

/// Subroutine call: `(?R)`, `(?1)`, `(?&name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subroutine {
    pub target: SubroutineTarget,
    pub span: Span,
}

/// Unparsable span placeholder produced only by tolerant parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNode {
    pub message: String,
    pub span: Span,
}

// ---- Character class expressions ----

/// Character class node (`[...]`), possibly negated, holding a class
/// expression: literals, ranges, types, properties, nested classes and
/// class-algebra operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharClass {
    pub negated: bool,
    pub items: Vec<ClassItem>,
    pub span: Span,
}

/// Enum representing all possible character class item types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClassItem {
    Char(ClassLiteral),
    Range(ClassRange),
    Type(ClassType),
    Property(ClassProperty),
    Nested(CharClass),
    Operation(ClassOperation),
}

/// Single character inside a class, with its written escape kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLiteral {
    #[serde(rename = "char")]
    pub ch: char,
    pub kind: CharLiteralKind,
    pub span: Span,
}

/// Character range like `a-z`. `lo <= hi` is a validation rule, not a
/// construction invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRange {
    pub lo: ClassLiteral,
    pub hi: ClassLiteral,
    pub span: Span,
}

/// Shorthand type inside a class (`\d`, `\w`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassType {
    pub letter: char,
    pub span: Span,
}

/// Unicode property inside a class (`\p{L}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassProperty {
    pub negated: bool,
    pub name: String,
    pub span: Span,
}

/// Class-algebra operation: `left op right`, where both operands are class
/// expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOperation {
    pub kind: ClassOpKind,
    pub left: Vec<ClassItem>,
    pub right: Vec<ClassItem>,
    pub span: Span,
}

// ---- Node helpers ----

impl Node {
    /// The source span of this node.
    pub fn span(&self) -> Span {
        match self {
            Node::Regex(n) => n.span,
            Node::Alternation(n) => n.span,
            Node::Sequence(n) => n.span,
            Node::Literal(n) => n.span,
            Node::CharLiteral(n) => n.span,
            Node::Dot(n) => n.span,
            Node::CharClass(n) => n.span,
            Node::CharType(n) => n.span,
            Node::Anchor(n) => n.span,
            Node::Quantifier(n) => n.span,
            Node::Group(n) => n.span,
            Node::Define(n) => n.span,
            Node::Conditional(n) => n.span,
            Node::Backreference(n) => n.span,
            Node::Subroutine(n) => n.span,
            Node::Error(n) => n.span,
        }
    }

    /// An empty sequence, used for empty patterns and empty branches.
    pub fn empty(span: Span) -> Node {
        Node::Sequence(Sequence {
            parts: Vec::new(),
            span,
        })
    }

    /// True for the empty sequence.
    pub fn is_empty_sequence(&self) -> bool {
        matches!(self, Node::Sequence(s) if s.parts.is_empty())
    }

    /// Visit direct children, depth-first building blocks.
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        match self {
            Node::Regex(n) => f(&n.body),
            Node::Alternation(n) => n.branches.iter().for_each(f),
            Node::Sequence(n) => n.parts.iter().for_each(f),
            Node::Quantifier(n) => f(&n.child),
            Node::Group(n) => f(&n.body),
            Node::Define(n) => f(&n.body),
            Node::Conditional(n) => {
                f(&n.then_branch);
                if let Some(e) = &n.else_branch {
                    f(e);
                }
            }
            _ => {}
        }
    }

    /// Depth-first, left-to-right traversal over the whole subtree,
    /// including `self`.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        f(self);
        self.for_each_child(&mut |c| c.walk(f));
    }
}

// ---- Group numbering ----

/// One capturing group as seen by the numbering walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub number: u32,
    pub name: Option<String>,
    pub span: Span,
    /// Index of the innermost enclosing branch-reset group, if any
    #[serde(rename = "branchReset")]
    pub branch_reset: Option<usize>,
}

/// Derived table mapping capturing groups to sequential numbers.
///
/// Branch-reset groups share numbers across their alternatives, so a
/// number can map to several groups and a name can alias several numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMap {
    /// Highest assigned group number
    pub count: u32,
    /// Groups in source order
    pub groups: Vec<GroupInfo>,
    /// name → numbers multimap
    pub names: BTreeMap<String, Vec<u32>>,
}

impl GroupMap {
    /// Assign numbers to the capturing groups of `root` (mutating their
    /// `number` fields) and return the derived table.
    pub fn assign(root: &mut Node) -> GroupMap {
        let mut map = GroupMap::default();
        let mut counter = 0u32;
        let mut reset_ids = 0usize;
        Self::walk(root, &mut counter, None, &mut reset_ids, &mut map);
        map.count = map.groups.iter().map(|g| g.number).max().unwrap_or(0);
        map
    }

    fn walk(
        node: &mut Node,
        counter: &mut u32,
        branch_reset: Option<usize>,
        reset_ids: &mut usize,
        map: &mut GroupMap,
    ) {
        match node {
            Node::Group(g) if g.kind == GroupKind::BranchReset => {
                let id = *reset_ids;
                *reset_ids += 1;
                let entry = *counter;
                let mut max = entry;
                match g.body.as_mut() {
                    Node::Alternation(alt) => {
                        for branch in &mut alt.branches {
                            *counter = entry;
                            Self::walk(branch, counter, Some(id), reset_ids, map);
                            max = max.max(*counter);
                        }
                    }
                    other => {
                        Self::walk(other, counter, Some(id), reset_ids, map);
                        max = max.max(*counter);
                    }
                }
                *counter = max;
            }
            Node::Group(g) => {
                if g.kind.is_capturing() {
                    *counter += 1;
                    g.number = Some(*counter);
                    map.groups.push(GroupInfo {
                        number: *counter,
                        name: g.name.clone(),
                        span: g.span,
                        branch_reset,
                    });
                    if let Some(name) = &g.name {
                        let numbers = map.names.entry(name.clone()).or_default();
                        if !numbers.contains(counter) {
                            numbers.push(*counter);
                        }
                    }
                }
                Self::walk(&mut g.body, counter, branch_reset, reset_ids, map);
            }
            Node::Regex(r) => Self::walk(&mut r.body, counter, branch_reset, reset_ids, map),
            Node::Alternation(a) => {
                for b in &mut a.branches {
                    Self::walk(b, counter, branch_reset, reset_ids, map);
                }
            }
            Node::Sequence(s) => {
                for p in &mut s.parts {
                    Self::walk(p, counter, branch_reset, reset_ids, map);
                }
            }
            Node::Quantifier(q) => Self::walk(&mut q.child, counter, branch_reset, reset_ids, map),
            Node::Define(d) => Self::walk(&mut d.body, counter, branch_reset, reset_ids, map),
            Node::Conditional(c) => {
                Self::walk(&mut c.then_branch, counter, branch_reset, reset_ids, map);
                if let Some(e) = &mut c.else_branch {
                    Self::walk(e, counter, branch_reset, reset_ids, map);
                }
            }
            _ => {}
        }
    }

    /// First declaration span for a group number.
    pub fn span_of(&self, number: u32) -> Option<Span> {
        self.groups.iter().find(|g| g.number == number).map(|g| g.span)
    }

    /// Numbers aliased by a name, in declaration order.
    pub fn numbers_for(&self, name: &str) -> &[u32] {
        self.names.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
