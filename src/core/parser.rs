//! Recursive-descent parser producing the AST.
//!
//! The parser consumes the token stream produced by the lexer. Recursion
//! depth is explicitly bounded (structural nesting of groups, classes and
//! alternations), and breaching the bound is reported as a resource-limit
//! error, distinct from syntax errors.
//!
//! Two entry points exist: [`parse`] aborts on the first error;
//! [`parse_tolerant`] collects errors and produces a best-effort AST in
//! which unparsable spans appear as explicit `Error` nodes, for use by
//! linting front ends.

use crate::core::errors::{Error, SourceError};
use crate::core::hints::hint_for;
use crate::core::nodes::*;
use crate::core::pattern::Pattern;
use crate::core::tokens::*;
use crate::core::{lexer, Span};

/// Successful parse: the root node plus the derived group table.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub root: Node,
    pub groups: GroupMap,
}

/// Tolerant parse: best-effort AST plus every error encountered.
#[derive(Debug, Clone)]
pub struct TolerantOutput {
    pub root: Node,
    pub groups: GroupMap,
    pub errors: Vec<Error>,
}

/// Parse a pattern, aborting on the first error.
pub fn parse(pattern: &Pattern, max_depth: usize) -> Result<ParseOutput, Error> {
    let tokens = lexer::tokenize(&pattern.body, pattern.flags)?;
    let mut parser = Parser::new(pattern, tokens, max_depth, false);
    let body = parser.parse_whole()?;
    let mut root = parser.wrap_root(body);
    let groups = GroupMap::assign(&mut root);
    Ok(ParseOutput { root, groups })
}

/// Parse a pattern without aborting, collecting errors into the output.
pub fn parse_tolerant(pattern: &Pattern, max_depth: usize) -> TolerantOutput {
    let tokens = match lexer::tokenize(&pattern.body, pattern.flags) {
        Ok(t) => t,
        Err(e) => {
            // Tokenization is all-or-nothing; degrade to a single error node.
            let span = Span::new(0, pattern.body.len());
            let root = Node::Regex(RegexNode {
                delimiter: pattern.delimiter,
                flags: pattern.flags,
                body: Box::new(Node::Error(ErrorNode {
                    message: e.to_string(),
                    span,
                })),
                span,
            });
            return TolerantOutput {
                root,
                groups: GroupMap::default(),
                errors: vec![e],
            };
        }
    };

    let mut parser = Parser::new(pattern, tokens, max_depth, true);
    let body = match parser.parse_whole() {
        Ok(b) => b,
        Err(e) => {
            // Depth-limit breaches abort even in tolerant mode.
            parser.errors.push(e);
            Node::empty(Span::new(0, pattern.body.len()))
        }
    };
    let mut root = parser.wrap_root(body);
    let groups = GroupMap::assign(&mut root);
    TolerantOutput {
        root,
        groups,
        errors: parser.errors,
    }
}

struct Parser<'a> {
    pattern: &'a Pattern,
    tokens: Vec<Token>,
    i: usize,
    depth: usize,
    max_depth: usize,
    tolerant: bool,
    errors: Vec<Error>,
    /// Capturing groups opened so far, for relative backref resolution
    cap_count: u32,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a Pattern, tokens: Vec<Token>, max_depth: usize, tolerant: bool) -> Self {
        Parser {
            pattern,
            tokens,
            i: 0,
            depth: 0,
            max_depth,
            tolerant,
            errors: Vec::new(),
            cap_count: 0,
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.i)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.i).cloned();
        if t.is_some() {
            self.i += 1;
        }
        t
    }

    fn here(&self) -> usize {
        self.tokens
            .get(self.i)
            .map(|t| t.span.start)
            .unwrap_or(self.pattern.body.len())
    }

    fn err(&self, message: impl Into<String>, pos: usize, code: &str) -> Error {
        Error::Parser(
            SourceError::new(message, pos, &self.pattern.body, code).with_hint(hint_for(code)),
        )
    }

    fn enter(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Error::ResourceLimit {
                limit: "recursion_depth".to_string(),
                observed: self.depth as u64,
                max: self.max_depth as u64,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn wrap_root(&self, body: Node) -> Node {
        let span = Span::new(0, self.pattern.body.len());
        Node::Regex(RegexNode {
            delimiter: self.pattern.delimiter,
            flags: self.pattern.flags,
            body: Box::new(body),
            span,
        })
    }

    fn parse_whole(&mut self) -> Result<Node, Error> {
        let node = self.parse_alternation()?;
        if !self.eof() {
            let pos = self.here();
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::GroupClose)) {
                let e = self.err("Unmatched ')'", pos, "parser.unmatched_close");
                if self.tolerant {
                    self.errors.push(e);
                    self.i += 1;
                    let rest = self.parse_whole()?;
                    let span = node.span().cover(rest.span());
                    return Ok(Node::Sequence(Sequence {
                        parts: vec![node, rest],
                        span,
                    }));
                }
                return Err(e);
            }
            return Err(self.err("Unexpected trailing input", pos, "parser.unexpected"));
        }
        Ok(node)
    }

    fn parse_alternation(&mut self) -> Result<Node, Error> {
        self.enter()?;
        let start = self.here();
        let mut branches = vec![self.parse_sequence()?];

        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Bar)) {
            self.i += 1;
            branches.push(self.parse_sequence()?);
        }
        self.leave();

        if branches.len() == 1 {
            return Ok(branches.pop().expect("one branch"));
        }
        let end = branches.last().map(|b| b.span().end).unwrap_or(start);
        Ok(Node::Alternation(Alternation {
            branches,
            span: Span::new(start, end),
        }))
    }

    fn parse_sequence(&mut self) -> Result<Node, Error> {
        let start = self.here();
        let mut parts: Vec<Node> = Vec::new();

        loop {
            match self.peek().map(|t| t.kind.clone()) {
                None => break,
                Some(TokenKind::Bar) | Some(TokenKind::GroupClose) => break,
                Some(TokenKind::Comment) => {
                    self.i += 1;
                    continue;
                }
                Some(TokenKind::Quantifier { min, max, greediness }) => {
                    let token = self.advance().expect("peeked");
                    match parts.pop() {
                        Some(atom) if quantifiable(&atom) => {
                            let greediness = effective_greediness(greediness, token.flags);
                            let span = atom.span().cover(token.span);
                            parts.push(Node::Quantifier(Quantifier {
                                child: Box::new(atom),
                                min,
                                max,
                                greediness,
                                span,
                            }));
                        }
                        popped => {
                            if let Some(atom) = popped {
                                parts.push(atom);
                            }
                            let e = self.err(
                                "Quantifier does not follow a repeatable item",
                                token.span.start,
                                "parser.dangling_quantifier",
                            );
                            if self.tolerant {
                                self.errors.push(e);
                                parts.push(Node::Error(ErrorNode {
                                    message: "dangling quantifier".to_string(),
                                    span: token.span,
                                }));
                                continue;
                            }
                            return Err(e);
                        }
                    }
                }
                Some(_) => {
                    match self.parse_atom() {
                        Ok(Some(atom)) => parts.push(atom),
                        Ok(None) => {}
                        Err(e) => {
                            if self.tolerant {
                                let span = self
                                    .peek()
                                    .map(|t| t.span)
                                    .unwrap_or_else(|| Span::new(self.here(), self.here()));
                                self.errors.push(e);
                                self.i += 1;
                                parts.push(Node::Error(ErrorNode {
                                    message: "unparsable".to_string(),
                                    span,
                                }));
                                continue;
                            }
                            return Err(e);
                        }
                    }
                }
            }
        }

        let parts = coalesce_literals(parts);
        let end = parts.last().map(|p| p.span().end).unwrap_or(start);
        if parts.len() == 1 {
            return Ok(parts.into_iter().next().expect("one part"));
        }
        Ok(Node::Sequence(Sequence {
            parts,
            span: Span::new(start.min(end), end),
        }))
    }

    /// Parse one atom. Returns `Ok(None)` for tokens that produce no node.
    fn parse_atom(&mut self) -> Result<Option<Node>, Error> {
        let token = match self.advance() {
            Some(t) => t,
            None => return Ok(None),
        };
        let span = token.span;

        let node = match token.kind {
            TokenKind::Literal { ch, escape } => match escape {
                CharLiteralKind::Raw => Node::Literal(Literal {
                    value: ch.to_string(),
                    span,
                }),
                kind => Node::CharLiteral(CharLiteral {
                    codepoint: ch,
                    kind,
                    span,
                }),
            },
            TokenKind::CharType { letter } => Node::CharType(CharType { letter, span }),
            TokenKind::UnicodeProperty { negated, name } => Node::CharClass(CharClass {
                negated: false,
                items: vec![ClassItem::Property(ClassProperty { negated, name, span })],
                span,
            }),
            TokenKind::Anchor { anchor } => Node::Anchor(Anchor { kind: anchor, span }),
            TokenKind::Dot => Node::Dot(Dot { span }),
            TokenKind::ClassOpen { negated } => self.parse_class(negated, span)?,
            TokenKind::GroupOpen { open } => self.parse_group(open, span)?,
            TokenKind::Backreference { target } => {
                let (by_number, by_name) = match target {
                    BackrefTarget::Number(n) => (Some(n), None),
                    BackrefTarget::Name(n) => (None, Some(n)),
                    BackrefTarget::Relative(n) => {
                        let back = n.unsigned_abs().max(1);
                        let resolved = self.cap_count.saturating_sub(back - 1);
                        (Some(resolved), None)
                    }
                };
                Node::Backreference(Backreference {
                    by_number,
                    by_name,
                    span,
                })
            }
            TokenKind::Subroutine { target } => Node::Subroutine(Subroutine { target, span }),
            TokenKind::Comment => return Ok(None),
            TokenKind::GroupClose
            | TokenKind::Bar
            | TokenKind::Quantifier { .. }
            | TokenKind::ClassClose
            | TokenKind::RangeDash
            | TokenKind::ClassOp { .. } => {
                return Err(self.err(
                    "Unexpected token",
                    span.start,
                    "parser.unexpected",
                ))
            }
        };
        Ok(Some(node))
    }

    fn expect_group_close(&mut self, open_span: Span) -> Result<Span, Error> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::GroupClose) => {
                let t = self.advance().expect("peeked");
                Ok(t.span)
            }
            _ => {
                let e = self.err(
                    "Unterminated group",
                    open_span.start,
                    "parser.unbalanced_group",
                );
                if self.tolerant {
                    self.errors.push(e);
                    Ok(Span::new(self.here(), self.here()))
                } else {
                    Err(e)
                }
            }
        }
    }

    fn parse_group(&mut self, open: GroupOpenKind, open_span: Span) -> Result<Node, Error> {
        // Unscoped inline flags close inside their own token.
        if let GroupOpenKind::InlineFlags { on, off, scoped: false } = &open {
            return Ok(Node::Group(Group {
                kind: GroupKind::InlineFlags,
                name: None,
                number: None,
                flags_on: Some(*on),
                flags_off: Some(*off),
                body: Box::new(Node::empty(Span::new(open_span.end, open_span.end))),
                span: open_span,
            }));
        }

        self.enter()?;
        if matches!(open, GroupOpenKind::Capturing | GroupOpenKind::Named { .. }) {
            self.cap_count += 1;
        }

        let result = (|| -> Result<Node, Error> {
            match open {
                GroupOpenKind::Define => {
                    let body = self.parse_alternation()?;
                    let close = self.expect_group_close(open_span)?;
                    Ok(Node::Define(Define {
                        body: Box::new(body),
                        span: open_span.cover(close),
                    }))
                }
                GroupOpenKind::Conditional { condition } => {
                    let body = self.parse_alternation()?;
                    let close = self.expect_group_close(open_span)?;
                    let span = open_span.cover(close);
                    let (then_branch, else_branch) = match body {
                        Node::Alternation(mut alt) if alt.branches.len() == 2 => {
                            let e = alt.branches.pop().expect("two branches");
                            let t = alt.branches.pop().expect("two branches");
                            (t, Some(Box::new(e)))
                        }
                        Node::Alternation(_) => {
                            return Err(self.err(
                                "Conditional group has more than two branches",
                                open_span.start,
                                "parser.bad_conditional",
                            ))
                        }
                        other => (other, None),
                    };
                    Ok(Node::Conditional(Conditional {
                        condition,
                        then_branch: Box::new(then_branch),
                        else_branch,
                        span,
                    }))
                }
                other => {
                    let (kind, name, flags_on, flags_off) = match other {
                        GroupOpenKind::Capturing => (GroupKind::Capturing, None, None, None),
                        GroupOpenKind::NonCapturing => (GroupKind::NonCapturing, None, None, None),
                        GroupOpenKind::Named { name } => (GroupKind::Named, Some(name), None, None),
                        GroupOpenKind::Atomic => (GroupKind::Atomic, None, None, None),
                        GroupOpenKind::LookaheadPos => (GroupKind::LookaheadPos, None, None, None),
                        GroupOpenKind::LookaheadNeg => (GroupKind::LookaheadNeg, None, None, None),
                        GroupOpenKind::LookbehindPos => (GroupKind::LookbehindPos, None, None, None),
                        GroupOpenKind::LookbehindNeg => (GroupKind::LookbehindNeg, None, None, None),
                        GroupOpenKind::BranchReset => (GroupKind::BranchReset, None, None, None),
                        GroupOpenKind::InlineFlags { on, off, .. } => {
                            (GroupKind::InlineFlags, None, Some(on), Some(off))
                        }
                        GroupOpenKind::Define | GroupOpenKind::Conditional { .. } => unreachable!(),
                    };
                    let body = self.parse_alternation()?;
                    let close = self.expect_group_close(open_span)?;
                    Ok(Node::Group(Group {
                        kind,
                        name,
                        number: None,
                        flags_on,
                        flags_off,
                        body: Box::new(body),
                        span: open_span.cover(close),
                    }))
                }
            }
        })();
        self.leave();
        result
    }

    fn parse_class(&mut self, negated: bool, open_span: Span) -> Result<Node, Error> {
        self.enter()?;
        let result = self.parse_class_body(negated, open_span);
        self.leave();
        result.map(Node::CharClass)
    }

    fn parse_class_body(&mut self, negated: bool, open_span: Span) -> Result<CharClass, Error> {
        // Segments separated by class operators, folded left-associatively.
        let mut segments: Vec<(Option<ClassOpKind>, Vec<ClassItem>)> = vec![(None, Vec::new())];
        let close_span;

        loop {
            let token = match self.advance() {
                Some(t) => t,
                None => {
                    return Err(self.err(
                        "Unterminated character class",
                        open_span.start,
                        "lexer.unterminated_class",
                    ))
                }
            };
            let span = token.span;
            let current = &mut segments.last_mut().expect("segment").1;

            match token.kind {
                TokenKind::ClassClose => {
                    close_span = span;
                    break;
                }
                TokenKind::ClassOp { op } => {
                    segments.push((Some(op), Vec::new()));
                }
                TokenKind::Literal { ch, escape } => current.push(ClassItem::Char(ClassLiteral {
                    ch,
                    kind: escape,
                    span,
                })),
                TokenKind::CharType { letter } => {
                    current.push(ClassItem::Type(ClassType { letter, span }))
                }
                TokenKind::UnicodeProperty { negated, name } => {
                    current.push(ClassItem::Property(ClassProperty { negated, name, span }))
                }
                TokenKind::ClassOpen { negated } => {
                    let nested = self.parse_class_body(negated, span)?;
                    current.push(ClassItem::Nested(nested));
                }
                TokenKind::RangeDash => {
                    let lo = match current.pop() {
                        Some(ClassItem::Char(c)) => c,
                        other => {
                            if let Some(item) = other {
                                current.push(item);
                            }
                            return Err(self.err(
                                "Range endpoint must be a single character",
                                span.start,
                                "range.bad_operand",
                            ));
                        }
                    };
                    let hi = match self.advance() {
                        Some(Token {
                            kind: TokenKind::Literal { ch, escape },
                            span: hi_span,
                            ..
                        }) => ClassLiteral {
                            ch,
                            kind: escape,
                            span: hi_span,
                        },
                        Some(t) => {
                            return Err(self.err(
                                "Range endpoint must be a single character",
                                t.span.start,
                                "range.bad_operand",
                            ))
                        }
                        None => {
                            return Err(self.err(
                                "Unterminated character class",
                                open_span.start,
                                "lexer.unterminated_class",
                            ))
                        }
                    };
                    let range_span = lo.span.cover(hi.span);
                    current.push(ClassItem::Range(ClassRange {
                        lo,
                        hi,
                        span: range_span,
                    }));
                }
                _ => {
                    return Err(self.err(
                        "Unexpected token in character class",
                        span.start,
                        "parser.unexpected",
                    ))
                }
            }
        }

        let span = open_span.cover(close_span);
        let mut iter = segments.into_iter();
        let (_, mut items) = iter.next().expect("first segment");
        for (op, right) in iter {
            let op = op.expect("operator between segments");
            items = vec![ClassItem::Operation(ClassOperation {
                kind: op,
                left: items,
                right,
                span,
            })];
        }

        Ok(CharClass {
            negated,
            items,
            span,
        })
    }
}

/// Quantifiers may not follow anchors or other quantifiers.
fn quantifiable(node: &Node) -> bool {
    !matches!(node, Node::Anchor(_) | Node::Quantifier(_))
}

/// The `U` flag swaps the default greediness and the meaning of `?`.
fn effective_greediness(syntactic: Greediness, flags: crate::core::pattern::Flags) -> Greediness {
    if !flags.ungreedy {
        return syntactic;
    }
    match syntactic {
        Greediness::Greedy => Greediness::Lazy,
        Greediness::Lazy => Greediness::Greedy,
        Greediness::Possessive => Greediness::Possessive,
    }
}

/// Merge adjacent single-character literal nodes into string literals.
fn coalesce_literals(parts: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(parts.len());
    for part in parts {
        if let (Some(Node::Literal(prev)), Node::Literal(cur)) = (out.last_mut(), &part) {
            if prev.span.end == cur.span.start {
                prev.value.push_str(&cur.value);
                prev.span.end = cur.span.end;
                continue;
            }
        }
        out.push(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::pattern;

    fn parse_body(body: &str) -> ParseOutput {
        let p = pattern::split(&format!("/{}/", body), TargetVersion::default()).unwrap();
        parse(&p, 1024).unwrap()
    }

    fn body_of(out: &ParseOutput) -> &Node {
        match &out.root {
            Node::Regex(r) => &r.body,
            _ => panic!("expected Regex root"),
        }
    }

    fn parse_err(body: &str) -> Error {
        let p = pattern::split(&format!("/{}/", body), TargetVersion::default()).unwrap();
        parse(&p, 1024).unwrap_err()
    }

    #[test]
    fn test_literals_coalesce() {
        let out = parse_body("hello");
        match body_of(&out) {
            Node::Literal(l) => {
                assert_eq!(l.value, "hello");
                assert_eq!(l.span, Span::new(0, 5));
            }
            other => panic!("expected coalesced literal, got {:?}", other),
        }
    }

    #[test]
    fn test_quantifier_binds_last_char() {
        let out = parse_body("ab+");
        match body_of(&out) {
            Node::Sequence(seq) => {
                assert_eq!(seq.parts.len(), 2);
                assert!(matches!(&seq.parts[0], Node::Literal(l) if l.value == "a"));
                match &seq.parts[1] {
                    Node::Quantifier(q) => {
                        assert_eq!(q.min, 1);
                        assert_eq!(q.max, None);
                        assert!(matches!(&*q.child, Node::Literal(l) if l.value == "b"));
                    }
                    other => panic!("expected quantifier, got {:?}", other),
                }
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_alternation_in_group() {
        // /(a|b)+c/ parses to a sequence of quantified group and literal
        let out = parse_body("(a|b)+c");
        match body_of(&out) {
            Node::Sequence(seq) => {
                match &seq.parts[0] {
                    Node::Quantifier(q) => match &*q.child {
                        Node::Group(g) => {
                            assert!(matches!(&*g.body, Node::Alternation(a) if a.branches.len() == 2))
                        }
                        other => panic!("expected group, got {:?}", other),
                    },
                    other => panic!("expected quantifier, got {:?}", other),
                }
                assert!(matches!(&seq.parts[1], Node::Literal(l) if l.value == "c"));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_pattern_is_empty_sequence() {
        let out = parse_body("");
        assert!(body_of(&out).is_empty_sequence());
    }

    #[test]
    fn test_empty_alternation_branches_allowed() {
        let out = parse_body("a||b");
        match body_of(&out) {
            Node::Alternation(alt) => {
                assert_eq!(alt.branches.len(), 3);
                assert!(alt.branches[1].is_empty_sequence());
            }
            other => panic!("expected alternation, got {:?}", other),
        }
    }

    #[test]
    fn test_group_numbering() {
        let out = parse_body("(a)(?:b)(?<x>c)");
        assert_eq!(out.groups.count, 2);
        assert_eq!(out.groups.numbers_for("x"), &[2]);
    }

    #[test]
    fn test_branch_reset_numbering() {
        let out = parse_body("(?|(a)|(b)(c))(d)");
        assert_eq!(out.groups.count, 3);
    }

    #[test]
    fn test_conditional_group() {
        let out = parse_body("(a)(?(1)b|c)");
        match body_of(&out) {
            Node::Sequence(seq) => match &seq.parts[1] {
                Node::Conditional(c) => {
                    assert!(matches!(c.condition, CondRef::GroupNumber { number: 1 }));
                    assert!(c.else_branch.is_some());
                }
                other => panic!("expected conditional, got {:?}", other),
            },
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_three_branches_rejected() {
        let e = parse_err("(a)(?(1)b|c|d)");
        assert_eq!(e.code(), Some("parser.bad_conditional"));
    }

    #[test]
    fn test_class_with_range_and_type() {
        let out = parse_body(r"[a-z\d]");
        match body_of(&out) {
            Node::CharClass(cc) => {
                assert_eq!(cc.items.len(), 2);
                assert!(matches!(&cc.items[0], ClassItem::Range(r) if r.lo.ch == 'a' && r.hi.ch == 'z'));
                assert!(matches!(&cc.items[1], ClassItem::Type(t) if t.letter == 'd'));
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_class_operation_folds_left() {
        let out = parse_body("[[a-z]&&[aeiou]--[o]]");
        match body_of(&out) {
            Node::CharClass(cc) => match &cc.items[0] {
                ClassItem::Operation(op) => {
                    assert_eq!(op.kind, ClassOpKind::Difference);
                    assert!(matches!(&op.left[0], ClassItem::Operation(inner) if inner.kind == ClassOpKind::Intersection));
                }
                other => panic!("expected operation, got {:?}", other),
            },
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_range_with_type_endpoint_rejected() {
        let e = parse_err(r"[\d-z]");
        assert_eq!(e.code(), Some("range.bad_operand"));
    }

    #[test]
    fn test_dangling_quantifier() {
        let e = parse_err("*a");
        assert_eq!(e.code(), Some("parser.dangling_quantifier"));
    }

    #[test]
    fn test_quantified_anchor_rejected() {
        let e = parse_err("^*");
        assert_eq!(e.code(), Some("parser.dangling_quantifier"));
    }

    #[test]
    fn test_double_quantifier_rejected() {
        let e = parse_err("a**");
        assert_eq!(e.code(), Some("parser.dangling_quantifier"));
    }

    #[test]
    fn test_unbalanced_group() {
        let e = parse_err("(ab");
        assert_eq!(e.code(), Some("parser.unbalanced_group"));
    }

    #[test]
    fn test_unmatched_close() {
        let e = parse_err("ab)");
        assert_eq!(e.code(), Some("parser.unmatched_close"));
    }

    #[test]
    fn test_depth_limit() {
        let deep = "(".repeat(40) + "a" + &")".repeat(40);
        let p = pattern::split(&format!("/{}/", deep), TargetVersion::default()).unwrap();
        let err = parse(&p, 16).unwrap_err();
        assert!(matches!(err, Error::ResourceLimit { ref limit, .. } if limit == "recursion_depth"));
    }

    #[test]
    fn test_relative_backref_resolves() {
        let out = parse_body(r"(a)(b)\g{-1}");
        let mut found = None;
        body_of(&out).walk(&mut |n| {
            if let Node::Backreference(b) = n {
                found = b.by_number;
            }
        });
        assert_eq!(found, Some(2));
    }

    #[test]
    fn test_tolerant_collects_errors() {
        let p = pattern::split("/a)*b(/", TargetVersion::default()).unwrap();
        let out = parse_tolerant(&p, 1024);
        assert!(!out.errors.is_empty());
        let mut error_nodes = 0;
        out.root.walk(&mut |n| {
            if matches!(n, Node::Error(_)) {
                error_nodes += 1;
            }
        });
        assert!(error_nodes >= 1);
    }

    #[test]
    fn test_tolerant_on_valid_pattern_has_no_errors() {
        let p = pattern::split("/(a|b)+c/", TargetVersion::default()).unwrap();
        let out = parse_tolerant(&p, 1024);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_spans_cover_source() {
        let out = parse_body("(a|b)+c");
        match body_of(&out) {
            Node::Sequence(seq) => {
                assert_eq!(seq.parts[0].span(), Span::new(0, 6));
                assert_eq!(seq.parts[1].span(), Span::new(6, 7));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }
}
