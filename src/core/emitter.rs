//! Pattern writer: render an AST back to pattern text.
//!
//! Inverse of the parser up to literal coalescing: parsing the emitted
//! text yields a structurally equal AST. Used by the optimizer to produce
//! its output string and savings, and by the round-trip test properties.

use crate::core::nodes::*;
use crate::core::pattern::{Flags, Pattern};
use crate::core::tokens::{AnchorKind, CharLiteralKind, ClassOpKind, CondRef, Greediness, SubroutineTarget};

/// Render a full pattern (delimiter, body, flags) from a root node.
pub fn emit_pattern(root: &Node) -> Pattern {
    match root {
        Node::Regex(r) => Pattern {
            delimiter: r.delimiter,
            body: emit_body(&r.body, r.flags),
            flags: r.flags,
        },
        other => Pattern {
            delimiter: '/',
            body: emit_body(other, Flags::default()),
            flags: Flags::default(),
        },
    }
}

/// Render a subtree as pattern text under the given flags.
pub fn emit_body(node: &Node, flags: Flags) -> String {
    let mut out = String::new();
    emit_node(node, flags, &mut out);
    out
}

fn emit_node(node: &Node, flags: Flags, out: &mut String) {
    match node {
        Node::Regex(r) => emit_node(&r.body, r.flags, out),
        Node::Alternation(a) => {
            for (i, b) in a.branches.iter().enumerate() {
                if i > 0 {
                    out.push('|');
                }
                emit_node(b, flags, out);
            }
        }
        Node::Sequence(s) => {
            for p in &s.parts {
                if matches!(p, Node::Alternation(_)) {
                    out.push_str("(?:");
                    emit_node(p, flags, out);
                    out.push(')');
                } else {
                    emit_node(p, flags, out);
                }
            }
        }
        Node::Literal(l) => {
            for ch in l.value.chars() {
                push_escaped_literal(ch, flags, out);
            }
        }
        Node::CharLiteral(c) => push_char_literal(c.codepoint, c.kind, false, out),
        Node::Dot(_) => out.push('.'),
        Node::CharType(t) => {
            out.push('\\');
            out.push(t.letter);
        }
        Node::Anchor(a) => out.push_str(anchor_text(a.kind)),
        Node::CharClass(cc) => {
            // A lone property needs no brackets
            if !cc.negated && cc.items.len() == 1 {
                if let ClassItem::Property(p) = &cc.items[0] {
                    push_property(p, out);
                    return;
                }
            }
            push_class(cc, out);
        }
        Node::Quantifier(q) => {
            let needs_wrap = match &*q.child {
                Node::Sequence(_) | Node::Alternation(_) => true,
                Node::Literal(l) => l.value.chars().count() != 1,
                _ => false,
            };
            if needs_wrap {
                out.push_str("(?:");
                emit_node(&q.child, flags, out);
                out.push(')');
            } else {
                emit_node(&q.child, flags, out);
            }
            push_quantifier(q, flags, out);
        }
        Node::Group(g) => {
            match g.kind {
                GroupKind::Capturing => out.push('('),
                GroupKind::NonCapturing => out.push_str("(?:"),
                GroupKind::Named => {
                    out.push_str("(?<");
                    out.push_str(g.name.as_deref().unwrap_or(""));
                    out.push('>');
                }
                GroupKind::Atomic => out.push_str("(?>"),
                GroupKind::LookaheadPos => out.push_str("(?="),
                GroupKind::LookaheadNeg => out.push_str("(?!"),
                GroupKind::LookbehindPos => out.push_str("(?<="),
                GroupKind::LookbehindNeg => out.push_str("(?<!"),
                GroupKind::BranchReset => out.push_str("(?|"),
                GroupKind::InlineFlags => {
                    out.push_str("(?");
                    if let Some(on) = &g.flags_on {
                        out.push_str(&on.letters());
                    }
                    if let Some(off) = &g.flags_off {
                        if !off.is_empty() {
                            out.push('-');
                            out.push_str(&off.letters());
                        }
                    }
                    if g.body.is_empty_sequence() {
                        out.push(')');
                        return;
                    }
                    out.push(':');
                }
            }
            let inner_flags = match (&g.flags_on, &g.flags_off) {
                (Some(on), Some(off)) => flags.apply_inline(on, off),
                _ => flags,
            };
            emit_node(&g.body, inner_flags, out);
            out.push(')');
        }
        Node::Define(d) => {
            out.push_str("(?(DEFINE)");
            emit_node(&d.body, flags, out);
            out.push(')');
        }
        Node::Conditional(c) => {
            out.push_str("(?(");
            match &c.condition {
                CondRef::GroupNumber { number } => out.push_str(&number.to_string()),
                CondRef::GroupName { name } => {
                    out.push('<');
                    out.push_str(name);
                    out.push('>');
                }
                CondRef::Recursion => out.push('R'),
            }
            out.push(')');
            emit_node(&c.then_branch, flags, out);
            if let Some(e) = &c.else_branch {
                out.push('|');
                emit_node(e, flags, out);
            }
            out.push(')');
        }
        Node::Backreference(b) => {
            if let Some(name) = &b.by_name {
                out.push_str("\\k<");
                out.push_str(name);
                out.push('>');
            } else if let Some(n) = b.by_number {
                // \g{n} avoids the octal/backreference ambiguity of \n
                out.push_str("\\g{");
                out.push_str(&n.to_string());
                out.push('}');
            }
        }
        Node::Subroutine(s) => match &s.target {
            SubroutineTarget::WholePattern => out.push_str("(?R)"),
            SubroutineTarget::Number(n) => {
                out.push_str("(?");
                out.push_str(&n.to_string());
                out.push(')');
            }
            SubroutineTarget::Name(name) => {
                out.push_str("(?&");
                out.push_str(name);
                out.push(')');
            }
        },
        Node::Error(_) => {}
    }
}

fn anchor_text(kind: AnchorKind) -> &'static str {
    match kind {
        AnchorKind::Start => "^",
        AnchorKind::End => "$",
        AnchorKind::StartOfString => "\\A",
        AnchorKind::EndOfString => "\\z",
        AnchorKind::EndBeforeNewline => "\\Z",
        AnchorKind::WordBoundary => "\\b",
        AnchorKind::NonWordBoundary => "\\B",
        AnchorKind::MatchStart => "\\G",
        AnchorKind::Keep => "\\K",
    }
}

fn push_quantifier(q: &Quantifier, flags: Flags, out: &mut String) {
    match (q.min, q.max) {
        (0, None) => out.push('*'),
        (1, None) => out.push('+'),
        (0, Some(1)) => out.push('?'),
        (min, None) => out.push_str(&format!("{{{},}}", min)),
        (min, Some(max)) if min == max => out.push_str(&format!("{{{}}}", min)),
        (min, Some(max)) => out.push_str(&format!("{{{},{}}}", min, max)),
    }
    // Under U the bare form is lazy and `?` makes it greedy
    let suffix = match (q.greediness, flags.ungreedy) {
        (Greediness::Lazy, false) | (Greediness::Greedy, true) => "?",
        (Greediness::Possessive, _) => "+",
        _ => "",
    };
    out.push_str(suffix);
}

fn push_escaped_literal(ch: char, flags: Flags, out: &mut String) {
    match ch {
        '\\' | '.' | '^' | '$' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' => {
            out.push('\\');
            out.push(ch);
        }
        '#' if flags.extended => {
            out.push('\\');
            out.push(ch);
        }
        c if flags.extended && c.is_whitespace() => match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => {
                out.push('\\');
                out.push(c);
            }
        },
        c => out.push(c),
    }
}

fn push_char_literal(cp: char, kind: CharLiteralKind, in_class: bool, out: &mut String) {
    match kind {
        CharLiteralKind::Raw => {
            if in_class {
                push_escaped_class_char(cp, out);
            } else {
                push_escaped_literal(cp, Flags::default(), out);
            }
        }
        CharLiteralKind::Control => match cp {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{000C}' => out.push_str("\\f"),
            '\u{0007}' => out.push_str("\\a"),
            '\u{001B}' => out.push_str("\\e"),
            c => {
                // \cX round-trips any remaining control value
                let x = ((c as u32) ^ 0x40) as u8 as char;
                out.push_str("\\c");
                out.push(x);
            }
        },
        CharLiteralKind::Hex => out.push_str(&format!("\\x{{{:X}}}", cp as u32)),
        CharLiteralKind::Octal => {
            if (cp as u32) <= 0o77 {
                out.push_str(&format!("\\0{:o}", cp as u32));
            } else {
                out.push_str(&format!("\\x{{{:X}}}", cp as u32));
            }
        }
        CharLiteralKind::Unicode => out.push_str(&format!("\\u{:04X}", cp as u32)),
        CharLiteralKind::UnicodeNamed => out.push_str(&format!("\\N{{U+{:04X}}}", cp as u32)),
    }
}

fn push_escaped_class_char(ch: char, out: &mut String) {
    match ch {
        '\\' | ']' | '^' | '-' | '[' | '&' | '~' => {
            out.push('\\');
            out.push(ch);
        }
        c => out.push(c),
    }
}

fn push_property(p: &ClassProperty, out: &mut String) {
    out.push('\\');
    out.push(if p.negated { 'P' } else { 'p' });
    out.push('{');
    out.push_str(&p.name);
    out.push('}');
}

fn push_class(cc: &CharClass, out: &mut String) {
    out.push('[');
    if cc.negated {
        out.push('^');
    }
    push_class_items(&cc.items, out);
    out.push(']');
}

fn push_class_items(items: &[ClassItem], out: &mut String) {
    for item in items {
        match item {
            ClassItem::Char(c) => push_char_literal(c.ch, c.kind, true, out),
            ClassItem::Range(r) => {
                push_char_literal(r.lo.ch, r.lo.kind, true, out);
                out.push('-');
                push_char_literal(r.hi.ch, r.hi.kind, true, out);
            }
            ClassItem::Type(t) => {
                out.push('\\');
                out.push(t.letter);
            }
            ClassItem::Property(p) => push_property(p, out),
            ClassItem::Nested(nested) => push_class(nested, out),
            ClassItem::Operation(op) => {
                push_class_items(&op.left, out);
                out.push_str(match op.kind {
                    ClassOpKind::Union => "",
                    ClassOpKind::Intersection => "&&",
                    ClassOpKind::Difference => "--",
                    ClassOpKind::SymmetricDifference => "~~",
                });
                push_class_items(&op.right, out);
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

    fn round_trip(source: &str) -> String {
        let p = split(source, TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        emit_pattern(&out.root).to_delimited()
    }

    fn assert_stable(source: &str) {
        // Emitted text reparses to a structurally identical AST
        let first = round_trip(source);
        let second = round_trip(&first);
        assert_eq!(first, second, "emitter not stable for {}", source);
    }

    #[test]
    fn test_simple_round_trips() {
        assert_eq!(round_trip("/abc/"), "/abc/");
        assert_eq!(round_trip("/(a|b)+c/"), "/(a|b)+c/");
        assert_eq!(round_trip("/^a{2,5}?$/i"), "/^a{2,5}?$/i");
        assert_eq!(round_trip(r"/[a-z\d]/"), r"/[a-z\d]/");
    }

    #[test]
    fn test_group_kinds_round_trip() {
        for src in [
            "/(?:ab)/",
            "/(?<name>x)/",
            "/(?>ab)/",
            "/(?=a)(?!b)(?<=c)(?<!d)/",
            "/(?|(a)|(b))/",
            "/(?i:x)/",
            "/(a)(?(1)b|c)/",
            "/(?(DEFINE)(?<n>x))/",
            "/(a)(?1)(?R)/",
        ] {
            assert_stable(src);
        }
    }

    #[test]
    fn test_escapes_round_trip() {
        assert_stable(r"/a\.b\*c/");
        assert_stable(r"/\x{1F600}\n\t/");
        assert_stable(r"/[\]a^-]/");
    }

    #[test]
    fn test_backref_emits_unambiguous_form() {
        assert_eq!(round_trip(r"/(a)\1/"), r"/(a)\g{1}/");
        assert_stable(r"/(a)\g{1}/");
    }

    #[test]
    fn test_class_operation_round_trip() {
        assert_stable("/[[a-z]&&[aeiou]]/");
        assert_stable("/[[a-z]--[m]]/");
    }

    #[test]
    fn test_extended_mode_escapes_whitespace() {
        // In x mode the space is insignificant and disappears from the AST
        let p = split("/a b/x", TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        let emitted = emit_pattern(&out.root);
        assert_eq!(emitted.body, "ab");
    }

    #[test]
    fn test_quantified_wrap() {
        // Optimizer-style tree: quantifier over a multi-char literal
        use crate::core::Span;
        let node = Node::Quantifier(Quantifier {
            child: Box::new(Node::Literal(Literal {
                value: "ab".to_string(),
                span: Span::default(),
            })),
            min: 2,
            max: Some(2),
            greediness: Greediness::Greedy,
            span: Span::default(),
        });
        assert_eq!(emit_body(&node, Flags::default()), "(?:ab){2}");
    }
}
