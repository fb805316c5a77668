//! Regular-subset gate.
//!
//! Walks the AST and fails fast on every feature the automata pipeline
//! cannot express, so NFA/DFA construction and the solver operate on a
//! guaranteed-regular sublanguage. The check is deliberately syntactic:
//! a pattern is rejected even when its non-regular construct is vacuous.

use crate::core::errors::Error;
use crate::core::nodes::*;
use crate::core::tokens::{AnchorKind, Greediness};

/// What the caller is willing to let through.
#[derive(Debug, Clone, Copy)]
pub struct RegularityOptions {
    /// Reject possessive quantifiers. They do not change the recognized
    /// language, but strict callers want them surfaced rather than erased.
    pub strict_possessive: bool,
    /// Admit lookarounds whose body can match empty. A positive assertion
    /// with a nullable body is vacuously true (erased during
    /// construction); its negative dual is never true.
    pub allow_trivial_lookaround: bool,
}

impl Default for RegularityOptions {
    fn default() -> Self {
        RegularityOptions {
            strict_possessive: true,
            allow_trivial_lookaround: false,
        }
    }
}

/// Verify that the AST stays inside the regular sublanguage.
pub fn ensure_regular(node: &Node, options: &RegularityOptions) -> Result<(), Error> {
    let mut result = Ok(());
    node.walk(&mut |n| {
        if result.is_err() {
            return;
        }
        if let Some(reason) = refusal(n, options) {
            result = Err(Error::Complexity {
                reason,
                span: Some(n.span()),
            });
        }
    });
    result
}

fn refusal(node: &Node, options: &RegularityOptions) -> Option<String> {
    match node {
        Node::Backreference(_) => Some("backreferences are not regular".to_string()),
        Node::Subroutine(_) => {
            Some("recursion and subroutine calls are not regular".to_string())
        }
        Node::Conditional(_) => Some("conditional groups are not regular".to_string()),
        Node::Define(_) => Some("(?(DEFINE)...) groups are not supported".to_string()),
        Node::Group(g) if g.kind == GroupKind::Atomic => {
            Some("atomic groups are not supported".to_string())
        }
        Node::Group(g) if g.kind.is_lookaround() => {
            if options.allow_trivial_lookaround && crate::core::analysis::is_nullable(&g.body) {
                None
            } else {
                Some("lookaround assertions are not supported".to_string())
            }
        }
        Node::Quantifier(q)
            if options.strict_possessive && q.greediness == Greediness::Possessive =>
        {
            Some("possessive quantifiers are not supported in strict mode".to_string())
        }
        Node::Anchor(a)
            if matches!(
                a.kind,
                AnchorKind::WordBoundary
                    | AnchorKind::NonWordBoundary
                    | AnchorKind::Keep
            ) =>
        {
            Some("word-boundary and \\K assertions are not supported".to_string())
        }
        Node::CharClass(cc) if has_property(cc) => {
            Some("unicode property classes are not supported".to_string())
        }
        Node::Error(_) => Some("pattern contains unparsable spans".to_string()),
        _ => None,
    }
}

fn has_property(cc: &CharClass) -> bool {
    fn items_have(items: &[ClassItem]) -> bool {
        items.iter().any(|i| match i {
            ClassItem::Property(_) => true,
            ClassItem::Nested(n) => has_property(n),
            ClassItem::Operation(op) => items_have(&op.left) || items_have(&op.right),
            _ => false,
        })
    }
    items_have(&cc.items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn gate(body: &str) -> Result<(), Error> {
        gate_with(body, RegularityOptions::default())
    }

    fn gate_with(body: &str, options: RegularityOptions) -> Result<(), Error> {
        let p = split(&format!("/{}/", body), TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        ensure_regular(&out.root, &options)
    }

    #[test]
    fn test_regular_patterns_pass() {
        for body in ["(a|b)+c", "^[0-9]+$", "a{2,5}", "(?:x)(?<n>y)", "a|", ""] {
            assert!(gate(body).is_ok(), "{} should be regular", body);
        }
    }

    #[test]
    fn test_non_regular_features_refused() {
        for body in [r"(a)\1", "(?R)", "(a)(?1)", "(a)(?(1)b)", "(?>ab)", "(?=x)y", r"a\bb", r"\p{L}"] {
            let err = gate(body).unwrap_err();
            assert!(
                matches!(err, Error::Complexity { .. }),
                "{} should be refused",
                body
            );
        }
    }

    #[test]
    fn test_possessive_strictness() {
        assert!(gate("a++b").is_err());
        let lax = RegularityOptions {
            strict_possessive: false,
            ..Default::default()
        };
        assert!(gate_with("a++b", lax).is_ok());
    }

    #[test]
    fn test_trivial_lookaround_opt_in() {
        let opts = RegularityOptions {
            allow_trivial_lookaround: true,
            ..Default::default()
        };
        assert!(gate_with("(?=$)a", opts).is_ok());
        assert!(gate_with("(?=ab)a", opts).is_err());
    }

    #[test]
    fn test_error_span_points_at_culprit() {
        let err = gate(r"ab(?>c)").unwrap_err();
        match err {
            Error::Complexity { span, .. } => {
                assert_eq!(span.unwrap().start, 2);
            }
            other => panic!("expected complexity error, got {:?}", other),
        }
    }
}
