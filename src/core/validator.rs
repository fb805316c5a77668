//! Semantic validation over the AST.
//!
//! A single depth-first traversal checks group references, quantifier and
//! range sanity, lookbehind boundedness, duplicate names and inline-flag
//! scoping. Every rule carries a stable error code. Structural rules have
//! already been enforced by the parser; everything here is about meaning,
//! not shape.

use crate::config::Config;
use crate::core::analysis::{complexity_score, max_len, min_len};
use crate::core::errors::{Error, ErrorCategory, SourceError};
use crate::core::hints::hint_for;
use crate::core::nodes::*;
use crate::core::parser::ParseOutput;
use crate::core::pattern::Pattern;
use crate::core::tokens::{CondRef, SubroutineTarget};
use serde::{Deserialize, Serialize};

/// Outcome of validation, shaped for the public API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "complexityScore")]
    pub complexity_score: u32,
}

impl ValidationResult {
    pub fn ok(score: u32) -> Self {
        ValidationResult {
            valid: true,
            error: None,
            category: None,
            offset: None,
            snippet: None,
            hint: None,
            code: None,
            complexity_score: score,
        }
    }

    pub fn from_error(e: &Error, score: u32) -> Self {
        ValidationResult {
            valid: false,
            error: Some(e.to_string()),
            category: Some(e.category()),
            offset: e.offset(),
            snippet: e.snippet(),
            hint: e.hint().map(str::to_string),
            code: e.code().map(str::to_string),
            complexity_score: score,
        }
    }
}

/// Validate a parsed pattern. Returns the first violated rule.
pub fn validate(out: &ParseOutput, pattern: &Pattern, config: &Config) -> Result<(), Error> {
    if pattern.body.len() > config.max_pattern_length {
        return Err(Error::ResourceLimit {
            limit: "pattern_length".to_string(),
            observed: pattern.body.len() as u64,
            max: config.max_pattern_length as u64,
        });
    }

    check_duplicate_names(out, pattern)?;

    let mut checker = Checker {
        pattern,
        config,
        groups: &out.groups,
    };
    checker.walk(&out.root)
}

struct Checker<'a> {
    pattern: &'a Pattern,
    config: &'a Config,
    groups: &'a GroupMap,
}

impl<'a> Checker<'a> {
    fn err(&self, message: impl Into<String>, pos: usize, code: &str) -> Error {
        Error::Validation(
            SourceError::new(message, pos, &self.pattern.body, code).with_hint(hint_for(code)),
        )
    }

    fn walk(&mut self, node: &Node) -> Result<(), Error> {
        self.check(node)?;
        let mut result = Ok(());
        node.for_each_child(&mut |child| {
            if result.is_ok() {
                result = self.walk(child);
            }
        });
        result
    }

    fn check(&mut self, node: &Node) -> Result<(), Error> {
        match node {
            Node::Quantifier(q) => self.check_quantifier(q),
            Node::CharClass(cc) => self.check_class(cc),
            Node::Group(g) => self.check_group(g),
            Node::Backreference(b) => self.check_backref(b),
            Node::Conditional(c) => self.check_conditional(c),
            Node::Subroutine(s) => self.check_subroutine(s),
            _ => Ok(()),
        }
    }

    fn check_quantifier(&self, q: &Quantifier) -> Result<(), Error> {
        if let Some(max) = q.max {
            if max < q.min {
                return Err(self.err(
                    format!("Quantifier maximum {} is smaller than minimum {}", max, q.min),
                    q.span.start,
                    "quantifier.reversed",
                ));
            }
        }
        let bound = self.config.max_quantifier;
        let largest = q.max.unwrap_or(q.min);
        if q.min > bound || largest > bound {
            return Err(self.err(
                format!("Quantifier bound {} exceeds the maximum of {}", largest.max(q.min), bound),
                q.span.start,
                "quantifier.too_large",
            ));
        }
        Ok(())
    }

    fn check_class(&self, cc: &CharClass) -> Result<(), Error> {
        self.check_class_items(&cc.items)
    }

    fn check_class_items(&self, items: &[ClassItem]) -> Result<(), Error> {
        for item in items {
            match item {
                ClassItem::Range(r) => {
                    if r.lo.ch > r.hi.ch {
                        return Err(self.err(
                            format!(
                                "Range '{}-{}' is reversed by codepoint",
                                r.lo.ch.escape_default(),
                                r.hi.ch.escape_default()
                            ),
                            r.span.start,
                            "range.reversed",
                        ));
                    }
                }
                ClassItem::Nested(nested) => self.check_class(nested)?,
                ClassItem::Operation(op) => {
                    if op.left.is_empty() || op.right.is_empty() {
                        return Err(self.err(
                            "Class operation requires a class expression on both sides",
                            op.span.start,
                            "class.bad_operand",
                        ));
                    }
                    self.check_class_items(&op.left)?;
                    self.check_class_items(&op.right)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_group(&self, g: &Group) -> Result<(), Error> {
        if g.kind.is_lookbehind() {
            let max = match max_len(&g.body) {
                Some(m) => m,
                None => {
                    return Err(self.err(
                        "Lookbehind body has unbounded length",
                        g.span.start,
                        "lookbehind.unbounded",
                    ))
                }
            };
            let cap = self.config.max_lookbehind_length as u64;
            if max > cap {
                return Err(self.err(
                    format!("Lookbehind length {} exceeds the maximum of {}", max, cap),
                    g.span.start,
                    "lookbehind.too_long",
                ));
            }
            if !self.config.target_version.allows_variable_lookbehind() && min_len(&g.body) != max {
                return Err(self.err(
                    format!(
                        "Variable-length lookbehind requires version 8.2, targeting {}",
                        self.config.target_version
                    ),
                    g.span.start,
                    "lookbehind.variable",
                ));
            }
        }

        if g.kind == GroupKind::InlineFlags {
            if let (Some(on), Some(off)) = (&g.flags_on, &g.flags_off) {
                let conflict: Vec<char> = on
                    .letters()
                    .chars()
                    .filter(|c| off.letters().contains(*c))
                    .collect();
                if !conflict.is_empty() {
                    return Err(self.err(
                        format!(
                            "Flag(s) '{}' both set and cleared in the same group",
                            conflict.iter().collect::<String>()
                        ),
                        g.span.start,
                        "flags.bad_scope",
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_backref(&self, b: &Backreference) -> Result<(), Error> {
        if let Some(n) = b.by_number {
            let declared = self
                .groups
                .span_of(n)
                .filter(|span| span.start < b.span.start);
            if n == 0 || declared.is_none() {
                return Err(self.err(
                    format!(
                        "Backreference \\{} has no corresponding capturing group ({} defined)",
                        n, self.groups.count
                    ),
                    b.span.start,
                    "backref.missing",
                ));
            }
        }
        if let Some(name) = &b.by_name {
            let numbers = self.groups.numbers_for(name);
            if numbers.is_empty() {
                return Err(self.err(
                    format!("Backreference to unknown group name '{}'", name),
                    b.span.start,
                    "backref.unknown_name",
                ));
            }
            let declared_before = self
                .groups
                .groups
                .iter()
                .any(|g| g.name.as_deref() == Some(name) && g.span.start < b.span.start);
            if !declared_before {
                return Err(self.err(
                    format!("Group '{}' is declared after the reference to it", name),
                    b.span.start,
                    "backref.unknown_name",
                ));
            }
        }
        Ok(())
    }

    fn check_conditional(&self, c: &Conditional) -> Result<(), Error> {
        match &c.condition {
            CondRef::GroupNumber { number } => {
                if *number == 0 || self.groups.span_of(*number).is_none() {
                    return Err(self.err(
                        format!("Conditional references non-existent group {}", number),
                        c.span.start,
                        "backref.missing",
                    ));
                }
            }
            CondRef::GroupName { name } => {
                if self.groups.numbers_for(name).is_empty() {
                    return Err(self.err(
                        format!("Conditional references unknown group name '{}'", name),
                        c.span.start,
                        "backref.unknown_name",
                    ));
                }
            }
            CondRef::Recursion => {}
        }
        Ok(())
    }

    fn check_subroutine(&self, s: &Subroutine) -> Result<(), Error> {
        match &s.target {
            SubroutineTarget::Number(n) => {
                if *n != 0 && self.groups.span_of(*n).is_none() {
                    return Err(self.err(
                        format!("Subroutine call references non-existent group {}", n),
                        s.span.start,
                        "backref.missing",
                    ));
                }
            }
            SubroutineTarget::Name(name) => {
                if self.groups.numbers_for(name).is_empty() {
                    return Err(self.err(
                        format!("Subroutine call references unknown group name '{}'", name),
                        s.span.start,
                        "backref.unknown_name",
                    ));
                }
            }
            SubroutineTarget::WholePattern => {}
        }
        Ok(())
    }
}

/// Duplicate names are allowed only inside the same branch-reset group, or
/// anywhere under the `J` flag.
fn check_duplicate_names(out: &ParseOutput, pattern: &Pattern) -> Result<(), Error> {
    if pattern.flags.dup_names {
        return Ok(());
    }
    for (i, g) in out.groups.groups.iter().enumerate() {
        let Some(name) = &g.name else { continue };
        for earlier in &out.groups.groups[..i] {
            if earlier.name.as_deref() == Some(name) {
                let same_reset =
                    earlier.branch_reset.is_some() && earlier.branch_reset == g.branch_reset;
                if !same_reset {
                    return Err(Error::Validation(
                        SourceError::new(
                            format!("Duplicate group name '{}'", name),
                            g.span.start,
                            &pattern.body,
                            "group.duplicate_name",
                        )
                        .with_hint(hint_for("group.duplicate_name")),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Compile the pattern with the host runtime matcher, surfacing failures
/// that only the runtime can detect (feature gating, size blowups).
pub fn runtime_validate(pattern: &Pattern) -> Result<(), Error> {
    let mut builder = regex::RegexBuilder::new(&pattern.body);
    builder
        .case_insensitive(pattern.flags.ignore_case)
        .multi_line(pattern.flags.multiline)
        .dot_matches_new_line(pattern.flags.dot_all)
        .ignore_whitespace(pattern.flags.extended)
        .unicode(pattern.flags.unicode);
    builder.build().map(|_| ()).map_err(|e| Error::RuntimeCompilation {
        message: e.to_string(),
    })
}

/// Validate and shape the outcome for the public API.
pub fn validation_result(out: &ParseOutput, pattern: &Pattern, config: &Config) -> ValidationResult {
    let score = complexity_score(&out.root);
    match validate(out, pattern, config) {
        Ok(()) => {
            if config.runtime_validation {
                if let Err(e) = runtime_validate(pattern) {
                    return ValidationResult::from_error(&e, score);
                }
            }
            ValidationResult::ok(score)
        }
        Err(e) => ValidationResult::from_error(&e, score),
    }
}
