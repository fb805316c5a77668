//! Single entry point composing the whole pipeline.
//!
//! A [`Facade`] owns an immutable [`Config`] and exposes parse, validate,
//! optimize, explain, literal extraction and ReDoS analysis; the
//! [`LanguageSolver`] is the sibling facade for two-pattern decision
//! questions. Parse and NFA results are memoized through the configured
//! cache; cache failures silently degrade to recomputation.

use crate::automata::nfa::Nfa;
use crate::automata::regular::RegularityOptions;
use crate::automata::solver::{
    self, CompileBudget, EquivalenceOutcome, SolverOptions, SolverOutcome,
};
use crate::cache::generate_key;
use crate::config::Config;
use crate::core::emitter::emit_pattern;
use crate::core::errors::{Error, Result};
use crate::core::literals::{literals, LiteralOptions, LiteralSet};
use crate::core::nodes::{GroupKind, Node};
use crate::core::optimizer::{optimize, OptimizeOptions, OptimizeResult};
use crate::core::parser::{self, ParseOutput, TolerantOutput};
use crate::core::pattern::{self, Pattern};
use crate::core::validator::{validation_result, ValidationResult};
use crate::redos::{analyze as redos_analyze, RedosOptions, RedosReport, Severity};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Output format for [`Facade::explain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExplainFormat {
    Text,
    Json,
}

/// Combined single-pattern report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub pattern: String,
    pub valid: bool,
    pub validation: ValidationResult,
    #[serde(rename = "groupCount")]
    pub group_count: u32,
    #[serde(rename = "namedGroups")]
    pub named_groups: Vec<String>,
    #[serde(rename = "featuresUsed")]
    pub features_used: Vec<String>,
    pub literals: LiteralSet,
    #[serde(rename = "redosSeverity")]
    pub redos_severity: Severity,
}

/// The single entry point; safe for concurrent read-only use.
pub struct Facade {
    config: Config,
}

impl Facade {
    pub fn new(config: Config) -> Self {
        Facade { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Split a source string, enforcing the pattern length ceiling.
    pub fn split(&self, source: &str) -> Result<Pattern> {
        let p = pattern::split(source, self.config.target_version)?;
        if p.body.len() > self.config.max_pattern_length {
            return Err(Error::ResourceLimit {
                limit: "pattern_length".to_string(),
                observed: p.body.len() as u64,
                max: self.config.max_pattern_length as u64,
            });
        }
        Ok(p)
    }

    /// Parse a pattern to its AST, memoized through the cache.
    pub fn parse(&self, source: &str) -> Result<ParseOutput> {
        let p = self.split(source)?;

        let key = self.cache_key("parse", source);
        if let Some(root) = self.cache_load::<Node>(&key) {
            let mut root = root;
            let groups = crate::core::nodes::GroupMap::assign(&mut root);
            return Ok(ParseOutput { root, groups });
        }

        let out = parser::parse(&p, self.config.max_recursion_depth)?;
        self.cache_store(&key, &out.root);
        Ok(out)
    }

    /// Parse without aborting; errors land in the output.
    pub fn parse_tolerant(&self, source: &str) -> Result<TolerantOutput> {
        let p = self.split(source)?;
        Ok(parser::parse_tolerant(&p, self.config.max_recursion_depth))
    }

    /// Validate a pattern; parse failures shape into the result rather
    /// than erroring.
    pub fn validate(&self, source: &str) -> ValidationResult {
        let parsed = self
            .split(source)
            .and_then(|p| parser::parse(&p, self.config.max_recursion_depth).map(|o| (p, o)));
        match parsed {
            Ok((p, out)) => validation_result(&out, &p, &self.config),
            Err(e) => ValidationResult::from_error(&e, 0),
        }
    }

    /// Optimize a pattern and report savings.
    pub fn optimize(&self, source: &str, options: &OptimizeOptions) -> Result<OptimizeResult> {
        let out = self.parse(source)?;
        let (_, result) = optimize(&out.root, options);
        debug!(changed = result.changed, savings = result.savings, "optimized");
        Ok(result)
    }

    /// Render the AST for humans (`Text`) or tools (`Json`).
    pub fn explain(&self, source: &str, format: ExplainFormat) -> Result<String> {
        let out = self.parse(source)?;
        match format {
            ExplainFormat::Json => {
                serde_json::to_string_pretty(&out.root).map_err(|e| Error::Cache {
                    message: format!("serialization failed: {}", e),
                })
            }
            ExplainFormat::Text => Ok(render_tree(&out.root)),
        }
    }

    /// ReDoS analysis, honoring the configured allow-list.
    pub fn redos(&self, source: &str, options: &RedosOptions) -> Result<RedosReport> {
        let p = self.split(source)?;
        if self
            .config
            .redos_ignored_patterns
            .iter()
            .any(|ignored| ignored == source || *ignored == p.body)
        {
            return Ok(RedosReport {
                severity: Severity::Safe,
                score: 0,
                findings: Vec::new(),
                confirmation: None,
            });
        }
        let out = self.parse(source)?;
        Ok(redos_analyze(&out.root, p.flags, options))
    }

    /// Bounded literal prefix/suffix extraction.
    pub fn literals(&self, source: &str, options: LiteralOptions) -> Result<LiteralSet> {
        let out = self.parse(source)?;
        Ok(literals(&out.root, options))
    }

    /// Combined report: validation, structure, features, literals, risk.
    pub fn analyze(&self, source: &str) -> Result<Report> {
        let p = self.split(source)?;
        let out = self.parse(source)?;
        let validation = validation_result(&out, &p, &self.config);
        let redos = redos_analyze(&out.root, p.flags, &RedosOptions::default());
        Ok(Report {
            pattern: emit_pattern(&out.root).to_delimited(),
            valid: validation.valid,
            group_count: out.groups.count,
            named_groups: out.groups.names.keys().cloned().collect(),
            features_used: features_used(&out.root),
            literals: literals(&out.root, LiteralOptions::default()),
            redos_severity: redos.severity,
            validation,
        })
    }

    // ---- cache plumbing ----

    fn cache_key(&self, stage: &str, input: &str) -> String {
        let seed = format!("{};{}", stage, self.config.option_bits());
        generate_key(input, &seed)
    }

    fn cache_load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.config.cache.as_ref()?;
        let bytes = cache.load(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(_) => None,
        }
    }

    fn cache_store<T: Serialize>(&self, key: &str, value: &T) {
        let Some(cache) = self.config.cache.as_ref() else {
            return;
        };
        if let Ok(bytes) = serde_json::to_vec(value) {
            cache.write(key, &bytes);
        }
    }
}

/// Feature inventory of a parsed pattern, for reports.
fn features_used(root: &Node) -> Vec<String> {
    let mut features = std::collections::BTreeSet::new();
    root.walk(&mut |n| {
        let name = match n {
            Node::Group(g) => match g.kind {
                GroupKind::Named => Some("named_group"),
                GroupKind::Atomic => Some("atomic_group"),
                GroupKind::LookaheadPos | GroupKind::LookaheadNeg => Some("lookahead"),
                GroupKind::LookbehindPos | GroupKind::LookbehindNeg => Some("lookbehind"),
                GroupKind::BranchReset => Some("branch_reset"),
                GroupKind::InlineFlags => Some("inline_flags"),
                _ => None,
            },
            Node::Backreference(_) => Some("backreference"),
            Node::Subroutine(_) => Some("subroutine_call"),
            Node::Conditional(_) => Some("conditional"),
            Node::Define(_) => Some("define"),
            Node::Quantifier(q)
                if q.greediness == crate::core::tokens::Greediness::Possessive =>
            {
                Some("possessive_quantifier")
            }
            Node::CharClass(cc) if class_uses_property(cc) => Some("unicode_property"),
            _ => None,
        };
        if let Some(name) = name {
            features.insert(name.to_string());
        }
    });
    features.into_iter().collect()
}

fn class_uses_property(cc: &crate::core::nodes::CharClass) -> bool {
    use crate::core::nodes::ClassItem;
    fn items(list: &[ClassItem]) -> bool {
        list.iter().any(|i| match i {
            ClassItem::Property(_) => true,
            ClassItem::Nested(n) => items(&n.items),
            ClassItem::Operation(op) => items(&op.left) || items(&op.right),
            _ => false,
        })
    }
    items(&cc.items)
}

/// Indented textual rendering of the AST.
fn render_tree(root: &Node) -> String {
    fn render(node: &Node, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let label = match node {
            Node::Regex(r) => format!("Regex flags={}", r.flags.letters()),
            Node::Alternation(a) => format!("Alternation ({} branches)", a.branches.len()),
            Node::Sequence(s) => format!("Sequence ({} parts)", s.parts.len()),
            Node::Literal(l) => format!("Literal {:?}", l.value),
            Node::CharLiteral(c) => format!("CharLiteral {:?} ({:?})", c.codepoint, c.kind),
            Node::Dot(_) => "Dot".to_string(),
            Node::CharClass(cc) => format!(
                "CharClass negated={} ({} items)",
                cc.negated,
                cc.items.len()
            ),
            Node::CharType(t) => format!("CharType \\{}", t.letter),
            Node::Anchor(a) => format!("Anchor {:?}", a.kind),
            Node::Quantifier(q) => format!(
                "Quantifier {}..{} {:?}",
                q.min,
                q.max.map(|m| m.to_string()).unwrap_or_else(|| "∞".to_string()),
                q.greediness
            ),
            Node::Group(g) => match (&g.name, g.number) {
                (Some(name), _) => format!("Group {:?} name={}", g.kind, name),
                (None, Some(n)) => format!("Group {:?} #{}", g.kind, n),
                _ => format!("Group {:?}", g.kind),
            },
            Node::Define(_) => "Define".to_string(),
            Node::Conditional(c) => format!("Conditional {:?}", c.condition),
            Node::Backreference(b) => match (&b.by_name, b.by_number) {
                (Some(name), _) => format!("Backreference name={}", name),
                (None, Some(n)) => format!("Backreference #{}", n),
                _ => "Backreference".to_string(),
            },
            Node::Subroutine(s) => format!("Subroutine {:?}", s.target),
            Node::Error(e) => format!("Error {:?}", e.message),
        };
        out.push_str(&pad);
        out.push_str(&label);
        out.push('\n');
        node.for_each_child(&mut |c| render(c, depth + 1, out));
    }
    let mut out = String::new();
    render(root, 0, &mut out);
    out
}

// ---- Language solver facade ----

/// Sibling facade for two-pattern decision questions.
pub struct LanguageSolver<'a> {
    facade: &'a Facade,
}

impl<'a> LanguageSolver<'a> {
    pub fn new(facade: &'a Facade) -> Self {
        LanguageSolver { facade }
    }

    fn budget(&self) -> CompileBudget {
        CompileBudget {
            dfa_state_limit: self.facade.config.dfa_state_limit,
            alphabet_limit: self.facade.config.alphabet_limit,
        }
    }

    /// Compile one side to an NFA, memoized through the cache.
    fn nfa_for(&self, source: &str, options: &SolverOptions) -> Result<Nfa> {
        let stage = format!(
            "nfa;{:?};{}",
            options.match_mode, options.allow_trivial_lookaround
        );
        let key = self.facade.cache_key(&stage, source);
        if let Some(nfa) = self.facade.cache_load::<Nfa>(&key) {
            return Ok(nfa);
        }
        let p = self.facade.split(source)?;
        let out = self.facade.parse(source)?;
        let regularity = RegularityOptions {
            allow_trivial_lookaround: options.allow_trivial_lookaround,
            ..Default::default()
        };
        let nfa = solver::compile_nfa(&out.root, p.flags, options.match_mode, &regularity)?;
        self.facade.cache_store(&key, &nfa);
        Ok(nfa)
    }

    fn compile_pair(
        &self,
        a: &str,
        b: &str,
        options: &SolverOptions,
    ) -> Result<(crate::automata::dfa::Dfa, crate::automata::dfa::Dfa)> {
        let na = self.nfa_for(a, options)?;
        let nb = self.nfa_for(b, options)?;
        let alphabet = crate::automata::alphabet::Alphabet::from_nfas(
            [&na, &nb].into_iter(),
            self.facade.config.alphabet_limit,
        )?;
        let deadline = options.deadline();
        let budget = self.budget();
        let da = solver::compile_dfa(&na, &alphabet, &budget, options, deadline)?;
        let db = solver::compile_dfa(&nb, &alphabet, &budget, options, deadline)?;
        Ok((da, db))
    }

    /// Is the intersection of the two languages empty?
    pub fn intersection_empty(
        &self,
        a: &str,
        b: &str,
        options: &SolverOptions,
    ) -> Result<SolverOutcome> {
        let (da, db) = self.compile_pair(a, b, options)?;
        solver::intersection_empty(&da, &db, options.deadline())
    }

    /// Is the left language a subset of the right?
    pub fn subset_of(&self, a: &str, b: &str, options: &SolverOptions) -> Result<SolverOutcome> {
        let (da, db) = self.compile_pair(a, b, options)?;
        solver::subset_of(&da, &db, options.deadline())
    }

    /// Do the two patterns recognize the same language?
    pub fn equivalent(
        &self,
        a: &str,
        b: &str,
        options: &SolverOptions,
    ) -> Result<EquivalenceOutcome> {
        let (da, db) = self.compile_pair(a, b, options)?;
        solver::equivalent(&da, &db, options.deadline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::sync::Arc;

    fn facade() -> Facade {
        Facade::new(Config::default())
    }

    #[test]
    fn test_parse_and_validate() {
        let f = facade();
        assert!(f.parse("/(a|b)+c/").is_ok());
        let v = f.validate("/(a|b)+c/");
        assert!(v.valid);
        let v = f.validate(r"/(a)\2/");
        assert!(!v.valid);
        assert_eq!(v.code.as_deref(), Some("backref.missing"));
    }

    #[test]
    fn test_pattern_length_boundary() {
        let mut config = Config::default();
        config.max_pattern_length = 8;
        let f = Facade::new(config);
        assert!(f.parse(&format!("/{}/", "a".repeat(8))).is_ok());
        let err = f.parse(&format!("/{}/", "a".repeat(9))).unwrap_err();
        assert!(matches!(err, Error::ResourceLimit { ref limit, .. } if limit == "pattern_length"));
    }

    #[test]
    fn test_parse_is_memoized() {
        let cache = Arc::new(MemoryCache::new());
        let mut config = Config::default();
        config.cache = Some(cache.clone());
        let f = Facade::new(config);

        let first = f.parse("/(a|b)+c/").unwrap();
        assert_eq!(cache.len(), 1);
        let second = f.parse("/(a|b)+c/").unwrap();
        assert_eq!(first.root, second.root);
        assert_eq!(first.groups, second.groups);
    }

    #[test]
    fn test_explain_formats() {
        let f = facade();
        let text = f.explain("/(a|b)+c/", ExplainFormat::Text).unwrap();
        assert!(text.contains("Alternation"));
        assert!(text.contains("Quantifier"));

        let json = f.explain("/(a|b)+c/", ExplainFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "Regex");
    }

    #[test]
    fn test_redos_allow_list() {
        let mut config = Config::default();
        config.redos_ignored_patterns = vec!["(a+)+$".to_string()];
        let f = Facade::new(config);
        let report = f.redos("/(a+)+$/", &RedosOptions::default()).unwrap();
        assert_eq!(report.severity, Severity::Safe);

        let f = facade();
        let report = f.redos("/(a+)+$/", &RedosOptions::default()).unwrap();
        assert!(report.severity >= Severity::High);
    }

    #[test]
    fn test_analyze_report() {
        let f = facade();
        let report = f.analyze("/(?<year>\\d{4})-(?<month>\\d{2})/").unwrap();
        assert!(report.valid);
        assert_eq!(report.group_count, 2);
        assert_eq!(report.named_groups, vec!["month", "year"]);
        assert!(report.features_used.contains(&"named_group".to_string()));
        assert_eq!(report.redos_severity, Severity::Safe);
    }

    #[test]
    fn test_solver_facade_scenarios() {
        let f = facade();
        let solver = LanguageSolver::new(&f);
        let opts = SolverOptions::default();

        let r = solver
            .intersection_empty("/^[0-9]+$/", "/^[a-z]+$/", &opts)
            .unwrap();
        assert!(r.holds);
        assert!(r.witness.is_none());

        let r = solver.subset_of("/^a+$/", "/^[a-c]+$/", &opts).unwrap();
        assert!(r.holds);

        let r = solver.equivalent("/^a+$/", "/^aa*$/", &opts).unwrap();
        assert!(r.equivalent);
    }

    #[test]
    fn test_solver_rejects_non_regular() {
        let f = facade();
        let solver = LanguageSolver::new(&f);
        let err = solver
            .subset_of(r"/(a)\1/", "/a+/", &SolverOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Complexity { .. }));
    }

    #[test]
    fn test_solver_uses_cache() {
        let cache = Arc::new(MemoryCache::new());
        let mut config = Config::default();
        config.cache = Some(cache.clone());
        let f = Facade::new(config);
        let solver = LanguageSolver::new(&f);
        let opts = SolverOptions::default();

        solver.subset_of("/^a+$/", "/^[a-c]+$/", &opts).unwrap();
        let after_first = cache.len();
        assert!(after_first >= 2, "parse and nfa entries expected");
        solver.subset_of("/^a+$/", "/^[a-c]+$/", &opts).unwrap();
        assert_eq!(cache.len(), after_first);
    }
}
