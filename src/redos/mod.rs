//! ReDoS risk analysis.
//!
//! Static detection locates ambiguity-induced blowup on the AST: nested
//! unbounded quantifiers (exponential), adjacent greedy repeaters with
//! overlapping bodies (polynomial), plus informational findings about
//! available mitigations. Severity only ever increases as findings
//! accumulate, and an empirical confirmation can never be downgraded by
//! later theory.
//!
//! Empirical confirmation pumps attack strings of growing length through
//! the step-counting backtracking runtime in [`backtrack`] under a strict
//! deadline; the host linear-time matcher is useless for this purpose.

pub mod backtrack;

use crate::automata::symbol::CharSet;
use crate::core::analysis::{first_set, is_nullable, last_set, max_len};
use crate::core::emitter::emit_body;
use crate::core::nodes::*;
use crate::core::pattern::Flags;
use crate::core::tokens::{AnchorKind, Greediness};
use crate::core::Span;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Risk buckets, ordered; severity is monotonic non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Safe,
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

/// Finding classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Exponential,
    Polynomial,
    PossessiveMitigable,
    AnchorBoundMitigable,
}

impl FindingCategory {
    fn weight(self) -> u32 {
        match self {
            FindingCategory::Exponential => 8,
            FindingCategory::Polynomial => 4,
            FindingCategory::PossessiveMitigable => 1,
            FindingCategory::AnchorBoundMitigable => 1,
        }
    }
}

/// One located risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FindingCategory,
    pub message: String,
    pub span: Span,
    #[serde(rename = "suggestedRewrite", skip_serializing_if = "Option::is_none")]
    pub suggested_rewrite: Option<String>,
}

/// Snapshot of the witness-runtime limits in effect during confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    #[serde(rename = "stepLimit")]
    pub step_limit: u64,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

/// One pumped measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub length: usize,
    pub steps: u64,
    pub micros: u64,
}

/// Result of the empirical phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed: bool,
    pub samples: Vec<TimingSample>,
    #[serde(rename = "growthRatio")]
    pub growth_ratio: f64,
    pub evidence: String,
    pub runtime: RuntimeInfo,
    #[serde(rename = "timedOut")]
    pub timed_out: bool,
}

/// Full analysis report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedosReport {
    pub severity: Severity,
    pub score: u32,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
}

/// Analysis options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedosOptions {
    /// A bounded quantifier counts as a repeater above this bound
    #[serde(rename = "repeatThreshold")]
    pub repeat_threshold: u32,
    /// Run the empirical confirmation phase
    pub confirm: bool,
    #[serde(rename = "confirmTimeoutMs")]
    pub confirm_timeout_ms: u64,
    #[serde(rename = "confirmStepLimit")]
    pub confirm_step_limit: u64,
}

impl Default for RedosOptions {
    fn default() -> Self {
        RedosOptions {
            repeat_threshold: 10,
            confirm: false,
            confirm_timeout_ms: 2_000,
            confirm_step_limit: 1_000_000,
        }
    }
}

/// Analyze a parsed pattern for ReDoS risk.
pub fn analyze(root: &Node, flags: Flags, options: &RedosOptions) -> RedosReport {
    let mut findings = Vec::new();
    collect_findings(root, options, &mut Vec::new(), false, &mut findings);

    if !findings.is_empty() && !is_anchored(root) {
        findings.push(Finding {
            category: FindingCategory::AnchorBoundMitigable,
            message: "pattern is unanchored; anchors would bound the scan window".to_string(),
            span: root.span(),
            suggested_rewrite: None,
        });
    }

    let score: u32 = findings.iter().map(|f| f.category.weight()).sum();
    let severity = bucket(score);

    let confirmation = if options.confirm && !findings.is_empty() {
        Some(confirm(root, flags, &findings, options))
    } else {
        None
    };

    // A confirmed blowup is at least High regardless of the static score.
    let severity = match &confirmation {
        Some(c) if c.confirmed => severity.max(Severity::High),
        _ => severity,
    };

    debug!(score, findings = findings.len(), "redos analysis done");
    RedosReport {
        severity,
        score,
        findings,
        confirmation,
    }
}

fn bucket(score: u32) -> Severity {
    match score {
        0 => Severity::Safe,
        1..=3 => Severity::Low,
        4..=7 => Severity::Medium,
        8..=15 => Severity::High,
        _ => Severity::Critical,
    }
}

/// Is the quantifier a repeater worth analyzing?
fn is_repeater(q: &Quantifier, options: &RedosOptions) -> bool {
    match q.max {
        None => true,
        Some(m) => m > options.repeat_threshold,
    }
}

fn collect_findings(
    node: &Node,
    options: &RedosOptions,
    repeater_stack: &mut Vec<Span>,
    in_atomic: bool,
    findings: &mut Vec<Finding>,
) {
    match node {
        Node::Quantifier(q) => {
            let mitigated = in_atomic || q.greediness == Greediness::Possessive;
            let repeats = is_repeater(q, options);

            if repeats && !mitigated {
                if let Some(&outer) = repeater_stack.last() {
                    // Nested unbounded repetition over a consuming body
                    if max_len(&q.child) != Some(0) {
                        findings.push(Finding {
                            category: FindingCategory::Exponential,
                            message: "nested unbounded quantifiers allow exponentially many \
                                      decompositions of the same input"
                                .to_string(),
                            span: outer,
                            suggested_rewrite: Some(
                                "make the outer group atomic ((?>...)) or the inner quantifier \
                                 possessive"
                                    .to_string(),
                            ),
                        });
                    }
                }
                // Overlapping alternation branches inside a repeater
                if let Some(span) = overlapping_alternation(&q.child) {
                    findings.push(Finding {
                        category: FindingCategory::Exponential,
                        message: "alternation branches inside a repeated group overlap on their \
                                  first characters"
                            .to_string(),
                        span,
                        suggested_rewrite: Some(
                            "disjoin the branches or make the group atomic".to_string(),
                        ),
                    });
                }
            }

            if repeats && !mitigated {
                repeater_stack.push(q.span);
                collect_findings(&q.child, options, repeater_stack, in_atomic, findings);
                repeater_stack.pop();
            } else {
                collect_findings(&q.child, options, repeater_stack, in_atomic, findings);
            }
        }
        Node::Sequence(s) => {
            adjacent_repeater_findings(&s.parts, options, findings);
            for p in &s.parts {
                collect_findings(p, options, repeater_stack, in_atomic, findings);
            }
        }
        Node::Group(g) => {
            let atomic = in_atomic || g.kind == GroupKind::Atomic;
            collect_findings(&g.body, options, repeater_stack, atomic, findings);
        }
        other => {
            other.for_each_child(&mut |c| {
                collect_findings(c, options, repeater_stack, in_atomic, findings)
            });
        }
    }
}

/// Two adjacent greedy repeaters whose bodies overlap scan the same input
/// quadratically; non-overlapping neighbours merely invite a possessive.
fn adjacent_repeater_findings(
    parts: &[Node],
    options: &RedosOptions,
    findings: &mut Vec<Finding>,
) {
    for pair in parts.windows(2) {
        let (Node::Quantifier(a), Node::Quantifier(b)) = (&pair[0], &pair[1]) else {
            continue;
        };
        if !is_repeater(a, options) || !is_repeater(b, options) {
            continue;
        }
        if a.greediness == Greediness::Possessive || b.greediness == Greediness::Possessive {
            continue;
        }
        let overlap = last_set(&a.child).overlaps(&first_set(&b.child));
        if overlap {
            findings.push(Finding {
                category: FindingCategory::Polynomial,
                message: "two adjacent unbounded repeaters accept the same characters; the \
                          split point is ambiguous"
                    .to_string(),
                span: a.span.cover(b.span),
                suggested_rewrite: Some("make the first repeater possessive".to_string()),
            });
        } else {
            findings.push(Finding {
                category: FindingCategory::PossessiveMitigable,
                message: "adjacent repeaters are disjoint; a possessive quantifier would \
                          remove the remaining backtracking"
                    .to_string(),
                span: a.span,
                suggested_rewrite: Some(possessive_rewrite(a)),
            });
        }
    }
}

fn possessive_rewrite(q: &Quantifier) -> String {
    let body = emit_body(&Node::Quantifier(q.clone()), Flags::default());
    format!("{}+", body)
}

/// First span of an alternation (directly under a repeater) whose branches
/// overlap on a first character or share nullability.
fn overlapping_alternation(body: &Node) -> Option<Span> {
    let alt = match body {
        Node::Alternation(a) => a,
        Node::Group(g) if !g.kind.is_lookaround() => return overlapping_alternation(&g.body),
        Node::Sequence(s) if s.parts.len() == 1 => return overlapping_alternation(&s.parts[0]),
        _ => return None,
    };
    let sets: Vec<CharSet> = alt.branches.iter().map(first_set).collect();
    for i in 0..sets.len() {
        for j in i + 1..sets.len() {
            let both_nullable = is_nullable(&alt.branches[i]) && is_nullable(&alt.branches[j]);
            if both_nullable || sets[i].overlaps(&sets[j]) {
                return Some(alt.span);
            }
        }
    }
    None
}

fn is_anchored(root: &Node) -> bool {
    let mut anchored = false;
    root.walk(&mut |n| {
        if let Node::Anchor(a) = n {
            if matches!(
                a.kind,
                AnchorKind::Start
                    | AnchorKind::End
                    | AnchorKind::StartOfString
                    | AnchorKind::EndOfString
                    | AnchorKind::EndBeforeNewline
            ) {
                anchored = true;
            }
        }
    });
    anchored
}

// ---- Empirical confirmation ----

const PUMP_LENGTHS: [usize; 4] = [8, 12, 16, 20];
const GROWTH_THRESHOLD: f64 = 3.0;

fn confirm(
    root: &Node,
    flags: Flags,
    findings: &[Finding],
    options: &RedosOptions,
) -> Confirmation {
    let runtime = RuntimeInfo {
        step_limit: options.confirm_step_limit,
        timeout_ms: options.confirm_timeout_ms,
    };
    let deadline = Instant::now() + Duration::from_millis(options.confirm_timeout_ms);

    let culprit = findings
        .iter()
        .find(|f| {
            matches!(
                f.category,
                FindingCategory::Exponential | FindingCategory::Polynomial
            )
        })
        .map(|f| f.span);

    let pump = pump_char(root, culprit);
    let poison = poison_char(root);

    let mut samples = Vec::new();
    let mut hit_limit = false;
    let mut timed_out = false;
    for &n in &PUMP_LENGTHS {
        let attack: String = std::iter::repeat(pump)
            .take(n)
            .chain(std::iter::once(poison))
            .collect();
        let started = Instant::now();
        let outcome = backtrack::run(
            root,
            flags,
            &attack,
            backtrack::Limits {
                step_limit: options.confirm_step_limit,
                deadline: Some(deadline),
            },
        );
        samples.push(TimingSample {
            length: attack.chars().count(),
            steps: outcome.steps,
            micros: started.elapsed().as_micros() as u64,
        });
        match outcome.stopped {
            Some(backtrack::Stop::StepLimit) => {
                hit_limit = true;
                break;
            }
            Some(backtrack::Stop::Deadline) => {
                timed_out = true;
                break;
            }
            Some(backtrack::Stop::Unsupported(reason)) => {
                return Confirmation {
                    confirmed: false,
                    samples,
                    growth_ratio: 0.0,
                    evidence: format!("witness runtime cannot execute this pattern: {}", reason),
                    runtime,
                    timed_out: false,
                };
            }
            None => {}
        }
    }

    let growth_ratio = mean_growth(&samples);
    let confirmed = hit_limit || growth_ratio >= GROWTH_THRESHOLD;
    let evidence = if hit_limit {
        format!(
            "step budget of {} exhausted at input length {}",
            options.confirm_step_limit,
            samples.last().map(|s| s.length).unwrap_or(0)
        )
    } else if timed_out {
        "deadline expired before the growth curve settled; theoretical verdict stands".to_string()
    } else if confirmed {
        format!(
            "step count grew {:.1}x per {} added characters",
            growth_ratio,
            PUMP_LENGTHS[1] - PUMP_LENGTHS[0]
        )
    } else {
        format!("no superlinear growth observed (ratio {:.2})", growth_ratio)
    };

    Confirmation {
        confirmed,
        samples,
        growth_ratio,
        evidence,
        runtime,
        timed_out,
    }
}

fn mean_growth(samples: &[TimingSample]) -> f64 {
    let mut ratios = Vec::new();
    for pair in samples.windows(2) {
        if pair[0].steps > 0 {
            ratios.push(pair[1].steps as f64 / pair[0].steps as f64);
        }
    }
    if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    }
}

/// A character the culprit repeater consumes; smallest printable wins.
fn pump_char(root: &Node, culprit: Option<Span>) -> char {
    let set = match culprit.and_then(|span| find_quantifier_at(root, span)) {
        Some(q) => first_set(&q.child),
        None => first_set(root),
    };
    set.min_codepoint()
        .and_then(char::from_u32)
        .filter(|c| *c != '\0')
        .unwrap_or('a')
}

/// A character the pattern cannot continue or end with, forcing failure.
fn poison_char(root: &Node) -> char {
    let bad = first_set(root).union(&last_set(root));
    ('!'..='~').find(|c| !bad.contains(*c as u32)).unwrap_or('\0')
}

fn find_quantifier_at(root: &Node, span: Span) -> Option<&Quantifier> {
    let mut found: Option<&Quantifier> = None;
    root.walk(&mut |n| {
        if found.is_none() {
            if let Node::Quantifier(q) = n {
                if q.span == span {
                    found = Some(q);
                }
            }
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn report(source: &str) -> RedosReport {
        report_with(source, &RedosOptions::default())
    }

    fn report_with(source: &str, options: &RedosOptions) -> RedosReport {
        let p = split(source, TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        analyze(&out.root, p.flags, options)
    }

    #[test]
    fn test_benign_patterns_are_safe() {
        for src in ["/(a|b)+c/", "/^a+$/", "/[a-z]{3}/", "/foo|bar/"] {
            let r = report(src);
            assert_eq!(r.severity, Severity::Safe, "{} flagged: {:?}", src, r.findings);
        }
    }

    #[test]
    fn test_nested_quantifier_is_high() {
        let r = report(r"/(a+)+$/");
        assert!(r.severity >= Severity::High, "got {:?}", r.severity);
        assert!(r
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::Exponential));
    }

    #[test]
    fn test_exponential_culprit_span_covers_outer_quantifier() {
        let r = report(r"/(a+)+$/");
        let f = r
            .findings
            .iter()
            .find(|f| f.category == FindingCategory::Exponential)
            .unwrap();
        // Outer quantifier spans "(a+)+"
        assert_eq!(f.span.start, 0);
        assert_eq!(f.span.end, 5);
    }

    #[test]
    fn test_overlapping_alternation_in_repeater() {
        let r = report(r"/(a|ab)+$/");
        assert!(r
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::Exponential));
    }

    #[test]
    fn test_adjacent_overlapping_repeaters_polynomial() {
        let r = report(r"/a+a+$/");
        assert!(r
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::Polynomial));
        assert!(r.severity >= Severity::Medium);
    }

    #[test]
    fn test_disjoint_adjacent_repeaters_mitigable() {
        let r = report(r"/\d+[a-z]+$/");
        assert!(r
            .findings
            .iter()
            .all(|f| f.category != FindingCategory::Polynomial));
        assert!(r
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::PossessiveMitigable));
    }

    #[test]
    fn test_possessive_quantifier_mitigates() {
        let r = report(r"/(a+)++$/");
        assert!(r
            .findings
            .iter()
            .all(|f| f.category != FindingCategory::Exponential));
    }

    #[test]
    fn test_atomic_group_mitigates() {
        let r = report(r"/(?>(a+)+)$/");
        assert!(r
            .findings
            .iter()
            .all(|f| f.category != FindingCategory::Exponential));
    }

    #[test]
    fn test_unanchored_risk_notes_anchor_mitigation() {
        let r = report(r"/(a+)+b/");
        assert!(r
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::AnchorBoundMitigable));
    }

    #[test]
    fn test_severity_monotone_in_findings() {
        let one = report(r"/a+a+$/");
        let two = report(r"/a+a+b+b+$/");
        assert!(two.score >= one.score);
        assert!(two.severity >= one.severity);
    }

    #[test]
    fn test_confirmation_confirms_exponential() {
        let mut options = RedosOptions::default();
        options.confirm = true;
        options.confirm_step_limit = 200_000;
        let r = report_with(r"/(a+)+$/", &options);
        let c = r.confirmation.expect("confirmation ran");
        assert!(c.confirmed, "evidence: {}", c.evidence);
        assert!(r.severity >= Severity::High);
    }

    #[test]
    fn test_confirmation_skipped_when_safe() {
        let mut options = RedosOptions::default();
        options.confirm = true;
        let r = report_with("/^abc$/", &options);
        assert!(r.confirmation.is_none());
        assert_eq!(r.severity, Severity::Safe);
    }
}
