//! Step-counting backtracking matcher used as the ReDoS witness runtime.
//!
//! A deliberately naive recursive matcher over the AST: it exhibits the
//! same catastrophic backtracking a PCRE-style engine would, which is the
//! point: the linear-time host matcher cannot demonstrate blowup. Every
//! node visit counts as a step; runs are capped by a step budget and a
//! deadline. Not a general-purpose engine: unsupported constructs abort
//! the run rather than approximating.

use crate::automata::symbol::{char_type_set, class_set, dot_set, word_set, CharSet};
use crate::core::nodes::*;
use crate::core::pattern::Flags;
use crate::core::tokens::{AnchorKind, Greediness};
use std::time::Instant;

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stop {
    StepLimit,
    Deadline,
    Unsupported(String),
}

/// Result of one bounded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub matched: Option<bool>,
    pub stopped: Option<Stop>,
    pub steps: u64,
}

/// Budget for a single run.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub step_limit: u64,
    pub deadline: Option<Instant>,
}

/// Run the matcher against `input`, substring semantics.
pub fn run(root: &Node, flags: Flags, input: &str, limits: Limits) -> RunOutcome {
    let chars: Vec<char> = input.chars().collect();
    let mut m = Matcher {
        chars,
        flags,
        steps: 0,
        limits,
        captures: Vec::new(),
    };
    let anchored_starts = 0..=m.chars.len();
    for start in anchored_starts {
        let mut accept = |_m: &mut Matcher, _pos: usize| Ok(true);
        match m.match_node(body_of(root), start, &mut accept) {
            Ok(true) => {
                return RunOutcome {
                    matched: Some(true),
                    stopped: None,
                    steps: m.steps,
                }
            }
            Ok(false) => continue,
            Err(stop) => {
                return RunOutcome {
                    matched: None,
                    stopped: Some(stop),
                    steps: m.steps,
                }
            }
        }
    }
    RunOutcome {
        matched: Some(false),
        stopped: None,
        steps: m.steps,
    }
}

fn body_of(root: &Node) -> &Node {
    match root {
        Node::Regex(r) => &r.body,
        other => other,
    }
}

type Cont<'c> = &'c mut dyn FnMut(&mut Matcher, usize) -> Result<bool, Stop>;

struct Matcher {
    chars: Vec<char>,
    flags: Flags,
    steps: u64,
    limits: Limits,
    captures: Vec<Option<(usize, usize)>>,
}

impl Matcher {
    fn tick(&mut self) -> Result<(), Stop> {
        self.steps += 1;
        if self.steps > self.limits.step_limit {
            return Err(Stop::StepLimit);
        }
        if self.steps % 4096 == 0 {
            if let Some(d) = self.limits.deadline {
                if Instant::now() > d {
                    return Err(Stop::Deadline);
                }
            }
        }
        Ok(())
    }

    fn at(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).copied()
    }

    fn char_matches(&self, set: &CharSet, pos: usize) -> bool {
        match self.at(pos) {
            Some(c) => {
                let folded = if self.flags.ignore_case {
                    set.case_fold_ascii()
                } else {
                    set.clone()
                };
                folded.contains(c as u32)
            }
            None => false,
        }
    }

    fn is_word(&self, pos: usize) -> bool {
        match self.chars.get(pos) {
            Some(&c) => word_set().contains(c as u32),
            None => false,
        }
    }

    fn anchor_holds(&self, kind: AnchorKind, pos: usize) -> Result<bool, Stop> {
        let len = self.chars.len();
        Ok(match kind {
            AnchorKind::Start => {
                pos == 0 || (self.flags.multiline && self.chars.get(pos - 1) == Some(&'\n'))
            }
            AnchorKind::End => {
                pos == len || (self.flags.multiline && self.chars.get(pos) == Some(&'\n'))
            }
            AnchorKind::StartOfString | AnchorKind::MatchStart => pos == 0,
            AnchorKind::EndOfString => pos == len,
            AnchorKind::EndBeforeNewline => {
                pos == len || (pos + 1 == len && self.chars.get(pos) == Some(&'\n'))
            }
            AnchorKind::WordBoundary => {
                let before = pos > 0 && self.is_word(pos - 1);
                let after = self.is_word(pos);
                before != after
            }
            AnchorKind::NonWordBoundary => {
                let before = pos > 0 && self.is_word(pos - 1);
                let after = self.is_word(pos);
                before == after
            }
            AnchorKind::Keep => true,
        })
    }

    /// First overall match of `node` from `pos`, without offering
    /// alternatives to the caller (atomic/possessive semantics).
    fn first_match(&mut self, node: &Node, pos: usize) -> Result<Option<usize>, Stop> {
        let mut end: Option<usize> = None;
        let mut grab = |_m: &mut Matcher, p: usize| {
            end = Some(p);
            Ok(true)
        };
        let matched = self.match_node(node, pos, &mut grab)?;
        Ok(if matched { end } else { None })
    }

    /// Match ending exactly at `target` (bounded lookbehind helper).
    fn match_ending_at(&mut self, node: &Node, pos: usize, target: usize) -> Result<bool, Stop> {
        let mut exact = move |_m: &mut Matcher, p: usize| Ok(p == target);
        self.match_node(node, pos, &mut exact)
    }

    fn match_node(&mut self, node: &Node, pos: usize, k: Cont) -> Result<bool, Stop> {
        self.tick()?;
        match node {
            Node::Regex(r) => self.match_node(&r.body, pos, k),
            Node::Literal(l) => {
                let mut p = pos;
                for c in l.value.chars() {
                    let matched = match self.at(p) {
                        Some(have) if have == c => true,
                        Some(have) if self.flags.ignore_case => {
                            have.to_ascii_lowercase() == c.to_ascii_lowercase()
                        }
                        _ => false,
                    };
                    if !matched {
                        return Ok(false);
                    }
                    p += 1;
                }
                k(self, p)
            }
            Node::CharLiteral(c) => {
                if self.char_matches(&CharSet::single(c.codepoint), pos) {
                    k(self, pos + 1)
                } else {
                    Ok(false)
                }
            }
            Node::Dot(_) => {
                if self.char_matches(&dot_set(self.flags.dot_all), pos) {
                    k(self, pos + 1)
                } else {
                    Ok(false)
                }
            }
            Node::CharType(t) if t.letter == 'R' => {
                if self.at(pos) == Some('\r') && self.at(pos + 1) == Some('\n') {
                    return k(self, pos + 2);
                }
                if self.char_matches(&crate::automata::symbol::newline_set(), pos) {
                    return k(self, pos + 1);
                }
                Ok(false)
            }
            Node::CharType(t) => match char_type_set(t.letter) {
                Some(set) => {
                    if self.char_matches(&set, pos) {
                        k(self, pos + 1)
                    } else {
                        Ok(false)
                    }
                }
                None => Err(Stop::Unsupported(format!("char type \\{}", t.letter))),
            },
            Node::CharClass(cc) => match class_set(cc) {
                Some(set) => {
                    if self.char_matches(&set, pos) {
                        k(self, pos + 1)
                    } else {
                        Ok(false)
                    }
                }
                None => Err(Stop::Unsupported("unicode property class".to_string())),
            },
            Node::Anchor(a) => {
                if self.anchor_holds(a.kind, pos)? {
                    k(self, pos)
                } else {
                    Ok(false)
                }
            }
            Node::Sequence(s) => self.match_seq(&s.parts, 0, pos, k),
            Node::Alternation(a) => {
                for branch in &a.branches {
                    if self.match_node(branch, pos, k)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Node::Quantifier(q) => {
                let max = q.max.unwrap_or(u32::MAX);
                match q.greediness {
                    Greediness::Greedy => self.match_greedy(q, 0, q.min, max, pos, k),
                    Greediness::Lazy => self.match_lazy(q, 0, q.min, max, pos, k),
                    Greediness::Possessive => {
                        let mut p = pos;
                        let mut count = 0u32;
                        while count < max {
                            match self.first_match(&q.child, p)? {
                                Some(next) if next > p => {
                                    p = next;
                                    count += 1;
                                }
                                // A zero-width repetition satisfies any
                                // remaining minimum without progress.
                                Some(_) => {
                                    count = count.max(q.min);
                                    break;
                                }
                                None => break,
                            }
                        }
                        if count < q.min {
                            return Ok(false);
                        }
                        k(self, p)
                    }
                }
            }
            Node::Group(g) => match g.kind {
                GroupKind::Capturing | GroupKind::Named => {
                    let number = g.number.unwrap_or(0) as usize;
                    if self.captures.len() < number + 1 {
                        self.captures.resize(number + 1, None);
                    }
                    let saved = self.captures[number];
                    let mut record = |m: &mut Matcher, p: usize| {
                        m.captures[number] = Some((pos, p));
                        k(m, p)
                    };
                    let matched = self.match_node(&g.body, pos, &mut record)?;
                    if !matched {
                        self.captures[number] = saved;
                    }
                    Ok(matched)
                }
                GroupKind::NonCapturing | GroupKind::BranchReset | GroupKind::InlineFlags => {
                    self.match_node(&g.body, pos, k)
                }
                GroupKind::Atomic => match self.first_match(&g.body, pos)? {
                    Some(p) => k(self, p),
                    None => Ok(false),
                },
                GroupKind::LookaheadPos => {
                    if self.first_match(&g.body, pos)?.is_some() {
                        k(self, pos)
                    } else {
                        Ok(false)
                    }
                }
                GroupKind::LookaheadNeg => {
                    if self.first_match(&g.body, pos)?.is_none() {
                        k(self, pos)
                    } else {
                        Ok(false)
                    }
                }
                GroupKind::LookbehindPos => {
                    for start in (0..=pos).rev() {
                        if self.match_ending_at(&g.body, start, pos)? {
                            return k(self, pos);
                        }
                    }
                    Ok(false)
                }
                GroupKind::LookbehindNeg => {
                    for start in (0..=pos).rev() {
                        if self.match_ending_at(&g.body, start, pos)? {
                            return Ok(false);
                        }
                    }
                    k(self, pos)
                }
            },
            Node::Backreference(b) => {
                let captured = match (b.by_number, &b.by_name) {
                    (Some(n), _) => self.captures.get(n as usize).copied().flatten(),
                    // Named references are resolved to numbers upstream;
                    // a bare name here means resolution failed.
                    (None, Some(name)) => {
                        return Err(Stop::Unsupported(format!("named backreference {}", name)))
                    }
                    _ => None,
                };
                let (s, e) = match captured {
                    Some(range) => range,
                    // A reference to an unset group fails the match
                    None => return Ok(false),
                };
                let text: Vec<char> = self.chars[s..e].to_vec();
                let mut p = pos;
                for c in text {
                    if self.at(p) != Some(c) {
                        return Ok(false);
                    }
                    p += 1;
                }
                k(self, p)
            }
            Node::Subroutine(_) => Err(Stop::Unsupported("subroutine call".to_string())),
            Node::Conditional(_) => Err(Stop::Unsupported("conditional group".to_string())),
            Node::Define(_) => k(self, pos),
            Node::Error(_) => Err(Stop::Unsupported("unparsable span".to_string())),
        }
    }

    fn match_seq(&mut self, parts: &[Node], i: usize, pos: usize, k: Cont) -> Result<bool, Stop> {
        if i == parts.len() {
            return k(self, pos);
        }
        let mut rest = |m: &mut Matcher, p: usize| m.match_seq(parts, i + 1, p, k);
        self.match_node(&parts[i], pos, &mut rest)
    }

    fn match_greedy(
        &mut self,
        q: &Quantifier,
        count: u32,
        min: u32,
        max: u32,
        pos: usize,
        k: Cont,
    ) -> Result<bool, Stop> {
        self.tick()?;
        if count < max {
            let mut more = |m: &mut Matcher, p: usize| {
                // Zero-width loop protection: a copy that consumed nothing
                // cannot be repeated forever.
                if p == pos && count + 1 > min {
                    return Ok(false);
                }
                m.match_greedy(q, count + 1, min, max, p, k)
            };
            if self.match_node(&q.child, pos, &mut more)? {
                return Ok(true);
            }
        }
        if count >= min {
            return k(self, pos);
        }
        Ok(false)
    }

    fn match_lazy(
        &mut self,
        q: &Quantifier,
        count: u32,
        min: u32,
        max: u32,
        pos: usize,
        k: Cont,
    ) -> Result<bool, Stop> {
        self.tick()?;
        if count >= min && k(self, pos)? {
            return Ok(true);
        }
        if count < max {
            let mut more = |m: &mut Matcher, p: usize| {
                if p == pos && count + 1 > min {
                    return Ok(false);
                }
                m.match_lazy(q, count + 1, min, max, p, k)
            };
            return self.match_node(&q.child, pos, &mut more);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetVersion;
    use crate::core::parser::parse;
    use crate::core::pattern::split;

    fn run_pattern(source: &str, input: &str) -> RunOutcome {
        run_with_budget(source, input, 1_000_000)
    }

    fn run_with_budget(source: &str, input: &str, steps: u64) -> RunOutcome {
        let p = split(source, TargetVersion::default()).unwrap();
        let out = parse(&p, 1024).unwrap();
        run(
            &out.root,
            p.flags,
            input,
            Limits {
                step_limit: steps,
                deadline: None,
            },
        )
    }

    fn matches(source: &str, input: &str) -> bool {
        run_pattern(source, input).matched.unwrap()
    }

    #[test]
    fn test_substring_semantics() {
        assert!(matches("/bc/", "abcd"));
        assert!(!matches("/bd/", "abcd"));
        assert!(matches("/^ab/", "abcd"));
        assert!(!matches("/^bc/", "abcd"));
    }

    #[test]
    fn test_quantifiers_and_classes() {
        assert!(matches("/^[a-c]+$/", "abccba"));
        assert!(!matches("/^[a-c]+$/", "abxba"));
        assert!(matches("/^a{2,3}$/", "aaa"));
        assert!(!matches("/^a{2,3}$/", "aaaa"));
    }

    #[test]
    fn test_lazy_and_greedy_agree_on_language() {
        for input in ["", "a", "aa"] {
            assert_eq!(matches("/^a*$/", input), matches("/^a*?$/", input));
        }
    }

    #[test]
    fn test_backreference() {
        assert!(matches(r"/^(ab)\1$/", "abab"));
        assert!(!matches(r"/^(ab)\1$/", "abac"));
    }

    #[test]
    fn test_lookarounds() {
        assert!(matches(r"/^a(?=bc)/", "abc"));
        assert!(!matches(r"/^a(?=bc)/", "abd"));
        assert!(matches(r"/(?<=ab)c/", "abc"));
        assert!(!matches(r"/(?<=xb)c/", "abc"));
        assert!(matches(r"/a(?!x)./", "aby"));
        assert!(!matches(r"/^a(?!b)/", "ab"));
    }

    #[test]
    fn test_word_boundary() {
        assert!(matches(r"/\bcat\b/", "a cat sat"));
        assert!(!matches(r"/\bcat\b/", "concatenate"));
    }

    #[test]
    fn test_atomic_group_cuts() {
        // (?>a+)a can never match: the atomic group eats every 'a'
        assert!(!matches(r"/^(?>a+)a$/", "aaaa"));
        assert!(matches(r"/^(a+)a$/", "aaaa"));
    }

    #[test]
    fn test_possessive_quantifier_cuts() {
        assert!(!matches(r"/^a++a$/", "aaaa"));
    }

    #[test]
    fn test_catastrophic_pattern_hits_step_limit() {
        let outcome = run_with_budget(r"/(a+)+$/", &("a".repeat(28) + "!"), 200_000);
        assert_eq!(outcome.stopped, Some(Stop::StepLimit));
    }

    #[test]
    fn test_step_growth_on_ambiguous_pattern() {
        let short = run_pattern(r"/(a+)+$/", &("a".repeat(8) + "!"));
        let long = run_pattern(r"/(a+)+$/", &("a".repeat(16) + "!"));
        assert!(long.steps > short.steps * 4, "steps should blow up");
    }

    #[test]
    fn test_linear_pattern_stays_cheap() {
        let outcome = run_pattern("/^a+$/", &"a".repeat(64));
        assert!(outcome.steps < 10_000);
        assert_eq!(outcome.matched, Some(true));
    }
}
