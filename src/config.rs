//! Facade configuration.
//!
//! A single immutable record carries every tunable the pipeline consults:
//! resource ceilings, the target language version (which decides flag
//! admissibility), the cache implementation, and ReDoS allow-listing.

use crate::cache::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Target language version, used to gate version-dependent flags and
/// lookbehind variability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetVersion {
    pub major: u8,
    pub minor: u8,
}

impl TargetVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        TargetVersion { major, minor }
    }

    /// The replacement-evaluation flag `e` was removed at 7.0.
    pub fn allows_eval_flag(&self) -> bool {
        *self < TargetVersion::new(7, 0)
    }

    /// The return-substring flag `r` exists from 8.4 onward.
    pub fn allows_return_substring_flag(&self) -> bool {
        *self >= TargetVersion::new(8, 4)
    }

    /// Variable-length (but still bounded) lookbehind is accepted from 8.2.
    pub fn allows_variable_lookbehind(&self) -> bool {
        *self >= TargetVersion::new(8, 2)
    }
}

impl Default for TargetVersion {
    fn default() -> Self {
        TargetVersion::new(8, 2)
    }
}

impl std::fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Immutable configuration shared by every facade operation.
///
/// Construct once (usually via [`Config::default`] plus field updates) and
/// hand to [`crate::facade::Facade::new`]. All fields are read-only after
/// construction, which makes the facade safe for concurrent use.
#[derive(Clone)]
pub struct Config {
    /// Maximum accepted pattern body length in bytes
    pub max_pattern_length: usize,
    /// Cap on the statically computed lookbehind length
    pub max_lookbehind_length: u32,
    /// Parser recursion depth bound
    pub max_recursion_depth: usize,
    /// Upper bound for `{m,n}` quantifier operands
    pub max_quantifier: u32,
    /// Target language version for flag and feature gating
    pub target_version: TargetVersion,
    /// Pluggable memoization backend; `None` disables caching
    pub cache: Option<Arc<dyn Cache>>,
    /// Re-validate accepted patterns with the host runtime matcher
    pub runtime_validation: bool,
    /// Pattern bodies exempt from ReDoS analysis
    pub redos_ignored_patterns: Vec<String>,
    /// Subset-construction state ceiling
    pub dfa_state_limit: usize,
    /// Alphabet partition class ceiling
    pub alphabet_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_pattern_length: 65_536,
            max_lookbehind_length: 255,
            max_recursion_depth: 1024,
            max_quantifier: 65_535,
            target_version: TargetVersion::default(),
            cache: None,
            runtime_validation: false,
            redos_ignored_patterns: Vec::new(),
            dfa_state_limit: 10_000,
            alphabet_limit: 2_000,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("max_pattern_length", &self.max_pattern_length)
            .field("max_lookbehind_length", &self.max_lookbehind_length)
            .field("max_recursion_depth", &self.max_recursion_depth)
            .field("max_quantifier", &self.max_quantifier)
            .field("target_version", &self.target_version)
            .field("cache", &self.cache.as_ref().map(|_| "…"))
            .field("runtime_validation", &self.runtime_validation)
            .field("redos_ignored_patterns", &self.redos_ignored_patterns)
            .field("dfa_state_limit", &self.dfa_state_limit)
            .field("alphabet_limit", &self.alphabet_limit)
            .finish()
    }
}

impl Config {
    /// Bit-significant digest of the options that influence cached outputs.
    ///
    /// Included in every cache key so that configuration changes invalidate
    /// prior entries.
    pub fn option_bits(&self) -> String {
        format!(
            "v{};pl{};lb{};rd{};q{};ds{};al{}",
            self.target_version,
            self.max_pattern_length,
            self.max_lookbehind_length,
            self.max_recursion_depth,
            self.max_quantifier,
            self.dfa_state_limit,
            self.alphabet_limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_gates() {
        let old = TargetVersion::new(5, 6);
        assert!(old.allows_eval_flag());
        assert!(!old.allows_return_substring_flag());

        let modern = TargetVersion::new(8, 4);
        assert!(!modern.allows_eval_flag());
        assert!(modern.allows_return_substring_flag());
        assert!(modern.allows_variable_lookbehind());
    }

    #[test]
    fn test_option_bits_change_with_version() {
        let a = Config::default();
        let mut b = Config::default();
        b.target_version = TargetVersion::new(7, 4);
        assert_ne!(a.option_bits(), b.option_bits());
    }
}
