//! Delimited pattern handling: splitting a source string into delimiter,
//! body and flags, and validating the flag set against the target version.
//!
//! A pattern arrives as e.g. `/foo|bar/im` or `#ab+c#x`. The splitter
//! recognizes the delimiters `/ # ~ %` plus the paired forms `() [] {} <>`
//! (closed by their counterpart), strips them, and interprets the trailing
//! characters as flags. The result is immutable.

use crate::config::TargetVersion;
use crate::core::errors::{Error, SourceError};
use crate::core::hints::hint_for;
use serde::{Deserialize, Serialize};

/// Container for pattern flags/modifiers.
///
/// Flags control matching behavior (case sensitivity, multiline mode, ...)
/// and, for `e`/`r`, are only admissible on certain target versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Flags {
    #[serde(rename = "ignoreCase")]
    pub ignore_case: bool,
    pub multiline: bool,
    #[serde(rename = "dotAll")]
    pub dot_all: bool,
    pub extended: bool,
    pub unicode: bool,
    pub ungreedy: bool,
    pub anchored: bool,
    #[serde(rename = "dollarEndOnly")]
    pub dollar_end_only: bool,
    #[serde(rename = "dupNames")]
    pub dup_names: bool,
    pub extra: bool,
    /// Replacement evaluation; removed from the language at 7.0
    pub eval: bool,
    /// Return-substring mode; introduced at 8.4
    pub return_substring: bool,
}

impl Flags {
    /// Parse a flag letter sequence without version checking.
    ///
    /// Unknown letters are returned rather than silently dropped; duplicate
    /// letters collapse silently.
    pub fn from_letters(letters: &str) -> (Flags, Vec<char>) {
        let mut f = Flags::default();
        let mut unknown = Vec::new();
        for ch in letters.chars() {
            match ch {
                'i' => f.ignore_case = true,
                'm' => f.multiline = true,
                's' => f.dot_all = true,
                'x' => f.extended = true,
                'u' => f.unicode = true,
                'U' => f.ungreedy = true,
                'A' => f.anchored = true,
                'D' => f.dollar_end_only = true,
                'J' => f.dup_names = true,
                'X' => f.extra = true,
                'e' => f.eval = true,
                'r' => f.return_substring = true,
                other => unknown.push(other),
            }
        }
        (f, unknown)
    }

    /// Render the flag set back to its letter form, in canonical order.
    pub fn letters(&self) -> String {
        let mut out = String::new();
        for (on, ch) in [
            (self.ignore_case, 'i'),
            (self.multiline, 'm'),
            (self.dot_all, 's'),
            (self.extended, 'x'),
            (self.unicode, 'u'),
            (self.ungreedy, 'U'),
            (self.anchored, 'A'),
            (self.dollar_end_only, 'D'),
            (self.dup_names, 'J'),
            (self.extra, 'X'),
            (self.eval, 'e'),
            (self.return_substring, 'r'),
        ] {
            if on {
                out.push(ch);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.letters().is_empty()
    }

    /// Apply an inline `(?on-off)` modifier to a copy of this flag set.
    ///
    /// Only the locally scopable letters (i, m, s, x, U) participate in
    /// inline groups.
    pub fn apply_inline(&self, on: &Flags, off: &Flags) -> Flags {
        let mut f = *self;
        for (set, value) in [(on, true), (off, false)] {
            if set.ignore_case {
                f.ignore_case = value;
            }
            if set.multiline {
                f.multiline = value;
            }
            if set.dot_all {
                f.dot_all = value;
            }
            if set.extended {
                f.extended = value;
            }
            if set.ungreedy {
                f.ungreedy = value;
            }
        }
        f
    }
}

/// An immutable delimited pattern: `(delimiter, body, flags)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub delimiter: char,
    pub body: String,
    pub flags: Flags,
}

impl Pattern {
    /// Render the pattern back into delimited form.
    pub fn to_delimited(&self) -> String {
        let closer = closing_delimiter(self.delimiter);
        format!("{}{}{}{}", self.delimiter, self.body, closer, self.flags.letters())
    }
}

const SIMPLE_DELIMITERS: [char; 4] = ['/', '#', '~', '%'];

fn closing_delimiter(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        other => other,
    }
}

fn is_opening_delimiter(ch: char) -> bool {
    SIMPLE_DELIMITERS.contains(&ch) || matches!(ch, '(' | '[' | '{' | '<')
}

/// Split a source string into `(delimiter, body, flags)`.
///
/// Leading whitespace is skipped. If the first character is not a
/// recognized delimiter the whole string is treated as an undelimited body
/// with no flags (delimiter `/`).
///
/// # Errors
///
/// * `splitter.missing_delimiter` when the closing delimiter is absent
/// * `splitter.unknown_flag` listing every unrecognized flag letter,
///   including version-gated letters used on the wrong target version
pub fn split(source: &str, version: TargetVersion) -> Result<Pattern, Error> {
    let trimmed = source.trim_start();
    let offset = source.len() - trimmed.len();

    let mut chars = trimmed.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => {
            return Ok(Pattern {
                delimiter: '/',
                body: String::new(),
                flags: Flags::default(),
            })
        }
    };

    if !is_opening_delimiter(first) {
        return Ok(Pattern {
            delimiter: '/',
            body: trimmed.to_string(),
            flags: Flags::default(),
        });
    }

    let closer = closing_delimiter(first);
    let rest = &trimmed[first.len_utf8()..];

    // Scan for the unescaped closing delimiter. Paired delimiters nest.
    let mut depth = 0usize;
    let mut escaped = false;
    let mut close_at = None;
    for (i, ch) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            c if c == first && first != closer => depth += 1,
            c if c == closer => {
                if depth == 0 {
                    close_at = Some(i);
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    let close_at = close_at.ok_or_else(|| {
        Error::Parser(
            SourceError::new(
                format!("Missing closing delimiter '{}'", closer),
                offset + trimmed.len(),
                source,
                "splitter.missing_delimiter",
            )
            .with_hint(hint_for("splitter.missing_delimiter")),
        )
    })?;

    let body = rest[..close_at].to_string();
    let flag_text = rest[close_at + closer.len_utf8()..].trim();

    let (flags, mut unknown) = Flags::from_letters(flag_text);
    if flags.eval && !version.allows_eval_flag() {
        unknown.push('e');
    }
    if flags.return_substring && !version.allows_return_substring_flag() {
        unknown.push('r');
    }
    if !unknown.is_empty() {
        let listed: String = unknown.iter().collect();
        return Err(Error::Parser(
            SourceError::new(
                format!("Unknown flag(s) '{}' for version {}", listed, version),
                offset + first.len_utf8() + close_at + closer.len_utf8(),
                source,
                "splitter.unknown_flag",
            )
            .with_hint(hint_for("splitter.unknown_flag")),
        ));
    }

    Ok(Pattern {
        delimiter: first,
        body,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v() -> TargetVersion {
        TargetVersion::default()
    }

    #[test]
    fn test_split_slash() {
        let p = split("/ab+c/im", v()).unwrap();
        assert_eq!(p.delimiter, '/');
        assert_eq!(p.body, "ab+c");
        assert!(p.flags.ignore_case);
        assert!(p.flags.multiline);
        assert!(!p.flags.dot_all);
    }

    #[test]
    fn test_split_paired() {
        let p = split("{a{1,2}b}x", v()).unwrap();
        assert_eq!(p.delimiter, '{');
        assert_eq!(p.body, "a{1,2}b");
        assert!(p.flags.extended);
    }

    #[test]
    fn test_split_escaped_delimiter() {
        let p = split(r"/a\/b/", v()).unwrap();
        assert_eq!(p.body, r"a\/b");
    }

    #[test]
    fn test_undelimited_body() {
        let p = split("ab+c", v()).unwrap();
        assert_eq!(p.delimiter, '/');
        assert_eq!(p.body, "ab+c");
        assert!(p.flags.is_empty());
    }

    #[test]
    fn test_missing_closer() {
        let err = split("/abc", v()).unwrap_err();
        assert_eq!(err.code(), Some("splitter.missing_delimiter"));
    }

    #[test]
    fn test_unknown_flag() {
        let err = split("/abc/q", v()).unwrap_err();
        assert_eq!(err.code(), Some("splitter.unknown_flag"));
        assert!(err.to_string().contains('q'));
    }

    #[test]
    fn test_eval_flag_gated_by_version() {
        assert!(split("/a/e", TargetVersion::new(5, 6)).is_ok());
        let err = split("/a/e", TargetVersion::new(8, 0)).unwrap_err();
        assert_eq!(err.code(), Some("splitter.unknown_flag"));
    }

    #[test]
    fn test_return_substring_flag_introduced() {
        assert!(split("/a/r", TargetVersion::new(8, 4)).is_ok());
        assert!(split("/a/r", TargetVersion::new(8, 0)).is_err());
    }

    #[test]
    fn test_duplicate_flags_collapse() {
        let p = split("/a/iii", v()).unwrap();
        assert_eq!(p.flags.letters(), "i");
    }

    #[test]
    fn test_round_trip() {
        let p = split("/ab|c/sx", v()).unwrap();
        assert_eq!(p.to_delimited(), "/ab|c/sx");
    }
}
