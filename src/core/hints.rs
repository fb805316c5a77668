//! Context-aware hints for common pattern mistakes.
//!
//! Maps stable error codes to instructional messages that help users
//! understand and fix their patterns. Hints are attached to errors at the
//! point where they are raised; unknown codes simply produce no hint.

/// Get a hint for a given error code.
///
/// # Arguments
///
/// * `code` - The stable error code raised by the lexer, parser or validator
///
/// # Returns
///
/// An optional hint string providing guidance on how to fix the error
pub fn hint_for(code: &str) -> Option<String> {
    let text = match code {
        "splitter.missing_delimiter" => {
            "A delimited pattern must start and end with the same delimiter, \
             e.g. /abc/i. Paired delimiters ( ) [ ] { } < > close with their \
             counterpart."
        }
        "splitter.unknown_flag" => {
            "Recognized flags are: i (case-insensitive), m (multiline), \
             s (dotall), x (extended), u (unicode), U (ungreedy), A (anchored), \
             D (dollar-end-only), J (duplicate names), X (extra)."
        }
        "lexer.unterminated_class" => {
            "This character class was opened with '[' but never closed. \
             Add a matching ']' to close the character class."
        }
        "lexer.bad_escape" => {
            "The character after '\\' does not form a valid escape sequence. \
             To match a literal backslash, write '\\\\'."
        }
        "lexer.unterminated_property" => {
            "Unicode property names must be enclosed in braces, e.g. \\p{L}. \
             Add the closing '}'."
        }
        "lexer.bad_hex" => {
            "Hex escapes take the form \\xHH or \\x{H...} with hexadecimal \
             digits only."
        }
        "lexer.bad_group_modifier" => {
            "After '(?' the parser expects ':', '=', '!', '<', '>', '#', '|', \
             'P', a flag letter, or a digit for a conditional reference."
        }
        "parser.unbalanced_group" => {
            "This group was opened with '(' but never closed. \
             Add a matching ')' to close the group."
        }
        "parser.unmatched_close" => {
            "This ')' does not have a matching opening '('. \
             Did you mean to escape it with '\\)'?"
        }
        "parser.dangling_quantifier" => {
            "A quantifier must follow something to repeat. \
             Add an atom before '*', '+', '?' or '{m,n}'."
        }
        "parser.bad_brace_quantifier" => {
            "Brace quantifiers take the form {m}, {m,} or {m,n} with decimal \
             numbers. To match a literal brace, escape it as '\\{'."
        }
        "parser.empty_group_name" => {
            "Named groups need a non-empty name, e.g. (?<year>\\d{4})."
        }
        "quantifier.reversed" => {
            "In {m,n} the maximum must not be smaller than the minimum. \
             Swap the bounds."
        }
        "range.reversed" => {
            "In a character range the left endpoint must not exceed the \
             right one by codepoint. Write the smaller character first."
        }
        "backref.missing" => {
            "A numeric backreference must point at a capturing group that is \
             opened earlier in the pattern. Count only capturing groups: \
             (?:...) groups do not get numbers."
        }
        "backref.unknown_name" => {
            "A named backreference must use the exact name of an earlier \
             named group, e.g. (?<word>\\w+) ... \\k<word>."
        }
        "group.duplicate_name" => {
            "Two groups share the same name. Rename one of them, move both \
             into the same branch-reset group (?|...), or enable the J flag."
        }
        "lookbehind.unbounded" => {
            "Lookbehind bodies must have a statically bounded length. \
             Replace unbounded quantifiers like '*' or '+' with bounded \
             counts such as {0,20}."
        }
        _ => return None,
    };
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_group_hint() {
        let hint = hint_for("parser.unbalanced_group");
        assert!(hint.is_some());
        assert!(hint.unwrap().contains("matching ')'"));
    }

    #[test]
    fn test_unknown_flag_hint() {
        let hint = hint_for("splitter.unknown_flag");
        assert!(hint.is_some());
        assert!(hint.unwrap().contains("i (case-insensitive)"));
    }

    #[test]
    fn test_no_hint_for_unknown_code() {
        assert!(hint_for("nonsense.code").is_none());
    }
}
