//! Single-pass, position-preserving lexer for pattern bodies.
//!
//! The lexer resolves every escape sequence, tracks "inside character
//! class" context (where most metacharacters become literals), maintains
//! the inline-flag state so each token carries a flag snapshot, and skips
//! whitespace and comments under the `x` flag.

use crate::core::errors::{Error, SourceError};
use crate::core::hints::hint_for;
use crate::core::pattern::Flags;
use crate::core::tokens::*;
use crate::core::Span;

/// Tokenize a pattern body under the given top-level flags.
///
/// # Errors
///
/// `Error::Lexer` on unterminated classes, bad escapes, unterminated
/// property names and malformed group modifiers; `Error::Parser` for
/// ill-formed brace quantifiers (attributed to the grammar, not the
/// character stream).
pub fn tokenize(body: &str, flags: Flags) -> Result<Vec<Token>, Error> {
    Lexer::new(body, flags).run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    i: usize,
    flags: Flags,
    flag_stack: Vec<Flags>,
    in_class: usize,
    class_open_at: usize,
    quoting: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, flags: Flags) -> Self {
        Lexer {
            src,
            chars: src.char_indices().collect(),
            i: 0,
            flags,
            flag_stack: Vec::new(),
            in_class: 0,
            class_open_at: 0,
            quoting: false,
            tokens: Vec::new(),
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.chars.len()
    }

    fn pos(&self) -> usize {
        self.chars.get(self.i).map(|(b, _)| *b).unwrap_or(self.src.len())
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.chars.get(self.i + n).map(|(_, c)| *c)
    }

    fn take(&mut self) -> Option<char> {
        let ch = self.peek(0);
        if ch.is_some() {
            self.i += 1;
        }
        ch
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek(0) == Some(expected) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn err(&self, message: impl Into<String>, pos: usize, code: &str) -> Error {
        Error::Lexer(SourceError::new(message, pos, self.src, code).with_hint(hint_for(code)))
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let span = Span::new(start, self.pos());
        self.tokens.push(Token::new(kind, span, self.flags));
    }

    fn last_kind(&self) -> Option<&TokenKind> {
        self.tokens.last().map(|t| &t.kind)
    }

    fn run(mut self) -> Result<Vec<Token>, Error> {
        while !self.eof() {
            if self.quoting {
                self.lex_quoted();
                continue;
            }
            if self.flags.extended && self.in_class == 0 {
                if self.skip_extended_whitespace() {
                    continue;
                }
            }
            if self.in_class > 0 {
                self.lex_in_class()?;
            } else {
                self.lex_outside()?;
            }
        }

        if self.in_class > 0 {
            return Err(self.err(
                "Unterminated character class",
                self.class_open_at,
                "lexer.unterminated_class",
            ));
        }

        Ok(self.tokens)
    }

    /// Skip whitespace and `#`-to-EOL comments under the x flag.
    /// Comments become tokens so tooling can see them; whitespace is dropped.
    fn skip_extended_whitespace(&mut self) -> bool {
        match self.peek(0) {
            Some(c) if c.is_whitespace() => {
                self.i += 1;
                true
            }
            Some('#') => {
                let start = self.pos();
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.i += 1;
                }
                self.push(TokenKind::Comment, start);
                true
            }
            _ => false,
        }
    }

    fn lex_quoted(&mut self) {
        let start = self.pos();
        let ch = self.take().unwrap();
        if ch == '\\' && self.peek(0) == Some('E') {
            self.i += 1;
            self.quoting = false;
            return;
        }
        self.push(
            TokenKind::Literal {
                ch,
                escape: CharLiteralKind::Raw,
            },
            start,
        );
    }

    fn lex_outside(&mut self) -> Result<(), Error> {
        let start = self.pos();
        let ch = self.take().expect("not at EOF");

        match ch {
            '\\' => self.lex_escape(start),
            '[' => {
                self.in_class += 1;
                self.class_open_at = start;
                let negated = self.eat('^');
                self.push(TokenKind::ClassOpen { negated }, start);
                // A ']' immediately after the opener is a literal.
                if self.peek(0) == Some(']') {
                    let lit_start = self.pos();
                    self.i += 1;
                    self.push(
                        TokenKind::Literal {
                            ch: ']',
                            escape: CharLiteralKind::Raw,
                        },
                        lit_start,
                    );
                }
                Ok(())
            }
            '(' => self.lex_group_open(start),
            ')' => {
                if let Some(f) = self.flag_stack.pop() {
                    self.flags = f;
                }
                self.push(TokenKind::GroupClose, start);
                Ok(())
            }
            '|' => {
                self.push(TokenKind::Bar, start);
                Ok(())
            }
            '.' => {
                self.push(TokenKind::Dot, start);
                Ok(())
            }
            '^' => {
                self.push(
                    TokenKind::Anchor {
                        anchor: AnchorKind::Start,
                    },
                    start,
                );
                Ok(())
            }
            '$' => {
                self.push(
                    TokenKind::Anchor {
                        anchor: AnchorKind::End,
                    },
                    start,
                );
                Ok(())
            }
            '*' => {
                self.finish_quantifier(0, None, start);
                Ok(())
            }
            '+' => {
                self.finish_quantifier(1, None, start);
                Ok(())
            }
            '?' => {
                self.finish_quantifier(0, Some(1), start);
                Ok(())
            }
            '{' => self.lex_brace(start),
            other => {
                self.push(
                    TokenKind::Literal {
                        ch: other,
                        escape: CharLiteralKind::Raw,
                    },
                    start,
                );
                Ok(())
            }
        }
    }

    fn lex_in_class(&mut self) -> Result<(), Error> {
        let start = self.pos();
        let ch = self.take().expect("not at EOF");

        match ch {
            ']' => {
                self.in_class -= 1;
                self.push(TokenKind::ClassClose, start);
                Ok(())
            }
            '[' => {
                // Nested class, operand of the class algebra.
                self.in_class += 1;
                let negated = self.eat('^');
                self.push(TokenKind::ClassOpen { negated }, start);
                Ok(())
            }
            '\\' => self.lex_escape(start),
            '&' if self.peek(0) == Some('&') => {
                self.i += 1;
                self.push(
                    TokenKind::ClassOp {
                        op: ClassOpKind::Intersection,
                    },
                    start,
                );
                Ok(())
            }
            '-' if self.peek(0) == Some('-') => {
                self.i += 1;
                self.push(
                    TokenKind::ClassOp {
                        op: ClassOpKind::Difference,
                    },
                    start,
                );
                Ok(())
            }
            '~' if self.peek(0) == Some('~') => {
                self.i += 1;
                self.push(
                    TokenKind::ClassOp {
                        op: ClassOpKind::SymmetricDifference,
                    },
                    start,
                );
                Ok(())
            }
            '-' if self.range_dash_applies() => {
                self.push(TokenKind::RangeDash, start);
                Ok(())
            }
            other => {
                self.push(
                    TokenKind::Literal {
                        ch: other,
                        escape: CharLiteralKind::Raw,
                    },
                    start,
                );
                Ok(())
            }
        }
    }

    /// `-` is a range operator when it sits between a potential endpoint and
    /// something other than the class end; otherwise it is a literal.
    fn range_dash_applies(&self) -> bool {
        let prev_ok = matches!(
            self.last_kind(),
            Some(TokenKind::Literal { .. })
                | Some(TokenKind::CharType { .. })
                | Some(TokenKind::UnicodeProperty { .. })
        );
        let next_ok = !matches!(self.peek(0), None | Some(']'));
        prev_ok && next_ok
    }

    fn finish_quantifier(&mut self, min: u32, max: Option<u32>, start: usize) {
        let greediness = if self.eat('?') {
            Greediness::Lazy
        } else if self.eat('+') {
            Greediness::Possessive
        } else {
            Greediness::Greedy
        };
        self.push(
            TokenKind::Quantifier {
                min,
                max,
                greediness,
            },
            start,
        );
    }

    /// `{` starts a quantifier only when followed by a digit; otherwise it
    /// is an ordinary literal. A digit-led brace that does not close as
    /// `{m}`, `{m,}` or `{m,n}` is rejected.
    fn lex_brace(&mut self, start: usize) -> Result<(), Error> {
        if !matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
            self.push(
                TokenKind::Literal {
                    ch: '{',
                    escape: CharLiteralKind::Raw,
                },
                start,
            );
            return Ok(());
        }

        let bad = |l: &Lexer| {
            Err(Error::Parser(
                SourceError::new(
                    "Ill-formed {m,n} quantifier",
                    start,
                    l.src,
                    "parser.bad_brace_quantifier",
                )
                .with_hint(hint_for("parser.bad_brace_quantifier")),
            ))
        };

        let min = match self.read_decimal() {
            Some(n) => n,
            None => return bad(self),
        };
        let max = if self.eat(',') {
            if self.peek(0) == Some('}') {
                None
            } else {
                match self.read_decimal() {
                    Some(n) => Some(n),
                    None => return bad(self),
                }
            }
        } else {
            Some(min)
        };
        if !self.eat('}') {
            return bad(self);
        }
        self.finish_quantifier(min, max, start);
        Ok(())
    }

    fn read_decimal(&mut self) -> Option<u32> {
        let mut value: u64 = 0;
        let mut any = false;
        while let Some(c) = self.peek(0) {
            if let Some(d) = c.to_digit(10) {
                any = true;
                self.i += 1;
                value = value.saturating_mul(10).saturating_add(d as u64);
            } else {
                break;
            }
        }
        if any {
            Some(value.min(u32::MAX as u64) as u32)
        } else {
            None
        }
    }

    fn read_hex(&mut self, max_digits: usize) -> Option<u32> {
        let mut value: u32 = 0;
        let mut count = 0;
        while count < max_digits {
            match self.peek(0).and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    self.i += 1;
                    value = value.wrapping_mul(16).wrapping_add(d);
                    count += 1;
                }
                None => break,
            }
        }
        if count > 0 {
            Some(value)
        } else {
            None
        }
    }

    fn read_name<F: Fn(char) -> bool>(&mut self, valid: F) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if valid(c) {
                name.push(c);
                self.i += 1;
            } else {
                break;
            }
        }
        name
    }

    fn literal_from(&mut self, ch: char, kind: CharLiteralKind, start: usize) -> Result<(), Error> {
        self.push(TokenKind::Literal { ch, escape: kind }, start);
        Ok(())
    }

    fn codepoint(&self, value: u32, start: usize) -> Result<char, Error> {
        char::from_u32(value)
            .ok_or_else(|| self.err(format!("Invalid codepoint U+{:X}", value), start, "lexer.bad_escape"))
    }

    fn lex_escape(&mut self, start: usize) -> Result<(), Error> {
        let ch = match self.take() {
            Some(c) => c,
            None => {
                return Err(self.err(
                    "Pattern ends with a trailing backslash",
                    start,
                    "lexer.bad_escape",
                ))
            }
        };
        let in_class = self.in_class > 0;

        match ch {
            // Character types, valid in both contexts
            'd' | 'D' | 'w' | 'W' | 's' | 'S' | 'h' | 'H' | 'v' | 'V' => {
                self.push(TokenKind::CharType { letter: ch }, start);
                Ok(())
            }
            // \R (newline sequence) and bare \N (non-newline) are atoms only
            'R' => {
                if in_class {
                    return Err(self.err(r"\R is not allowed in a character class", start, "lexer.bad_escape"));
                }
                self.push(TokenKind::CharType { letter: 'R' }, start);
                Ok(())
            }
            'N' if self.peek(0) != Some('{') => {
                if in_class {
                    return Err(self.err(r"\N is not allowed in a character class", start, "lexer.bad_escape"));
                }
                self.push(TokenKind::CharType { letter: 'N' }, start);
                Ok(())
            }
            // \N{U+hhhh}
            'N' => {
                self.i += 1; // '{'
                if !self.eat('U') || !self.eat('+') {
                    return Err(self.err(
                        r"\N{...} supports only the \N{U+hhhh} form",
                        start,
                        "lexer.bad_escape",
                    ));
                }
                let value = self
                    .read_hex(6)
                    .ok_or_else(|| self.err(r"Missing hex digits in \N{U+...}", start, "lexer.bad_hex"))?;
                if !self.eat('}') {
                    return Err(self.err(r"Unterminated \N{U+...} escape", start, "lexer.bad_escape"));
                }
                let c = self.codepoint(value, start)?;
                self.literal_from(c, CharLiteralKind::UnicodeNamed, start)
            }
            // Anchors (\b is a backspace literal inside a class)
            'A' if !in_class => self.anchor(AnchorKind::StartOfString, start),
            'z' if !in_class => self.anchor(AnchorKind::EndOfString, start),
            'Z' if !in_class => self.anchor(AnchorKind::EndBeforeNewline, start),
            'b' if !in_class => self.anchor(AnchorKind::WordBoundary, start),
            'B' if !in_class => self.anchor(AnchorKind::NonWordBoundary, start),
            'G' if !in_class => self.anchor(AnchorKind::MatchStart, start),
            'K' if !in_class => self.anchor(AnchorKind::Keep, start),
            'b' => self.literal_from('\u{0008}', CharLiteralKind::Control, start),

            // Simple control escapes
            'n' => self.literal_from('\n', CharLiteralKind::Control, start),
            'r' => self.literal_from('\r', CharLiteralKind::Control, start),
            't' => self.literal_from('\t', CharLiteralKind::Control, start),
            'f' => self.literal_from('\u{000C}', CharLiteralKind::Control, start),
            'a' => self.literal_from('\u{0007}', CharLiteralKind::Control, start),
            'e' => self.literal_from('\u{001B}', CharLiteralKind::Control, start),

            // \cX
            'c' => {
                let x = self.take().ok_or_else(|| {
                    self.err(r"\c must be followed by a character", start, "lexer.bad_escape")
                })?;
                if !x.is_ascii() {
                    return Err(self.err(r"\cX requires an ASCII character", start, "lexer.bad_escape"));
                }
                let value = (x.to_ascii_uppercase() as u32) ^ 0x40;
                let c = self.codepoint(value, start)?;
                self.literal_from(c, CharLiteralKind::Control, start)
            }

            // \xHH and \x{H...}
            'x' => {
                if self.eat('{') {
                    let value = self
                        .read_hex(6)
                        .ok_or_else(|| self.err(r"Missing hex digits in \x{...}", start, "lexer.bad_hex"))?;
                    if !self.eat('}') {
                        return Err(self.err(r"Unterminated \x{...} escape", start, "lexer.bad_hex"));
                    }
                    let c = self.codepoint(value, start)?;
                    self.literal_from(c, CharLiteralKind::Hex, start)
                } else {
                    let value = self
                        .read_hex(2)
                        .ok_or_else(|| self.err(r"Missing hex digits after \x", start, "lexer.bad_hex"))?;
                    let c = self.codepoint(value, start)?;
                    self.literal_from(c, CharLiteralKind::Hex, start)
                }
            }

            // \uHHHH
            'u' => {
                let value = self
                    .read_hex(4)
                    .ok_or_else(|| self.err(r"Missing hex digits after \u", start, "lexer.bad_hex"))?;
                let c = self.codepoint(value, start)?;
                self.literal_from(c, CharLiteralKind::Unicode, start)
            }

            // Octal: \0, \0dd and (inside classes) \ddd
            '0' => {
                let mut value = 0u32;
                for _ in 0..2 {
                    match self.peek(0).and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            self.i += 1;
                            value = value * 8 + d;
                        }
                        None => break,
                    }
                }
                let c = self.codepoint(value, start)?;
                self.literal_from(c, CharLiteralKind::Octal, start)
            }

            // Digits: backreference outside classes, octal inside
            c @ '1'..='9' => {
                if in_class {
                    let mut value = c.to_digit(8).unwrap_or(0);
                    if c.to_digit(8).is_none() {
                        // \8 and \9 fall back to the literal digit
                        return self.literal_from(c, CharLiteralKind::Raw, start);
                    }
                    for _ in 0..2 {
                        match self.peek(0).and_then(|d| d.to_digit(8)) {
                            Some(d) => {
                                self.i += 1;
                                value = value * 8 + d;
                            }
                            None => break,
                        }
                    }
                    let resolved = self.codepoint(value, start)?;
                    self.literal_from(resolved, CharLiteralKind::Octal, start)
                } else {
                    let mut number = c.to_digit(10).unwrap();
                    if let Some(d) = self.peek(0).and_then(|d| d.to_digit(10)) {
                        self.i += 1;
                        number = number * 10 + d;
                    }
                    self.push(
                        TokenKind::Backreference {
                            target: BackrefTarget::Number(number),
                        },
                        start,
                    );
                    Ok(())
                }
            }

            // \k<name>, \k'name', \k{name}
            'k' if !in_class => {
                let (open, close) = match self.take() {
                    Some('<') => ('<', '>'),
                    Some('\'') => ('\'', '\''),
                    Some('{') => ('{', '}'),
                    _ => {
                        return Err(self.err(
                            r"\k must be followed by <name>, 'name' or {name}",
                            start,
                            "lexer.bad_escape",
                        ))
                    }
                };
                let _ = open;
                let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() || !self.eat(close) {
                    return Err(self.err(r"Malformed \k backreference name", start, "lexer.bad_escape"));
                }
                self.push(
                    TokenKind::Backreference {
                        target: BackrefTarget::Name(name),
                    },
                    start,
                );
                Ok(())
            }

            // \g1, \g{n}, \g{-n}, \g{name}; \g<name>/\g'name' are calls
            'g' if !in_class => self.lex_g_escape(start),

            // Unicode properties
            'p' | 'P' => {
                let mut negated = ch == 'P';
                let name = if self.eat('{') {
                    if self.eat('^') {
                        negated = !negated;
                    }
                    let name = self.read_name(|c| c.is_alphanumeric() || c == '_' || c == '&');
                    if !self.eat('}') {
                        return Err(self.err(
                            "Unterminated unicode property name",
                            start,
                            "lexer.unterminated_property",
                        ));
                    }
                    name
                } else {
                    match self.take() {
                        Some(c) if c.is_ascii_alphabetic() => c.to_string(),
                        _ => {
                            return Err(self.err(
                                r"\p must be followed by a property letter or {name}",
                                start,
                                "lexer.unterminated_property",
                            ))
                        }
                    }
                };
                if name.is_empty() {
                    return Err(self.err(
                        "Empty unicode property name",
                        start,
                        "lexer.unterminated_property",
                    ));
                }
                self.push(TokenKind::UnicodeProperty { negated, name }, start);
                Ok(())
            }

            // \Q ... \E quoted span
            'Q' => {
                self.quoting = true;
                Ok(())
            }
            'E' => Ok(()),

            // Identity escapes for punctuation; unknown letter escapes fail
            other if other.is_alphanumeric() => Err(self.err(
                format!("Unrecognized escape \\{}", other),
                start,
                "lexer.bad_escape",
            )),
            other => self.literal_from(other, CharLiteralKind::Raw, start),
        }
    }

    fn lex_g_escape(&mut self, start: usize) -> Result<(), Error> {
        match self.peek(0) {
            Some('{') => {
                self.i += 1;
                let negative = self.eat('-');
                if let Some(c) = self.peek(0) {
                    if c.is_ascii_digit() {
                        let n = self
                            .read_decimal()
                            .ok_or_else(|| self.err(r"Malformed \g{...}", start, "lexer.bad_escape"))?;
                        if !self.eat('}') {
                            return Err(self.err(r"Unterminated \g{...}", start, "lexer.bad_escape"));
                        }
                        let target = if negative {
                            BackrefTarget::Relative(n as i32)
                        } else {
                            BackrefTarget::Number(n)
                        };
                        self.push(TokenKind::Backreference { target }, start);
                        return Ok(());
                    }
                }
                if negative {
                    return Err(self.err(r"Malformed \g{-...}", start, "lexer.bad_escape"));
                }
                let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() || !self.eat('}') {
                    return Err(self.err(r"Malformed \g{...}", start, "lexer.bad_escape"));
                }
                self.push(
                    TokenKind::Backreference {
                        target: BackrefTarget::Name(name),
                    },
                    start,
                );
                Ok(())
            }
            Some('<') | Some('\'') => {
                let close = if self.take() == Some('<') { '>' } else { '\'' };
                let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() || !self.eat(close) {
                    return Err(self.err(r"Malformed \g subroutine call", start, "lexer.bad_escape"));
                }
                self.push(
                    TokenKind::Subroutine {
                        target: SubroutineTarget::Name(name),
                    },
                    start,
                );
                Ok(())
            }
            Some(c) if c.is_ascii_digit() => {
                let n = self
                    .read_decimal()
                    .ok_or_else(|| self.err(r"Malformed \g backreference", start, "lexer.bad_escape"))?;
                self.push(
                    TokenKind::Backreference {
                        target: BackrefTarget::Number(n),
                    },
                    start,
                );
                Ok(())
            }
            _ => Err(self.err(
                r"\g must be followed by a number, {...}, <name> or 'name'",
                start,
                "lexer.bad_escape",
            )),
        }
    }

    fn anchor(&mut self, kind: AnchorKind, start: usize) -> Result<(), Error> {
        self.push(TokenKind::Anchor { anchor: kind }, start);
        Ok(())
    }

    fn lex_group_open(&mut self, start: usize) -> Result<(), Error> {
        if !self.eat('?') {
            self.flag_stack.push(self.flags);
            self.push(
                TokenKind::GroupOpen {
                    open: GroupOpenKind::Capturing,
                },
                start,
            );
            return Ok(());
        }

        let kind = match self.peek(0) {
            Some(':') => {
                self.i += 1;
                GroupOpenKind::NonCapturing
            }
            Some('=') => {
                self.i += 1;
                GroupOpenKind::LookaheadPos
            }
            Some('!') => {
                self.i += 1;
                GroupOpenKind::LookaheadNeg
            }
            Some('>') => {
                self.i += 1;
                GroupOpenKind::Atomic
            }
            Some('|') => {
                self.i += 1;
                GroupOpenKind::BranchReset
            }
            Some('#') => {
                // (?#...) comment, closed by the first ')'
                self.i += 1;
                while let Some(c) = self.take() {
                    if c == ')' {
                        self.push(TokenKind::Comment, start);
                        return Ok(());
                    }
                }
                return Err(self.err("Unterminated (?#...) comment", start, "lexer.bad_group_modifier"));
            }
            Some('<') => {
                self.i += 1;
                match self.peek(0) {
                    Some('=') => {
                        self.i += 1;
                        GroupOpenKind::LookbehindPos
                    }
                    Some('!') => {
                        self.i += 1;
                        GroupOpenKind::LookbehindNeg
                    }
                    _ => {
                        let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                        if name.is_empty() {
                            return Err(self.err(
                                "Empty group name",
                                start,
                                "parser.empty_group_name",
                            ));
                        }
                        if !self.eat('>') {
                            return Err(self.err(
                                "Unterminated group name",
                                start,
                                "lexer.bad_group_modifier",
                            ));
                        }
                        GroupOpenKind::Named { name }
                    }
                }
            }
            Some('\'') => {
                self.i += 1;
                let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() || !self.eat('\'') {
                    return Err(self.err("Malformed (?'name'...) group", start, "lexer.bad_group_modifier"));
                }
                GroupOpenKind::Named { name }
            }
            Some('P') => {
                self.i += 1;
                match self.take() {
                    Some('<') => {
                        let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                        if name.is_empty() || !self.eat('>') {
                            return Err(self.err(
                                "Malformed (?P<name>...) group",
                                start,
                                "lexer.bad_group_modifier",
                            ));
                        }
                        GroupOpenKind::Named { name }
                    }
                    Some('=') => {
                        let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                        if name.is_empty() || !self.eat(')') {
                            return Err(self.err(
                                "Malformed (?P=name) backreference",
                                start,
                                "lexer.bad_group_modifier",
                            ));
                        }
                        self.push(
                            TokenKind::Backreference {
                                target: BackrefTarget::Name(name),
                            },
                            start,
                        );
                        return Ok(());
                    }
                    Some('>') => {
                        let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                        if name.is_empty() || !self.eat(')') {
                            return Err(self.err(
                                "Malformed (?P>name) subroutine call",
                                start,
                                "lexer.bad_group_modifier",
                            ));
                        }
                        self.push(
                            TokenKind::Subroutine {
                                target: SubroutineTarget::Name(name),
                            },
                            start,
                        );
                        return Ok(());
                    }
                    _ => {
                        return Err(self.err(
                            "Malformed (?P...) construct",
                            start,
                            "lexer.bad_group_modifier",
                        ))
                    }
                }
            }
            Some('R') if self.peek(1) == Some(')') => {
                self.i += 2;
                self.push(
                    TokenKind::Subroutine {
                        target: SubroutineTarget::WholePattern,
                    },
                    start,
                );
                return Ok(());
            }
            Some('&') => {
                self.i += 1;
                let name = self.read_name(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() || !self.eat(')') {
                    return Err(self.err(
                        "Malformed (?&name) subroutine call",
                        start,
                        "lexer.bad_group_modifier",
                    ));
                }
                self.push(
                    TokenKind::Subroutine {
                        target: SubroutineTarget::Name(name),
                    },
                    start,
                );
                return Ok(());
            }
            Some('(') => {
                self.i += 1;
                let condition = self.lex_condition(start)?;
                match condition {
                    None => GroupOpenKind::Define,
                    Some(cond) => GroupOpenKind::Conditional { condition: cond },
                }
            }
            Some(c) if c.is_ascii_digit() => {
                let n = self.read_decimal().unwrap_or(0);
                if !self.eat(')') {
                    return Err(self.err(
                        "Malformed (?n) subroutine call",
                        start,
                        "lexer.bad_group_modifier",
                    ));
                }
                self.push(
                    TokenKind::Subroutine {
                        target: SubroutineTarget::Number(n),
                    },
                    start,
                );
                return Ok(());
            }
            Some(c) if c == '-' || "imsxuUJX".contains(c) => self.lex_inline_flags(start)?,
            _ => {
                return Err(self.err(
                    format!(
                        "Unknown group modifier '?{}'",
                        self.peek(0).map(|c| c.to_string()).unwrap_or_default()
                    ),
                    start,
                    "lexer.bad_group_modifier",
                ))
            }
        };

        // Unscoped inline flags close their own paren; everything else
        // pushes the flag snapshot for the matching GroupClose to restore.
        let unscoped_inline = matches!(&kind, GroupOpenKind::InlineFlags { scoped: false, .. });
        if !unscoped_inline {
            self.flag_stack.push(self.flags);
        }
        if let GroupOpenKind::InlineFlags { on, off, .. } = &kind {
            self.flags = self.flags.apply_inline(on, off);
        }
        self.push(TokenKind::GroupOpen { open: kind }, start);
        Ok(())
    }

    /// The condition of `(?(...)...)`. Returns `None` for `(?(DEFINE)`.
    fn lex_condition(&mut self, start: usize) -> Result<Option<CondRef>, Error> {
        let text = self.read_name(|c| c != ')');
        if !self.eat(')') {
            return Err(self.err(
                "Unterminated conditional group condition",
                start,
                "lexer.bad_group_modifier",
            ));
        }
        if text == "DEFINE" {
            return Ok(None);
        }
        if text == "R" {
            return Ok(Some(CondRef::Recursion));
        }
        if let Ok(n) = text.parse::<u32>() {
            return Ok(Some(CondRef::GroupNumber { number: n }));
        }
        let name = text
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
            .unwrap_or(&text);
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.err(
                format!("Malformed conditional reference '{}'", text),
                start,
                "lexer.bad_group_modifier",
            ));
        }
        Ok(Some(CondRef::GroupName {
            name: name.to_string(),
        }))
    }

    fn lex_inline_flags(&mut self, start: usize) -> Result<GroupOpenKind, Error> {
        let on_letters = self.read_name(|c| "imsxuUJX".contains(c));
        let off_letters = if self.eat('-') {
            self.read_name(|c| "imsxuUJX".contains(c))
        } else {
            String::new()
        };
        let scoped = match self.take() {
            Some(')') => false,
            Some(':') => true,
            _ => {
                return Err(self.err(
                    "Malformed inline flag group",
                    start,
                    "lexer.bad_group_modifier",
                ))
            }
        };
        let (on, _) = Flags::from_letters(&on_letters);
        let (off, _) = Flags::from_letters(&off_letters);
        Ok(GroupOpenKind::InlineFlags { on, off, scoped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(body: &str) -> Vec<Token> {
        tokenize(body, Flags::default()).unwrap()
    }

    fn kinds(body: &str) -> Vec<TokenKind> {
        lex(body).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_literals_and_dot() {
        let ks = kinds("a.b");
        assert_eq!(ks.len(), 3);
        assert!(matches!(ks[0], TokenKind::Literal { ch: 'a', .. }));
        assert!(matches!(ks[1], TokenKind::Dot));
    }

    #[test]
    fn test_spans_are_preserved() {
        let ts = lex("ab+");
        assert_eq!(ts[0].span, Span::new(0, 1));
        assert_eq!(ts[1].span, Span::new(1, 2));
        assert_eq!(ts[2].span, Span::new(2, 3));
    }

    #[test]
    fn test_quantifiers() {
        let ks = kinds("a*?b{2,5}+c{3}");
        assert!(matches!(
            ks[1],
            TokenKind::Quantifier {
                min: 0,
                max: None,
                greediness: Greediness::Lazy
            }
        ));
        assert!(matches!(
            ks[3],
            TokenKind::Quantifier {
                min: 2,
                max: Some(5),
                greediness: Greediness::Possessive
            }
        ));
        assert!(matches!(
            ks[5],
            TokenKind::Quantifier {
                min: 3,
                max: Some(3),
                greediness: Greediness::Greedy
            }
        ));
    }

    #[test]
    fn test_bad_brace_quantifier() {
        let err = tokenize("a{2,", Flags::default()).unwrap_err();
        assert_eq!(err.code(), Some("parser.bad_brace_quantifier"));
    }

    #[test]
    fn test_brace_literal_when_not_quantifier() {
        let ks = kinds("a{x}");
        assert!(matches!(ks[1], TokenKind::Literal { ch: '{', .. }));
    }

    #[test]
    fn test_class_tokens() {
        let ks = kinds("[^a-z\\d]");
        assert!(matches!(ks[0], TokenKind::ClassOpen { negated: true }));
        assert!(matches!(ks[1], TokenKind::Literal { ch: 'a', .. }));
        assert!(matches!(ks[2], TokenKind::RangeDash));
        assert!(matches!(ks[3], TokenKind::Literal { ch: 'z', .. }));
        assert!(matches!(ks[4], TokenKind::CharType { letter: 'd' }));
        assert!(matches!(ks[5], TokenKind::ClassClose));
    }

    #[test]
    fn test_leading_class_bracket_is_literal() {
        let ks = kinds("[]a]");
        assert!(matches!(ks[1], TokenKind::Literal { ch: ']', .. }));
        assert!(matches!(ks[3], TokenKind::ClassClose));
    }

    #[test]
    fn test_trailing_dash_is_literal() {
        let ks = kinds("[a-]");
        assert!(matches!(ks[2], TokenKind::Literal { ch: '-', .. }));
    }

    #[test]
    fn test_class_operators() {
        let ks = kinds("[[a-z]&&[aeiou]]");
        assert!(ks.iter().any(|k| matches!(
            k,
            TokenKind::ClassOp {
                op: ClassOpKind::Intersection
            }
        )));
    }

    #[test]
    fn test_unterminated_class() {
        let err = tokenize("[abc", Flags::default()).unwrap_err();
        assert_eq!(err.code(), Some("lexer.unterminated_class"));
    }

    #[test]
    fn test_escapes() {
        let ks = kinds(r"\n\x41\x{1F600}A\cM\0");
        assert!(matches!(ks[0], TokenKind::Literal { ch: '\n', escape: CharLiteralKind::Control }));
        assert!(matches!(ks[1], TokenKind::Literal { ch: 'A', escape: CharLiteralKind::Hex }));
        assert!(matches!(ks[2], TokenKind::Literal { ch: '😀', escape: CharLiteralKind::Hex }));
        assert!(matches!(ks[3], TokenKind::Literal { ch: 'A', escape: CharLiteralKind::Unicode }));
        assert!(matches!(ks[4], TokenKind::Literal { ch: '\r', escape: CharLiteralKind::Control }));
        assert!(matches!(ks[5], TokenKind::Literal { ch: '\0', escape: CharLiteralKind::Octal }));
    }

    #[test]
    fn test_named_codepoint() {
        let ks = kinds(r"\N{U+0041}");
        assert!(matches!(
            ks[0],
            TokenKind::Literal {
                ch: 'A',
                escape: CharLiteralKind::UnicodeNamed
            }
        ));
    }

    #[test]
    fn test_backreferences() {
        let ks = kinds(r"(a)\1\k<x>\g{2}\g{-1}");
        assert!(matches!(
            ks[3],
            TokenKind::Backreference {
                target: BackrefTarget::Number(1)
            }
        ));
        assert!(matches!(
            &ks[4],
            TokenKind::Backreference {
                target: BackrefTarget::Name(n)
            } if n == "x"
        ));
        assert!(matches!(
            ks[5],
            TokenKind::Backreference {
                target: BackrefTarget::Number(2)
            }
        ));
        assert!(matches!(
            ks[6],
            TokenKind::Backreference {
                target: BackrefTarget::Relative(1)
            }
        ));
    }

    #[test]
    fn test_group_variants() {
        let ks = kinds("(?:a)(?=b)(?<!c)(?<y>d)(?>e)(?|f)");
        assert!(matches!(&ks[0], TokenKind::GroupOpen { open: GroupOpenKind::NonCapturing }));
        assert!(matches!(&ks[3], TokenKind::GroupOpen { open: GroupOpenKind::LookaheadPos }));
        assert!(matches!(&ks[6], TokenKind::GroupOpen { open: GroupOpenKind::LookbehindNeg }));
        assert!(matches!(
            &ks[9],
            TokenKind::GroupOpen { open: GroupOpenKind::Named { name } } if name == "y"
        ));
        assert!(matches!(&ks[12], TokenKind::GroupOpen { open: GroupOpenKind::Atomic }));
        assert!(matches!(&ks[15], TokenKind::GroupOpen { open: GroupOpenKind::BranchReset }));
    }

    #[test]
    fn test_conditional_and_define() {
        let ks = kinds("(?(1)a|b)(?(DEFINE)(?<n>x))");
        assert!(matches!(
            &ks[0],
            TokenKind::GroupOpen {
                open: GroupOpenKind::Conditional {
                    condition: CondRef::GroupNumber { number: 1 }
                }
            }
        ));
        assert!(ks.iter().any(|k| matches!(k, TokenKind::GroupOpen { open: GroupOpenKind::Define })));
    }

    #[test]
    fn test_subroutine_calls() {
        let ks = kinds("(?R)(?1)(?&name)");
        assert!(matches!(
            ks[0],
            TokenKind::Subroutine {
                target: SubroutineTarget::WholePattern
            }
        ));
        assert!(matches!(
            ks[1],
            TokenKind::Subroutine {
                target: SubroutineTarget::Number(1)
            }
        ));
        assert!(matches!(
            &ks[2],
            TokenKind::Subroutine { target: SubroutineTarget::Name(n) } if n == "name"
        ));
    }

    #[test]
    fn test_inline_flags_snapshot() {
        // (?i) applies to the rest of the stream
        let ts = lex("a(?i)b");
        assert!(!ts[0].flags.ignore_case);
        assert!(ts.last().unwrap().flags.ignore_case);
    }

    #[test]
    fn test_scoped_inline_flags_restore() {
        let ts = lex("(?i:a)b");
        let b = ts.last().unwrap();
        assert!(matches!(b.kind, TokenKind::Literal { ch: 'b', .. }));
        assert!(!b.flags.ignore_case);
    }

    #[test]
    fn test_extended_mode_skips_whitespace() {
        let (flags, _) = Flags::from_letters("x");
        let ts = tokenize("a b # note\nc", flags).unwrap();
        let lits: Vec<char> = ts
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Literal { ch, .. } => Some(ch),
                _ => None,
            })
            .collect();
        assert_eq!(lits, vec!['a', 'b', 'c']);
        assert!(ts.iter().any(|t| matches!(t.kind, TokenKind::Comment)));
    }

    #[test]
    fn test_quoted_span() {
        let ks = kinds(r"\Qa+b\E*");
        assert!(matches!(ks[0], TokenKind::Literal { ch: 'a', .. }));
        assert!(matches!(ks[1], TokenKind::Literal { ch: '+', .. }));
        assert!(matches!(ks[2], TokenKind::Literal { ch: 'b', .. }));
        assert!(matches!(ks[3], TokenKind::Quantifier { .. }));
    }

    #[test]
    fn test_unknown_letter_escape_fails() {
        let err = tokenize(r"\j", Flags::default()).unwrap_err();
        assert_eq!(err.code(), Some("lexer.bad_escape"));
    }

    #[test]
    fn test_unicode_property() {
        let ks = kinds(r"\p{L}\P{Nd}\pN");
        assert!(matches!(
            &ks[0],
            TokenKind::UnicodeProperty { negated: false, name } if name == "L"
        ));
        assert!(matches!(
            &ks[1],
            TokenKind::UnicodeProperty { negated: true, name } if name == "Nd"
        ));
        assert!(matches!(
            &ks[2],
            TokenKind::UnicodeProperty { negated: false, name } if name == "N"
        ));
    }
}
