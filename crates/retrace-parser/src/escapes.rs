//! Escape sequences
//!
//! One entry point, [`Parser::parse_escape`], shared by the outer pattern
//! and bracket classes; `in_class` selects the diverging behaviors (`\b` is
//! backspace inside a class, backreferences are forbidden there, and the
//! zero-width escapes make no sense as class members).

use retrace_ast::{
    CharacterClass, ClassAssertion, NamedBackreference, Node, NumberedBackreference,
    SimpleAssertionKind,
};
use retrace_stream::CodepointStream;
use retrace_unicode as unicode;

use crate::error::ParseErrorKind;
use crate::{Parser, line_terminator_ranges};

/// What an escape sequence denoted.
pub(crate) enum Escaped {
    /// A single literal codepoint; may serve as a class range endpoint.
    Char(char),
    /// Several literal codepoints (`\Q…\E`, or an octal escape with
    /// trailing digits).
    Run(String),
    /// A character class (`\d`, `\w`, …).
    Class(CharacterClass),
    /// A full pattern node; never produced inside a class.
    Node(Node),
    /// Nothing to add (`\E` on its own, or an already-reported error).
    Nothing,
}

impl<S: CodepointStream> Parser<'_, S> {
    /// Parse one escape sequence. The backslash is already consumed; the
    /// cursor sits on the escape character.
    pub(crate) fn parse_escape(&mut self, in_class: bool) -> Escaped {
        let position = self.stream.position().saturating_sub(1);
        let Some(c) = self.stream.take() else {
            self.report_at(position, ParseErrorKind::IncompleteEscape);
            return Escaped::Nothing;
        };
        match c {
            'a' => Escaped::Char('\x07'),
            'e' => Escaped::Char('\x1B'),
            'f' => Escaped::Char('\x0C'),
            'n' => Escaped::Char('\n'),
            'r' => Escaped::Char('\r'),
            't' => Escaped::Char('\t'),
            '0' => self.octal_after_zero(),
            '1'..='9' => self.digit_escape(c, in_class, position),
            'o' => self.braced_codepoint(position, 8),
            'x' => self.hex_escape(position),
            'c' => self.control_escape(position),
            'd' => Escaped::Class(self.shorthand(unicode::decimal_number_ranges(), false)),
            'D' => Escaped::Class(self.shorthand(unicode::decimal_number_ranges(), true)),
            's' => Escaped::Class(self.shorthand(unicode::white_space_ranges(), false)),
            'S' => Escaped::Class(self.shorthand(unicode::white_space_ranges(), true)),
            'h' => Escaped::Class(self.shorthand(unicode::horizontal_whitespace_ranges(), false)),
            'H' => Escaped::Class(self.shorthand(unicode::horizontal_whitespace_ranges(), true)),
            'v' => Escaped::Class(self.shorthand(unicode::vertical_whitespace_ranges(), false)),
            'V' => Escaped::Class(self.shorthand(unicode::vertical_whitespace_ranges(), true)),
            'w' => Escaped::Class(self.shorthand(unicode::word_ranges(), false)),
            'W' => Escaped::Class(self.shorthand(unicode::word_ranges(), true)),
            'b' if in_class => Escaped::Char('\x08'),
            'b' => Escaped::Node(Node::ClassAssertion(self.word_boundary(true))),
            'B' if in_class => {
                self.report_at(position, ParseErrorKind::EscapeNotAllowedInClass('B'));
                Escaped::Nothing
            }
            'B' => Escaped::Node(Node::ClassAssertion(self.word_boundary(false))),
            'A' | 'Z' | 'z' | 'G' if in_class => {
                self.report_at(position, ParseErrorKind::EscapeNotAllowedInClass(c));
                Escaped::Nothing
            }
            'A' => Escaped::Node(Node::SimpleAssertion(SimpleAssertionKind::SubjectStart)),
            'Z' => Escaped::Node(Node::SimpleAssertion(
                SimpleAssertionKind::SubjectEndOrTrailingNewline,
            )),
            'z' => Escaped::Node(Node::SimpleAssertion(SimpleAssertionKind::SubjectEnd)),
            'G' => Escaped::Node(Node::SimpleAssertion(SimpleAssertionKind::RangeStart)),
            'K' if in_class => {
                self.report_at(position, ParseErrorKind::EscapeNotAllowedInClass('K'));
                Escaped::Nothing
            }
            'K' => Escaped::Node(Node::MatchStartOverride),
            'N' if in_class => {
                self.report_at(position, ParseErrorKind::EscapeNotAllowedInClass('N'));
                Escaped::Nothing
            }
            'N' => Escaped::Class(CharacterClass {
                ranges: line_terminator_ranges(),
                negate: true,
                case_insensitive: false,
            }),
            'Q' => self.quoted_run(position),
            'E' => Escaped::Nothing,
            'g' => self.g_reference(in_class, position),
            'k' => self.k_reference(in_class, position),
            'p' | 'P' => {
                self.report_at(position, ParseErrorKind::UnsupportedProperty);
                self.skim_property_argument();
                if in_class { Escaped::Nothing } else { Escaped::Node(Node::Error) }
            }
            c if c.is_ascii_alphanumeric() => {
                self.report_at(position, ParseErrorKind::InvalidEscape(c));
                Escaped::Char(c)
            }
            c => Escaped::Char(c),
        }
    }

    fn shorthand(&self, ranges: retrace_ranges::CodepointRanges, negate: bool) -> CharacterClass {
        CharacterClass {
            ranges,
            negate,
            case_insensitive: self.options.case_insensitive,
        }
    }

    fn word_boundary(&self, boundary: bool) -> ClassAssertion {
        ClassAssertion {
            class: CharacterClass {
                ranges: unicode::word_ranges(),
                negate: false,
                case_insensitive: false,
            },
            boundary,
        }
    }

    /// `\0` with up to two further octal digits.
    fn octal_after_zero(&mut self) -> Escaped {
        let mut value = 0u32;
        for _ in 0..2 {
            match self.stream.peek().and_then(|c| c.to_digit(8)) {
                Some(d) => {
                    self.stream.take();
                    value = value * 8 + d;
                }
                None => break,
            }
        }
        Escaped::Char(char::from_u32(value).unwrap_or('\0'))
    }

    /// Digits after a backslash: backreference or octal, by the classic
    /// rule. A single digit `1`-`7` is a backreference only when that many
    /// groups are already open; `8` and `9` always are.
    fn digit_escape(&mut self, first: char, in_class: bool, position: usize) -> Escaped {
        let mut digits = String::from(first);
        while let Some(c) = self.stream.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.stream.take();
            digits.push(c);
        }
        let number = parse_reference_number(&digits);
        let is_backreference = first >= '8' || number.is_some_and(|n| n <= self.capture_count);
        if is_backreference && !in_class {
            let Some(index) = number else {
                self.report_at(position, ParseErrorKind::NumberTooLarge);
                return Escaped::Nothing;
            };
            return Escaped::Node(Node::NumberedBackreference(NumberedBackreference {
                index,
                case_insensitive: self.options.case_insensitive,
            }));
        }
        if is_backreference && in_class {
            self.report_at(position, ParseErrorKind::BackreferenceInClass);
            return Escaped::Nothing;
        }
        // Octal: up to three octal digits from the start of the run; the
        // rest of the digits are literal codepoints.
        let mut value = 0u32;
        let mut used = 0;
        for c in digits.chars().take(3) {
            match c.to_digit(8) {
                Some(d) => {
                    value = value * 8 + d;
                    used += 1;
                }
                None => break,
            }
        }
        if used == 0 {
            // `\8` or `\9` inside a class with no preceding octal digit.
            self.report_at(position, ParseErrorKind::InvalidNumericEscape);
            return Escaped::Nothing;
        }
        let mut run = String::new();
        run.push(char::from_u32(value).unwrap_or('\0'));
        run.extend(digits.chars().skip(used));
        if run.chars().count() == 1 {
            Escaped::Char(char::from_u32(value).unwrap_or('\0'))
        } else {
            Escaped::Run(run)
        }
    }

    /// `\o{…}` and `\x{…}`.
    fn braced_codepoint(&mut self, position: usize, radix: u32) -> Escaped {
        if !self.eat('{') {
            self.report_at(position, ParseErrorKind::InvalidNumericEscape);
            return Escaped::Nothing;
        }
        let mut value: u64 = 0;
        let mut any = false;
        loop {
            match self.stream.peek() {
                Some('}') => {
                    self.stream.take();
                    break;
                }
                Some(c) => match c.to_digit(radix) {
                    Some(d) => {
                        self.stream.take();
                        any = true;
                        value = value.saturating_mul(u64::from(radix)).saturating_add(u64::from(d));
                    }
                    None => {
                        self.report(ParseErrorKind::InvalidNumericEscape);
                        self.stream.take();
                    }
                },
                None => {
                    self.report_at(position, ParseErrorKind::UnterminatedNumericEscape);
                    return Escaped::Nothing;
                }
            }
        }
        if !any {
            self.report_at(position, ParseErrorKind::InvalidNumericEscape);
            return Escaped::Nothing;
        }
        match u32::try_from(value).ok().and_then(char::from_u32) {
            Some(c) => Escaped::Char(c),
            None => {
                self.report_at(position, ParseErrorKind::CodepointOutOfRange);
                Escaped::Nothing
            }
        }
    }

    /// `\x{…}` or `\xHH` with up to two hex digits (`\x` alone is NUL).
    fn hex_escape(&mut self, position: usize) -> Escaped {
        if self.stream.peek() == Some('{') {
            return self.braced_codepoint(position, 16);
        }
        let mut value = 0u32;
        for _ in 0..2 {
            match self.stream.peek().and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    self.stream.take();
                    value = value * 16 + d;
                }
                None => break,
            }
        }
        Escaped::Char(char::from_u32(value).unwrap_or('\0'))
    }

    /// `\cX`: the control character for an ASCII `X`.
    fn control_escape(&mut self, position: usize) -> Escaped {
        let Some(c) = self.stream.take() else {
            self.report_at(position, ParseErrorKind::MissingControlCharacter);
            return Escaped::Nothing;
        };
        if !c.is_ascii() || (c as u32) < 0x20 || c == '\x7F' {
            self.report_at(position, ParseErrorKind::MissingControlCharacter);
            return Escaped::Nothing;
        }
        let value = (c.to_ascii_uppercase() as u32) ^ 0x40;
        Escaped::Char(char::from_u32(value).unwrap_or('\0'))
    }

    /// `\Q…\E`: everything up to the closing `\E` is literal.
    fn quoted_run(&mut self, position: usize) -> Escaped {
        let mut run = String::new();
        loop {
            match self.stream.take() {
                Some('\\') if self.stream.peek() == Some('E') => {
                    self.stream.take();
                    return Escaped::Run(run);
                }
                Some(c) => run.push(c),
                None => {
                    self.report_at(position, ParseErrorKind::UnterminatedQuote);
                    return Escaped::Run(run);
                }
            }
        }
    }

    /// `\g` backreference family: `\gN`, `\g{N}`, `\g{-N}`, `\g{name}`,
    /// `\g<…>`, `\g'…'`.
    fn g_reference(&mut self, in_class: bool, position: usize) -> Escaped {
        if in_class {
            self.report_at(position, ParseErrorKind::BackreferenceInClass);
            self.skim_reference_argument();
            return Escaped::Nothing;
        }
        match self.stream.peek() {
            Some('{') => {
                self.stream.take();
                self.delimited_reference('}', position)
            }
            Some('<') => {
                self.stream.take();
                self.delimited_reference('>', position)
            }
            Some('\'') => {
                self.stream.take();
                self.delimited_reference('\'', position)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => {
                let text = self.read_signed_digits();
                self.reference_from_text(&text, position)
            }
            _ => {
                self.report_at(position, ParseErrorKind::InvalidEscape('g'));
                Escaped::Nothing
            }
        }
    }

    /// `\k<name>`, `\k'name'`, `\k{name}`.
    fn k_reference(&mut self, in_class: bool, position: usize) -> Escaped {
        if in_class {
            self.report_at(position, ParseErrorKind::BackreferenceInClass);
            self.skim_reference_argument();
            return Escaped::Nothing;
        }
        let close = match self.stream.peek() {
            Some('<') => '>',
            Some('\'') => '\'',
            Some('{') => '}',
            _ => {
                self.report_at(position, ParseErrorKind::InvalidEscape('k'));
                return Escaped::Nothing;
            }
        };
        self.stream.take();
        match self.parse_group_name(close) {
            Some(name) => Escaped::Node(Node::NamedBackreference(NamedBackreference {
                name,
                case_insensitive: self.options.case_insensitive,
            })),
            None => Escaped::Nothing,
        }
    }

    /// The contents of `\g{…}` / `\g<…>` / `\g'…'`: a possibly signed
    /// number, or a group name.
    fn delimited_reference(&mut self, close: char, position: usize) -> Escaped {
        let mut text = String::new();
        loop {
            match self.stream.peek() {
                Some(c) if c == close => {
                    self.stream.take();
                    break;
                }
                Some(c) => {
                    self.stream.take();
                    text.push(c);
                }
                None => {
                    self.report_at(position, ParseErrorKind::UnterminatedName);
                    return Escaped::Nothing;
                }
            }
        }
        if text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            self.reference_from_text(&text, position)
        } else if is_valid_group_name(&text) {
            Escaped::Node(Node::NamedBackreference(NamedBackreference {
                name: text,
                case_insensitive: self.options.case_insensitive,
            }))
        } else {
            self.report_at(position, ParseErrorKind::InvalidGroupName);
            Escaped::Nothing
        }
    }

    /// Resolve a signed or absolute numeric reference against the groups
    /// opened so far.
    fn reference_from_text(&mut self, text: &str, position: usize) -> Escaped {
        let index = match text.strip_prefix('-') {
            Some(rest) => parse_reference_number(rest)
                .and_then(|n| (n > 0).then_some(n))
                .and_then(|n| self.capture_count.checked_sub(n - 1))
                .and_then(|i| (i > 0).then_some(i)),
            None => {
                let rest = text.strip_prefix('+').unwrap_or(text);
                let relative = text.starts_with('+');
                parse_reference_number(rest).and_then(|n| {
                    if relative {
                        Some(self.capture_count + n)
                    } else {
                        (n > 0).then_some(n)
                    }
                })
            }
        };
        match index {
            Some(index) => Escaped::Node(Node::NumberedBackreference(NumberedBackreference {
                index,
                case_insensitive: self.options.case_insensitive,
            })),
            None => {
                self.report_at(position, ParseErrorKind::BadBackreference);
                Escaped::Nothing
            }
        }
    }

    fn read_signed_digits(&mut self) -> String {
        let mut text = String::new();
        if matches!(self.stream.peek(), Some('-') | Some('+')) {
            if let Some(sign) = self.stream.take() {
                text.push(sign);
            }
        }
        while let Some(c) = self.stream.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.stream.take();
            text.push(c);
        }
        text
    }

    /// Read a group name up to `close`. Reports and returns `None` on an
    /// empty or malformed name or a missing delimiter.
    pub(crate) fn parse_group_name(&mut self, close: char) -> Option<String> {
        let position = self.stream.position();
        let mut name = String::new();
        loop {
            match self.stream.peek() {
                Some(c) if c == close => {
                    self.stream.take();
                    break;
                }
                Some(c) if c.is_alphanumeric() || c == '_' => {
                    self.stream.take();
                    name.push(c);
                }
                Some(_) => {
                    self.report(ParseErrorKind::InvalidGroupName);
                    // Resync at the delimiter or group end.
                    while let Some(c) = self.stream.peek() {
                        if c == close || c == ')' {
                            break;
                        }
                        self.stream.take();
                    }
                    if self.stream.peek() == Some(close) {
                        self.stream.take();
                    }
                    return None;
                }
                None => {
                    self.report_at(position, ParseErrorKind::UnterminatedName);
                    return None;
                }
            }
        }
        if is_valid_group_name(&name) {
            Some(name)
        } else {
            self.report_at(position, ParseErrorKind::InvalidGroupName);
            None
        }
    }

    /// Skip the argument of an unsupported `\p` escape.
    fn skim_property_argument(&mut self) {
        match self.stream.peek() {
            Some('{') => {
                while let Some(c) = self.stream.take() {
                    if c == '}' {
                        break;
                    }
                }
            }
            Some(_) => {
                self.stream.take();
            }
            None => {}
        }
    }

    /// Skip a `\g`/`\k` argument found inside a class so parsing resyncs.
    fn skim_reference_argument(&mut self) {
        let close = match self.stream.peek() {
            Some('{') => '}',
            Some('<') => '>',
            Some('\'') => '\'',
            _ => return,
        };
        self.stream.take();
        while let Some(c) = self.stream.take() {
            if c == close {
                break;
            }
        }
    }
}

/// A name is an identifier: letters, digits, underscore, not starting with
/// a digit.
pub(crate) fn is_valid_group_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parse a capture reference number, refusing absurd digit runs.
pub(crate) fn parse_reference_number(digits: &str) -> Option<usize> {
    if digits.is_empty() || digits.len() > 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
