//! Bracket expressions
//!
//! `[…]` parsing: negation, literal members, `a-b` ranges, POSIX classes,
//! shorthand classes, and `\Q…\E` runs. Escape behavior inside a class
//! diverges from the outer pattern; that split lives in the escapes module.

use retrace_ast::{CharacterClass, Node};
use retrace_ranges::CodepointRange;
use retrace_stream::CodepointStream;
use retrace_unicode::PosixClass;

use crate::error::ParseErrorKind;
use crate::escapes::Escaped;
use crate::Parser;

/// Pending state of the `a-b` range automaton.
#[derive(Default)]
struct RangeState {
    /// A member that may yet become a range start.
    pending: Option<char>,
    /// A `-` has been seen after `pending`.
    dash: bool,
}

impl<S: CodepointStream> Parser<'_, S> {
    /// Parse a bracket expression; the opening `[` is already consumed.
    pub(crate) fn parse_class(&mut self) -> Node {
        let open_position = self.stream.position().saturating_sub(1);
        let mut class = CharacterClass {
            case_insensitive: self.options.case_insensitive,
            ..CharacterClass::default()
        };
        class.negate = self.eat('^');

        let mut state = RangeState::default();
        let mut first = true;
        loop {
            if self.options.extended_more {
                while matches!(self.stream.peek(), Some(' ') | Some('\t')) {
                    self.stream.take();
                }
            }
            let Some(c) = self.stream.peek() else {
                self.report_at(open_position, ParseErrorKind::UnterminatedClass);
                break;
            };
            match c {
                ']' if !first => {
                    self.stream.take();
                    break;
                }
                '[' if self.peek_is_posix() => {
                    self.stream.take();
                    self.flush(&mut class, &mut state);
                    self.parse_posix_member(&mut class);
                }
                '\\' => {
                    self.stream.take();
                    match self.parse_escape(true) {
                        Escaped::Char(ch) => self.member(&mut class, &mut state, ch),
                        Escaped::Run(run) => {
                            let mut chars = run.chars();
                            match (chars.next(), chars.next()) {
                                (Some(only), None) => self.member(&mut class, &mut state, only),
                                _ => {
                                    self.flush(&mut class, &mut state);
                                    for ch in run.chars() {
                                        class.ranges.push(CodepointRange::from(ch));
                                    }
                                }
                            }
                        }
                        Escaped::Class(shorthand) => {
                            // A shorthand cannot be a range endpoint; any
                            // pending start falls back to a literal.
                            self.flush(&mut class, &mut state);
                            class.ranges.extend(&shorthand.effective_ranges());
                        }
                        Escaped::Node(_) | Escaped::Nothing => {}
                    }
                }
                '-' => {
                    self.stream.take();
                    if state.pending.is_some() && !state.dash {
                        state.dash = true;
                    } else {
                        self.member(&mut class, &mut state, '-');
                    }
                }
                _ => {
                    self.stream.take();
                    self.member(&mut class, &mut state, c);
                }
            }
            first = false;
        }
        self.flush(&mut class, &mut state);
        class.ranges.sort_and_compact();
        Node::Class(class)
    }

    /// Add a literal member, closing a range if one is open.
    fn member(&mut self, class: &mut CharacterClass, state: &mut RangeState, c: char) {
        if state.dash {
            let Some(start) = state.pending.take() else {
                state.dash = false;
                return;
            };
            state.dash = false;
            let (mut first, mut last) = (start as u32, c as u32);
            if first > last {
                self.report(ParseErrorKind::RangeOutOfOrder);
                std::mem::swap(&mut first, &mut last);
            }
            class.ranges.push(CodepointRange::new(first, last));
        } else {
            if let Some(prev) = state.pending.take() {
                class.ranges.push(CodepointRange::from(prev));
            }
            state.pending = Some(c);
        }
    }

    /// Commit any pending member and dangling dash as literals.
    fn flush(&mut self, class: &mut CharacterClass, state: &mut RangeState) {
        if let Some(prev) = state.pending.take() {
            class.ranges.push(CodepointRange::from(prev));
        }
        if state.dash {
            class.ranges.push(CodepointRange::from('-'));
            state.dash = false;
        }
    }

    /// Whether the cursor (on `[`) starts a `[:…:]` item.
    fn peek_is_posix(&self) -> bool {
        let mut probe = self.stream.clone();
        probe.take();
        probe.peek() == Some(':')
    }

    /// Parse `:name:]` (the leading `[` is consumed). On a malformed item
    /// the `[` degrades to a literal member.
    fn parse_posix_member(&mut self, class: &mut CharacterClass) {
        let position = self.stream.position().saturating_sub(1);
        let mut probe = self.stream.clone();
        probe.take(); // `:`
        let negate = if probe.peek() == Some('^') {
            probe.take();
            true
        } else {
            false
        };
        let mut name = String::new();
        while let Some(c) = probe.peek() {
            if c.is_ascii_lowercase() {
                probe.take();
                name.push(c);
            } else {
                break;
            }
        }
        if probe.peek() != Some(':') {
            class.ranges.push(CodepointRange::from('['));
            return;
        }
        probe.take();
        if probe.peek() != Some(']') {
            class.ranges.push(CodepointRange::from('['));
            return;
        }
        probe.take();
        self.stream = probe;

        match PosixClass::from_name(&name) {
            Some(posix) => {
                let ranges = posix.ranges();
                let ranges = if negate { ranges.negated() } else { ranges };
                class.ranges.extend(&ranges);
            }
            None if PosixClass::is_recognized_unsupported(&name) => {
                self.report_at(position, ParseErrorKind::UnsupportedPosixClass(name));
            }
            None => {
                self.report_at(position, ParseErrorKind::InvalidPosixClass(name));
            }
        }
    }
}
