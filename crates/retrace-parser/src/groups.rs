//! Group prefixes
//!
//! Everything that starts with `(`: capturing and non-capturing groups,
//! atomic groups, duplicate-numbered alternation `(?|…)`, named groups in
//! their three spellings, look-arounds, subroutine calls, conditionals,
//! inline options, comments, and `(*…)` verbs.

use retrace_ast::{
    Alternative, ComplexAssertion, Conditional, ConditionalCondition, NamedBackreference, Node,
    Subexpression, SubexpressionKind,
};
use retrace_stream::CodepointStream;

use crate::error::ParseErrorKind;
use crate::escapes::parse_reference_number;
use crate::Parser;

impl<S: CodepointStream> Parser<'_, S> {
    /// Parse a group; the opening `(` is already consumed. Returns `None`
    /// for constructs that produce no node (comments, inline options).
    pub(crate) fn parse_group(&mut self, depth: usize) -> Option<Node> {
        match self.stream.peek() {
            Some('?') => {
                self.stream.take();
                self.parse_question_group(depth)
            }
            Some('*') => {
                self.stream.take();
                Some(self.parse_verb(depth))
            }
            _ => {
                // A plain group: capturing unless auto-capture is off.
                if self.options.no_auto_capture {
                    let body = self.parse_group_body(depth);
                    Some(into_group(body, SubexpressionKind::NonCapturing, None, None))
                } else {
                    let index = self.next_capture_index();
                    let body = self.parse_group_body(depth);
                    Some(into_group(body, SubexpressionKind::Normal, Some(index), None))
                }
            }
        }
    }

    /// Parse the body of a group and its closing parenthesis, with options
    /// scoped to the body.
    fn parse_group_body(&mut self, depth: usize) -> Node {
        let saved = self.options;
        let node = self.parse_alternation(depth + 1);
        self.options = saved;
        if !self.eat(')') {
            self.report(ParseErrorKind::UnterminatedGroup);
        }
        node
    }

    /// Everything after `(?`.
    fn parse_question_group(&mut self, depth: usize) -> Option<Node> {
        let position = self.stream.position();
        match self.stream.peek() {
            Some(':') => {
                self.stream.take();
                let body = self.parse_group_body(depth);
                Some(into_group(body, SubexpressionKind::NonCapturing, None, None))
            }
            Some('>') => {
                self.stream.take();
                let body = self.parse_group_body(depth);
                Some(into_group(body, SubexpressionKind::Atomic, None, None))
            }
            Some('|') => {
                self.stream.take();
                Some(self.parse_duplicate_group(depth))
            }
            Some('=') => {
                self.stream.take();
                Some(self.lookaround(depth, false, false, false))
            }
            Some('!') => {
                self.stream.take();
                Some(self.lookaround(depth, false, true, false))
            }
            Some('<') => {
                self.stream.take();
                match self.stream.peek() {
                    Some('=') => {
                        self.stream.take();
                        Some(self.lookaround(depth, true, false, false))
                    }
                    Some('!') => {
                        self.stream.take();
                        Some(self.lookaround(depth, true, true, false))
                    }
                    _ => Some(self.named_group(depth, '>')),
                }
            }
            Some('\'') => {
                self.stream.take();
                Some(self.named_group(depth, '\''))
            }
            Some('P') => {
                self.stream.take();
                match self.stream.peek() {
                    Some('<') => {
                        self.stream.take();
                        Some(self.named_group(depth, '>'))
                    }
                    Some('=') => {
                        self.stream.take();
                        let name = self.parse_group_name(')')?;
                        Some(Node::NamedBackreference(NamedBackreference {
                            name,
                            case_insensitive: self.options.case_insensitive,
                        }))
                    }
                    Some('>') => {
                        self.stream.take();
                        let name = self.parse_group_name(')')?;
                        Some(Node::NamedSubroutine(name))
                    }
                    _ => {
                        self.report_at(position, ParseErrorKind::MalformedGroup);
                        self.resync_to_group_end();
                        Some(Node::Error)
                    }
                }
            }
            Some('&') => {
                self.stream.take();
                let name = self.parse_group_name(')')?;
                Some(Node::NamedSubroutine(name))
            }
            Some('R') => {
                self.stream.take();
                if self.eat(')') {
                    Some(Node::NumberedSubroutine(0))
                } else {
                    self.report_at(position, ParseErrorKind::MalformedGroup);
                    self.resync_to_group_end();
                    Some(Node::Error)
                }
            }
            Some('#') => {
                self.stream.take();
                loop {
                    match self.stream.take() {
                        Some(')') => break,
                        Some(_) => {}
                        None => {
                            self.report_at(position, ParseErrorKind::UnterminatedGroup);
                            break;
                        }
                    }
                }
                None
            }
            Some('(') => {
                self.stream.take();
                Some(self.parse_conditional(depth))
            }
            Some(c) if c.is_ascii_digit() => self.numbered_subroutine(position, false),
            Some('+') => {
                self.stream.take();
                self.numbered_subroutine(position, true)
            }
            Some('-') if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.stream.take();
                let call = self.numbered_subroutine_relative_back(position);
                Some(call)
            }
            Some(c) if c == '^' || is_flag_letter(c) || c == '-' => self.parse_options_group(depth),
            _ => {
                self.report_at(position, ParseErrorKind::MalformedGroup);
                self.resync_to_group_end();
                Some(Node::Error)
            }
        }
    }

    fn peek_second(&self) -> Option<char> {
        let mut probe = self.stream.clone();
        probe.take();
        probe.peek()
    }

    /// Skip forward past the closing parenthesis of a broken group.
    fn resync_to_group_end(&mut self) {
        let mut nesting = 0usize;
        while let Some(c) = self.stream.peek() {
            self.stream.take();
            match c {
                '(' => nesting += 1,
                ')' => {
                    if nesting == 0 {
                        return;
                    }
                    nesting -= 1;
                }
                '\\' => {
                    self.stream.take();
                }
                _ => {}
            }
        }
    }

    fn lookaround(&mut self, depth: usize, backward: bool, negative: bool, non_atomic: bool) -> Node {
        let body = self.parse_group_body(depth);
        Node::ComplexAssertion(ComplexAssertion {
            backward,
            negative,
            non_atomic,
            expression: Box::new(body),
        })
    }

    fn named_group(&mut self, depth: usize, close: char) -> Node {
        let name = self.parse_group_name(close);
        let index = self.next_capture_index();
        let body = self.parse_group_body(depth);
        into_group(body, SubexpressionKind::Normal, Some(index), name)
    }

    /// `(?n)` and `(?+n)` subroutine calls.
    fn numbered_subroutine(&mut self, position: usize, relative_forward: bool) -> Option<Node> {
        let digits = self.read_digits();
        let number = parse_reference_number(&digits);
        if !self.eat(')') {
            self.report_at(position, ParseErrorKind::MalformedGroup);
            self.resync_to_group_end();
            return Some(Node::Error);
        }
        match number {
            Some(n) if relative_forward => Some(Node::NumberedSubroutine(self.capture_count + n)),
            // `(?0)` is whole-pattern recursion, same as `(?R)`.
            Some(n) => Some(Node::NumberedSubroutine(n)),
            None => {
                self.report_at(position, ParseErrorKind::BadSubroutine);
                Some(Node::Error)
            }
        }
    }

    /// `(?-n)`: the n-th most recently opened group.
    fn numbered_subroutine_relative_back(&mut self, position: usize) -> Node {
        let digits = self.read_digits();
        let resolved = parse_reference_number(&digits)
            .and_then(|n| (n > 0).then_some(n))
            .and_then(|n| self.capture_count.checked_sub(n - 1))
            .and_then(|i| (i > 0).then_some(i));
        if !self.eat(')') {
            self.report_at(position, ParseErrorKind::MalformedGroup);
            self.resync_to_group_end();
            return Node::Error;
        }
        match resolved {
            Some(index) => Node::NumberedSubroutine(index),
            None => {
                self.report_at(position, ParseErrorKind::BadSubroutine);
                Node::Error
            }
        }
    }

    pub(crate) fn read_digits(&mut self) -> String {
        let mut digits = String::new();
        while let Some(c) = self.stream.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.stream.take();
            digits.push(c);
        }
        digits
    }

    /// `(?|…)`: alternatives share capture indices. The counter rewinds to
    /// the base for every branch and ends at the maximum any branch
    /// reached.
    fn parse_duplicate_group(&mut self, depth: usize) -> Node {
        let saved_options = self.options;
        let base = self.capture_count;
        let mut max = base;
        let mut branches = Vec::new();
        loop {
            self.capture_count = base;
            branches.push(self.parse_sequence(depth + 1));
            max = max.max(self.capture_count);
            if !self.eat('|') {
                break;
            }
        }
        self.capture_count = max;
        self.options = saved_options;
        if !self.eat(')') {
            self.report(ParseErrorKind::UnterminatedGroup);
        }
        Node::Subexpression(Subexpression {
            nodes: vec![Node::Alternative(Alternative { branches })],
            kind: SubexpressionKind::Duplicate,
            capture_index: None,
            capture_name: None,
        })
    }

    /// `(?flags)`, `(?flags-flags)`, `(?^flags)`, and their `:`-scoped
    /// forms.
    fn parse_options_group(&mut self, depth: usize) -> Option<Node> {
        let position = self.stream.position();
        let mut options = self.options;
        if self.eat('^') {
            options = Default::default();
        }
        let mut enable = true;
        let mut prev_flag = None;
        loop {
            match self.stream.peek() {
                Some(')') => {
                    self.stream.take();
                    // Applies to the rest of the enclosing group.
                    self.options = options;
                    return None;
                }
                Some(':') => {
                    self.stream.take();
                    let saved = self.options;
                    self.options = options;
                    let body = self.parse_group_body(depth);
                    self.options = saved;
                    return Some(into_group(body, SubexpressionKind::NonCapturing, None, None));
                }
                Some('-') if enable => {
                    self.stream.take();
                    enable = false;
                    prev_flag = None;
                }
                Some(c) if is_flag_letter(c) => {
                    self.stream.take();
                    options.apply_flag(c, enable);
                    // A doubled `x` in one run means extended-more.
                    if c == 'x' && enable && prev_flag == Some('x') {
                        options.extended_more = true;
                    }
                    prev_flag = Some(c);
                }
                _ => {
                    self.report_at(position, ParseErrorKind::MalformedGroup);
                    self.resync_to_group_end();
                    return Some(Node::Error);
                }
            }
        }
    }

    /// `(?(…)…|…)`; the cursor sits after `(?(`.
    fn parse_conditional(&mut self, depth: usize) -> Node {
        let position = self.stream.position();
        let Some(condition) = self.parse_condition(position) else {
            self.resync_to_group_end();
            return Node::Error;
        };
        let saved = self.options;
        let if_true = self.parse_sequence(depth + 1);
        let if_false = if self.eat('|') {
            Some(self.parse_sequence(depth + 1))
        } else {
            None
        };
        while self.stream.peek() == Some('|') {
            self.report(ParseErrorKind::TooManyBranches);
            self.stream.take();
            // Parse and drop the surplus branch so the group still closes.
            let _ = self.parse_sequence(depth + 1);
        }
        self.options = saved;
        if !self.eat(')') {
            self.report(ParseErrorKind::UnterminatedGroup);
        }
        Node::Conditional(Conditional {
            condition,
            if_true,
            if_false,
        })
    }

    /// The parenthesized condition of a conditional group, cursor after its
    /// opening `(`.
    fn parse_condition(&mut self, position: usize) -> Option<ConditionalCondition> {
        match self.stream.peek() {
            Some('?') | Some('*') => {
                // An assertion condition is a full look-around group.
                let is_verb = self.stream.peek() == Some('*');
                self.stream.take();
                let node = if is_verb {
                    self.parse_verb(0)
                } else {
                    self.parse_question_group(0)?
                };
                match node {
                    Node::ComplexAssertion(_) => Some(ConditionalCondition::Assertion(Box::new(node))),
                    _ => {
                        self.report_at(position, ParseErrorKind::InvalidCondition);
                        None
                    }
                }
            }
            Some('R') => {
                self.stream.take();
                match self.stream.peek() {
                    Some(')') => {
                        self.stream.take();
                        Some(ConditionalCondition::AnyRecursion)
                    }
                    Some('&') => {
                        self.stream.take();
                        let name = self.parse_group_name(')')?;
                        Some(ConditionalCondition::NamedRecursion(name))
                    }
                    Some(c) if c.is_ascii_digit() => {
                        let digits = self.read_digits();
                        let index = parse_reference_number(&digits)?;
                        if !self.eat(')') {
                            self.report_at(position, ParseErrorKind::InvalidCondition);
                            return None;
                        }
                        Some(ConditionalCondition::NumberedRecursion(index))
                    }
                    _ => {
                        self.report_at(position, ParseErrorKind::InvalidCondition);
                        None
                    }
                }
            }
            Some('<') => {
                self.stream.take();
                let name = self.parse_group_name('>')?;
                if !self.eat(')') {
                    self.report_at(position, ParseErrorKind::InvalidCondition);
                    return None;
                }
                Some(ConditionalCondition::NamedCapture(name))
            }
            Some('\'') => {
                self.stream.take();
                let name = self.parse_group_name('\'')?;
                if !self.eat(')') {
                    self.report_at(position, ParseErrorKind::InvalidCondition);
                    return None;
                }
                Some(ConditionalCondition::NamedCapture(name))
            }
            Some(c) if c.is_ascii_digit() || c == '+' || c == '-' => {
                let negative = self.eat('-');
                if !negative {
                    self.eat('+');
                }
                let digits = self.read_digits();
                if !self.eat(')') {
                    self.report_at(position, ParseErrorKind::InvalidCondition);
                    return None;
                }
                let number = parse_reference_number(&digits)?;
                let index = if negative {
                    self.capture_count
                        .checked_sub(number.checked_sub(1)?)
                        .filter(|&i| i > 0)?
                } else {
                    number
                };
                if index == 0 {
                    self.report_at(position, ParseErrorKind::InvalidCondition);
                    return None;
                }
                Some(ConditionalCondition::NumberedCapture(index))
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(c) = self.stream.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        self.stream.take();
                        word.push(c);
                    } else {
                        break;
                    }
                }
                if !self.eat(')') {
                    self.report_at(position, ParseErrorKind::InvalidCondition);
                    return None;
                }
                if word == "DEFINE" {
                    Some(ConditionalCondition::Define)
                } else {
                    Some(ConditionalCondition::NamedCapture(word))
                }
            }
            _ => {
                self.report_at(position, ParseErrorKind::InvalidCondition);
                None
            }
        }
    }

    /// `(*…)` verbs and named control prefixes; the cursor sits after `(*`.
    pub(crate) fn parse_verb(&mut self, depth: usize) -> Node {
        let position = self.stream.position();
        let mut word = String::new();
        while let Some(c) = self.stream.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.stream.take();
                word.push(c);
            } else {
                break;
            }
        }
        match self.stream.peek() {
            Some(')') => {
                self.stream.take();
                match word.as_str() {
                    "FAIL" | "F" => Node::Fail,
                    "ACCEPT" => Node::Accept,
                    // Engine-configuration verbs are recorded as advisory
                    // features; they do not change matching here.
                    "UTF" | "UCP" | "CR" | "LF" | "CRLF" | "ANYCRLF" | "ANY" | "NUL"
                    | "BSR_ANYCRLF" | "BSR_UNICODE" | "NO_AUTO_POSSESS" | "NO_DOTSTAR_ANCHOR"
                    | "NO_JIT" | "NO_START_OPT" | "NOTEMPTY" | "NOTEMPTY_ATSTART" => {
                        Node::Feature { identifier: word }
                    }
                    _ => {
                        self.report_at(position, ParseErrorKind::UnknownVerb(word));
                        Node::Error
                    }
                }
            }
            Some(':') => {
                self.stream.take();
                self.parse_verb_argument(depth, word, position)
            }
            _ => {
                self.report_at(position, ParseErrorKind::UnterminatedGroup);
                self.resync_to_group_end();
                Node::Error
            }
        }
    }

    /// The part after `(*word:`.
    fn parse_verb_argument(&mut self, depth: usize, word: String, position: usize) -> Node {
        // Control prefixes take a sub-pattern; MARK takes a label.
        let control: Option<(bool, bool, bool, bool)> = match word.as_str() {
            // (backward, negative, non_atomic, atomic-group)
            "pla" | "positive_lookahead" => Some((false, false, false, false)),
            "nla" | "negative_lookahead" => Some((false, true, false, false)),
            "plb" | "positive_lookbehind" => Some((true, false, false, false)),
            "nlb" | "negative_lookbehind" => Some((true, true, false, false)),
            "napla" | "non_atomic_positive_lookahead" => Some((false, false, true, false)),
            "naplb" | "non_atomic_positive_lookbehind" => Some((true, false, true, false)),
            "atomic" => Some((false, false, false, true)),
            _ => None,
        };
        if let Some((backward, negative, non_atomic, atomic_group)) = control {
            if atomic_group {
                let body = self.parse_group_body(depth);
                return into_group(body, SubexpressionKind::Atomic, None, None);
            }
            return self.lookaround(depth, backward, negative, non_atomic);
        }
        if word.is_empty() || word == "MARK" {
            let mut name = String::new();
            loop {
                match self.stream.take() {
                    Some(')') => break,
                    Some(c) => name.push(c),
                    None => {
                        self.report_at(position, ParseErrorKind::UnterminatedGroup);
                        break;
                    }
                }
            }
            return Node::Mark { name };
        }
        self.report_at(position, ParseErrorKind::UnknownVerb(word));
        self.resync_to_group_end();
        Node::Error
    }
}

fn is_flag_letter(c: char) -> bool {
    matches!(c, 'i' | 'm' | 'n' | 's' | 'x')
}

/// Wrap a parsed body into a group node, reusing a bare subexpression when
/// possible.
fn into_group(
    body: Node,
    kind: SubexpressionKind,
    capture_index: Option<usize>,
    capture_name: Option<String>,
) -> Node {
    match body {
        Node::Subexpression(mut sub)
            if sub.kind == SubexpressionKind::NonCapturing && sub.capture_index.is_none() =>
        {
            sub.kind = kind;
            sub.capture_index = capture_index;
            sub.capture_name = capture_name;
            Node::Subexpression(sub)
        }
        other => Node::Subexpression(Subexpression {
            nodes: vec![other],
            kind,
            capture_index,
            capture_name,
        }),
    }
}
