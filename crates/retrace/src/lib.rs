//! retrace — a Unicode-aware backtracking regular expression engine
//!
//! The pipeline is parser → compiler → matcher: a PCRE-style pattern is
//! parsed into an AST, lowered into a state machine, and executed against a
//! bidirectional codepoint stream with full backtracking, captures, atomic
//! groups, look-arounds, subroutine calls, and recursion.
//!
//! This crate is the facade. It wires the stages together for `&str`
//! subjects and re-exports the engine types for embedders with their own
//! stream implementations (ropes, buffers).
//!
//! # Usage
//!
//! ```
//! use retrace::Regex;
//!
//! # fn main() -> Result<(), retrace::PatternErrors> {
//! let re = Regex::new(r"(?<word>\w+)-\k<word>")?;
//! let found = re.find("go ha-ha!");
//! assert!(found.is_some());
//! if let Some(m) = found {
//!     assert_eq!(m.as_str(), "ha-ha");
//!     assert_eq!(m.group_name("word"), Some("ha"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Compilation is lossy-tolerant: [`compile`] always returns a machine plus
//! whatever diagnostics were collected, while [`Regex::new`] treats any
//! diagnostic as an error.

use thiserror::Error;

pub use retrace_ast::Options;
pub use retrace_compiler::{CompileDiagnostic, NamedCaptures, StateMachine};
pub use retrace_matcher::{Capture, MatchResult, Matcher, MatcherConfig};
pub use retrace_parser::{ParseDiagnostic, ParseErrorKind};
pub use retrace_ranges::{CodepointRange, CodepointRanges};
pub use retrace_stream::{BufferStream, CodepointStream, LineEnding, StrStream};

/// Everything that went wrong while compiling a pattern.
#[derive(Debug, Clone, Default, PartialEq, Error)]
pub struct PatternErrors {
    /// Problems found while parsing, with pattern positions.
    pub parse: Vec<ParseDiagnostic>,
    /// Problems found while lowering the AST.
    pub compile: Vec<CompileDiagnostic>,
}

impl PatternErrors {
    /// Whether any diagnostic was recorded.
    pub fn is_empty(&self) -> bool {
        self.parse.is_empty() && self.compile.is_empty()
    }

    /// Total number of diagnostics.
    pub fn len(&self) -> usize {
        self.parse.len() + self.compile.len()
    }
}

impl std::fmt::Display for PatternErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for d in &self.parse {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{d}")?;
            first = false;
        }
        for d in &self.compile {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{d}")?;
            first = false;
        }
        if first {
            write!(f, "no errors")?;
        }
        Ok(())
    }
}

/// Compile a pattern, returning the machine together with all diagnostics.
/// The machine is usable even when diagnostics are present; broken parts of
/// the pattern simply never match.
pub fn compile(pattern: &str, options: Options) -> (StateMachine, PatternErrors) {
    let (ast, parse) =
        retrace_parser::parse_collecting(StrStream::new(pattern), options);
    let output = retrace_compiler::compile(&ast);
    (output.machine, PatternErrors { parse, compile: output.diagnostics })
}

/// A compiled pattern with a `&str` convenience API.
///
/// The compiled machine is immutable; one `Regex` may serve any number of
/// concurrent matchers.
#[derive(Debug, Clone)]
pub struct Regex {
    machine: StateMachine,
    config: MatcherConfig,
}

impl Regex {
    /// Compile with default options; any diagnostic is an error.
    pub fn new(pattern: &str) -> Result<Regex, PatternErrors> {
        Regex::with_options(pattern, Options::default())
    }

    /// Compile with explicit options; any diagnostic is an error.
    pub fn with_options(pattern: &str, options: Options) -> Result<Regex, PatternErrors> {
        let (machine, errors) = compile(pattern, options);
        if errors.is_empty() {
            Ok(Regex { machine, config: MatcherConfig::default() })
        } else {
            Err(errors)
        }
    }

    /// Replace the per-match resource limits.
    pub fn with_matcher_config(mut self, config: MatcherConfig) -> Regex {
        self.config = config;
        self
    }

    /// The underlying machine, for matching over custom streams.
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Whether the pattern matches anywhere in the subject.
    pub fn is_match(&self, subject: &str) -> bool {
        self.find(subject).is_some()
    }

    /// The first match in the subject.
    pub fn find<'r, 's>(&'r self, subject: &'s str) -> Option<Match<'r, 's>> {
        self.find_iter(subject).next()
    }

    /// Iterate over all non-overlapping matches.
    pub fn find_iter<'r, 's>(&'r self, subject: &'s str) -> Matches<'r, 's> {
        Matches {
            matcher: Matcher::with_config(&self.machine, self.config),
            stream: StrStream::new(subject),
            subject,
            named: self.machine.named_captures(),
            done: false,
        }
    }
}

/// One match, with its captures resolved against the subject.
#[derive(Debug, Clone)]
pub struct Match<'r, 's> {
    subject: &'s str,
    result: MatchResult,
    named: &'r NamedCaptures,
}

impl<'s> Match<'_, 's> {
    /// Codepoint index where the reported match begins (honoring `\K`).
    pub fn begin(&self) -> usize {
        self.result.begin()
    }

    /// Codepoint index one past the match end.
    pub fn end(&self) -> usize {
        self.result.end()
    }

    /// The matched text.
    pub fn as_str(&self) -> &'s str {
        self.slice(self.begin(), self.end()).unwrap_or("")
    }

    /// The text of capture group `index`, if it participated.
    pub fn group(&self, index: usize) -> Option<&'s str> {
        let capture = self.result.capture(index)?;
        self.slice(capture.begin, capture.end())
    }

    /// The text captured by the first participating group of this name.
    pub fn group_name(&self, name: &str) -> Option<&'s str> {
        let name_ref = self.named.name_ref(name)?;
        self.named
            .indices(name_ref)
            .iter()
            .find_map(|&index| self.group(index))
    }

    /// Number of capture slots, including the whole match.
    pub fn num_groups(&self) -> usize {
        self.result.captures.len()
    }

    /// The most recent `(*MARK)` label on the winning path.
    pub fn mark(&self) -> Option<&str> {
        self.result.mark()
    }

    /// The raw engine result, in codepoint positions.
    pub fn raw(&self) -> &MatchResult {
        &self.result
    }

    /// Slice the subject by codepoint positions.
    fn slice(&self, begin: usize, end: usize) -> Option<&'s str> {
        let from = byte_offset(self.subject, begin)?;
        let to = byte_offset(self.subject, end)?;
        self.subject.get(from..to)
    }
}

/// Byte offset of the codepoint at `cp_index` (or the subject end).
fn byte_offset(subject: &str, cp_index: usize) -> Option<usize> {
    if cp_index == 0 {
        return Some(0);
    }
    subject
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(subject.len()))
        .nth(cp_index)
}

/// Iterator over non-overlapping matches.
pub struct Matches<'r, 's> {
    matcher: Matcher<'r, StrStream<'s>>,
    stream: StrStream<'s>,
    subject: &'s str,
    named: &'r NamedCaptures,
    done: bool,
}

impl<'r, 's> Iterator for Matches<'r, 's> {
    type Item = Match<'r, 's>;

    fn next(&mut self) -> Option<Match<'r, 's>> {
        if self.done {
            return None;
        }
        match self.matcher.find_next(&mut self.stream) {
            Some(result) => Some(Match {
                subject: self.subject,
                result,
                named: self.named,
            }),
            None => {
                self.done = true;
                None
            }
        }
    }
}
