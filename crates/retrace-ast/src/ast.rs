//! Pattern AST nodes

use retrace_ranges::{CodepointRanges, MAX_CODEPOINT};

/// A node of the pattern tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Placeholder for a construct that failed to parse. Downstream passes
    /// treat it as something that can never match.
    Error,
    /// A run of literal codepoints.
    Literal(Literal),
    /// A bracket expression or a shorthand class like `\d`.
    Class(CharacterClass),
    /// `\1`, `\g{n}`, …
    NumberedBackreference(NumberedBackreference),
    /// `\k<name>`, `(?P=name)`, …
    NamedBackreference(NamedBackreference),
    /// `^`, `$`, `\A`, `\Z`, `\z`, and friends.
    SimpleAssertion(SimpleAssertionKind),
    /// `\b` / `\B`: a zero-width test against a character class on both
    /// sides of the cursor.
    ClassAssertion(ClassAssertion),
    /// Look-ahead / look-behind.
    ComplexAssertion(ComplexAssertion),
    /// A group: ordered children plus capture behavior.
    Subexpression(Subexpression),
    /// `a|b|c`.
    Alternative(Alternative),
    /// `x*`, `x{m,n}?`, `x++`, …
    Repetition(Repetition),
    /// `(?(…)…|…)`.
    Conditional(Conditional),
    /// `(?n)`, `(?R)`, `(?+n)`.
    NumberedSubroutine(usize),
    /// `(?&name)`, `(?P>name)`.
    NamedSubroutine(String),
    /// `(*FAIL)`.
    Fail,
    /// `(*ACCEPT)`.
    Accept,
    /// `(*MARK:name)` / `(*:name)`.
    Mark { name: String },
    /// `\K`: reset the reported match start to the current position.
    MatchStartOverride,
    /// An advisory feature identifier the engine records but does not act
    /// on.
    Feature { identifier: String },
}

impl Node {
    /// An empty non-capturing subexpression; the unit for sequencing.
    pub fn empty() -> Node {
        Node::Subexpression(Subexpression::non_capturing())
    }
}

/// A codepoint string matched verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// The codepoints, already simple-folded when `case_insensitive`.
    pub contents: String,
    /// Compare folded.
    pub case_insensitive: bool,
}

/// A character class with optional negation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharacterClass {
    /// The member ranges, normalized.
    pub ranges: CodepointRanges,
    /// `[^…]`.
    pub negate: bool,
    /// Class membership is tested after fold closure.
    pub case_insensitive: bool,
}

impl CharacterClass {
    /// The ranges to test against, with negation materialized.
    pub fn effective_ranges(&self) -> CodepointRanges {
        if self.negate { self.ranges.negated() } else { self.ranges.clone() }
    }

    /// The class matching any codepoint (`.` with dot-all).
    pub fn any() -> CharacterClass {
        CharacterClass {
            ranges: CodepointRanges::from_ranges([(0u32, MAX_CODEPOINT)]),
            negate: false,
            case_insensitive: false,
        }
    }
}

/// `\g{n}` and spelled-out equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedBackreference {
    /// Index of the referenced group.
    pub index: usize,
    /// Compare folded.
    pub case_insensitive: bool,
}

/// `\k<name>` and spelled-out equivalents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBackreference {
    /// Name of the referenced group.
    pub name: String,
    /// Compare folded.
    pub case_insensitive: bool,
}

/// Zero-width assertions that need no sub-expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleAssertionKind {
    /// Never passes; the lowering of constructs that cannot match.
    AlwaysFalse,
    /// `^` under multiline.
    LineStart,
    /// `$` under multiline.
    LineEnd,
    /// `\A`, or `^` without multiline.
    SubjectStart,
    /// `\Z`, or `$` without multiline.
    SubjectEndOrTrailingNewline,
    /// `\z`.
    SubjectEnd,
    /// `\G`: where this match attempt began.
    RangeStart,
}

/// `\b` / `\B` generalized over a character class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassAssertion {
    /// The class defining "word" characters.
    pub class: CharacterClass,
    /// True for the boundary form (`\b`), false for its complement (`\B`).
    pub boundary: bool,
}

/// Look-around assertion carrying a sub-pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexAssertion {
    /// Look-behind when set.
    pub backward: bool,
    /// Passes iff the body does *not* match.
    pub negative: bool,
    /// Body backtrack points stay live in the enclosing match.
    pub non_atomic: bool,
    /// The asserted pattern.
    pub expression: Box<Node>,
}

/// How a group relates to capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubexpressionKind {
    /// A plain capturing group.
    Normal,
    /// `(?:…)`.
    #[default]
    NonCapturing,
    /// A branch set of `(?|…)`: alternatives share capture indices.
    Duplicate,
    /// `(?>…)`.
    Atomic,
}

/// A group node: an ordered run of children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subexpression {
    /// Children, in sequence.
    pub nodes: Vec<Node>,
    /// Capture behavior of the group.
    pub kind: SubexpressionKind,
    /// Capture index when `kind` is `Normal`.
    pub capture_index: Option<usize>,
    /// Name for named captures.
    pub capture_name: Option<String>,
}

impl Subexpression {
    /// An empty non-capturing group.
    pub fn non_capturing() -> Subexpression {
        Subexpression::default()
    }

    /// A capturing group with the given index.
    pub fn capturing(index: usize) -> Subexpression {
        Subexpression {
            kind: SubexpressionKind::Normal,
            capture_index: Some(index),
            ..Subexpression::default()
        }
    }
}

/// An alternation: branches tried in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alternative {
    /// The branches.
    pub branches: Vec<Subexpression>,
}

/// How a repetition backtracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepetitionKind {
    /// Longest first.
    #[default]
    Greedy,
    /// Shortest first (`?` suffix).
    Lazy,
    /// Longest only; never gives anything back (`+` suffix).
    Possessive,
}

/// A quantified sub-pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Repetition {
    /// The repeated pattern.
    pub expression: Box<Node>,
    /// Minimum number of matches.
    pub min: u32,
    /// Maximum number of matches; [`Repetition::NO_LIMIT`] for unbounded.
    pub max: u32,
    /// Backtracking behavior.
    pub kind: RepetitionKind,
}

impl Repetition {
    /// Sentinel for an unbounded maximum.
    pub const NO_LIMIT: u32 = u32::MAX;
}

/// The condition of a `(?(…)…|…)` group.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalCondition {
    /// `(?(n)…)`: group `n` has matched.
    NumberedCapture(usize),
    /// `(?(<name>)…)`: a group of that name has matched.
    NamedCapture(String),
    /// `(?(?=…)…)`: a nested look-around decides.
    Assertion(Box<Node>),
    /// `(?(DEFINE)…)`: the body is never executed as a branch but its
    /// groups stay addressable by subroutine calls.
    Define,
    /// `(?(R)…)`: any recursion is in progress.
    AnyRecursion,
    /// `(?(Rn)…)`: a recursion of group `n` is in progress.
    NumberedRecursion(usize),
    /// `(?(R&name)…)`: a recursion of a group with that name is in
    /// progress.
    NamedRecursion(String),
}

/// A conditional group.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// What decides the branch.
    pub condition: ConditionalCondition,
    /// Taken when the condition holds.
    pub if_true: Subexpression,
    /// Taken otherwise; empty match when absent.
    pub if_false: Option<Subexpression>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use retrace_ranges::CodepointRange;

    #[test]
    fn effective_ranges_materializes_negation() {
        let class = CharacterClass {
            ranges: CodepointRanges::from_ranges([('a' as u32, 'z' as u32)]),
            negate: true,
            case_insensitive: false,
        };
        let eff = class.effective_ranges();
        assert!(!eff.contains('a' as u32));
        assert!(eff.contains('A' as u32));
        assert!(eff.contains(0x10FFFF));
        assert_eq!(
            eff.ranges()[0],
            CodepointRange::new(0, 'a' as u32 - 1)
        );
    }

    #[test]
    fn effective_ranges_passthrough_without_negation() {
        let class = CharacterClass {
            ranges: CodepointRanges::from_ranges([('0' as u32, '9' as u32)]),
            negate: false,
            case_insensitive: false,
        };
        assert_eq!(class.effective_ranges(), class.ranges);
    }

    #[test]
    fn empty_node_is_a_bare_group() {
        assert_eq!(Node::empty(), Node::Subexpression(Subexpression::default()));
    }
}
