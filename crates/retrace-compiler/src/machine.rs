//! The compiled state machine
//!
//! States live in a single table and refer to each other by index
//! ([`StateRef`]), so cycles introduced by repetition loops stay inside the
//! table and subroutine targets are plain numbers. A machine is immutable
//! once built and can be shared freely; all mutable matching state lives in
//! the matcher.

use std::fmt;

use retrace_ast::SimpleAssertionKind;
use retrace_ranges::CodepointRanges;
use rustc_hash::FxHashMap;

/// Index of a state in the machine's state table.
pub type StateRef = u32;

/// Index into the machine's name table.
pub type NameRef = u32;

/// One outgoing edge of a state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// What must hold (and what side effect runs) for this edge.
    pub condition: Condition,
    /// Destination state.
    pub target: StateRef,
}

/// A state: its ordered out-edges and whether a successful edge suppresses
/// the backtracking frame (used by conditionals so a decided guard never
/// falls through to the other branch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub transitions: Vec<Transition>,
    pub is_atomic: bool,
}

/// Subroutine call data carried by a [`Condition::Jump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpData {
    /// State at which the callee is complete; reaching it returns to
    /// `return_state`.
    pub callee_exit: StateRef,
    /// Where matching continues after the callee returns.
    pub return_state: StateRef,
    /// Capture index of the called group (0 for whole-pattern recursion).
    pub subroutine_capture: usize,
}

/// A look-around body compiled into its own machine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAssertion {
    /// Look-behind when set.
    pub backward: bool,
    /// Passes iff the body does not match.
    pub negative: bool,
    /// Run inline in the enclosing engine rather than on a cloned matcher.
    pub non_atomic: bool,
    /// For look-behind: the fixed body lengths to try, in order.
    pub rewind_lengths: Vec<usize>,
    /// The body.
    pub machine: StateMachine,
}

/// The condition of a transition: a predicate over the stream plus an
/// optional engine side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Consume this exact codepoint string (folded comparison when
    /// case-insensitive). An empty literal consumes nothing and always
    /// accepts.
    Literal { contents: String, case_insensitive: bool },
    /// Consume one codepoint contained in the ranges. Negation is already
    /// materialized and case-insensitive classes are pre-folded.
    Class(CodepointRanges),
    /// Zero-width position test.
    SimpleAssertion(SimpleAssertionKind),
    /// Word-boundary style test of the codepoints on either side.
    ClassAssertion { ranges: CodepointRanges, boundary: bool },
    /// Consume the text last captured by the numbered group.
    NumberedBackreference { index: usize, case_insensitive: bool },
    /// Consume the text last captured by any group of this name.
    NamedBackreference { name: NameRef, case_insensitive: bool },
    /// Begin recording a capture.
    CaptureBegin(usize),
    /// Finish the most recently begun capture.
    CaptureEnd,
    /// `\K`.
    ResetMatchStart,
    /// Open an atomic span.
    PushAtomic,
    /// Close an atomic span, discarding frames pushed inside it.
    PopAtomic,
    /// Save the stream for a later restore.
    PushStreamCheckpoint,
    /// Restore the stream saved by the matching push.
    RestoreStreamCheckpoint,
    /// Record the position for a zero-width-loop check.
    PushPosition,
    /// Fail if no input was consumed since the recorded position.
    CheckInfiniteLoop,
    /// Move the stream backward this many codepoints.
    Rewind(usize),
    /// Call a group as a subroutine.
    Jump(JumpData),
    /// A look-around.
    Assertion(Box<CompiledAssertion>),
    /// Conditional guard: the numbered group has matched.
    CheckNumberedCapture(usize),
    /// Conditional guard: a group of this name has matched.
    CheckNamedCapture(NameRef),
    /// Conditional guard: a recursion of the numbered group is active.
    CheckNumberedRecursion(usize),
    /// Conditional guard: a recursion of a group of this name is active.
    CheckNamedRecursion(NameRef),
    /// Conditional guard: any subroutine call is active.
    CheckAnyRecursion,
    /// Never accepts.
    Fail,
    /// Record a `(*MARK)` label.
    Mark(String),
}

impl Condition {
    /// An always-true, non-consuming condition.
    pub fn epsilon() -> Condition {
        Condition::Literal { contents: String::new(), case_insensitive: false }
    }
}

/// Ordered bidirectional mapping between capture names and indices.
/// Several groups may share one name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedCaptures {
    names: Vec<String>,
    indices: Vec<Vec<usize>>,
    by_name: FxHashMap<String, NameRef>,
    by_capture: FxHashMap<usize, NameRef>,
}

impl NamedCaptures {
    /// Record that capture `index` carries `name`.
    pub fn add(&mut self, name: &str, index: usize) -> NameRef {
        let name_ref = match self.by_name.get(name) {
            Some(&r) => r,
            None => {
                let r = self.names.len() as NameRef;
                self.names.push(name.to_owned());
                self.indices.push(Vec::new());
                self.by_name.insert(name.to_owned(), r);
                r
            }
        };
        let slot = &mut self.indices[name_ref as usize];
        if !slot.contains(&index) {
            slot.push(index);
            slot.sort_unstable();
        }
        self.by_capture.insert(index, name_ref);
        name_ref
    }

    /// Look up a name.
    pub fn name_ref(&self, name: &str) -> Option<NameRef> {
        self.by_name.get(name).copied()
    }

    /// All capture indices sharing the name, in increasing order.
    pub fn indices(&self, name: NameRef) -> &[usize] {
        &self.indices[name as usize]
    }

    /// The name of the given capture index, if any.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.by_capture.get(&index).map(|&r| self.names[r as usize].as_str())
    }

    /// The interned name text.
    pub fn name(&self, name: NameRef) -> &str {
        &self.names[name as usize]
    }

    /// Iterate `(name, indices)` pairs in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names
            .iter()
            .zip(self.indices.iter())
            .map(|(n, i)| (n.as_str(), i.as_slice()))
    }

    /// Whether no group is named.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A compiled pattern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMachine {
    states: Vec<State>,
    start_state: StateRef,
    end_state: StateRef,
    named_captures: NamedCaptures,
    capture_count: usize,
}

impl StateMachine {
    pub(crate) fn new(
        states: Vec<State>,
        start_state: StateRef,
        end_state: StateRef,
        named_captures: NamedCaptures,
        capture_count: usize,
    ) -> Self {
        StateMachine { states, start_state, end_state, named_captures, capture_count }
    }

    /// The state table entry.
    pub fn state(&self, r: StateRef) -> &State {
        &self.states[r as usize]
    }

    /// Number of states.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Entry state.
    pub fn start_state(&self) -> StateRef {
        self.start_state
    }

    /// Accepting state.
    pub fn end_state(&self) -> StateRef {
        self.end_state
    }

    /// The name directory.
    pub fn named_captures(&self) -> &NamedCaptures {
        &self.named_captures
    }

    /// Number of capture groups, excluding the whole-match capture 0.
    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// A human-readable rendering of the state table, for tests and traces.
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "machine: {} states, start={}, end={}, captures={}",
            self.states.len(),
            self.start_state,
            self.end_state,
            self.capture_count
        )?;
        for (i, state) in self.states.iter().enumerate() {
            let marker = if state.is_atomic { " (atomic)" } else { "" };
            writeln!(f, "  s{i}{marker}:")?;
            for t in &state.transitions {
                writeln!(f, "    -> s{} {}", t.target, describe(&t.condition))?;
            }
        }
        Ok(())
    }
}

fn describe(condition: &Condition) -> String {
    match condition {
        Condition::Literal { contents, .. } if contents.is_empty() => "eps".to_owned(),
        Condition::Literal { contents, case_insensitive } => {
            format!("lit {contents:?}{}", if *case_insensitive { " (i)" } else { "" })
        }
        Condition::Class(ranges) => format!("class ({} ranges)", ranges.ranges().len()),
        Condition::SimpleAssertion(kind) => format!("assert {kind:?}"),
        Condition::ClassAssertion { boundary, .. } => {
            format!("{}boundary", if *boundary { "" } else { "non-" })
        }
        Condition::NumberedBackreference { index, .. } => format!("backref {index}"),
        Condition::NamedBackreference { name, .. } => format!("backref name#{name}"),
        Condition::CaptureBegin(index) => format!("capture-begin {index}"),
        Condition::CaptureEnd => "capture-end".to_owned(),
        Condition::ResetMatchStart => "reset-match-start".to_owned(),
        Condition::PushAtomic => "push-atomic".to_owned(),
        Condition::PopAtomic => "pop-atomic".to_owned(),
        Condition::PushStreamCheckpoint => "push-checkpoint".to_owned(),
        Condition::RestoreStreamCheckpoint => "restore-checkpoint".to_owned(),
        Condition::PushPosition => "push-position".to_owned(),
        Condition::CheckInfiniteLoop => "check-progress".to_owned(),
        Condition::Rewind(n) => format!("rewind {n}"),
        Condition::Jump(jump) => format!(
            "call group {} (exit s{}, return s{})",
            jump.subroutine_capture, jump.callee_exit, jump.return_state
        ),
        Condition::Assertion(a) => format!(
            "{}look{} ({} states)",
            if a.negative { "negative " } else { "" },
            if a.backward { "behind" } else { "ahead" },
            a.machine.num_states()
        ),
        Condition::CheckNumberedCapture(index) => format!("if-captured {index}"),
        Condition::CheckNamedCapture(name) => format!("if-captured name#{name}"),
        Condition::CheckNumberedRecursion(index) => format!("if-recursing {index}"),
        Condition::CheckNamedRecursion(name) => format!("if-recursing name#{name}"),
        Condition::CheckAnyRecursion => "if-recursing".to_owned(),
        Condition::Fail => "fail".to_owned(),
        Condition::Mark(name) => format!("mark {name:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_captures_support_duplicates() {
        let mut named = NamedCaptures::default();
        named.add("x", 1);
        named.add("y", 2);
        named.add("x", 3);
        let x = named.name_ref("x").unwrap_or_default();
        assert_eq!(named.indices(x), &[1, 3]);
        assert_eq!(named.name_of(3), Some("x"));
        assert_eq!(named.name_of(2), Some("y"));
        assert_eq!(named.name_of(4), None);
        assert_eq!(named.name(x), "x");
        let pairs: Vec<_> = named.iter().collect();
        assert_eq!(pairs[0].0, "x");
        assert_eq!(pairs[1].0, "y");
    }

    #[test]
    fn epsilon_is_an_empty_literal() {
        match Condition::epsilon() {
            Condition::Literal { contents, .. } => assert!(contents.is_empty()),
            other => assert!(false, "unexpected condition {other:?}"),
        }
    }
}
