//! Backtracking matcher
//!
//! Executes a compiled [`StateMachine`] against a [`CodepointStream`]. The
//! matcher walks transitions one at a time; whenever it takes an edge of a
//! state that still has untried alternatives, it pushes a backtracking frame
//! recording everything needed to come back: the stream before the edge, the
//! state and next transition index, capture bookkeeping, and snapshots of
//! the auxiliary stacks (subroutine calls, stream checkpoints, loop-guard
//! positions). Failure pops the top frame and resumes there.
//!
//! All scratch state lives only for the duration of one `try_match` call and
//! is cleared on both the success and the exhausted path, so one matcher can
//! be reused across calls. The machine itself is never mutated and can be
//! shared.

mod result;

pub use result::{Capture, MatchResult, MatcherConfig};

use retrace_ast::SimpleAssertionKind;
use retrace_compiler::{CompiledAssertion, Condition, StateMachine, StateRef};
use retrace_stream::{CodepointStream, LineEnding, consume_line_ending, is_within_crlf};
use retrace_unicode::fold;

/// What evaluating a transition condition produced.
enum Outcome {
    /// The condition rejected; the stream is restored by the caller.
    Reject,
    /// The condition accepted.
    Accept,
    /// A positive look-around accepted and its captures forward into the
    /// enclosing match.
    AcceptCaptures(Vec<Option<Capture>>),
}

fn bool_outcome(accepted: bool) -> Outcome {
    if accepted { Outcome::Accept } else { Outcome::Reject }
}

/// An active subroutine call.
#[derive(Clone)]
struct SubroutineFrame {
    /// Reaching this state completes the callee.
    callee_exit: StateRef,
    /// Where the caller resumes.
    return_state: StateRef,
    /// Capture index of the called group.
    capture: usize,
    /// Capture values at call time, restored on return.
    saved_captures: Vec<Option<Capture>>,
    /// Ongoing-capture depth at call time.
    saved_ongoing_len: usize,
}

/// A backtracking frame: everything needed to resume at an untried
/// alternative.
struct Frame<S> {
    /// Stream just before the transition that pushed this frame.
    stream: S,
    state: StateRef,
    next_transition: usize,
    ongoing_len: usize,
    /// `(index, previous value)` pairs for captures finished after this
    /// frame, applied in reverse on backtrack.
    capture_undo: Vec<(usize, Option<Capture>)>,
    overridden_start: Option<usize>,
    atomic_len: usize,
    subroutines: Vec<SubroutineFrame>,
    checkpoints: Vec<S>,
    positions: Vec<usize>,
    marks_len: usize,
}

/// A reusable matcher over one compiled machine.
///
/// The matcher owns mutable scratch state and must not be shared between
/// threads while matching; the machine it borrows is immutable and may be.
pub struct Matcher<'m, S: CodepointStream> {
    machine: &'m StateMachine,
    config: MatcherConfig,
    frames: Vec<Frame<S>>,
    /// `(capture index, begin position)` for captures currently open.
    ongoing: Vec<(usize, usize)>,
    captures: Vec<Option<Capture>>,
    /// Frame depths recorded by atomic-span opens.
    atomic_marks: Vec<usize>,
    subroutines: Vec<SubroutineFrame>,
    checkpoints: Vec<S>,
    positions: Vec<usize>,
    marks: Vec<String>,
    overridden_start: Option<usize>,
    hit_cap: bool,
    previous_empty_end: Option<usize>,
}

impl<'m, S: CodepointStream> Matcher<'m, S> {
    /// Create a matcher with default limits.
    pub fn new(machine: &'m StateMachine) -> Self {
        Matcher::with_config(machine, MatcherConfig::default())
    }

    /// Create a matcher with explicit limits.
    pub fn with_config(machine: &'m StateMachine, config: MatcherConfig) -> Self {
        Matcher {
            machine,
            config,
            frames: Vec::new(),
            ongoing: Vec::new(),
            captures: Vec::new(),
            atomic_marks: Vec::new(),
            subroutines: Vec::new(),
            checkpoints: Vec::new(),
            positions: Vec::new(),
            marks: Vec::new(),
            overridden_start: None,
            hit_cap: false,
            previous_empty_end: None,
        }
    }

    /// Whether the most recent attempt aborted on the iteration cap.
    pub fn hit_iteration_cap(&self) -> bool {
        self.hit_cap
    }

    /// Attempt a match at the current stream position. On success the
    /// stream is left at the match end; on failure it is restored. With
    /// `reject_empty`, an empty completion is treated as a failed path and
    /// backtracking continues looking for a non-empty one.
    pub fn try_match(&mut self, stream: &mut S, reject_empty: bool) -> Option<MatchResult> {
        self.reset();
        self.hit_cap = false;
        let saved = stream.clone();
        let result = self.run(stream, reject_empty, None, None);
        if result.is_none() {
            *stream = saved;
        }
        self.reset();
        result
    }

    /// Slide forward from the current position until a match is found or
    /// the stream is exhausted. The stream ends up at the match end. An
    /// empty match is never reported twice at the same position.
    pub fn find_next(&mut self, stream: &mut S) -> Option<MatchResult> {
        loop {
            let at = stream.position();
            let reject_empty = self.previous_empty_end == Some(at);
            if let Some(result) = self.try_match(stream, reject_empty) {
                self.previous_empty_end =
                    if result.whole().length == 0 { Some(result.whole().end()) } else { None };
                return Some(result);
            }
            if stream.at_end() {
                return None;
            }
            stream.take();
        }
    }

    /// Report every match in turn; the callback returns `false` to stop.
    pub fn find_all(&mut self, stream: &mut S, mut callback: impl FnMut(MatchResult) -> bool) {
        while let Some(result) = self.find_next(stream) {
            if !callback(result) {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.frames.clear();
        self.ongoing.clear();
        self.captures.clear();
        self.atomic_marks.clear();
        self.subroutines.clear();
        self.checkpoints.clear();
        self.positions.clear();
        self.marks.clear();
        self.overridden_start = None;
    }

    /// Whether every scratch structure is empty; the invariant both exits
    /// of `try_match` maintain.
    #[doc(hidden)]
    pub fn scratch_is_clear(&self) -> bool {
        self.frames.is_empty()
            && self.ongoing.is_empty()
            && self.captures.is_empty()
            && self.atomic_marks.is_empty()
            && self.subroutines.is_empty()
            && self.checkpoints.is_empty()
            && self.positions.is_empty()
            && self.marks.is_empty()
            && self.overridden_start.is_none()
    }

    // ---- engine core ----

    fn run(
        &mut self,
        stream: &mut S,
        reject_empty: bool,
        required_end: Option<usize>,
        seed_captures: Option<&[Option<Capture>]>,
    ) -> Option<MatchResult> {
        let match_begin = stream.position();
        self.captures = match seed_captures {
            Some(seed) => seed.to_vec(),
            None => vec![None; self.machine.capture_count() + 1],
        };
        if self.captures.len() < self.machine.capture_count() + 1 {
            self.captures.resize(self.machine.capture_count() + 1, None);
        }
        let mut current = self.machine.start_state();
        let mut transition_idx = 0usize;
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                self.hit_cap = true;
                tracing::debug!(iterations, "iteration cap exceeded, aborting match");
                return None;
            }

            // A completed subroutine returns before anything else happens.
            if self
                .subroutines
                .last()
                .is_some_and(|top| top.callee_exit == current)
            {
                self.return_from_subroutine(&mut current);
                transition_idx = 0;
                continue;
            }

            if current == self.machine.end_state() {
                if !self.subroutines.is_empty() {
                    // `(*ACCEPT)` inside a call completes the call only.
                    self.return_from_subroutine(&mut current);
                    transition_idx = 0;
                    continue;
                }
                let length = stream.position().saturating_sub(match_begin);
                let rejected = (reject_empty && length == 0)
                    || required_end.is_some_and(|end| stream.position() != end);
                if !rejected {
                    tracing::debug!(iterations, length, "match");
                    return Some(self.build_result(stream));
                }
                if !self.backtrack(stream, &mut current, &mut transition_idx) {
                    return None;
                }
                continue;
            }

            let state = self.machine.state(current);
            let Some(transition) = state.transitions.get(transition_idx) else {
                if !self.backtrack(stream, &mut current, &mut transition_idx) {
                    tracing::debug!(iterations, "no match");
                    return None;
                }
                continue;
            };

            let before = stream.clone();
            match self.evaluate(&transition.condition, stream, match_begin) {
                Outcome::Reject => {
                    *stream = before;
                    transition_idx += 1;
                }
                outcome => {
                    if !state.is_atomic && transition_idx + 1 < state.transitions.len() {
                        self.push_frame(before, current, transition_idx + 1);
                    }
                    self.apply(&transition.condition, outcome, stream);
                    current = transition.target;
                    transition_idx = 0;
                }
            }
        }
    }

    fn push_frame(&mut self, stream: S, state: StateRef, next_transition: usize) {
        self.frames.push(Frame {
            stream,
            state,
            next_transition,
            ongoing_len: self.ongoing.len(),
            capture_undo: Vec::new(),
            overridden_start: self.overridden_start,
            atomic_len: self.atomic_marks.len(),
            subroutines: self.subroutines.clone(),
            checkpoints: self.checkpoints.clone(),
            positions: self.positions.clone(),
            marks_len: self.marks.len(),
        });
    }

    fn backtrack(
        &mut self,
        stream: &mut S,
        current: &mut StateRef,
        transition_idx: &mut usize,
    ) -> bool {
        let Some(frame) = self.frames.pop() else { return false };
        *stream = frame.stream;
        *current = frame.state;
        *transition_idx = frame.next_transition;
        self.ongoing.truncate(frame.ongoing_len);
        for (index, old) in frame.capture_undo.into_iter().rev() {
            self.captures[index] = old;
        }
        self.overridden_start = frame.overridden_start;
        self.atomic_marks.truncate(frame.atomic_len);
        self.subroutines = frame.subroutines;
        self.checkpoints = frame.checkpoints;
        self.positions = frame.positions;
        self.marks.truncate(frame.marks_len);
        true
    }

    fn return_from_subroutine(&mut self, current: &mut StateRef) {
        let Some(frame) = self.subroutines.pop() else { return };
        // Captures made inside the call are rewound; recursion-safe.
        self.captures = frame.saved_captures;
        self.ongoing.truncate(frame.saved_ongoing_len);
        *current = frame.return_state;
    }

    fn record_capture_undo(&mut self, index: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.capture_undo.push((index, self.captures[index]));
        }
    }

    fn build_result(&mut self, stream: &S) -> MatchResult {
        // `(*ACCEPT)` may leave captures open; they close at the accept
        // position.
        while let Some((index, begin)) = self.ongoing.pop() {
            self.captures[index] = Some(Capture {
                begin,
                length: stream.position().saturating_sub(begin),
            });
        }
        MatchResult {
            captures: std::mem::take(&mut self.captures),
            overridden_start: self.overridden_start.take(),
            marks: std::mem::take(&mut self.marks),
        }
    }

    // ---- condition evaluation (no matcher-state effects) ----

    fn evaluate(&mut self, condition: &Condition, stream: &mut S, match_begin: usize) -> Outcome {
        match condition {
            Condition::Literal { contents, case_insensitive } => {
                for expected in contents.chars() {
                    let Some(actual) = stream.take() else { return Outcome::Reject };
                    let actual = if *case_insensitive { fold(actual) } else { actual };
                    if actual != expected {
                        return Outcome::Reject;
                    }
                }
                Outcome::Accept
            }
            Condition::Class(ranges) => match stream.take() {
                Some(c) if ranges.contains(c as u32) => Outcome::Accept,
                _ => Outcome::Reject,
            },
            Condition::SimpleAssertion(kind) => {
                bool_outcome(self.check_simple(*kind, stream, match_begin))
            }
            Condition::ClassAssertion { ranges, boundary } => {
                let prev = stream.peek_prev().is_some_and(|c| ranges.contains(c as u32));
                let next = stream.peek().is_some_and(|c| ranges.contains(c as u32));
                bool_outcome(if *boundary { prev != next } else { prev == next })
            }
            Condition::NumberedBackreference { index, case_insensitive } => {
                bool_outcome(self.consume_backreference(stream, *index, *case_insensitive))
            }
            Condition::NamedBackreference { name, case_insensitive } => {
                // The first group of this name that has matched decides.
                let chosen = self
                    .machine
                    .named_captures()
                    .indices(*name)
                    .iter()
                    .copied()
                    .find(|&i| self.capture_value(i).is_some());
                match chosen {
                    Some(index) => {
                        bool_outcome(self.consume_backreference(stream, index, *case_insensitive))
                    }
                    None => Outcome::Reject,
                }
            }
            Condition::Assertion(assertion) => self.check_assertion(assertion, stream),
            Condition::CheckNumberedCapture(index) => {
                bool_outcome(self.capture_value(*index).is_some())
            }
            Condition::CheckNamedCapture(name) => bool_outcome(
                self.machine
                    .named_captures()
                    .indices(*name)
                    .iter()
                    .any(|&i| self.capture_value(i).is_some()),
            ),
            Condition::CheckAnyRecursion => bool_outcome(!self.subroutines.is_empty()),
            Condition::CheckNumberedRecursion(index) => {
                bool_outcome(self.subroutines.last().is_some_and(|f| f.capture == *index))
            }
            Condition::CheckNamedRecursion(name) => {
                let indices = self.machine.named_captures().indices(*name);
                bool_outcome(
                    self.subroutines
                        .last()
                        .is_some_and(|f| indices.contains(&f.capture)),
                )
            }
            Condition::CheckInfiniteLoop => {
                bool_outcome(self.positions.last().copied() != Some(stream.position()))
            }
            Condition::Rewind(count) => {
                for _ in 0..*count {
                    if stream.prev().is_none() {
                        return Outcome::Reject;
                    }
                }
                Outcome::Accept
            }
            Condition::Fail => Outcome::Reject,
            // Side-effect-only conditions always accept; effects run in
            // `apply` after the backtracking frame is in place.
            Condition::CaptureBegin(_)
            | Condition::CaptureEnd
            | Condition::ResetMatchStart
            | Condition::PushAtomic
            | Condition::PopAtomic
            | Condition::PushStreamCheckpoint
            | Condition::RestoreStreamCheckpoint
            | Condition::PushPosition
            | Condition::Jump(_)
            | Condition::Mark(_) => Outcome::Accept,
        }
    }

    fn capture_value(&self, index: usize) -> Option<Capture> {
        self.captures.get(index).copied().flatten()
    }

    /// Compare the span captured by `index` against the input at the
    /// cursor, consuming it on success.
    fn consume_backreference(&self, stream: &mut S, index: usize, case_insensitive: bool) -> bool {
        let Some(capture) = self.capture_value(index) else { return false };
        // Walk a second cursor back over the captured span; the stream has
        // no random access, but it is bidirectional and cheap to clone.
        let mut source = stream.clone();
        let here = source.position();
        if capture.begin <= here {
            for _ in 0..(here - capture.begin) {
                if source.prev().is_none() {
                    return false;
                }
            }
        } else {
            for _ in 0..(capture.begin - here) {
                if source.take().is_none() {
                    return false;
                }
            }
        }
        for _ in 0..capture.length {
            let (Some(expected), Some(actual)) = (source.take(), stream.take()) else {
                return false;
            };
            let (expected, actual) = if case_insensitive {
                (fold(expected), fold(actual))
            } else {
                (expected, actual)
            };
            if expected != actual {
                return false;
            }
        }
        true
    }

    fn check_simple(&self, kind: SimpleAssertionKind, stream: &S, match_begin: usize) -> bool {
        match kind {
            SimpleAssertionKind::AlwaysFalse => false,
            SimpleAssertionKind::SubjectStart => stream.at_start(),
            SimpleAssertionKind::SubjectEnd => stream.at_end(),
            SimpleAssertionKind::SubjectEndOrTrailingNewline => {
                if stream.at_end() {
                    return true;
                }
                if is_within_crlf(stream) {
                    return false;
                }
                let mut probe = stream.clone();
                consume_line_ending(&mut probe) != LineEnding::None && probe.at_end()
            }
            SimpleAssertionKind::LineStart => {
                if stream.at_start() {
                    return true;
                }
                if is_within_crlf(stream) {
                    return false;
                }
                matches!(stream.peek_prev(), Some('\n') | Some('\r'))
            }
            SimpleAssertionKind::LineEnd => {
                if stream.at_end() {
                    return true;
                }
                if is_within_crlf(stream) {
                    return false;
                }
                matches!(stream.peek(), Some('\n') | Some('\r'))
            }
            SimpleAssertionKind::RangeStart => stream.position() == match_begin,
        }
    }

    /// Run a look-around body on a cloned sub-matcher. Look-behind bodies
    /// start with rewind edges and must land back exactly at the current
    /// position.
    fn check_assertion(&mut self, assertion: &CompiledAssertion, stream: &S) -> Outcome {
        let mut sub: Matcher<'_, S> = Matcher::with_config(&assertion.machine, self.config);
        let mut sub_stream = stream.clone();
        let required_end = assertion.backward.then(|| stream.position());
        let result = sub.run(&mut sub_stream, false, required_end, Some(&self.captures));
        if sub.hit_cap {
            // A body that blows the budget is a non-match.
            self.hit_cap = true;
        }
        match (result, assertion.negative) {
            (Some(body), false) => Outcome::AcceptCaptures(body.captures),
            (None, true) => Outcome::Accept,
            _ => Outcome::Reject,
        }
    }

    // ---- side effects ----

    fn apply(&mut self, condition: &Condition, outcome: Outcome, stream: &mut S) {
        match condition {
            Condition::CaptureBegin(index) => {
                self.ongoing.push((*index, stream.position()));
            }
            Condition::CaptureEnd => {
                if let Some((index, begin)) = self.ongoing.pop() {
                    self.record_capture_undo(index);
                    self.captures[index] = Some(Capture {
                        begin,
                        length: stream.position().saturating_sub(begin),
                    });
                } else {
                    debug_assert!(false, "capture end without a matching begin");
                }
            }
            Condition::ResetMatchStart => {
                self.overridden_start = Some(stream.position());
            }
            Condition::PushAtomic => {
                self.atomic_marks.push(self.frames.len());
            }
            Condition::PopAtomic => {
                if let Some(mark) = self.atomic_marks.pop() {
                    // Frames inside the span are gone for good; their
                    // capture history folds into the surviving frame so
                    // later backtracking still restores correctly.
                    let discarded = self.frames.split_off(mark);
                    if let Some(survivor) = self.frames.last_mut() {
                        for frame in discarded {
                            survivor.capture_undo.extend(frame.capture_undo);
                        }
                    }
                } else {
                    debug_assert!(false, "atomic close without a matching open");
                }
            }
            Condition::PushStreamCheckpoint => {
                self.checkpoints.push(stream.clone());
            }
            Condition::RestoreStreamCheckpoint => {
                if let Some(saved) = self.checkpoints.pop() {
                    *stream = saved;
                } else {
                    debug_assert!(false, "checkpoint restore without a matching push");
                }
            }
            Condition::PushPosition => {
                self.positions.push(stream.position());
            }
            Condition::CheckInfiniteLoop => {
                self.positions.pop();
            }
            Condition::Jump(jump) => {
                self.subroutines.push(SubroutineFrame {
                    callee_exit: jump.callee_exit,
                    return_state: jump.return_state,
                    capture: jump.subroutine_capture,
                    saved_captures: self.captures.clone(),
                    saved_ongoing_len: self.ongoing.len(),
                });
            }
            Condition::Mark(name) => {
                self.marks.push(name.clone());
            }
            Condition::Assertion(_) => {
                if let Outcome::AcceptCaptures(forwarded) = outcome {
                    for (index, value) in forwarded.into_iter().enumerate() {
                        if index < self.captures.len() && self.captures[index] != value {
                            self.record_capture_undo(index);
                            self.captures[index] = value;
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests;
