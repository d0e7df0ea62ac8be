//! AST lowering

use retrace_ast::{
    Alternative, CharacterClass, ComplexAssertion, Conditional, ConditionalCondition, Node,
    Repetition, RepetitionKind, Subexpression, SubexpressionKind,
};
use retrace_unicode::add_fold_closure;
use rustc_hash::FxHashMap;

use crate::machine::{
    CompiledAssertion, Condition, JumpData, NamedCaptures, State, StateMachine, StateRef,
    Transition,
};
use crate::CompileDiagnostic;

/// The result of lowering: a machine is always produced, alongside any
/// diagnostics.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub machine: StateMachine,
    pub diagnostics: Vec<CompileDiagnostic>,
}

/// Lower a pattern tree into a state machine.
pub fn compile(ast: &Node) -> CompileOutput {
    let mut registry = Registry::default();
    registry.visit(ast);

    let mut compiler = Compiler::new(registry.named, registry.capture_count);
    let start = compiler.new_state();
    let end = compiler.new_state();
    compiler.end_state = end;

    // Frame the whole pattern in capture 0.
    let body_in = compiler.new_state();
    let body_out = compiler.new_state();
    compiler.add(start, Condition::CaptureBegin(0), body_in);
    compiler.compile_node(ast, body_in, body_out);
    compiler.add(body_out, Condition::CaptureEnd, end);
    compiler.group_states.insert(0, (body_in, body_out));

    compiler.patch_jumps();
    let machine = StateMachine::new(
        compiler.states,
        start,
        end,
        compiler.named,
        compiler.capture_count,
    );
    tracing::debug!(
        states = machine.num_states(),
        captures = machine.capture_count(),
        diagnostics = compiler.diagnostics.len(),
        "compiled pattern"
    );
    CompileOutput { machine, diagnostics: compiler.diagnostics }
}

/// First pass: collect capture names and the total group count, so forward
/// references resolve and the name directory is complete before lowering.
#[derive(Default)]
struct Registry {
    named: NamedCaptures,
    capture_count: usize,
}

impl Registry {
    fn visit(&mut self, node: &Node) {
        match node {
            Node::Subexpression(sub) => {
                if let Some(index) = sub.capture_index {
                    self.capture_count = self.capture_count.max(index);
                    if let Some(name) = &sub.capture_name {
                        self.named.add(name, index);
                    }
                }
                for child in &sub.nodes {
                    self.visit(child);
                }
            }
            Node::Alternative(alt) => {
                for branch in &alt.branches {
                    for child in &branch.nodes {
                        self.visit(child);
                    }
                }
            }
            Node::Repetition(rep) => self.visit(&rep.expression),
            Node::ComplexAssertion(assertion) => self.visit(&assertion.expression),
            Node::Conditional(cond) => {
                if let ConditionalCondition::Assertion(node) = &cond.condition {
                    self.visit(node);
                }
                for child in &cond.if_true.nodes {
                    self.visit(child);
                }
                if let Some(branch) = &cond.if_false {
                    for child in &branch.nodes {
                        self.visit(child);
                    }
                }
            }
            _ => {}
        }
    }
}

/// A subroutine call waiting for its target group to be compiled.
struct PendingJump {
    state: StateRef,
    transition: usize,
    capture: usize,
    return_state: StateRef,
}

struct Compiler {
    states: Vec<State>,
    end_state: StateRef,
    named: NamedCaptures,
    capture_count: usize,
    /// Capture index -> (entry, exit) of the group's inner subgraph.
    group_states: FxHashMap<usize, (StateRef, StateRef)>,
    pending_jumps: Vec<PendingJump>,
    diagnostics: Vec<CompileDiagnostic>,
}

impl Compiler {
    fn new(named: NamedCaptures, capture_count: usize) -> Self {
        Compiler {
            states: Vec::new(),
            end_state: 0,
            named,
            capture_count,
            group_states: FxHashMap::default(),
            pending_jumps: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn new_state(&mut self) -> StateRef {
        let r = self.states.len() as StateRef;
        self.states.push(State::default());
        r
    }

    fn add(&mut self, from: StateRef, condition: Condition, target: StateRef) {
        self.states[from as usize]
            .transitions
            .push(Transition { condition, target });
    }

    // ---- node lowering ----

    fn compile_node(&mut self, node: &Node, from: StateRef, to: StateRef) {
        match node {
            Node::Error => self.add(from, Condition::Fail, to),
            Node::Literal(lit) => self.add(
                from,
                Condition::Literal {
                    contents: lit.contents.clone(),
                    case_insensitive: lit.case_insensitive,
                },
                to,
            ),
            Node::Class(class) => {
                let ranges = effective_class_ranges(class);
                self.add(from, Condition::Class(ranges), to);
            }
            Node::SimpleAssertion(kind) => self.add(from, Condition::SimpleAssertion(*kind), to),
            Node::ClassAssertion(assertion) => {
                let ranges = effective_class_ranges(&assertion.class);
                self.add(
                    from,
                    Condition::ClassAssertion { ranges, boundary: assertion.boundary },
                    to,
                );
            }
            Node::NumberedBackreference(backref) => {
                if backref.index == 0 || backref.index > self.capture_count {
                    self.diagnostics
                        .push(CompileDiagnostic::BadBackreference(backref.index));
                    self.add(from, Condition::Fail, to);
                } else {
                    self.add(
                        from,
                        Condition::NumberedBackreference {
                            index: backref.index,
                            case_insensitive: backref.case_insensitive,
                        },
                        to,
                    );
                }
            }
            Node::NamedBackreference(backref) => match self.named.name_ref(&backref.name) {
                Some(name) => self.add(
                    from,
                    Condition::NamedBackreference {
                        name,
                        case_insensitive: backref.case_insensitive,
                    },
                    to,
                ),
                None => {
                    self.diagnostics
                        .push(CompileDiagnostic::UnknownName(backref.name.clone()));
                    self.add(from, Condition::Fail, to);
                }
            },
            Node::Subexpression(sub) => self.compile_subexpression(sub, from, to),
            Node::Alternative(alt) => self.compile_alternative(alt, from, to),
            Node::Repetition(rep) => self.compile_repetition(rep, from, to),
            Node::ComplexAssertion(assertion) => self.compile_complex_assertion(assertion, from, to),
            Node::Conditional(cond) => self.compile_conditional(cond, from, to),
            Node::NumberedSubroutine(index) => self.compile_subroutine_call(*index, from, to),
            Node::NamedSubroutine(name) => match self.named.name_ref(name) {
                // A call by name targets the first group of that name.
                Some(name_ref) => match self.named.indices(name_ref).first() {
                    Some(&index) => self.compile_subroutine_call(index, from, to),
                    None => self.add(from, Condition::Fail, to),
                },
                None => {
                    self.diagnostics
                        .push(CompileDiagnostic::UnknownSubroutineName(name.clone()));
                    self.add(from, Condition::Fail, to);
                }
            },
            Node::Fail => self.add(from, Condition::Fail, to),
            Node::Accept => {
                // Jump straight to the accepting state; anything after is
                // unreachable by construction.
                let end = self.end_state;
                self.add(from, Condition::epsilon(), end);
            }
            Node::Mark { name } => self.add(from, Condition::Mark(name.clone()), to),
            Node::MatchStartOverride => self.add(from, Condition::ResetMatchStart, to),
            Node::Feature { .. } => self.add(from, Condition::epsilon(), to),
        }
    }

    /// Chain a sequence of nodes through fresh intermediate states.
    fn compile_chain(&mut self, nodes: &[Node], from: StateRef, to: StateRef) {
        match nodes {
            [] => self.add(from, Condition::epsilon(), to),
            [only] => self.compile_node(only, from, to),
            [head, rest @ ..] => {
                let next = self.new_state();
                self.compile_node(head, from, next);
                self.compile_chain(rest, next, to);
            }
        }
    }

    fn compile_subexpression(&mut self, sub: &Subexpression, from: StateRef, to: StateRef) {
        match sub.kind {
            SubexpressionKind::NonCapturing | SubexpressionKind::Duplicate => {
                self.compile_chain(&sub.nodes, from, to);
            }
            SubexpressionKind::Normal => {
                let index = match sub.capture_index {
                    Some(index) => index,
                    None => {
                        // A capturing group always carries its index; a
                        // missing one is a parser recovery artifact.
                        self.compile_chain(&sub.nodes, from, to);
                        return;
                    }
                };
                let inner_in = self.new_state();
                let inner_out = self.new_state();
                self.add(from, Condition::CaptureBegin(index), inner_in);
                self.compile_chain(&sub.nodes, inner_in, inner_out);
                self.add(inner_out, Condition::CaptureEnd, to);
                self.group_states.insert(index, (inner_in, inner_out));
            }
            SubexpressionKind::Atomic => {
                let inner_in = self.new_state();
                let inner_out = self.new_state();
                self.add(from, Condition::PushAtomic, inner_in);
                self.compile_chain(&sub.nodes, inner_in, inner_out);
                self.add(inner_out, Condition::PopAtomic, to);
            }
        }
    }

    /// Branches fan out of the shared entry state; the transition order is
    /// the source order, which is also the backtracking order.
    fn compile_alternative(&mut self, alt: &Alternative, from: StateRef, to: StateRef) {
        for branch in &alt.branches {
            self.compile_chain(&branch.nodes, from, to);
        }
    }

    fn compile_repetition(&mut self, rep: &Repetition, from: StateRef, to: StateRef) {
        if rep.kind == RepetitionKind::Possessive {
            // A possessive quantifier is the greedy one inside an atomic
            // span.
            let inner_in = self.new_state();
            let inner_out = self.new_state();
            self.add(from, Condition::PushAtomic, inner_in);
            let greedy = Repetition {
                expression: rep.expression.clone(),
                min: rep.min,
                max: rep.max,
                kind: RepetitionKind::Greedy,
            };
            self.compile_repetition(&greedy, inner_in, inner_out);
            self.add(inner_out, Condition::PopAtomic, to);
            return;
        }

        if rep.max == 0 {
            // Matches exactly zero times. The body is still compiled, as a
            // dead end, so groups inside stay addressable by subroutines.
            let dead_in = self.new_state();
            let dead_out = self.new_state();
            self.compile_node(&rep.expression, dead_in, dead_out);
            self.add(from, Condition::epsilon(), to);
            return;
        }

        let lazy = rep.kind == RepetitionKind::Lazy;

        // Mandatory copies.
        let mut cursor = from;
        for _ in 0..rep.min {
            let next = self.new_state();
            self.compile_node(&rep.expression, cursor, next);
            cursor = next;
        }

        if rep.max == Repetition::NO_LIMIT {
            // One loop head with a body back-edge and an exit edge. The
            // head is always a dedicated state so the back-edge never
            // re-enters a state shared with sibling alternatives.
            let head = if cursor == from {
                let head = self.new_state();
                self.add(cursor, Condition::epsilon(), head);
                head
            } else {
                cursor
            };
            let body_in = self.new_state();
            let body_out = self.new_state();
            if lazy {
                self.add(head, Condition::epsilon(), to);
                self.add(head, Condition::PushPosition, body_in);
            } else {
                self.add(head, Condition::PushPosition, body_in);
                self.add(head, Condition::epsilon(), to);
            }
            self.compile_node(&rep.expression, body_in, body_out);
            self.add(body_out, Condition::CheckInfiniteLoop, head);
            return;
        }

        // Bounded: a chain of optional copies, each offering an exit; the
        // edge order encodes greediness.
        let extra = rep.max - rep.min;
        for i in 0..extra {
            let last = i + 1 == extra;
            let next = if last { to } else { self.new_state() };
            if lazy {
                self.add(cursor, Condition::epsilon(), to);
                self.compile_node(&rep.expression, cursor, next);
            } else {
                self.compile_node(&rep.expression, cursor, next);
                self.add(cursor, Condition::epsilon(), to);
            }
            cursor = next;
        }
        if extra == 0 {
            // min == max: the mandatory chain must still reach `to`.
            self.add(cursor, Condition::epsilon(), to);
        }
    }

    fn compile_subroutine_call(&mut self, capture: usize, from: StateRef, to: StateRef) {
        if capture > self.capture_count {
            self.diagnostics
                .push(CompileDiagnostic::BadSubroutineTarget(capture));
            self.add(from, Condition::Fail, to);
            return;
        }
        // Target states may not exist yet (forward calls); emit a
        // placeholder and patch once the whole tree is lowered.
        let transition = self.states[from as usize].transitions.len();
        self.add(
            from,
            Condition::Jump(JumpData {
                callee_exit: 0,
                return_state: to,
                subroutine_capture: capture,
            }),
            from,
        );
        self.pending_jumps.push(PendingJump {
            state: from,
            transition,
            capture,
            return_state: to,
        });
    }

    fn patch_jumps(&mut self) {
        let pending = std::mem::take(&mut self.pending_jumps);
        for jump in pending {
            let slot = &mut self.states[jump.state as usize].transitions[jump.transition];
            match self.group_states.get(&jump.capture) {
                Some(&(entry, exit)) => {
                    slot.target = entry;
                    slot.condition = Condition::Jump(JumpData {
                        callee_exit: exit,
                        return_state: jump.return_state,
                        subroutine_capture: jump.capture,
                    });
                }
                None => {
                    self.diagnostics
                        .push(CompileDiagnostic::BadSubroutineTarget(jump.capture));
                    slot.target = jump.return_state;
                    slot.condition = Condition::Fail;
                }
            }
        }
    }

    fn compile_complex_assertion(
        &mut self,
        assertion: &ComplexAssertion,
        from: StateRef,
        to: StateRef,
    ) {
        if assertion.non_atomic && !assertion.backward && !assertion.negative {
            // Inline zero-width execution: the body's backtrack points stay
            // live; the checkpoint rewinds whatever the body consumed.
            let body_in = self.new_state();
            let body_out = self.new_state();
            self.add(from, Condition::PushStreamCheckpoint, body_in);
            self.compile_node(&assertion.expression, body_in, body_out);
            self.add(body_out, Condition::RestoreStreamCheckpoint, to);
            return;
        }
        let condition = self.assertion_condition(assertion);
        self.add(from, condition, to);
    }

    /// Compile a look-around body into its own machine, carried by the
    /// transition condition.
    fn assertion_condition(&mut self, assertion: &ComplexAssertion) -> Condition {
        let rewind_lengths = if assertion.backward {
            match fixed_lengths(&assertion.expression) {
                Some(lengths) if !lengths.is_empty() => lengths,
                _ => {
                    self.diagnostics
                        .push(CompileDiagnostic::VariableLengthLookbehind);
                    return Condition::Fail;
                }
            }
        } else {
            Vec::new()
        };

        let mut sub = Compiler::new(self.named.clone(), self.capture_count);
        let start = sub.new_state();
        let end = sub.new_state();
        sub.end_state = end;
        if assertion.backward {
            // The body runs forward after rewinding by one of the fixed
            // lengths; backtracking through these edges tries each length.
            let body_in = sub.new_state();
            for &length in &rewind_lengths {
                sub.add(start, Condition::Rewind(length), body_in);
            }
            sub.compile_node(&assertion.expression, body_in, end);
        } else {
            sub.compile_node(&assertion.expression, start, end);
        }
        sub.patch_jumps();
        self.diagnostics.append(&mut sub.diagnostics);
        let machine = StateMachine::new(sub.states, start, end, sub.named, sub.capture_count);

        Condition::Assertion(Box::new(CompiledAssertion {
            backward: assertion.backward,
            negative: assertion.negative,
            non_atomic: assertion.non_atomic,
            rewind_lengths,
            machine,
        }))
    }

    fn compile_conditional(&mut self, cond: &Conditional, from: StateRef, to: StateRef) {
        // The decision state commits: once a guard edge is taken the other
        // branch must never run, so the state suppresses its frame.
        let decision = self.new_state();
        self.states[decision as usize].is_atomic = true;
        self.add(from, Condition::epsilon(), decision);

        if matches!(cond.condition, ConditionalCondition::Define) {
            // The body is compiled out of line: reachable through
            // subroutine calls, never as a branch.
            let dead_in = self.new_state();
            let dead_out = self.new_state();
            self.compile_chain(&cond.if_true.nodes, dead_in, dead_out);
            self.add(decision, Condition::epsilon(), to);
            return;
        }

        let guard = match &cond.condition {
            ConditionalCondition::NumberedCapture(index) => {
                Condition::CheckNumberedCapture(*index)
            }
            ConditionalCondition::NamedCapture(name) => match self.named.name_ref(name) {
                Some(name_ref) => Condition::CheckNamedCapture(name_ref),
                None => {
                    self.diagnostics
                        .push(CompileDiagnostic::UnknownConditionName(name.clone()));
                    Condition::Fail
                }
            },
            ConditionalCondition::Assertion(node) => match &**node {
                Node::ComplexAssertion(assertion) => self.assertion_condition(assertion),
                _ => Condition::Fail,
            },
            ConditionalCondition::AnyRecursion => Condition::CheckAnyRecursion,
            ConditionalCondition::NumberedRecursion(index) => {
                Condition::CheckNumberedRecursion(*index)
            }
            ConditionalCondition::NamedRecursion(name) => match self.named.name_ref(name) {
                Some(name_ref) => Condition::CheckNamedRecursion(name_ref),
                None => {
                    self.diagnostics
                        .push(CompileDiagnostic::UnknownConditionName(name.clone()));
                    Condition::Fail
                }
            },
            ConditionalCondition::Define => Condition::Fail,
        };

        let yes_in = self.new_state();
        self.add(decision, guard, yes_in);
        self.compile_chain(&cond.if_true.nodes, yes_in, to);

        let no_in = self.new_state();
        self.add(decision, Condition::epsilon(), no_in);
        match &cond.if_false {
            Some(branch) => self.compile_chain(&branch.nodes, no_in, to),
            None => self.add(no_in, Condition::epsilon(), to),
        }
    }
}

/// The effective, pre-folded ranges of a class: fold closure first, then
/// negation, so a negated case-insensitive class excludes both cases.
fn effective_class_ranges(class: &CharacterClass) -> retrace_ranges::CodepointRanges {
    let mut ranges = class.ranges.clone();
    if class.case_insensitive {
        add_fold_closure(&mut ranges);
    }
    if class.negate { ranges.negated() } else { ranges }
}

/// The set of lengths a node can match, when that set is small and fixed.
/// `None` means variable or unsupported-in-look-behind.
fn fixed_lengths(node: &Node) -> Option<Vec<usize>> {
    const MAX_VARIANTS: usize = 8;
    let lengths = match node {
        Node::Literal(lit) => vec![lit.contents.chars().count()],
        Node::Class(_) => vec![1],
        Node::SimpleAssertion(_)
        | Node::ClassAssertion(_)
        | Node::ComplexAssertion(_)
        | Node::Mark { .. }
        | Node::MatchStartOverride
        | Node::Feature { .. } => vec![0],
        Node::Error | Node::Fail => vec![],
        Node::Subexpression(sub) => chain_lengths(&sub.nodes)?,
        Node::Alternative(alt) => {
            let mut union = Vec::new();
            for branch in &alt.branches {
                union.extend(chain_lengths(&branch.nodes)?);
            }
            union.sort_unstable();
            union.dedup();
            union
        }
        Node::Repetition(rep) => {
            if rep.min != rep.max {
                return None;
            }
            let body = fixed_lengths(&rep.expression)?;
            let mut acc = vec![0usize];
            for _ in 0..rep.min {
                acc = sum_sets(&acc, &body)?;
            }
            acc
        }
        Node::NumberedBackreference(_)
        | Node::NamedBackreference(_)
        | Node::Conditional(_)
        | Node::NumberedSubroutine(_)
        | Node::NamedSubroutine(_)
        | Node::Accept => return None,
    };
    (lengths.len() <= MAX_VARIANTS).then_some(lengths)
}

fn chain_lengths(nodes: &[Node]) -> Option<Vec<usize>> {
    let mut acc = vec![0usize];
    for node in nodes {
        acc = sum_sets(&acc, &fixed_lengths(node)?)?;
    }
    Some(acc)
}

fn sum_sets(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    const MAX_VARIANTS: usize = 8;
    let mut out = Vec::new();
    for &x in a {
        for &y in b {
            out.push(x.checked_add(y)?);
        }
    }
    out.sort_unstable();
    out.dedup();
    (out.len() <= MAX_VARIANTS).then_some(out)
}
