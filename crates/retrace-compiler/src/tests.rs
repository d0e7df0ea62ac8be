use pretty_assertions::assert_eq;
use retrace_ast::Options;
use retrace_stream::StrStream;

use crate::{compile, CompileDiagnostic, Condition, StateMachine};

fn compile_pattern(pattern: &str) -> (StateMachine, Vec<CompileDiagnostic>) {
    let (ast, parse_diags) = retrace_parser::parse_collecting(
        StrStream::new(pattern),
        Options::default(),
    );
    assert_eq!(parse_diags, vec![], "parse diagnostics for `{pattern}`");
    let output = compile(&ast);
    (output.machine, output.diagnostics)
}

fn compile_clean(pattern: &str) -> StateMachine {
    let (machine, diagnostics) = compile_pattern(pattern);
    assert_eq!(diagnostics, vec![], "compile diagnostics for `{pattern}`");
    machine
}

/// Every condition reachable from the machine's states.
fn conditions(machine: &StateMachine) -> Vec<Condition> {
    let mut out = Vec::new();
    for i in 0..machine.num_states() {
        for t in &machine.state(i as u32).transitions {
            out.push(t.condition.clone());
        }
    }
    out
}

#[test]
fn whole_pattern_is_framed_in_capture_zero() {
    let machine = compile_clean("ab");
    let start_transitions = &machine.state(machine.start_state()).transitions;
    assert_eq!(start_transitions.len(), 1);
    assert_eq!(start_transitions[0].condition, Condition::CaptureBegin(0));
    assert!(
        conditions(&machine).contains(&Condition::CaptureEnd),
        "{machine}"
    );
}

#[test]
fn literal_compiles_to_one_transition() {
    let machine = compile_clean("abc");
    let found = conditions(&machine).into_iter().any(|c| {
        matches!(c, Condition::Literal { contents, .. } if contents == "abc")
    });
    assert!(found, "{machine}");
}

#[test]
fn capture_groups_register_begin_and_end() {
    let machine = compile_clean("(a)(b)");
    assert_eq!(machine.capture_count(), 2);
    let conds = conditions(&machine);
    assert!(conds.contains(&Condition::CaptureBegin(1)));
    assert!(conds.contains(&Condition::CaptureBegin(2)));
}

#[test]
fn named_directory_is_built() {
    let machine = compile_clean("(?<first>a)(?<second>b)(?<first>c)");
    let named = machine.named_captures();
    let first = named.name_ref("first");
    assert!(first.is_some());
    if let Some(first) = first {
        assert_eq!(named.indices(first), &[1, 3]);
    }
    assert_eq!(named.name_of(2), Some("second"));
}

#[test]
fn atomic_group_brackets_the_body() {
    let machine = compile_clean("(?>ab)");
    let conds = conditions(&machine);
    assert!(conds.contains(&Condition::PushAtomic));
    assert!(conds.contains(&Condition::PopAtomic));
}

#[test]
fn possessive_repetition_is_atomic() {
    let machine = compile_clean("a++");
    let conds = conditions(&machine);
    assert!(conds.contains(&Condition::PushAtomic));
    assert!(conds.contains(&Condition::PopAtomic));
}

#[test]
fn unbounded_repetition_has_a_loop_guard() {
    let machine = compile_clean("a*");
    let conds = conditions(&machine);
    assert!(conds.contains(&Condition::PushPosition));
    assert!(conds.contains(&Condition::CheckInfiniteLoop));
}

#[test]
fn greedy_loop_head_tries_the_body_first() {
    let machine = compile_clean("a*");
    assert_loop_order(&machine, true);
}

#[test]
fn lazy_loop_head_tries_the_exit_first() {
    let machine = compile_clean("a*?");
    assert_loop_order(&machine, false);
}

fn assert_loop_order(machine: &StateMachine, body_first: bool) {
    for i in 0..machine.num_states() {
        let state = machine.state(i as u32);
        if state.transitions.len() == 2 {
            let kinds: Vec<bool> = state
                .transitions
                .iter()
                .map(|t| matches!(t.condition, Condition::PushPosition))
                .collect();
            if kinds.contains(&true) {
                assert_eq!(kinds[0], body_first, "{machine}");
                return;
            }
        }
    }
    assert!(false, "no loop head found: {machine}");
}

#[test]
fn subroutine_call_resolves_forward_and_backward() {
    for pattern in ["(a)(?1)", "(?1)(a)"] {
        let machine = compile_clean(pattern);
        let jump = conditions(&machine).into_iter().find_map(|c| match c {
            Condition::Jump(j) => Some(j),
            _ => None,
        });
        assert!(jump.is_some(), "{pattern}: {machine}");
        if let Some(j) = jump {
            assert_eq!(j.subroutine_capture, 1, "{pattern}");
        }
    }
}

#[test]
fn recursion_targets_capture_zero() {
    let machine = compile_clean("a(?R)?");
    let jump = conditions(&machine).into_iter().find_map(|c| match c {
        Condition::Jump(j) => Some(j),
        _ => None,
    });
    if let Some(j) = jump {
        assert_eq!(j.subroutine_capture, 0);
    } else {
        assert!(false, "no jump found: {machine}");
    }
}

#[test]
fn missing_subroutine_target_degrades_to_fail() {
    let (machine, diagnostics) = compile_pattern("(?2)(a)");
    assert_eq!(diagnostics, vec![CompileDiagnostic::BadSubroutineTarget(2)]);
    assert!(conditions(&machine).contains(&Condition::Fail));
}

#[test]
fn bad_backreference_degrades_to_fail() {
    let (machine, diagnostics) = compile_pattern(r"(a)\g{7}");
    assert_eq!(diagnostics, vec![CompileDiagnostic::BadBackreference(7)]);
    assert!(conditions(&machine).contains(&Condition::Fail));
}

#[test]
fn lookahead_carries_a_sub_machine() {
    let machine = compile_clean("(?=ab)c");
    let assertion = conditions(&machine).into_iter().find_map(|c| match c {
        Condition::Assertion(a) => Some(a),
        _ => None,
    });
    match assertion {
        Some(a) => {
            assert!(!a.backward);
            assert!(!a.negative);
            assert!(a.machine.num_states() > 0);
        }
        None => assert!(false, "no assertion found: {machine}"),
    }
}

#[test]
fn fixed_length_lookbehind_computes_rewinds() {
    let machine = compile_clean("(?<=ab|xyz)c");
    let assertion = conditions(&machine).into_iter().find_map(|c| match c {
        Condition::Assertion(a) => Some(a),
        _ => None,
    });
    match assertion {
        Some(a) => {
            assert!(a.backward);
            assert_eq!(a.rewind_lengths, vec![2, 3]);
        }
        None => assert!(false, "no assertion found: {machine}"),
    }
}

#[test]
fn variable_length_lookbehind_is_rejected() {
    let (machine, diagnostics) = compile_pattern("(?<=a+)b");
    assert_eq!(
        diagnostics,
        vec![CompileDiagnostic::VariableLengthLookbehind]
    );
    assert!(conditions(&machine).contains(&Condition::Fail));
}

#[test]
fn conditional_decision_state_is_atomic() {
    let machine = compile_clean("(?(1)a|b)(x)");
    let mut found = false;
    for i in 0..machine.num_states() {
        let state = machine.state(i as u32);
        if state.is_atomic {
            assert_eq!(state.transitions.len(), 2, "{machine}");
            assert_eq!(
                state.transitions[0].condition,
                Condition::CheckNumberedCapture(1)
            );
            found = true;
        }
    }
    assert!(found, "no decision state: {machine}");
}

#[test]
fn define_body_is_unreachable_but_compiled() {
    let machine = compile_clean("(?(DEFINE)(?<digit>[0-9]))(?&digit)");
    // The DEFINE body registered its group: the call must resolve.
    let jump = conditions(&machine).into_iter().find_map(|c| match c {
        Condition::Jump(j) => Some(j),
        _ => None,
    });
    if let Some(j) = jump {
        assert_eq!(j.subroutine_capture, 1);
    } else {
        assert!(false, "no jump found: {machine}");
    }
}

#[test]
fn case_insensitive_class_is_pre_folded() {
    let (ast, _) = retrace_parser::parse_collecting(
        StrStream::new("(?i)[a-z]"),
        Options::default(),
    );
    let machine = compile(&ast).machine;
    let class = conditions(&machine).into_iter().find_map(|c| match c {
        Condition::Class(ranges) => Some(ranges),
        _ => None,
    });
    match class {
        Some(ranges) => {
            assert!(ranges.contains('a' as u32));
            assert!(ranges.contains('A' as u32));
        }
        None => assert!(false, "no class found: {machine}"),
    }
}

#[test]
fn verbs_and_match_start_override() {
    let machine = compile_clean(r"(*MARK:m)a\K(*FAIL)?");
    let conds = conditions(&machine);
    assert!(conds.contains(&Condition::Mark("m".to_owned())));
    assert!(conds.contains(&Condition::ResetMatchStart));
    assert!(conds.contains(&Condition::Fail));
}

#[test]
fn zero_max_repetition_keeps_groups_addressable() {
    let machine = compile_clean("(a){0}(?1)");
    let jump = conditions(&machine).into_iter().find_map(|c| match c {
        Condition::Jump(j) => Some(j),
        _ => None,
    });
    assert!(jump.is_some(), "{machine}");
}
