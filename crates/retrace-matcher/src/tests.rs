use pretty_assertions::assert_eq;
use retrace_ast::Options;
use retrace_compiler::StateMachine;
use retrace_stream::{CodepointStream, StrStream};

use crate::{Matcher, MatcherConfig, MatchResult};

fn machine_with(pattern: &str, options: Options) -> StateMachine {
    let (ast, parse_diags) = retrace_parser::parse_collecting(StrStream::new(pattern), options);
    assert_eq!(parse_diags, vec![], "parse diagnostics for `{pattern}`");
    let output = retrace_compiler::compile(&ast);
    assert_eq!(
        output.diagnostics,
        vec![],
        "compile diagnostics for `{pattern}`"
    );
    output.machine
}

fn machine(pattern: &str) -> StateMachine {
    machine_with(pattern, Options::default())
}

/// First match via `find_next`, as `(begin, text, result)`.
fn find_first(pattern: &str, subject: &str) -> Option<(usize, String, MatchResult)> {
    let compiled = machine(pattern);
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new(subject);
    let result = matcher.find_next(&mut stream)?;
    Some((result.begin(), text_of(subject, &result, 0), result))
}

/// All matches as `(begin, text)`.
fn find_all_with(pattern: &str, subject: &str, options: Options) -> Vec<(usize, String)> {
    let compiled = machine_with(pattern, options);
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new(subject);
    let mut out = Vec::new();
    matcher.find_all(&mut stream, |result| {
        out.push((result.begin(), text_of(subject, &result, 0)));
        true
    });
    out
}

fn find_all(pattern: &str, subject: &str) -> Vec<(usize, String)> {
    find_all_with(pattern, subject, Options::default())
}

/// The text of capture `index`, by codepoint positions.
fn text_of(subject: &str, result: &MatchResult, index: usize) -> String {
    match result.capture(index) {
        Some(cap) => {
            let begin = if index == 0 { result.begin() } else { cap.begin };
            let end = cap.end();
            subject.chars().skip(begin).take(end - begin).collect()
        }
        None => String::new(),
    }
}

// ---- end-to-end scenarios ----

#[test]
fn alternation_in_a_loop_captures_the_last_iteration() {
    let (begin, text, result) = find_first("a(b|c)+d", "abccbd").unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "abccbd"));
    assert_eq!(text_of("abccbd", &result, 1), "b");
}

#[test]
fn case_insensitive_literal_match() {
    let found = find_first("(?i)Hello", "heLLo, world");
    let (begin, text, _) = found.unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "heLLo"));
}

#[test]
fn word_boundaries_find_every_word() {
    assert_eq!(
        find_all(r"\b\w+\b", "one two three"),
        vec![
            (0, "one".to_owned()),
            (4, "two".to_owned()),
            (8, "three".to_owned())
        ]
    );
}

#[test]
fn named_backreference_round_trip() {
    let subject = "42-42 42-43";
    let compiled = machine(r"(?<num>\d+)-\k<num>");
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new(subject);
    let result = matcher.find_next(&mut stream);
    let result = result.unwrap_or_default();
    assert_eq!(result.begin(), 0);
    assert_eq!(result.len(), 5);
    assert_eq!(text_of(subject, &result, 1), "42");
    // No further match: 42-43 does not round-trip.
    assert!(matcher.find_next(&mut stream).is_none());
}

#[test]
fn multiline_anchors_hit_line_boundaries() {
    // `a` ends the first line, `b` starts the second.
    let options = Options { multiline: true, ..Options::default() };
    assert_eq!(
        find_all_with("a$|^b", "xa\nby", options),
        vec![(1, "a".to_owned()), (3, "b".to_owned())]
    );
    assert_eq!(find_all("a$|^b", "xa\nby"), vec![]);
}

#[test]
fn conditional_picks_the_else_branch_before_the_group_matches() {
    let subject = "nox";
    let (begin, text, result) = find_first("(?(1)yes|no)(x)", subject).unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "nox"));
    assert_eq!(text_of(subject, &result, 1), "x");
}

#[test]
fn atomic_group_cannot_give_back() {
    assert!(find_first("(?>a+)ab", "aaab").is_none());
}

// ---- invariants ----

#[test]
fn greedy_and_lazy_duality() {
    let (_, text, _) = find_first("a*", "aaaa").unwrap_or_default();
    assert_eq!(text, "aaaa");
    let (_, text, _) = find_first("a*?", "aaaa").unwrap_or_default();
    assert_eq!(text, "");
}

#[test]
fn atomic_alternation_cutoff() {
    assert!(find_first("(?>a|ab)c", "abc").is_none());
}

#[test]
fn possessive_cutoff() {
    assert!(find_first("a++a", "aa").is_none());
}

#[test]
fn backreference_round_trip() {
    let subject = "abcabc";
    let (begin, text, result) = find_first(r"(.+)\1", subject).unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "abcabc"));
    assert_eq!(text_of(subject, &result, 1), "abc");
}

#[test]
fn scratch_is_cleared_on_both_exits() {
    let compiled = machine("a(b|c)+d");
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new("abcd");
    assert!(matcher.try_match(&mut stream, false).is_some());
    assert!(matcher.scratch_is_clear());
    let mut stream = StrStream::new("zzz");
    assert!(matcher.try_match(&mut stream, false).is_none());
    assert!(matcher.scratch_is_clear());
}

#[test]
fn matcher_is_reusable_across_calls() {
    let compiled = machine(r"(\w+)@(\w+)");
    let mut matcher = Matcher::new(&compiled);
    for subject in ["a@b", "longer@names", "a@b again"] {
        let mut stream = StrStream::new(subject);
        assert!(matcher.find_next(&mut stream).is_some(), "{subject}");
    }
}

#[test]
fn empty_matches_are_not_reported_twice() {
    // An empty match at a position is followed by a non-empty attempt or
    // by moving on.
    assert_eq!(
        find_all("a*", "ba"),
        vec![(0, String::new()), (1, "a".to_owned()), (2, String::new())]
    );
}

#[test]
fn find_all_callback_stops_iteration() {
    let compiled = machine(r"\w");
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new("abc");
    let mut count = 0;
    matcher.find_all(&mut stream, |_| {
        count += 1;
        count < 2
    });
    assert_eq!(count, 2);
}

// ---- constructs ----

#[test]
fn repetition_bounds_are_honored() {
    assert!(find_first("a{2,3}", "a").is_none());
    let (_, text, _) = find_first("a{2,3}", "aaaa").unwrap_or_default();
    assert_eq!(text, "aaa");
    let (_, text, _) = find_first("a{2,3}?", "aaaa").unwrap_or_default();
    assert_eq!(text, "aa");
    let (_, text, _) = find_first("a{2}", "aaaa").unwrap_or_default();
    assert_eq!(text, "aa");
}

#[test]
fn classes_and_negation() {
    assert_eq!(
        find_all("[^aeiou ]+", "the quick fox"),
        vec![
            (0, "th".to_owned()),
            (4, "q".to_owned()),
            (6, "ck".to_owned()),
            (10, "f".to_owned()),
            (12, "x".to_owned())
        ]
    );
}

#[test]
fn dot_skips_line_terminators_unless_dot_all() {
    assert_eq!(find_all("x.y", "x\ny xzy"), vec![(4, "xzy".to_owned())]);
    let options = Options { dot_all: true, ..Options::default() };
    assert_eq!(
        find_all_with("x.y", "x\ny", options),
        vec![(0, "x\ny".to_owned())]
    );
}

#[test]
fn lookahead_is_zero_width() {
    let subject = "foobar foobaz";
    assert_eq!(
        find_all("foo(?=bar)", subject),
        vec![(0, "foo".to_owned())]
    );
    assert_eq!(
        find_all("foo(?!bar)", subject),
        vec![(7, "foo".to_owned())]
    );
}

#[test]
fn lookahead_forwards_its_captures() {
    let subject = "ab";
    let (_, _, result) = find_first("a(?=(b))", subject).unwrap_or_default();
    assert_eq!(text_of(subject, &result, 1), "b");
}

#[test]
fn lookbehind_fixed_lengths() {
    assert_eq!(
        find_all("(?<=ab)c", "abc xbc"),
        vec![(2, "c".to_owned())]
    );
    assert_eq!(
        find_all("(?<!ab)c", "abc xbc"),
        vec![(6, "c".to_owned())]
    );
    // Alternatives of different fixed lengths.
    assert_eq!(
        find_all("(?<=a|xy)b", "ab xyb zb"),
        vec![(1, "b".to_owned()), (5, "b".to_owned())]
    );
}

#[test]
fn non_atomic_lookahead_is_zero_width() {
    let (begin, text, _) = find_first("(*napla:ab)a", "ab").unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "a"));
}

#[test]
fn match_start_override_moves_the_reported_begin() {
    let subject = "abcdef";
    let (begin, text, result) = find_first(r"abc\Kdef", subject).unwrap_or_default();
    assert_eq!((begin, text.as_str()), (3, "def"));
    // Capture 0 still spans the full pattern walk.
    assert_eq!(result.capture(0).map(|c| c.begin), Some(0));
}

#[test]
fn marks_are_recorded_on_the_winning_path() {
    let (_, _, result) = find_first("(*MARK:first)a|(*MARK:second)b", "b").unwrap_or_default();
    assert_eq!(result.mark(), Some("second"));
}

#[test]
fn accept_ends_the_match_early() {
    let (_, text, _) = find_first("ab(*ACCEPT)cd", "abxx").unwrap_or_default();
    assert_eq!(text, "ab");
}

#[test]
fn fail_verb_forces_the_other_branch() {
    let (_, text, _) = find_first("a(*FAIL)|b", "ab").unwrap_or_default();
    assert_eq!(text, "b");
}

#[test]
fn subroutine_call_consumes_input() {
    let subject = "4242";
    let (begin, text, result) = find_first(r"(\d\d)(?1)", subject).unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "4242"));
    // Captures made inside the call are restored on return.
    assert_eq!(text_of(subject, &result, 1), "42");
}

#[test]
fn named_subroutine_call() {
    let (_, text, _) = find_first(r"(?<d>\d)(?&d)", "42").unwrap_or_default();
    assert_eq!(text, "42");
}

#[test]
fn define_groups_are_only_reachable_by_call() {
    let (begin, text, _) =
        find_first(r"(?(DEFINE)(?<digit>[0-9]))(?&digit)(?&digit)", "a42").unwrap_or_default();
    assert_eq!((begin, text.as_str()), (1, "42"));
}

#[test]
fn whole_pattern_recursion_matches_nested_parens() {
    let pattern = r"\((?:[^()]|(?R))*\)";
    let (begin, text, _) = find_first(pattern, "(a(b)c) rest").unwrap_or_default();
    assert_eq!((begin, text.as_str()), (0, "(a(b)c)"));
    assert!(find_first(pattern, "(a(b").is_none());
}

#[test]
fn recursion_condition_distinguishes_call_depth() {
    // Outside any recursion the condition is false.
    let (_, text, _) = find_first(r"(?(R)x|y)", "y").unwrap_or_default();
    assert_eq!(text, "y");
}

#[test]
fn duplicate_numbered_alternatives_share_the_index() {
    let subject = "b!";
    let (_, _, result) = find_first(r"(?|(a)|(b))!", subject).unwrap_or_default();
    assert_eq!(text_of(subject, &result, 1), "b");
}

#[test]
fn conditional_with_named_condition() {
    let subject = "ab";
    let (_, text, _) = find_first(r"(?<x>a)?(?(<x>)b|c)", subject).unwrap_or_default();
    assert_eq!(text, "ab");
    let (_, text, _) = find_first(r"(?<x>a)?(?(<x>)b|c)", "c").unwrap_or_default();
    assert_eq!(text, "c");
}

#[test]
fn backreference_to_unmatched_group_fails() {
    assert!(find_first(r"(a)?\1b", "b").is_none());
    let (_, text, _) = find_first(r"(a)?\1b", "aab").unwrap_or_default();
    assert_eq!(text, "aab");
}

#[test]
fn case_insensitive_backreference() {
    let options = Options { case_insensitive: true, ..Options::default() };
    assert_eq!(
        find_all_with(r"(\w+) \1", "Hello hELLO", options),
        vec![(0, "Hello hELLO".to_owned())]
    );
}

#[test]
fn case_insensitive_class_matches_both_cases() {
    let options = Options { case_insensitive: true, ..Options::default() };
    assert_eq!(
        find_all_with("[a-f]+", "aF Gz", options),
        vec![(0, "aF".to_owned())]
    );
}

#[test]
fn unicode_literals_and_word_classes() {
    assert_eq!(
        find_all(r"\w+", "caffè 漢字"),
        vec![(0, "caffè".to_owned()), (6, "漢字".to_owned())]
    );
}

#[test]
fn subject_end_anchors() {
    assert_eq!(find_all(r"abc\Z", "abc\n"), vec![(0, "abc".to_owned())]);
    assert_eq!(find_all(r"abc\z", "abc\n"), vec![]);
    assert_eq!(find_all(r"abc\z", "abc"), vec![(0, "abc".to_owned())]);
}

#[test]
fn crlf_counts_as_one_line_ending() {
    let options = Options { multiline: true, ..Options::default() };
    // `$` must not match between CR and LF.
    let compiled = machine_with("a$", options);
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new("a\r\nb");
    let result = matcher.find_next(&mut stream);
    assert_eq!(result.map(|r| (r.begin(), r.len())), Some((0, 1)));

    let compiled = machine_with("^b", options);
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new("a\r\nb");
    let result = matcher.find_next(&mut stream);
    assert_eq!(result.map(|r| r.begin()), Some(3));
}

#[test]
fn iteration_cap_aborts_catastrophic_backtracking() {
    let compiled = machine("(a+)+b");
    let config = MatcherConfig { max_iterations: 10_000 };
    let mut matcher = Matcher::with_config(&compiled, config);
    let subject = "a".repeat(40);
    let mut stream = StrStream::new(&subject);
    assert!(matcher.try_match(&mut stream, false).is_none());
    assert!(matcher.hit_iteration_cap());
    assert!(matcher.scratch_is_clear());
}

#[test]
fn machines_are_shareable_between_matchers() {
    let compiled = machine("ab+");
    let mut first = Matcher::new(&compiled);
    let mut second = Matcher::new(&compiled);
    let mut s1 = StrStream::new("abb");
    let mut s2 = StrStream::new("xab");
    assert!(first.find_next(&mut s1).is_some());
    assert!(second.find_next(&mut s2).is_some());
}

#[test]
fn shorthand_whitespace_classes() {
    assert_eq!(
        find_all(r"\h+", "a\t b\u{00A0}c"),
        vec![(1, "\t ".to_owned()), (4, "\u{00A0}".to_owned())]
    );
    assert_eq!(
        find_all(r"\v", "a\nb\u{2028}c"),
        vec![(1, "\n".to_owned()), (3, "\u{2028}".to_owned())]
    );
    assert_eq!(find_all(r"\S+", " ab c"), vec![(1, "ab".to_owned()), (4, "c".to_owned())]);
}

#[test]
fn non_newline_escape() {
    assert_eq!(
        find_all(r"a\Nb", "a\nb axb"),
        vec![(4, "axb".to_owned())]
    );
}

#[test]
fn range_start_anchor_pins_the_attempt_position() {
    // Without a match at the very start, `\G..` can still match where the
    // attempt began after sliding.
    let compiled = machine(r"\Gab");
    let mut matcher = Matcher::new(&compiled);
    let mut stream = StrStream::new("ab");
    assert!(matcher.try_match(&mut stream, false).is_some());
}

#[test]
fn conditional_on_a_lookahead() {
    // Chooses the branch by peeking, without consuming.
    let pattern = "(?(?=[0-9])[0-9]+|[a-z]+)";
    assert_eq!(find_all(pattern, "abc 123"), vec![(0, "abc".to_owned()), (4, "123".to_owned())]);
}

#[test]
fn lazy_plus_stops_at_the_first_viable_end() {
    let (_, text, _) = find_first("<.+?>", "<a><b>").unwrap_or_default();
    assert_eq!(text, "<a>");
    let (_, text, _) = find_first("<.+>", "<a><b>").unwrap_or_default();
    assert_eq!(text, "<a><b>");
}

#[test]
fn anchored_alternation_under_find() {
    // `^` fails at every later offset, so sliding never reports a match.
    assert_eq!(find_all("^x", "ax"), vec![]);
    assert_eq!(find_all(r"\Ax", "ax"), vec![]);
}

#[test]
fn matching_is_stream_generic() {
    use retrace_stream::BufferStream;
    let compiled = machine(r"(\w+)=(\d+)");
    let mut matcher = Matcher::new(&compiled);
    let mut stream = BufferStream::from_str("limit=250;");
    let result = matcher.find_next(&mut stream);
    assert_eq!(result.map(|r| (r.begin(), r.len())), Some((0, 9)));
    assert_eq!(stream.position(), 9);
}

#[test]
fn stable_across_repeated_runs() {
    let compiled = machine(r"[a-z]+(\d*)");
    for _ in 0..3 {
        let mut matcher = Matcher::new(&compiled);
        let mut stream = StrStream::new("abc123");
        let result = matcher.find_next(&mut stream);
        assert_eq!(result.map(|r| (r.begin(), r.len())), Some((0, 6)));
    }
}
