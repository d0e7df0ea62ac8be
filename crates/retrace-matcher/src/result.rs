//! Match results

/// A captured span, in codepoint positions of the subject stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// Codepoint index of the first captured codepoint.
    pub begin: usize,
    /// Number of captured codepoints.
    pub length: usize,
}

impl Capture {
    /// Codepoint index one past the captured span.
    pub fn end(&self) -> usize {
        self.begin + self.length
    }
}

/// The outcome of a successful match attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Captured groups; index 0 is the whole match. `None` marks a group
    /// that did not participate.
    pub captures: Vec<Option<Capture>>,
    /// Match start reset by `\K`, when one was crossed.
    pub overridden_start: Option<usize>,
    /// `(*MARK)` labels recorded on the successful path, oldest first.
    pub marks: Vec<String>,
}

impl MatchResult {
    /// The whole-match span.
    pub fn whole(&self) -> Capture {
        self.captures.first().copied().flatten().unwrap_or(Capture { begin: 0, length: 0 })
    }

    /// Codepoint index where the reported match begins, honoring `\K`.
    pub fn begin(&self) -> usize {
        self.overridden_start.unwrap_or_else(|| self.whole().begin)
    }

    /// Codepoint index one past the match end.
    pub fn end(&self) -> usize {
        self.whole().end()
    }

    /// Number of codepoints in the reported match.
    pub fn len(&self) -> usize {
        self.end().saturating_sub(self.begin())
    }

    /// Whether the reported match is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The capture of group `index`, if it participated.
    pub fn capture(&self, index: usize) -> Option<Capture> {
        self.captures.get(index).copied().flatten()
    }

    /// The most recent `(*MARK)` label, the one engines expose.
    pub fn mark(&self) -> Option<&str> {
        self.marks.last().map(String::as_str)
    }
}

/// Resource limits for one match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Upper bound on engine iterations per `try_match`; exceeding it
    /// aborts the attempt with no match.
    pub max_iterations: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig { max_iterations: 1_000_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_span_honors_the_override() {
        let result = MatchResult {
            captures: vec![Some(Capture { begin: 2, length: 5 })],
            overridden_start: Some(4),
            marks: vec![],
        };
        assert_eq!(result.begin(), 4);
        assert_eq!(result.end(), 7);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn last_mark_wins() {
        let result = MatchResult {
            captures: vec![Some(Capture { begin: 0, length: 1 })],
            overridden_start: None,
            marks: vec!["a".into(), "b".into()],
        };
        assert_eq!(result.mark(), Some("b"));
    }
}
