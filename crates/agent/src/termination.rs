//! Decides when a task is over.

/// The verdict for the latest assistant text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The sentinel appeared.
    Done,
    /// Budget left; keep going.
    Continue,
    /// The budget is spent without the sentinel.
    Exhausted,
}

/// Sentinel match plus an iteration budget. Holds no per-task state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationDetector {
    sentinel: Option<String>,
    max_iterations: u32,
}

impl TerminationDetector {
    pub fn new(sentinel: Option<String>, max_iterations: u32) -> Self {
        Self {
            sentinel: sentinel.filter(|s| !s.is_empty()),
            max_iterations,
        }
    }

    pub fn sentinel(&self) -> Option<&str> {
        self.sentinel.as_deref()
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Exact, case-sensitive substring match.
    pub fn is_finished(&self, text: &str) -> bool {
        self.sentinel.as_deref().is_some_and(|s| text.contains(s))
    }

    /// Whether `iterations` completed requests leave room for one more.
    pub fn budget_left(&self, iterations: u32) -> bool {
        iterations < self.max_iterations
    }

    /// Judge `text` after `iterations` completion requests.
    pub fn evaluate(&self, text: &str, iterations: u32) -> Verdict {
        if self.is_finished(text) {
            Verdict::Done
        } else if self.budget_left(iterations) {
            Verdict::Continue
        } else {
            Verdict::Exhausted
        }
    }
}

impl Default for TerminationDetector {
    fn default() -> Self {
        Self::new(Some("[FINISHED]".into()), 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_substring_match() {
        let d = TerminationDetector::default();
        assert!(d.is_finished("[FINISHED]"));
        assert!(d.is_finished("The answer is 42. [FINISHED] and some trailing text"));
        assert!(!d.is_finished("[finished]"));
        assert!(!d.is_finished("[ FINISHED ]"));
        assert!(!d.is_finished("FINISHED"));
    }

    #[test]
    fn sentinel_wins_over_spent_budget() {
        let d = TerminationDetector::new(Some("[DONE]".into()), 3);
        assert_eq!(d.evaluate("ok [DONE]", 3), Verdict::Done);
        assert_eq!(d.evaluate("ok", 2), Verdict::Continue);
        assert_eq!(d.evaluate("ok", 3), Verdict::Exhausted);
    }

    #[test]
    fn no_sentinel_never_finishes() {
        let d = TerminationDetector::new(None, 2);
        assert!(!d.is_finished("[FINISHED]"));
        assert_eq!(d.evaluate("anything", 1), Verdict::Continue);
        assert_eq!(d.evaluate("anything", 2), Verdict::Exhausted);
    }

    #[test]
    fn empty_sentinel_is_disabled() {
        let d = TerminationDetector::new(Some(String::new()), 2);
        assert_eq!(d.sentinel(), None);
        assert!(!d.is_finished("text"));
    }
}
