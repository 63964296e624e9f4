use std::fmt;

type Rule<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Ordered list of "never retry if the error matches" rules, consulted before
/// an error is handed to the backoff loop.
pub struct RetryPolicy<E> {
    rules: Vec<(&'static str, Rule<E>)>,
}

impl<E> RetryPolicy<E> {
    /// Creates a policy that retries every error.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule; errors it matches are never retried.
    pub fn never_retry_if<F>(mut self, name: &'static str, matches: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.rules.push((name, Box::new(matches)));
        self
    }

    /// Name of the first rule matching `err`, if any.
    pub fn matching_rule(&self, err: &E) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|(_, matches)| matches(err))
            .map(|(name, _)| *name)
    }

    pub fn should_retry(&self, err: &E) -> bool {
        self.matching_rule(err).is_none()
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.rules.iter().map(|(name, _)| *name).collect();
        f.debug_struct("RetryPolicy").field("rules", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_rule_wins() {
        let policy: RetryPolicy<u32> = RetryPolicy::new()
            .never_retry_if("even", |n| n % 2 == 0)
            .never_retry_if("big", |n| *n > 100);

        assert_eq!(policy.matching_rule(&4), Some("even"));
        assert_eq!(policy.matching_rule(&102), Some("even"));
        assert_eq!(policy.matching_rule(&101), Some("big"));
        assert_eq!(policy.matching_rule(&3), None);
        assert!(policy.should_retry(&3));
        assert!(!policy.should_retry(&8));
    }

    #[test]
    fn test_empty_policy_retries_everything() {
        let policy: RetryPolicy<&str> = RetryPolicy::default();
        assert!(policy.should_retry(&"anything"));
    }
}
