//! Per-language retry budgets.

use crate::contracts::Language;

/// Attempts allowed per slot.
static RETRY_BUDGETS: [(Language, usize); 4] = [
    (Language::Java, 5),
    (Language::Python, 3),
    (Language::Cpp, 5),
    (Language::Sql, 3),
];

/// Attempt budget for one slot of `language` (always at least 1).
pub fn max_attempts(language: Language) -> usize {
    RETRY_BUDGETS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, budget)| *budget)
        .unwrap_or(3)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budgets() {
        assert_eq!(max_attempts(Language::Java), 5);
        assert_eq!(max_attempts(Language::Cpp), 5);
        assert_eq!(max_attempts(Language::Python), 3);
        assert_eq!(max_attempts(Language::Sql), 3);
    }

    #[test]
    fn test_every_language_has_a_budget() {
        for language in Language::ALL {
            assert!(RETRY_BUDGETS.iter().any(|(l, _)| *l == language));
        }
    }
}
