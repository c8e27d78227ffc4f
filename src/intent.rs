//! Canned-intent matching that runs before the LLM.
//!
//! An ordered list of phrase rules; the first rule with a phrase contained in
//! the (case-folded) message wins. When a rule matches, the LLM call is
//! skipped entirely and a templated reply is sent instead.

/// What a message is asking, as far as canned replies are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// "Who are you?"
    Identity,
    /// "What's your name?"
    Name,
    /// Anything else; goes to the LLM.
    None,
}

/// Identity-query phrases.
pub const IDENTITY_PHRASES: &[&str] = &[
    "من أنت",
    "من هو",
    "من انت",
    "من انت؟",
    "من أنت؟",
    "من هو؟",
    "من انتي",
    "من انتي؟",
];

/// Name-query phrases.
pub const NAME_PHRASES: &[&str] = &[
    "اسمك",
    "اسمك؟",
    "ما اسمك",
    "ما اسمك؟",
    "شو اسمك",
    "شو اسمك؟",
    "اسمك ايه",
    "اسمك ايه؟",
];

/// A single phrase rule. Phrases are stored case-folded.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    phrases: Vec<String>,
}

impl IntentRule {
    pub fn new(intent: Intent, phrases: &[&str]) -> Self {
        Self {
            intent,
            phrases: phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn matches(&self, folded: &str) -> bool {
        self.phrases.iter().any(|p| folded.contains(p.as_str()))
    }
}

/// Ordered phrase-rule classifier.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl IntentClassifier {
    /// Build a classifier from rules; earlier rules take priority.
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// The bot's built-in rules: identity first, then name.
    pub fn default_rules() -> Self {
        Self::new(vec![
            IntentRule::new(Intent::Identity, IDENTITY_PHRASES),
            IntentRule::new(Intent::Name, NAME_PHRASES),
        ])
    }

    /// Classify a message.
    pub fn classify(&self, text: &str) -> Intent {
        let folded = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&folded))
            .map(|rule| rule.intent)
            .unwrap_or(Intent::None)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_question() {
        let c = IntentClassifier::default();
        assert_eq!(c.classify("من أنت؟"), Intent::Identity);
        assert_eq!(c.classify("من انتي"), Intent::Identity);
    }

    #[test]
    fn name_question() {
        let c = IntentClassifier::default();
        assert_eq!(c.classify("اسمك ايه؟"), Intent::Name);
        assert_eq!(c.classify("شو اسمك"), Intent::Name);
    }

    #[test]
    fn identity_wins_over_name() {
        let c = IntentClassifier::default();
        assert_eq!(c.classify("ما اسمك؟ ومن أنت؟"), Intent::Identity);
        assert_eq!(c.classify("اسمك ... من هو"), Intent::Identity);
    }

    #[test]
    fn matches_anywhere_in_longer_text() {
        let c = IntentClassifier::default();
        assert_eq!(
            c.classify("مرحبا يا صديقي، من أنت بالضبط؟ أريد أن أعرف"),
            Intent::Identity
        );
        assert_eq!(c.classify("hey! اسمك please"), Intent::Name);
    }

    #[test]
    fn unrelated_text_is_none() {
        let c = IntentClassifier::default();
        assert_eq!(c.classify("what is the capital of France?"), Intent::None);
        assert_eq!(c.classify("كيف حالك"), Intent::None);
        assert_eq!(c.classify(""), Intent::None);
    }

    #[test]
    fn classification_is_idempotent() {
        let c = IntentClassifier::default();
        for text in ["من أنت", "اسمك", "hello", "ما اسمك؟ من هو؟"] {
            assert_eq!(c.classify(text), c.classify(text));
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let c = IntentClassifier::new(vec![IntentRule::new(Intent::Identity, &["Who Are You"])]);
        assert_eq!(c.classify("so WHO ARE YOU anyway"), Intent::Identity);
        assert_eq!(c.classify("who are we"), Intent::None);
    }

    #[test]
    fn empty_rule_list_never_matches() {
        let c = IntentClassifier::new(vec![]);
        assert_eq!(c.classify("من أنت"), Intent::None);
    }
}
