//! Built-in semantic fallback
//!
//! Broader phrase lists than the confirmation keywords, plus negation
//! handling ("not really", "I don't think so"). Used when no external
//! semantic parser is available.

use super::classifier::{SemanticClassifier, Verdict};
use super::keywords::{normalize, KeywordSet};

const AGREEMENT: &[&str] = &[
    "absolutely",
    "definitely",
    "of course",
    "certainly",
    "affirmative",
    "that's me",
    "that's right",
    "do it",
    "please do",
    "i am",
    "i'm sure",
    "uh huh",
];

const REFUSAL: &[&str] = &[
    "never",
    "negative",
    "rather not",
    "not really",
    "no way",
    "forget it",
    "never mind",
    "leave it",
    "that's not me",
];

const NEGATIONS: &[&str] = &["not", "don't", "never", "isn't", "can't", "won't"];

/// Phrase-based [`SemanticClassifier`]
#[derive(Debug, Clone)]
pub struct PhraseLexicon {
    agreement: KeywordSet,
    refusal: KeywordSet,
    negations: KeywordSet,
}

impl PhraseLexicon {
    pub fn new() -> Self {
        Self {
            agreement: KeywordSet::new(AGREEMENT),
            refusal: KeywordSet::new(REFUSAL),
            negations: KeywordSet::new(NEGATIONS),
        }
    }

    fn interpret(&self, text: &str) -> Verdict {
        let words = normalize(text);

        // Refusal phrases win: most of them contain a negation themselves.
        if self.refusal.matches(&words) {
            return Verdict::Negative;
        }

        let agrees = self.agreement.matches(&words);
        let negated = self.negations.matches(&words);

        match (agrees, negated) {
            (true, false) => Verdict::Affirmative,
            (true, true) => Verdict::Negative,
            (false, true) if words.len() <= 4 => Verdict::Negative,
            _ => Verdict::Ambiguous,
        }
    }
}

impl Default for PhraseLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticClassifier for PhraseLexicon {
    fn classify(&self, text: &str) -> anyhow::Result<Verdict> {
        Ok(self.interpret(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement() {
        let lexicon = PhraseLexicon::new();
        assert_eq!(lexicon.interpret("Absolutely!"), Verdict::Affirmative);
        assert_eq!(lexicon.interpret("of course it is"), Verdict::Affirmative);
    }

    #[test]
    fn test_refusal() {
        let lexicon = PhraseLexicon::new();
        assert_eq!(lexicon.interpret("I'd rather not"), Verdict::Negative);
        assert_eq!(lexicon.interpret("never mind"), Verdict::Negative);
    }

    #[test]
    fn test_negated_agreement() {
        let lexicon = PhraseLexicon::new();
        assert_eq!(lexicon.interpret("definitely not"), Verdict::Negative);
        assert_eq!(lexicon.interpret("I don't think so"), Verdict::Negative);
    }

    #[test]
    fn test_unrelated_is_ambiguous() {
        let lexicon = PhraseLexicon::new();
        assert_eq!(lexicon.interpret("what's the weather"), Verdict::Ambiguous);
        assert_eq!(
            lexicon.interpret("hmm I'm not entirely sure what you are asking me"),
            Verdict::Ambiguous
        );
    }
}
