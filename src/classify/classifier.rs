//! Tri-state confirmation classifier

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::keywords::{normalize, KeywordSet};
use crate::config::Config;

/// Outcome of interpreting a spoken answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Affirmative,
    Negative,
    Ambiguous,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Affirmative => write!(f, "affirmative"),
            Verdict::Negative => write!(f, "negative"),
            Verdict::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Secondary interpreter consulted when no keyword matches
///
/// Errors are never propagated: the classifier turns them into
/// [`Verdict::Ambiguous`].
pub trait SemanticClassifier: Send + Sync {
    fn classify(&self, text: &str) -> anyhow::Result<Verdict>;
}

/// Maps a transcript to a [`Verdict`]
#[derive(Clone)]
pub struct ConfirmationClassifier {
    affirmative: KeywordSet,
    negative: KeywordSet,
    fallback: Option<Arc<dyn SemanticClassifier>>,
    fallback_timeout: Duration,
}

impl ConfirmationClassifier {
    /// Create a keyword-only classifier
    pub fn new(affirmative: KeywordSet, negative: KeywordSet) -> Self {
        Self {
            affirmative,
            negative,
            fallback: None,
            fallback_timeout: Duration::from_secs(2),
        }
    }

    /// Create a keyword-only classifier from the configured word lists
    pub fn from_config(config: &Config) -> Self {
        let mut classifier = Self::new(
            KeywordSet::new(&config.affirmative),
            KeywordSet::new(&config.negative),
        );
        classifier.fallback_timeout = config.semantic_timeout();
        classifier
    }

    /// Attach a semantic classifier for transcripts with no keyword match
    pub fn with_fallback(mut self, fallback: Arc<dyn SemanticClassifier>, timeout: Duration) -> Self {
        self.fallback = Some(fallback);
        self.fallback_timeout = timeout;
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Classify a transcript
    pub fn classify(&self, text: &str) -> Verdict {
        let words = normalize(text);
        if words.is_empty() {
            return Verdict::Ambiguous;
        }

        let yes = self.affirmative.matches(&words);
        let no = self.negative.matches(&words);

        let verdict = match (yes, no) {
            (true, false) => Verdict::Affirmative,
            (false, true) => Verdict::Negative,
            (true, true) => Verdict::Ambiguous,
            (false, false) => match &self.fallback {
                Some(fallback) => self.ask_fallback(Arc::clone(fallback), text),
                None => Verdict::Ambiguous,
            },
        };

        debug!(text, %verdict, "classified transcript");
        verdict
    }

    /// Run the semantic classifier on a helper thread so a hung backend
    /// cannot stall the dialogue past `fallback_timeout`.
    fn ask_fallback(&self, fallback: Arc<dyn SemanticClassifier>, text: &str) -> Verdict {
        let (tx, rx) = mpsc::channel();
        let owned = text.to_string();

        let spawned = thread::Builder::new()
            .name("semantic-classifier".to_string())
            .spawn(move || {
                let _ = tx.send(fallback.classify(&owned));
            });

        if let Err(e) = spawned {
            warn!(?e, "failed to spawn semantic classifier thread");
            return Verdict::Ambiguous;
        }

        match rx.recv_timeout(self.fallback_timeout) {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!(error = %e, "semantic classifier failed");
                Verdict::Ambiguous
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.fallback_timeout.as_millis() as u64,
                    "semantic classifier timed out"
                );
                Verdict::Ambiguous
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("semantic classifier thread exited without a verdict");
                Verdict::Ambiguous
            }
        }
    }
}

impl std::fmt::Debug for ConfirmationClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationClassifier")
            .field("affirmative", &self.affirmative)
            .field("negative", &self.negative)
            .field("fallback", &self.fallback.is_some())
            .field("fallback_timeout", &self.fallback_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keyword_classifier() -> ConfirmationClassifier {
        ConfirmationClassifier::from_config(&Config::with_data_dir("/tmp/voice-steward"))
    }

    struct Fixed(Verdict, AtomicUsize);

    impl SemanticClassifier for Fixed {
        fn classify(&self, _text: &str) -> anyhow::Result<Verdict> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0)
        }
    }

    struct Broken;

    impl SemanticClassifier for Broken {
        fn classify(&self, _text: &str) -> anyhow::Result<Verdict> {
            anyhow::bail!("model not loaded")
        }
    }

    struct Slow;

    impl SemanticClassifier for Slow {
        fn classify(&self, _text: &str) -> anyhow::Result<Verdict> {
            thread::sleep(Duration::from_millis(500));
            Ok(Verdict::Affirmative)
        }
    }

    #[test]
    fn test_fixed_table() {
        let classifier = keyword_classifier();
        let table = [
            ("yes", Verdict::Affirmative),
            ("yeah", Verdict::Affirmative),
            ("sure", Verdict::Affirmative),
            ("no", Verdict::Negative),
            ("nope", Verdict::Negative),
            ("cancel", Verdict::Negative),
            ("maybe", Verdict::Ambiguous),
            ("", Verdict::Ambiguous),
        ];
        for (text, expected) in table {
            assert_eq!(classifier.classify(text), expected, "transcript {text:?}");
        }
    }

    #[test]
    fn test_negated_agreement_never_confirms() {
        let classifier = keyword_classifier();
        assert_eq!(classifier.classify("that's not right"), Verdict::Ambiguous);

        let classifier = keyword_classifier()
            .with_fallback(Arc::new(crate::classify::PhraseLexicon::new()), Duration::from_secs(1));
        assert_eq!(classifier.classify("that's not right"), Verdict::Negative);
    }

    #[test]
    fn test_normalizes_case_and_punctuation() {
        let classifier = keyword_classifier();
        assert_eq!(classifier.classify("  YES!  "), Verdict::Affirmative);
        assert_eq!(classifier.classify("Go ahead."), Verdict::Affirmative);
        assert_eq!(classifier.classify("No, that's wrong"), Verdict::Negative);
    }

    #[test]
    fn test_both_sets_is_ambiguous() {
        let classifier = keyword_classifier();
        assert_eq!(classifier.classify("yes no"), Verdict::Ambiguous);
    }

    #[test]
    fn test_fallback_only_when_unmatched() {
        let fallback = Arc::new(Fixed(Verdict::Negative, AtomicUsize::new(0)));
        let classifier = keyword_classifier()
            .with_fallback(fallback.clone(), Duration::from_secs(1));

        assert_eq!(classifier.classify("yes"), Verdict::Affirmative);
        assert_eq!(fallback.1.load(Ordering::SeqCst), 0);

        assert_eq!(classifier.classify("I'd rather not"), Verdict::Negative);
        assert_eq!(fallback.1.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_error_is_ambiguous() {
        let classifier =
            keyword_classifier().with_fallback(Arc::new(Broken), Duration::from_secs(1));
        assert_eq!(classifier.classify("perhaps"), Verdict::Ambiguous);
    }

    #[test]
    fn test_fallback_timeout_is_ambiguous() {
        let classifier =
            keyword_classifier().with_fallback(Arc::new(Slow), Duration::from_millis(50));
        assert_eq!(classifier.classify("absolutely"), Verdict::Ambiguous);
    }

    #[test]
    fn test_empty_skips_fallback() {
        let fallback = Arc::new(Fixed(Verdict::Affirmative, AtomicUsize::new(0)));
        let classifier = keyword_classifier()
            .with_fallback(fallback.clone(), Duration::from_secs(1));
        assert_eq!(classifier.classify("   "), Verdict::Ambiguous);
        assert_eq!(fallback.1.load(Ordering::SeqCst), 0);
    }
}
