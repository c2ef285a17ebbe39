//! Yes/no interpretation of transcribed speech
//!
//! Keyword matching decides most answers; an optional semantic classifier
//! gets a say only when no keyword matched.

mod classifier;
mod keywords;
mod lexicon;

pub use classifier::{ConfirmationClassifier, SemanticClassifier, Verdict};
pub use keywords::{normalize, KeywordSet};
pub use lexicon::PhraseLexicon;
