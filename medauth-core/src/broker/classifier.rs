//! Reply classification: turn an inbound message body into a decision

use crate::models::Decision;

/// Classification of one inbound message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Confirm,
    Cancel,
    Irrelevant,
}

impl Classification {
    pub fn decision(self) -> Option<Decision> {
        match self {
            Classification::Confirm => Some(Decision::Confirm),
            Classification::Cancel => Some(Decision::Cancel),
            Classification::Irrelevant => None,
        }
    }
}

/// Strategy deciding what a reply means, independent of how it arrived.
pub trait ReplyClassifier: Send + Sync {
    fn classify(&self, body: &str) -> Classification;
}

/// Case-insensitive substring match on a confirm and a cancel keyword.
/// A body containing both keywords, or neither, is irrelevant.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    confirm: String,
    cancel: String,
}

impl KeywordClassifier {
    pub fn new(confirm: &str, cancel: &str) -> Self {
        Self {
            confirm: confirm.to_lowercase(),
            cancel: cancel.to_lowercase(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new("confirm", "cancel")
    }
}

impl ReplyClassifier for KeywordClassifier {
    fn classify(&self, body: &str) -> Classification {
        let text = body.to_lowercase();
        match (text.contains(&self.confirm), text.contains(&self.cancel)) {
            (true, false) => Classification::Confirm,
            (false, true) => Classification::Cancel,
            _ => Classification::Irrelevant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_classification() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("Confirm"), Classification::Confirm);
        assert_eq!(
            classifier.classify("yes I CONFIRMED it"),
            Classification::Confirm
        );
        assert_eq!(classifier.classify("cancel please"), Classification::Cancel);
        assert_eq!(classifier.classify("who is this?"), Classification::Irrelevant);
        assert_eq!(classifier.classify(""), Classification::Irrelevant);
    }

    #[test]
    fn test_both_keywords_are_ambiguous() {
        let classifier = KeywordClassifier::default();
        assert_eq!(
            classifier.classify("confirm? no, cancel"),
            Classification::Irrelevant
        );
    }

    #[test]
    fn test_custom_keywords() {
        let classifier = KeywordClassifier::new("SI", "NO");
        assert_eq!(classifier.classify("si"), Classification::Confirm);
        assert_eq!(classifier.classify("no"), Classification::Cancel);
        assert_eq!(Classification::Cancel.decision(), Some(Decision::Cancel));
        assert_eq!(Classification::Irrelevant.decision(), None);
    }
}
