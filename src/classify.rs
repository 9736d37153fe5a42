use thiserror::Error;

use crate::error::LabAssistError;

/// Shown instead of the raw error whenever the service reports quota exhaustion.
pub const QUOTA_MESSAGE: &str = "API quota exceeded. Please check your billing or try again later.";

/// A failure after classification: the text to show the user, and whether it
/// was a quota/rate-limit failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ClassifiedFailure {
    pub message: String,
    pub quota_exhausted: bool,
}

/// True when an error message carries the rate/quota signature.
/// Matching is case-sensitive, as produced by the transport.
pub fn is_quota_signature(message: &str) -> bool {
    message.contains("429") || message.contains("quota")
}

pub fn classify_message(message: &str) -> ClassifiedFailure {
    if is_quota_signature(message) {
        ClassifiedFailure {
            message: QUOTA_MESSAGE.to_string(),
            quota_exhausted: true,
        }
    } else {
        ClassifiedFailure {
            message: message.to_string(),
            quota_exhausted: false,
        }
    }
}

pub fn classify(error: &LabAssistError) -> ClassifiedFailure {
    classify_message(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_signatures() {
        assert!(is_quota_signature("Gemini API error (429 Too Many Requests): slow down"));
        assert!(is_quota_signature("You exceeded your current quota"));
        assert!(!is_quota_signature("Quota")); // case as produced by the transport
        assert!(!is_quota_signature("Gemini API error (500 Internal Server Error): boom"));
    }

    #[test]
    fn test_classify_substitutes_quota_message() {
        let failure = classify(&LabAssistError::Transport(
            "RESOURCE_EXHAUSTED (429): quota".to_string(),
        ));
        assert!(failure.quota_exhausted);
        assert_eq!(failure.message, QUOTA_MESSAGE);
        assert_eq!(failure.to_string(), QUOTA_MESSAGE);
    }

    #[test]
    fn test_classify_passes_other_messages_through() {
        let failure = classify(&LabAssistError::Transport("connection reset".to_string()));
        assert!(!failure.quota_exhausted);
        assert_eq!(failure.message, "connection reset");

        let failure = classify_message("Invalid AI response: failed to parse trends");
        assert_eq!(failure.message, "Invalid AI response: failed to parse trends");
    }
}
