//! Job status state machine.
//!
//! Forward order: PARSING → QUEUED → (EXTRACTING | ANALYZING) → THINKING → MATCHED.
//! FAILED is reachable from any non-terminal state. MATCHED and FAILED are terminal.
//!
//! The enum is the canonical representation everywhere in the pipeline; the
//! string labels exist only for Redis/Postgres/JSON serialization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Parsing,
    Queued,
    Extracting,
    Analyzing,
    Thinking,
    Matched,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Parsing => "parsing",
            JobStatus::Queued => "queued",
            JobStatus::Extracting => "extracting",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Thinking => "thinking",
            JobStatus::Matched => "matched",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(label: &str) -> Option<JobStatus> {
        match label {
            "parsing" => Some(JobStatus::Parsing),
            "queued" => Some(JobStatus::Queued),
            "extracting" => Some(JobStatus::Extracting),
            "analyzing" => Some(JobStatus::Analyzing),
            "thinking" => Some(JobStatus::Thinking),
            "matched" => Some(JobStatus::Matched),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states are never re-entered; a duplicate webhook delivery for
    /// a terminal job short-circuits to a no-op.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Matched | JobStatus::Failed)
    }

    /// Position in the forward partial order. EXTRACTING and ANALYZING are the
    /// same stage (link vs inline JD), so they share a rank. FAILED has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            JobStatus::Parsing => Some(0),
            JobStatus::Queued => Some(1),
            JobStatus::Extracting | JobStatus::Analyzing => Some(2),
            JobStatus::Thinking => Some(3),
            JobStatus::Matched => Some(4),
            JobStatus::Failed => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for status in [
            JobStatus::Parsing,
            JobStatus::Queued,
            JobStatus::Extracting,
            JobStatus::Analyzing,
            JobStatus::Thinking,
            JobStatus::Matched,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_unknown_label_is_none() {
        assert_eq!(JobStatus::parse("processing"), None);
        assert_eq!(JobStatus::parse(""), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Matched.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Thinking.is_terminal());
        assert!(!JobStatus::Parsing.is_terminal());
    }

    #[test]
    fn test_forward_order_is_monotonic() {
        let forward = [
            JobStatus::Parsing,
            JobStatus::Queued,
            JobStatus::Extracting,
            JobStatus::Thinking,
            JobStatus::Matched,
        ];
        for pair in forward.windows(2) {
            assert!(pair[0].rank().unwrap() < pair[1].rank().unwrap());
        }
    }

    #[test]
    fn test_extracting_and_analyzing_share_rank() {
        assert_eq!(JobStatus::Extracting.rank(), JobStatus::Analyzing.rank());
    }

    #[test]
    fn test_failed_has_no_rank() {
        assert_eq!(JobStatus::Failed.rank(), None);
    }

    #[test]
    fn test_serde_uses_lowercase_labels() {
        let json = serde_json::to_string(&JobStatus::Thinking).unwrap();
        assert_eq!(json, r#""thinking""#);
        let status: JobStatus = serde_json::from_str(r#""matched""#).unwrap();
        assert_eq!(status, JobStatus::Matched);
    }
}
