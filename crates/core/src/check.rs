use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One tracked reference to a government fiscal receipt. The id is the
/// registry-assigned identifier extracted from the receipt URL's `id`
/// query parameter; the registry issues it globally, not per owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptCheck {
    pub id: String,
    pub owner_id: i64,
    pub source_url: String,
    /// Raw XML was retrieved and stored.
    pub founded: bool,
    /// The raw XML was decoded into a normalized summary.
    pub saved: bool,
    /// A retrieval attempt was started and has not reached a terminal state.
    pub finding: bool,
    /// Last fetch/parse failure, if any. Cleared on the next attempt.
    pub error: Option<String>,
    pub xml_text: Option<String>,
    /// Normalized summary as JSON, present once `saved`.
    pub summary_json: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Lifecycle flags as reported to clients polling a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub exists: bool,
    pub founded: bool,
    pub saved: bool,
    pub finding: bool,
}

impl CheckStatus {
    pub fn missing() -> Self {
        CheckStatus { exists: false, founded: false, saved: false, finding: false }
    }

    /// Combine stored flags. A stale `finding` marker left over from an old
    /// attempt must never shadow a record that has since been founded.
    pub fn from_flags(founded: bool, saved: bool, marked_finding: bool) -> Self {
        CheckStatus {
            exists: true,
            founded,
            saved,
            finding: marked_finding && !founded,
        }
    }
}

impl ReceiptCheck {
    pub fn status(&self) -> CheckStatus {
        CheckStatus::from_flags(self.founded, self.saved, self.finding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_finding_marker_is_masked_once_founded() {
        let s = CheckStatus::from_flags(true, false, true);
        assert!(s.founded);
        assert!(!s.finding);
    }

    #[test]
    fn finding_reported_before_found() {
        let s = CheckStatus::from_flags(false, false, true);
        assert!(s.finding);
        assert!(!s.founded);
        assert!(!s.saved);
    }

    #[test]
    fn missing_has_all_flags_off() {
        let s = CheckStatus::missing();
        assert!(!s.exists && !s.founded && !s.saved && !s.finding);
    }
}
