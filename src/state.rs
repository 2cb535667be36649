use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Invitation {
    pub name: String,
    pub tag: String,
    pub invited_at: DateTime<Utc>,
}

/// Progress toward the requested number of invitations.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationSession {
    pub target: u32,
    pub invited: u32,
    pub invitations: Vec<Invitation>,
}

impl InvitationSession {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            invited: 0,
            invitations: Vec::new(),
        }
    }

    /// Count one invitation. Returns `false` once the target is already met.
    pub fn record(&mut self, name: &str, tag: &str) -> bool {
        if self.is_complete() {
            return false;
        }
        self.invited += 1;
        self.invitations.push(Invitation {
            name: name.to_string(),
            tag: tag.to_string(),
            invited_at: Utc::now(),
        });
        true
    }

    pub fn is_complete(&self) -> bool {
        self.invited >= self.target
    }

    pub fn remaining(&self) -> u32 {
        self.target.saturating_sub(self.invited)
    }

    pub fn invited_names(&self) -> impl Iterator<Item = &str> {
        self.invitations.iter().map(|i| i.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Target reached.
    Completed,
    /// Cycle ceiling hit before the target.
    Exhausted,
    /// Interrupted by the user.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Completed => "completed",
            Outcome::Exhausted => "exhausted",
            Outcome::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub session: InvitationSession,
    pub cycles: u32,
    pub candidates_seen: u32,
}

impl RunReport {
    /// One-line summary followed by the invited names.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}: invited {}/{} after {} cycle(s), {} candidate(s) reviewed",
            self.outcome,
            self.session.invited,
            self.session.target,
            self.cycles,
            self.candidates_seen
        );
        for name in self.session.invited_names() {
            out.push_str("\n  - ");
            out.push_str(name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_stops_at_target() {
        let mut session = InvitationSession::new(2);
        assert_eq!(session.remaining(), 2);
        assert!(session.record("alpha", "#A"));
        assert!(!session.is_complete());
        assert!(session.record("beta", "#B"));
        assert!(session.is_complete());
        assert!(!session.record("gamma", "#C"));
        assert_eq!(session.invited, 2);
        assert_eq!(session.remaining(), 0);
        assert_eq!(session.invited_names().collect::<Vec<_>>(), ["alpha", "beta"]);
    }

    #[test]
    fn test_summary_lists_names() {
        let mut session = InvitationSession::new(3);
        session.record("alpha", "#A");
        let report = RunReport {
            outcome: Outcome::Exhausted,
            session,
            cycles: 100,
            candidates_seen: 42,
        };
        let summary = report.summary();
        assert!(summary.starts_with("exhausted: invited 1/3 after 100 cycle(s)"));
        assert!(summary.ends_with("\n  - alpha"));
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            outcome: Outcome::Completed,
            session: InvitationSession::new(0),
            cycles: 0,
            candidates_seen: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["session"]["target"], 0);
    }
}
