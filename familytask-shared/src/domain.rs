use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A family may hold at most this many parent profiles.
pub const MAX_PARENTS_PER_FAMILY: i64 = 2;

/// The identifier of a family, shared out-of-band so another member can join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyCode(String);

impl FamilyCode {
    /// Trims surrounding whitespace; empty input is not a code.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(FamilyCode(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FamilyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskCompleted,
    TaskApproved,
    RewardRedeemed,
    FamilyJoined,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskCompleted => "task_completed",
            NotificationKind::TaskApproved => "task_approved",
            NotificationKind::RewardRedeemed => "reward_redeemed",
            NotificationKind::FamilyJoined => "family_joined",
            NotificationKind::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = std::convert::Infallible;

    /// Rows written by older tooling carry free-form types; those read as `System`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "task_completed" => NotificationKind::TaskCompleted,
            "task_approved" => NotificationKind::TaskApproved,
            "reward_redeemed" => NotificationKind::RewardRedeemed,
            "family_joined" => NotificationKind::FamilyJoined,
            _ => NotificationKind::System,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_code_rejects_blank_input() {
        assert!(FamilyCode::parse("").is_none());
        assert!(FamilyCode::parse("   ").is_none());
        assert_eq!(FamilyCode::parse(" F1 ").unwrap().as_str(), "F1");
    }

    #[test]
    fn unknown_notification_type_reads_as_system() {
        let kind: NotificationKind = "points_bonus".parse().unwrap();
        assert_eq!(kind, NotificationKind::System);
        let kind: NotificationKind = "task_approved".parse().unwrap();
        assert_eq!(kind, NotificationKind::TaskApproved);
    }
}
