//! Authenticated actor model

use serde::{Deserialize, Serialize};

/// The signed-in team member and their role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Team identifier, matched against `Distribution::owner_id`
    pub user_id: String,
    pub display_name: String,
    /// Zone id or zone name, depending on how the assignment was recorded
    #[serde(default)]
    pub assigned_zone: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    /// Expiry timestamp (Unix ms)
    pub expires_at: i64,
}

impl Session {
    #[must_use]
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }

    /// Slide the expiry forward from `now_ms`.
    pub fn refresh(&mut self, now_ms: i64, ttl_ms: i64) {
        self.expires_at = self.expires_at.max(now_ms.saturating_add(ttl_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: i64) -> Session {
        Session {
            user_id: "team-1".to_string(),
            display_name: "Team 1".to_string(),
            assigned_zone: Some("North".to_string()),
            is_admin: false,
            expires_at,
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let session = session(1_000);
        assert!(!session.is_expired_at(999));
        assert!(session.is_expired_at(1_000));
    }

    #[test]
    fn refresh_slides_but_never_shortens() {
        let mut session = session(1_000);
        session.refresh(900, 500);
        assert_eq!(session.expires_at, 1_400);

        session.refresh(0, 10);
        assert_eq!(session.expires_at, 1_400);
    }
}
