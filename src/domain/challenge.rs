use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Verified,
    Expired,
    Exhausted,
}

impl ChallengeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChallengeStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Verified => "verified",
            ChallengeStatus::Expired => "expired",
            ChallengeStatus::Exhausted => "exhausted",
        }
    }
}

/// A one-time-code challenge bound 1:1 to a pending movement.
///
/// Only the SHA-256 hash of the code is stored; the plaintext goes out of
/// band through the delivery port and is never persisted or logged. A
/// challenge verifies at most once, and never after `expires_at` or once
/// `attempts_remaining` hits zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub challenge_id: Uuid,
    pub movement_id: Uuid,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u8,
    pub status: ChallengeStatus,
    pub resend_count: u32,
    pub resend_cooldown_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn new(
        movement_id: Uuid,
        code: &str,
        ttl: Duration,
        max_attempts: u8,
        resend_cooldown: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            challenge_id: Uuid::new_v4(),
            movement_id,
            code_hash: hash_code(code),
            expires_at: now + ttl,
            attempts_remaining: max_attempts,
            status: ChallengeStatus::Pending,
            resend_count: 0,
            resend_cooldown_until: now + resend_cooldown,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn in_resend_cooldown(&self, now: DateTime<Utc>) -> bool {
        now < self.resend_cooldown_until
    }

    /// Compare a submitted code against the stored hash.
    ///
    /// The comparison runs over the full digest regardless of where the
    /// first mismatching byte sits.
    pub fn matches(&self, submitted: &str) -> bool {
        let Ok(stored) = hex::decode(&self.code_hash) else {
            return false;
        };
        let submitted = Sha256::digest(submitted.as_bytes());
        if stored.len() != submitted.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in stored.iter().zip(submitted.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

/// SHA-256 of the code, hex-encoded.
pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(code: &str) -> OtpChallenge {
        OtpChallenge::new(
            Uuid::new_v4(),
            code,
            Duration::minutes(5),
            5,
            Duration::seconds(30),
        )
    }

    #[test]
    fn test_plaintext_never_stored() {
        let ch = challenge("123456");
        assert_ne!(ch.code_hash, "123456");
        assert_eq!(ch.code_hash.len(), 64);
    }

    #[test]
    fn test_matches_correct_code_only() {
        let ch = challenge("123456");
        assert!(ch.matches("123456"));
        assert!(!ch.matches("123457"));
        assert!(!ch.matches(""));
        assert!(!ch.matches("1234567"));
    }

    #[test]
    fn test_expiry_window() {
        let ch = challenge("000000");
        assert!(!ch.is_expired(Utc::now()));
        assert!(ch.is_expired(ch.expires_at));
        assert!(ch.is_expired(ch.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_resend_cooldown_window() {
        let ch = challenge("000000");
        assert!(ch.in_resend_cooldown(ch.created_at));
        assert!(!ch.in_resend_cooldown(ch.resend_cooldown_until));
    }

    #[test]
    fn test_fresh_challenge_is_pending() {
        let ch = challenge("000000");
        assert_eq!(ch.status, ChallengeStatus::Pending);
        assert_eq!(ch.attempts_remaining, 5);
        assert!(!ch.status.is_terminal());
        assert!(ChallengeStatus::Verified.is_terminal());
    }
}
