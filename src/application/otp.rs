use crate::domain::challenge::{ChallengeStatus, OtpChallenge};
use crate::domain::ports::{ChallengeStoreRef, OtpDeliveryRef};
use crate::error::{LedgerError, Result};
use chrono::{Duration, Utc};
use rand::Rng;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub ttl: Duration,
    pub max_attempts: u8,
    pub resend_cooldown: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            max_attempts: 5,
            resend_cooldown: Duration::seconds(30),
        }
    }
}

/// Issues, verifies, and reissues one-time codes bound to pending movements.
///
/// The manager stores only code hashes; plaintext codes leave through the
/// delivery port exactly once per issue and are never persisted or logged.
pub struct OtpManager {
    challenges: ChallengeStoreRef,
    delivery: OtpDeliveryRef,
    config: OtpConfig,
}

impl OtpManager {
    pub fn new(challenges: ChallengeStoreRef, delivery: OtpDeliveryRef) -> Self {
        Self::with_config(challenges, delivery, OtpConfig::default())
    }

    pub fn with_config(
        challenges: ChallengeStoreRef,
        delivery: OtpDeliveryRef,
        config: OtpConfig,
    ) -> Self {
        Self {
            challenges,
            delivery,
            config,
        }
    }

    pub async fn issue(&self, movement_id: Uuid) -> Result<OtpChallenge> {
        let code = generate_code();
        let challenge = OtpChallenge::new(
            movement_id,
            &code,
            self.config.ttl,
            self.config.max_attempts,
            self.config.resend_cooldown,
        );
        self.challenges.insert(challenge.clone()).await?;
        self.delivery.deliver(movement_id, &code).await?;
        tracing::info!(
            %movement_id,
            challenge_id = %challenge.challenge_id,
            expires_at = %challenge.expires_at,
            "issued otp challenge"
        );
        Ok(challenge)
    }

    /// Check a submitted code against the movement's latest challenge.
    ///
    /// A correct code flips the challenge `Pending -> Verified` through the
    /// store CAS, so it is accepted at most once even under concurrent
    /// submissions. A wrong code burns one attempt; the attempt that spends
    /// the last one reports `OtpExhausted`.
    pub async fn verify(&self, movement_id: Uuid, submitted: &str) -> Result<OtpChallenge> {
        let challenge = self.latest(movement_id).await?;
        match challenge.status {
            ChallengeStatus::Verified => Err(LedgerError::OtpAlreadyUsed),
            ChallengeStatus::Expired => Err(LedgerError::OtpExpired),
            ChallengeStatus::Exhausted => Err(LedgerError::OtpExhausted),
            ChallengeStatus::Pending => {
                if challenge.is_expired(Utc::now()) {
                    let _ = self
                        .challenges
                        .transition(
                            challenge.challenge_id,
                            ChallengeStatus::Pending,
                            ChallengeStatus::Expired,
                        )
                        .await;
                    return Err(LedgerError::OtpExpired);
                }
                if challenge.matches(submitted) {
                    match self
                        .challenges
                        .transition(
                            challenge.challenge_id,
                            ChallengeStatus::Pending,
                            ChallengeStatus::Verified,
                        )
                        .await
                    {
                        Ok(verified) => Ok(verified),
                        // lost the race; report whatever state won
                        Err(_) => match self.latest(movement_id).await?.status {
                            ChallengeStatus::Expired => Err(LedgerError::OtpExpired),
                            ChallengeStatus::Exhausted => Err(LedgerError::OtpExhausted),
                            _ => Err(LedgerError::OtpAlreadyUsed),
                        },
                    }
                } else {
                    let updated = self.challenges.fail_attempt(challenge.challenge_id).await?;
                    tracing::debug!(
                        %movement_id,
                        attempts_remaining = updated.attempts_remaining,
                        "otp mismatch"
                    );
                    if updated.status == ChallengeStatus::Exhausted {
                        Err(LedgerError::OtpExhausted)
                    } else {
                        Err(LedgerError::WrongCode {
                            attempts_remaining: updated.attempts_remaining,
                        })
                    }
                }
            }
        }
    }

    /// Invalidate the prior challenge and issue a fresh one, throttled by
    /// the resend cooldown.
    pub async fn resend(&self, movement_id: Uuid) -> Result<OtpChallenge> {
        let prior = self.latest(movement_id).await?;
        let now = Utc::now();
        match prior.status {
            ChallengeStatus::Verified => Err(LedgerError::OtpAlreadyUsed),
            ChallengeStatus::Exhausted => Err(LedgerError::OtpExhausted),
            ChallengeStatus::Pending | ChallengeStatus::Expired => {
                if prior.status == ChallengeStatus::Pending {
                    if prior.in_resend_cooldown(now) {
                        return Err(LedgerError::ResendCooldown {
                            until: prior.resend_cooldown_until,
                        });
                    }
                    let _ = self
                        .challenges
                        .transition(
                            prior.challenge_id,
                            ChallengeStatus::Pending,
                            ChallengeStatus::Expired,
                        )
                        .await;
                }
                let code = generate_code();
                let mut next = OtpChallenge::new(
                    movement_id,
                    &code,
                    self.config.ttl,
                    self.config.max_attempts,
                    self.config.resend_cooldown,
                );
                next.resend_count = prior.resend_count + 1;
                self.challenges.insert(next.clone()).await?;
                self.delivery.deliver(movement_id, &code).await?;
                tracing::info!(
                    %movement_id,
                    challenge_id = %next.challenge_id,
                    resend_count = next.resend_count,
                    "reissued otp challenge"
                );
                Ok(next)
            }
        }
    }

    /// True when the movement's challenge is expired (flipping it from
    /// `Pending` if its clock ran out). Drives the background sweep.
    pub async fn expire_if_stale(&self, movement_id: Uuid) -> Result<bool> {
        let Some(challenge) = self.challenges.latest_for_movement(movement_id).await? else {
            return Ok(false);
        };
        match challenge.status {
            ChallengeStatus::Expired => Ok(true),
            ChallengeStatus::Pending if challenge.is_expired(Utc::now()) => {
                let _ = self
                    .challenges
                    .transition(
                        challenge.challenge_id,
                        ChallengeStatus::Pending,
                        ChallengeStatus::Expired,
                    )
                    .await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn latest(&self, movement_id: Uuid) -> Result<OtpChallenge> {
        self.challenges
            .latest_for_movement(movement_id)
            .await?
            .ok_or(LedgerError::ChallengeNotFound {
                movement: movement_id,
            })
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}
