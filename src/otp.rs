use async_trait::async_trait;
use dashmap::DashMap;
use log::warn;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_TTL_SECS: u64 = 300;

/// Out-of-band delivery channel for issued codes (mail, SMS, ...).
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Default sender: logs the code. Stands in until a real transport is wired.
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, email: &str, code: &str) -> anyhow::Result<()> {
        log::info!("OTP issued for {email}: {code}");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    Match,
    Mismatch,
    NotFound,
}

struct Challenge {
    code: String,
    issued_at: Instant,
}

/// One active challenge per email. Entries expire after `ttl` and a
/// successful verification consumes the entry, so a code matches at most
/// once.
pub struct OtpStore {
    challenges: DashMap<String, Challenge>,
    ttl: Duration,
    sender: Arc<dyn OtpSender>,
}

impl OtpStore {
    pub fn new(ttl: Duration, sender: Arc<dyn OtpSender>) -> Self {
        Self { challenges: DashMap::new(), ttl, sender }
    }

    pub fn from_env(sender: Arc<dyn OtpSender>) -> Self {
        let secs = std::env::var("FILEDROP_OTP_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TTL_SECS);
        Self::new(Duration::from_secs(secs), sender)
    }

    /// Generate a fresh 6-digit code for `email`, replacing any prior
    /// challenge, and hand it to the delivery channel. Delivery failures are
    /// logged and do not fail issuance.
    pub async fn issue(&self, email: &str) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..=999_999u32));
        self.challenges.insert(
            email.to_string(),
            Challenge { code: code.clone(), issued_at: Instant::now() },
        );
        if let Err(e) = self.sender.send(email, &code).await {
            warn!("OTP delivery for {email} failed: {e}");
        }
        code
    }

    pub fn verify(&self, email: &str, code: &str) -> OtpOutcome {
        let issued_at = match self.challenges.get(email) {
            None => return OtpOutcome::NotFound,
            Some(entry) => {
                if entry.issued_at.elapsed() < self.ttl && entry.code != code {
                    return OtpOutcome::Mismatch;
                }
                entry.issued_at
            }
        };
        // remove the entry we inspected, not one reissued since the lookup
        let removed = self
            .challenges
            .remove_if(email, |_, c| c.issued_at == issued_at)
            .is_some();
        if !removed || issued_at.elapsed() >= self.ttl {
            OtpOutcome::NotFound
        } else {
            OtpOutcome::Match
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl: Duration) -> OtpStore {
        OtpStore::new(ttl, Arc::new(LogOtpSender))
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let s = store(Duration::from_secs(60));
        assert_eq!(s.verify("nobody@x.com", "123456"), OtpOutcome::NotFound);
    }

    #[tokio::test]
    async fn correct_code_matches_once() {
        let s = store(Duration::from_secs(60));
        let code = s.issue("a@x.com").await;
        assert_eq!(code.len(), 6);
        assert_eq!(s.verify("a@x.com", &code), OtpOutcome::Match);
        // consumed on match
        assert_eq!(s.verify("a@x.com", &code), OtpOutcome::NotFound);
    }

    #[tokio::test]
    async fn wrong_code_is_mismatch_and_not_consumed() {
        let s = store(Duration::from_secs(60));
        let code = s.issue("a@x.com").await;
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert_eq!(s.verify("a@x.com", wrong), OtpOutcome::Mismatch);
        assert_eq!(s.verify("a@x.com", &code), OtpOutcome::Match);
    }

    #[tokio::test]
    async fn reissue_overwrites_prior_code() {
        let s = store(Duration::from_secs(60));
        let first = s.issue("a@x.com").await;
        let second = s.issue("a@x.com").await;
        if first != second {
            assert_eq!(s.verify("a@x.com", &first), OtpOutcome::Mismatch);
        }
        assert_eq!(s.verify("a@x.com", &second), OtpOutcome::Match);
    }

    #[tokio::test]
    async fn expired_code_is_not_found() {
        let s = store(Duration::from_millis(10));
        let code = s.issue("a@x.com").await;
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(s.verify("a@x.com", &code), OtpOutcome::NotFound);
    }

    #[tokio::test]
    async fn independent_emails_do_not_interfere() {
        let s = store(Duration::from_secs(60));
        let a = s.issue("a@x.com").await;
        let b = s.issue("b@x.com").await;
        assert_eq!(s.verify("a@x.com", &a), OtpOutcome::Match);
        assert_eq!(s.verify("b@x.com", &b), OtpOutcome::Match);
    }
}
