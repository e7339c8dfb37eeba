//! Short-lived one-time-password challenges.
//!
//! The store keeps at most one live challenge per actor key. `consume`
//! removes the entry under the same lock that checks it, so concurrent
//! verifications of the same code see at most one success.

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Delivery sink for issued codes (console, email gateway, ...).
pub trait OtpChannel: Send + Sync {
    fn dispatch(&self, login: &str, code: &str);
}

/// Logs codes to the server log; the default channel for back-office
/// deployments without an email gateway.
#[derive(Clone, Debug)]
pub struct ConsoleOtpChannel;

impl OtpChannel for ConsoleOtpChannel {
    fn dispatch(&self, login: &str, code: &str) {
        info!("one-time code for {login}: {code}");
    }
}

struct OtpEntry {
    code: String,
    expires_at: Instant,
}

/// In-process challenge store. The map never leaks outside this type, so a
/// shared external store can replace it without touching call sites.
pub struct OtpStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, OtpEntry>>,
}

impl OtpStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh 6-digit code, overwriting any prior live challenge for
    /// this key.
    pub async fn issue(&self, actor_key: &str) -> String {
        let code = generate_code();
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > Instant::now());
        entries.insert(
            actor_key.to_string(),
            OtpEntry {
                code: code.clone(),
                expires_at,
            },
        );
        code
    }

    /// Consume a challenge. Returns true at most once per issued code and
    /// only before expiry; the entry is deleted on success. A wrong code
    /// leaves the challenge in place.
    pub async fn consume(&self, actor_key: &str, code: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let accepted = match entries.get(actor_key) {
            Some(entry) => entry.code == code && entry.expires_at > Instant::now(),
            None => false,
        };
        if accepted {
            entries.remove(actor_key);
        }
        accepted
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn code_is_accepted_exactly_once() {
        let store = OtpStore::new(Duration::from_secs(300));
        let code = store.issue("alice").await;
        assert!(store.consume("alice", &code).await);
        assert!(!store.consume("alice", &code).await);
    }

    #[tokio::test]
    async fn wrong_code_does_not_consume_the_challenge() {
        let store = OtpStore::new(Duration::from_secs(300));
        let code = store.issue("alice").await;
        assert!(!store.consume("alice", "000000").await || code == "000000");
        // The real code still works afterwards.
        assert!(store.consume("alice", &code).await);
    }

    #[tokio::test]
    async fn reissue_overwrites_prior_challenge() {
        let store = OtpStore::new(Duration::from_secs(300));
        let first = store.issue("alice").await;
        let second = store.issue("alice").await;
        if first != second {
            assert!(!store.consume("alice", &first).await);
        }
        assert!(store.consume("alice", &second).await);
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let store = OtpStore::new(Duration::from_millis(10));
        let code = store.issue("alice").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.consume("alice", &code).await);
    }

    #[tokio::test]
    async fn concurrent_consume_has_at_most_one_winner() {
        let store = Arc::new(OtpStore::new(Duration::from_secs(300)));
        let code = store.issue("alice").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let code = code.clone();
            handles.push(tokio::spawn(
                async move { store.consume("alice", &code).await },
            ));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("task") {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn challenges_are_scoped_per_actor_key() {
        let store = OtpStore::new(Duration::from_secs(300));
        let alice_code = store.issue("alice").await;
        let _bob_code = store.issue("bob").await;
        assert!(!store.consume("bob", &alice_code).await || alice_code == _bob_code);
        assert!(store.consume("alice", &alice_code).await);
    }
}
