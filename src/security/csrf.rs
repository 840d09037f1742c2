//! One-time CSRF tokens bound to the origin that requested them.
//!
//! ```text
//! issue() ──▶ Issued/Valid ──validate()+consume()──▶ Consumed
//!                  │
//!                  └──expires_at <= now──▶ Expired (removed on validate or sweep)
//! ```

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::security::sweeper::Sweepable;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// A stored token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub value: String,
    pub session_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    Unknown,
    Expired,
    SessionMismatch,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::Unknown => "unknown",
            TokenRejection::Expired => "expired",
            TokenRejection::SessionMismatch => "session_mismatch",
        }
    }
}

/// Issues and validates tokens against a shared store.
pub struct CsrfTokenManager {
    store: DashMap<String, CsrfToken>,
    ttl_ms: u64,
}

impl Default for CsrfTokenManager {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

impl CsrfTokenManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: DashMap::new(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Issue a fresh token for `session_id` at `now` (ms since epoch).
    pub fn issue(&self, session_id: &str, now: u64) -> String {
        loop {
            let value = generate_token_value();
            // A collision at 256 bits means a broken RNG; draw again rather than overwrite.
            if let Entry::Vacant(slot) = self.store.entry(value.clone()) {
                slot.insert(CsrfToken {
                    value: value.clone(),
                    session_id: session_id.to_string(),
                    issued_at: now,
                    expires_at: now.saturating_add(self.ttl_ms),
                });
                return value;
            }
        }
    }

    /// True when `token` is live and was issued to `session_id`.
    pub fn validate(&self, token: &str, session_id: &str, now: u64) -> bool {
        self.check(token, session_id, now).is_ok()
    }

    /// Like [`validate`](Self::validate), reporting the rejection reason.
    ///
    /// Expired tokens are removed. A session mismatch leaves the token in
    /// place so a wrong guess cannot burn a legitimate token.
    pub fn check(&self, token: &str, session_id: &str, now: u64) -> Result<(), TokenRejection> {
        if !is_well_formed(token) {
            return Err(TokenRejection::Malformed);
        }

        let expired = {
            let entry = self.store.get(token).ok_or(TokenRejection::Unknown)?;
            if entry.expires_at > now && entry.session_id != session_id {
                return Err(TokenRejection::SessionMismatch);
            }
            entry.expires_at <= now
        };

        if expired {
            self.store.remove_if(token, |_, t| t.expires_at <= now);
            return Err(TokenRejection::Expired);
        }
        Ok(())
    }

    /// Remove a token after it has gated a state-changing request.
    pub fn consume(&self, token: &str) -> bool {
        self.store.remove(token).is_some()
    }

    /// Validate and consume in one step; the token is gone afterwards only on success.
    pub fn validate_and_consume(&self, token: &str, session_id: &str, now: u64) -> Result<(), TokenRejection> {
        self.check(token, session_id, now)?;
        // A concurrent request may have consumed it between check and remove.
        if self.consume(token) {
            Ok(())
        } else {
            Err(TokenRejection::Unknown)
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.store.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop every token whose expiry has passed.
    pub fn sweep_expired(&self, now: u64) -> usize {
        let before = self.store.len();
        self.store.retain(|_, token| token.expires_at > now);
        before.saturating_sub(self.store.len())
    }
}

impl Sweepable for CsrfTokenManager {
    fn name(&self) -> &'static str {
        "csrf_tokens"
    }

    fn sweep(&self, now: u64) -> usize {
        self.sweep_expired(now)
    }

    fn size(&self) -> usize {
        self.len()
    }
}

fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}
