//! Tunables governing invite issuance and redemption.

use std::time::Duration;

use url::Url;

use super::PairingCode;

/// Default base for shareable invite links.
pub const DEFAULT_LINK_BASE: &str = "pairing://invite";
/// Default bound on code-generation attempts per `IssueInvite`.
pub const DEFAULT_ISSUE_MAX_ATTEMPTS: u32 = 10;
/// Default number of re-reads after a redemption commit conflict.
pub const DEFAULT_REDEEM_CONFLICT_RETRIES: u32 = 3;
/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_ISSUE_ATTEMPTS: u32 = 100;
const MAX_CONFLICT_RETRIES: u32 = 10;
const MIN_STORE_TIMEOUT: Duration = Duration::from_millis(10);
const MAX_STORE_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_TOKEN_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingPolicyError {
    #[error("invite link base `{base}` is not a valid URL: {reason}")]
    InvalidLinkBase { base: String, reason: String },
    #[error("invite link base `{base}` must not carry a query or fragment")]
    LinkBaseHasSuffix { base: String },
}

/// Issuance and redemption policy shared by the coordinator and directory.
///
/// Numeric knobs are clamped rather than rejected: zero attempts becomes one,
/// and absurd timeouts are pulled back into range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPolicy {
    link_base: String,
    token_ttl: Option<chrono::Duration>,
    issue_max_attempts: u32,
    redeem_conflict_retries: u32,
    store_timeout: Duration,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            link_base: DEFAULT_LINK_BASE.to_owned(),
            token_ttl: None,
            issue_max_attempts: DEFAULT_ISSUE_MAX_ATTEMPTS,
            redeem_conflict_retries: DEFAULT_REDEEM_CONFLICT_RETRIES,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl PairingPolicy {
    /// Use `base` as the prefix of shareable links.
    pub fn with_link_base(mut self, base: &str) -> Result<Self, PairingPolicyError> {
        let trimmed = base.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|err| PairingPolicyError::InvalidLinkBase {
            base: base.to_owned(),
            reason: err.to_string(),
        })?;
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(PairingPolicyError::LinkBaseHasSuffix {
                base: base.to_owned(),
            });
        }
        self.link_base = trimmed.to_owned();
        Ok(self)
    }

    /// Expire tokens `ttl` after issue. `None` disables expiry.
    ///
    /// Non-positive values disable expiry; anything beyond a year is capped.
    pub fn with_token_ttl(mut self, ttl: Option<chrono::Duration>) -> Self {
        let longest = chrono::Duration::days(MAX_TOKEN_TTL_DAYS);
        self.token_ttl = ttl
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .map(|ttl| ttl.min(longest));
        self
    }

    pub fn with_issue_max_attempts(mut self, attempts: u32) -> Self {
        self.issue_max_attempts = attempts.clamp(1, MAX_ISSUE_ATTEMPTS);
        self
    }

    pub fn with_redeem_conflict_retries(mut self, retries: u32) -> Self {
        self.redeem_conflict_retries = retries.min(MAX_CONFLICT_RETRIES);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout.clamp(MIN_STORE_TIMEOUT, MAX_STORE_TIMEOUT);
        self
    }

    pub fn link_base(&self) -> &str {
        self.link_base.as_str()
    }

    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        self.token_ttl
    }

    pub fn issue_max_attempts(&self) -> u32 {
        self.issue_max_attempts
    }

    pub fn redeem_conflict_retries(&self) -> u32 {
        self.redeem_conflict_retries
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Shareable link for `code`, e.g. `pairing://invite/X7K2M9QT`.
    pub fn link_for(&self, code: &PairingCode) -> String {
        format!("{}/{}", self.link_base, code)
    }
}
