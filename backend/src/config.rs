//! Pairing configuration loaded via OrthoConfig.
//!
//! Values come from `PAIRING_*` environment variables or a config file.
//! Every field is optional; [`PairingSettings::to_policy`] fills gaps with
//! the domain defaults.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{PairingPolicy, PairingPolicyError};

/// Configuration values for invite issuance, redemption, and storage.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PAIRING")]
pub struct PairingSettings {
    /// Base of shareable invite links, e.g. `yourapp://invite`.
    pub link_base: Option<String>,
    /// Hours before an issued invite expires. Unset disables expiry.
    pub token_ttl_hours: Option<u32>,
    /// Code-generation attempts per issued invite.
    pub issue_max_attempts: Option<u32>,
    /// Re-reads allowed after a commit conflict.
    pub redeem_conflict_retries: Option<u32>,
    /// Deadline for a single store call, in milliseconds.
    pub store_timeout_ms: Option<u64>,
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
}

impl PairingSettings {
    /// Build the domain policy, applying defaults for anything unset.
    pub fn to_policy(&self) -> Result<PairingPolicy, PairingPolicyError> {
        let mut policy = PairingPolicy::default();
        if let Some(base) = self.link_base.as_deref() {
            policy = policy.with_link_base(base)?;
        }
        if let Some(hours) = self.token_ttl_hours {
            policy = policy.with_token_ttl(Some(chrono::Duration::hours(i64::from(hours))));
        }
        if let Some(attempts) = self.issue_max_attempts {
            policy = policy.with_issue_max_attempts(attempts);
        }
        if let Some(retries) = self.redeem_conflict_retries {
            policy = policy.with_redeem_conflict_retries(retries);
        }
        if let Some(millis) = self.store_timeout_ms {
            policy = policy.with_store_timeout(Duration::from_millis(millis));
        }
        Ok(policy)
    }

    /// Configured database URL, ignoring blank values.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
