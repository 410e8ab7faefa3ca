//! Driving port for read-side pairing queries.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{AccountId, Connection, Error, PairingToken, TokenStatus};

/// Issuer-facing invite counters.
///
/// `total` counts listed invites, so it always equals `used + pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InviteStats {
    pub total: usize,
    pub used: usize,
    pub pending: usize,
}

impl InviteStats {
    /// Aggregate counters over an invite listing. Cancelled tokens are skipped.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a PairingToken>) -> Self {
        tokens
            .into_iter()
            .fold(Self::default(), |mut stats, token| {
                match token.status() {
                    TokenStatus::Used => stats.used += 1,
                    TokenStatus::Pending => stats.pending += 1,
                    TokenStatus::Cancelled => return stats,
                }
                stats.total += 1;
                stats
            })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairingQuery: Send + Sync {
    /// Invites issued by `issuer`, newest first, excluding cancelled ones.
    async fn list_my_invites(&self, issuer: &AccountId) -> Result<Vec<PairingToken>, Error>;

    /// Counters over [`PairingQuery::list_my_invites`].
    async fn invite_stats(&self, issuer: &AccountId) -> Result<InviteStats, Error>;

    /// Connections in which `account` is either party, newest first.
    async fn list_connections(&self, account: &AccountId) -> Result<Vec<Connection>, Error>;
}
