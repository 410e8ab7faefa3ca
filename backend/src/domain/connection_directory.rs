//! Read-side queries over invites and connections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::pairing_service_support::{StoreAccess, map_store_error, within_deadline};
use crate::domain::ports::{InviteStats, PairingQuery, PairingStore};
use crate::domain::{AccountId, Connection, Error, PairingPolicy, PairingToken, TokenStatus};

/// Domain service implementing [`PairingQuery`].
#[derive(Clone)]
pub struct ConnectionDirectory<S> {
    store: Arc<S>,
    store_timeout: Duration,
}

impl<S> ConnectionDirectory<S> {
    pub fn new(store: Arc<S>, policy: &PairingPolicy) -> Self {
        Self {
            store,
            store_timeout: policy.store_timeout(),
        }
    }
}

#[async_trait]
impl<S> PairingQuery for ConnectionDirectory<S>
where
    S: PairingStore,
{
    async fn list_my_invites(&self, issuer: &AccountId) -> Result<Vec<PairingToken>, Error> {
        let tokens = within_deadline(
            self.store_timeout,
            StoreAccess::Read,
            "list_tokens_by_issuer",
            self.store.list_tokens_by_issuer(issuer),
        )
        .await?
        .map_err(map_store_error)?;
        Ok(tokens
            .into_iter()
            .filter(|token| token.status() != TokenStatus::Cancelled)
            .collect())
    }

    async fn invite_stats(&self, issuer: &AccountId) -> Result<InviteStats, Error> {
        let invites = self.list_my_invites(issuer).await?;
        Ok(InviteStats::from_tokens(&invites))
    }

    async fn list_connections(&self, account: &AccountId) -> Result<Vec<Connection>, Error> {
        within_deadline(
            self.store_timeout,
            StoreAccess::Read,
            "list_connections_for_account",
            self.store.list_connections_for_account(account),
        )
        .await?
        .map_err(map_store_error)
    }
}
