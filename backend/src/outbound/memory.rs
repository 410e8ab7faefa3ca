//! In-process pairing store.
//!
//! Every primitive runs under one `std::sync::Mutex`, so a commit's revision
//! check and its token and connection writes apply together. The lock is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::ports::{PairingStore, PairingStoreError};
use crate::domain::{
    AccountId, Connection, ConnectionDraft, ConnectionId, PairingCode, PairingToken,
};

#[derive(Debug)]
struct StoredToken {
    token: PairingToken,
    /// Insertion order, used to break `created_at` ties when listing.
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    tokens: HashMap<PairingCode, StoredToken>,
    connections: Vec<Connection>,
    next_seq: u64,
}

/// Pairing store backed by process memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPairingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPairingStore {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, PairingStoreError> {
        self.state
            .lock()
            .map_err(|_| PairingStoreError::connection("in-memory pairing store lock poisoned"))
    }

    /// Number of connections stored so far.
    pub fn connection_total(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connections
            .len()
    }

    fn next_revision(token: &PairingToken) -> Result<u32, PairingStoreError> {
        token
            .revision()
            .checked_add(1)
            .ok_or_else(|| PairingStoreError::query("pairing token revision overflow"))
    }

    /// Replace the stored token if it is still at the caller's revision.
    fn swap_token(
        state: &mut MemoryState,
        token: &PairingToken,
    ) -> Result<PairingToken, PairingStoreError> {
        let mismatch = || PairingStoreError::revision_mismatch(token.code().as_str(), token.revision());
        let stored = state.tokens.get_mut(token.code()).ok_or_else(mismatch)?;
        if stored.token.revision() != token.revision() {
            return Err(mismatch());
        }
        let next = token.clone().with_revision(Self::next_revision(token)?);
        stored.token = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl PairingStore for InMemoryPairingStore {
    async fn create_token_if_absent(
        &self,
        token: &PairingToken,
    ) -> Result<bool, PairingStoreError> {
        let mut state = self.lock()?;
        if state.tokens.contains_key(token.code()) {
            return Ok(false);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tokens.insert(
            token.code().clone(),
            StoredToken {
                token: token.clone().with_revision(0),
                seq,
            },
        );
        Ok(true)
    }

    async fn find_token(
        &self,
        code: &PairingCode,
    ) -> Result<Option<PairingToken>, PairingStoreError> {
        let state = self.lock()?;
        Ok(state.tokens.get(code).map(|stored| stored.token.clone()))
    }

    async fn commit_redemption(
        &self,
        redeemed: &PairingToken,
        connection: &ConnectionDraft,
    ) -> Result<Connection, PairingStoreError> {
        let mut state = self.lock()?;
        Self::swap_token(&mut state, redeemed)?;
        let connection = Connection::from_draft(ConnectionId::random(), connection.clone());
        state.connections.push(connection.clone());
        Ok(connection)
    }

    async fn commit_token_update(
        &self,
        token: &PairingToken,
    ) -> Result<PairingToken, PairingStoreError> {
        let mut state = self.lock()?;
        Self::swap_token(&mut state, token)
    }

    async fn list_tokens_by_issuer(
        &self,
        issuer: &AccountId,
    ) -> Result<Vec<PairingToken>, PairingStoreError> {
        let state = self.lock()?;
        let mut stored: Vec<&StoredToken> = state
            .tokens
            .values()
            .filter(|stored| stored.token.issuer_id() == issuer)
            .collect();
        stored.sort_by(|a, b| {
            b.token
                .created_at()
                .cmp(&a.token.created_at())
                .then(b.seq.cmp(&a.seq))
        });
        Ok(stored.into_iter().map(|stored| stored.token.clone()).collect())
    }

    async fn list_connections_for_account(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Connection>, PairingStoreError> {
        let state = self.lock()?;
        let mut connections: Vec<Connection> = state
            .connections
            .iter()
            .rev()
            .filter(|connection| connection.involves(account))
            .cloned()
            .collect();
        connections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(connections)
    }
}
