//! Driven port over the two pairing collections: tokens and connections.
//!
//! The backing store offers per-document conditional writes, not locks. The
//! port therefore expresses a transaction as optimistic concurrency: a token
//! read carries its `revision`, and every commit names that revision as its
//! read version. A commit whose token has moved on fails with
//! [`PairingStoreError::RevisionMismatch`] and writes nothing.

use async_trait::async_trait;

use crate::domain::{AccountId, Connection, ConnectionDraft, PairingCode, PairingToken};

use super::define_port_error;

define_port_error! {
    /// Errors raised by pairing store adapters.
    pub enum PairingStoreError {
        /// The store could not be reached.
        Connection { message: String } =>
            "pairing store connection failed: {message}",
        /// A query or mutation failed during execution.
        Query { message: String } =>
            "pairing store query failed: {message}",
        /// The token changed since it was read; nothing was written.
        RevisionMismatch { code: String, expected: u32 } =>
            "pairing token {code} is no longer at revision {expected}",
    }
}

/// Port for pairing token and connection persistence.
///
/// # Revision semantics
///
/// - Tokens are created at revision 0.
/// - Each committed write stores `revision + 1` and returns the token at its
///   new revision.
/// - The expected revision of a commit is the `revision()` of the token value
///   passed in, i.e. the revision the caller read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Insert `token` unless its code is already taken.
    ///
    /// Returns `true` when the token was created and `false` on collision.
    /// Collisions are decided by the store, so two concurrent callers with the
    /// same code cannot both see `true`.
    async fn create_token_if_absent(&self, token: &PairingToken)
    -> Result<bool, PairingStoreError>;

    /// Consistent read of a token and its current revision.
    async fn find_token(&self, code: &PairingCode)
    -> Result<Option<PairingToken>, PairingStoreError>;

    /// Atomically store the `Used` token and create the connection.
    ///
    /// Either both writes land or neither does. Returns the connection with
    /// its store-assigned id.
    async fn commit_redemption(
        &self,
        redeemed: &PairingToken,
        connection: &ConnectionDraft,
    ) -> Result<Connection, PairingStoreError>;

    /// Revision-guarded replacement of a single token.
    async fn commit_token_update(
        &self,
        token: &PairingToken,
    ) -> Result<PairingToken, PairingStoreError>;

    /// Tokens issued by `issuer`, newest first.
    async fn list_tokens_by_issuer(
        &self,
        issuer: &AccountId,
    ) -> Result<Vec<PairingToken>, PairingStoreError>;

    /// Connections in which `account` is either party, newest first.
    async fn list_connections_for_account(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Connection>, PairingStoreError>;
}
