//! PostgreSQL-backed `PairingStore` implementation using Diesel.
//!
//! Create-if-absent is an `INSERT ... ON CONFLICT (code) DO NOTHING`. Commits
//! are `UPDATE ... WHERE code = $1 AND revision = $expected`; zero affected
//! rows means another writer got there first. Redemption wraps that update and
//! the connection insert in one transaction.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{PairingStore, PairingStoreError};
use crate::domain::{
    AccountId, Connection, ConnectionDraft, ConnectionId, ConnectionStatus, PairingCode,
    PairingToken, PairingTokenDraft,
};

use super::models::{
    ConnectionRow, NewConnectionRow, NewPairingTokenRow, PairingTokenRow, PairingTokenUpdate,
};
use super::pool::{DbPool, PoolError};
use super::schema::{connections, pairing_tokens};

/// Diesel-backed implementation of the [`PairingStore`] port.
#[derive(Clone)]
pub struct DieselPairingStore {
    pool: DbPool,
}

impl DieselPairingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Failure inside the redemption transaction.
#[derive(Debug)]
enum CommitError {
    Diesel(diesel::result::Error),
    RevisionMismatch,
}

impl From<diesel::result::Error> for CommitError {
    fn from(value: diesel::result::Error) -> Self {
        Self::Diesel(value)
    }
}

fn map_pool_error(error: PoolError) -> PairingStoreError {
    PairingStoreError::connection(error.message())
}

fn map_diesel_error(error: diesel::result::Error) -> PairingStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => PairingStoreError::query("record not found"),
        DieselError::QueryBuilderError(_) => PairingStoreError::query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            PairingStoreError::connection("database connection error")
        }
        _ => PairingStoreError::query("database error"),
    }
}

fn revision_to_db(revision: u32) -> Result<i32, PairingStoreError> {
    i32::try_from(revision)
        .map_err(|_| PairingStoreError::query("pairing token revision exceeds column range"))
}

fn revision_from_db(revision: i32) -> Result<u32, PairingStoreError> {
    u32::try_from(revision)
        .map_err(|_| PairingStoreError::query("stored pairing token revision is negative"))
}

fn next_revision(token: &PairingToken) -> Result<u32, PairingStoreError> {
    token
        .revision()
        .checked_add(1)
        .ok_or_else(|| PairingStoreError::query("pairing token revision overflow"))
}

fn malformed(what: &str, err: impl std::fmt::Display) -> PairingStoreError {
    debug!(error = %err, what, "rejecting malformed pairing row");
    PairingStoreError::query(format!("stored {what} is malformed"))
}

fn parse_account(raw: String) -> Result<AccountId, PairingStoreError> {
    AccountId::new(raw).map_err(|err| malformed("account id", err))
}

fn row_to_token(row: PairingTokenRow) -> Result<PairingToken, PairingStoreError> {
    let draft = PairingTokenDraft {
        code: PairingCode::new(row.code).map_err(|err| malformed("pairing code", err))?,
        issuer_id: parse_account(row.issuer_id)?,
        issuer_role: row
            .issuer_role
            .parse()
            .map_err(|err| malformed("issuer role", err))?,
        redeemer_role: row
            .redeemer_role
            .parse()
            .map_err(|err| malformed("redeemer role", err))?,
        status: row
            .status
            .parse()
            .map_err(|err| malformed("token status", err))?,
        redeemed_by: row.redeemed_by.map(parse_account).transpose()?,
        created_at: row.created_at,
        redeemed_at: row.redeemed_at,
        expires_at: row.expires_at,
        cancelled_at: row.cancelled_at,
        revision: revision_from_db(row.revision)?,
    };
    PairingToken::restore(draft).map_err(|err| malformed("pairing token", err))
}

fn row_to_connection(row: ConnectionRow) -> Result<Connection, PairingStoreError> {
    Ok(Connection {
        id: ConnectionId::new(row.id),
        account_a_id: parse_account(row.account_a_id)?,
        account_b_id: parse_account(row.account_b_id)?,
        created_by: parse_account(row.created_by)?,
        status: row
            .status
            .parse()
            .map_err(|err| malformed("connection status", err))?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn new_token_row(token: &PairingToken) -> Result<NewPairingTokenRow<'_>, PairingStoreError> {
    Ok(NewPairingTokenRow {
        code: token.code().as_str(),
        issuer_id: token.issuer_id().as_str(),
        issuer_role: token.issuer_role().as_str(),
        redeemer_role: token.redeemer_role().as_str(),
        status: token.status().as_str(),
        redeemed_by: token.redeemed_by().map(AccountId::as_str),
        created_at: token.created_at(),
        redeemed_at: token.redeemed_at(),
        expires_at: token.expires_at(),
        cancelled_at: token.cancelled_at(),
        revision: revision_to_db(token.revision())?,
    })
}

fn token_update(
    token: &PairingToken,
    revision: u32,
) -> Result<PairingTokenUpdate<'_>, PairingStoreError> {
    Ok(PairingTokenUpdate {
        status: token.status().as_str(),
        redeemed_by: token.redeemed_by().map(AccountId::as_str),
        redeemed_at: token.redeemed_at(),
        cancelled_at: token.cancelled_at(),
        revision: revision_to_db(revision)?,
    })
}

fn new_connection_row(id: Uuid, draft: &ConnectionDraft) -> NewConnectionRow<'_> {
    NewConnectionRow {
        id,
        account_a_id: draft.account_a_id.as_str(),
        account_b_id: draft.account_b_id.as_str(),
        created_by: draft.created_by.as_str(),
        status: ConnectionStatus::Active.as_str(),
        created_at: draft.created_at,
        updated_at: draft.created_at,
    }
}

fn mismatch(token: &PairingToken) -> PairingStoreError {
    PairingStoreError::revision_mismatch(token.code().as_str(), token.revision())
}

/// Map a failed commit of `token`. Postgres serialization failures mean a
/// concurrent writer won, which is the same outcome as a stale revision.
fn map_commit_error(token: &PairingToken, error: diesel::result::Error) -> PairingStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            debug!(code = %token.code(), "commit hit a serialization failure");
            mismatch(token)
        }
        other => map_diesel_error(other),
    }
}

#[async_trait]
impl PairingStore for DieselPairingStore {
    async fn create_token_if_absent(
        &self,
        token: &PairingToken,
    ) -> Result<bool, PairingStoreError> {
        let fresh = token.clone().with_revision(0);
        let row = new_token_row(&fresh)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let inserted = diesel::insert_into(pairing_tokens::table)
            .values(&row)
            .on_conflict(pairing_tokens::code)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(inserted == 1)
    }

    async fn find_token(
        &self,
        code: &PairingCode,
    ) -> Result<Option<PairingToken>, PairingStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<PairingTokenRow> = pairing_tokens::table
            .filter(pairing_tokens::code.eq(code.as_str()))
            .select(PairingTokenRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_token).transpose()
    }

    async fn commit_redemption(
        &self,
        redeemed: &PairingToken,
        connection: &ConnectionDraft,
    ) -> Result<Connection, PairingStoreError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let expected = revision_to_db(redeemed.revision())?;
        let update = token_update(redeemed, next_revision(redeemed)?)?;
        let id = ConnectionId::random();
        let connection_row = new_connection_row(*id.as_uuid(), connection);
        let code = redeemed.code().as_str();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        // The token update and the connection insert land together or not at all.
        let outcome: Result<(), CommitError> = conn
            .transaction(|conn| {
                async move {
                    let updated = diesel::update(pairing_tokens::table)
                        .filter(
                            pairing_tokens::code
                                .eq(code)
                                .and(pairing_tokens::revision.eq(expected)),
                        )
                        .set(&update)
                        .execute(conn)
                        .await?;
                    if updated == 0 {
                        return Err(CommitError::RevisionMismatch);
                    }

                    diesel::insert_into(connections::table)
                        .values(&connection_row)
                        .execute(conn)
                        .await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await;

        match outcome {
            Ok(()) => Ok(Connection::from_draft(id, connection.clone())),
            Err(CommitError::RevisionMismatch) => Err(mismatch(redeemed)),
            Err(CommitError::Diesel(err)) => Err(map_commit_error(redeemed, err)),
        }
    }

    async fn commit_token_update(
        &self,
        token: &PairingToken,
    ) -> Result<PairingToken, PairingStoreError> {
        let expected = revision_to_db(token.revision())?;
        let revision = next_revision(token)?;
        let update = token_update(token, revision)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(pairing_tokens::table)
            .filter(
                pairing_tokens::code
                    .eq(token.code().as_str())
                    .and(pairing_tokens::revision.eq(expected)),
            )
            .set(&update)
            .execute(&mut conn)
            .await
            .map_err(|err| map_commit_error(token, err))?;

        if updated == 0 {
            return Err(mismatch(token));
        }
        Ok(token.clone().with_revision(revision))
    }

    async fn list_tokens_by_issuer(
        &self,
        issuer: &AccountId,
    ) -> Result<Vec<PairingToken>, PairingStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<PairingTokenRow> = pairing_tokens::table
            .filter(pairing_tokens::issuer_id.eq(issuer.as_str()))
            .order((
                pairing_tokens::created_at.desc(),
                pairing_tokens::issue_seq.desc(),
            ))
            .select(PairingTokenRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(row_to_token).collect()
    }

    async fn list_connections_for_account(
        &self,
        account: &AccountId,
    ) -> Result<Vec<Connection>, PairingStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<ConnectionRow> = connections::table
            .filter(
                connections::account_a_id
                    .eq(account.as_str())
                    .or(connections::account_b_id.eq(account.as_str())),
            )
            .order(connections::created_at.desc())
            .select(ConnectionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter().map(row_to_connection).collect()
    }
}
