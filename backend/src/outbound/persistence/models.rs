//! Diesel row structs for the pairing tables.
//!
//! These types are internal to the persistence layer; the store converts them
//! to and from domain aggregates.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{connections, pairing_tokens};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pairing_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PairingTokenRow {
    pub code: String,
    pub issuer_id: String,
    pub issuer_role: String,
    pub redeemer_role: String,
    pub status: String,
    pub redeemed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub revision: i32,
}

/// Insertable token; `issue_seq` is left to the database.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pairing_tokens)]
pub(crate) struct NewPairingTokenRow<'a> {
    pub code: &'a str,
    pub issuer_id: &'a str,
    pub issuer_role: &'a str,
    pub redeemer_role: &'a str,
    pub status: &'a str,
    pub redeemed_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub revision: i32,
}

/// Lifecycle columns written by a revision-guarded update.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = pairing_tokens)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct PairingTokenUpdate<'a> {
    pub status: &'a str,
    pub redeemed_by: Option<&'a str>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub revision: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = connections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ConnectionRow {
    pub id: Uuid,
    pub account_a_id: String,
    pub account_b_id: String,
    pub created_by: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = connections)]
pub(crate) struct NewConnectionRow<'a> {
    pub id: Uuid,
    pub account_a_id: &'a str,
    pub account_b_id: &'a str,
    pub created_by: &'a str,
    pub status: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
